//! SeaORM entities that map to database tables.

pub mod ping_result;

pub mod prelude {
    pub use super::ping_result::ActiveModel as PingResultActiveModel;
    pub use super::ping_result::Column as PingResultColumn;
    pub use super::ping_result::Entity as PingResult;
    pub use super::ping_result::Model as PingResultModel;
}
