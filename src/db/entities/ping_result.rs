use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One successful reachability probe against a container address.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ping_results")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub ip_address: String,
    /// Round-trip latency in milliseconds.
    #[sea_orm(column_type = "Double")]
    pub ping_time: f64,
    pub last_seen: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
