use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr,
    EntityTrait, QueryOrder, Schema, Set,
};
use tracing::info;

use crate::db::entities::ping_result;

/// Opens a pooled connection to the results database.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(max_connections);
    Database::connect(opt).await
}

/// Owns persistence of probe results. Cheap to clone; clones share the pool.
#[derive(Clone, Debug)]
pub struct PingResultStore {
    db: DatabaseConnection,
}

impl PingResultStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates the `ping_results` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), DbErr> {
        let builder = self.db.get_database_backend();
        let schema = Schema::new(builder);
        let stmt = schema
            .create_table_from_entity(ping_result::Entity)
            .if_not_exists()
            .to_owned();
        self.db.execute(builder.build(&stmt)).await?;
        info!("Ensured ping_results table exists.");
        Ok(())
    }

    /// Appends one probe result.
    pub async fn insert(
        &self,
        ip_address: &str,
        ping_time: f64,
        last_seen: DateTime<Utc>,
    ) -> Result<ping_result::Model, DbErr> {
        let row = ping_result::ActiveModel {
            ip_address: Set(ip_address.to_owned()),
            ping_time: Set(ping_time),
            last_seen: Set(last_seen),
            ..Default::default()
        };
        row.insert(&self.db).await
    }

    /// Returns every stored result in insertion order.
    pub async fn list_all(&self) -> Result<Vec<ping_result::Model>, DbErr> {
        ping_result::Entity::find()
            .order_by_asc(ping_result::Column::Id)
            .all(&self.db)
            .await
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}
