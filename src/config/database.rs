//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables and their indexes are generated from the entity definitions with
//! `Schema::create_table_from_entity` / `create_index_from_entity`, so the schema
//! always matches the Rust structs without hand-written SQL.

use crate::entities::{BillFile, Inquiry, RateLimit, ReturnRecord, Unit};
use crate::errors::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Establishes a connection pool to the database at `database_url`.
///
/// Every store call acquires a pooled connection, so `timeout` bounds how long any
/// single persistence call can wait before surfacing an internal error.
#[instrument]
pub async fn create_connection(database_url: &str, timeout: Duration) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options
        .acquire_timeout(timeout)
        .connect_timeout(timeout)
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    info!("Database connection established");
    Ok(db)
}

async fn create_entity_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(builder.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(builder.build(&index)).await?;
    }
    debug!("Ensured table {}", entity.table_name());
    Ok(())
}

/// Creates all necessary database tables and indexes if they do not exist yet.
///
/// Covers units, returns, inquiries, bill metadata and rate-limit counters.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_entity_table(db, &schema, Unit).await?;
    create_entity_table(db, &schema, ReturnRecord).await?;
    create_entity_table(db, &schema, Inquiry).await?;
    create_entity_table(db, &schema, BillFile).await?;
    create_entity_table(db, &schema, RateLimit).await?;

    info!("Database tables ensured");
    Ok(())
}
