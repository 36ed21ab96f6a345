//! SurrealDB integration for the background job worker.
//!
//! This crate provides database connectivity, repositories for queues and
//! job records, and [`SurrealStore`], which implements the worker's
//! `QueueStore` and `JobStore` seams.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod schema;
mod store;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, get_db, init_db, supported_schemes};
pub use schema::init_schema;
pub use store::SurrealStore;

/// Initialize the database with the given configuration.
///
/// This should be called once at application startup.
pub async fn init(config: DbConfig) -> Result<(), DbError> {
    init_db(config).await?;
    init_schema().await?;
    Ok(())
}
