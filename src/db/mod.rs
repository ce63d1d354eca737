//! Database layer
//!
//! SQLite storage for the forum. The pool is shared as a `DynDatabasePool`;
//! repositories wrap it behind async traits so services can also run on the
//! in-memory implementations in `memory`.
//!
//! # Usage
//!
//! ```ignore
//! use forum::config::DatabaseConfig;
//! use forum::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, DatabasePool, DynDatabasePool, SqliteDatabase};
