//! SQLite persistence layer for Herald.
//!
//! This crate provides the durable [`Repository`](herald_core::Repository)
//! implementation used by the engine, backed by SQLx with SQLite, plus an
//! in-memory implementation for tests and examples.
//!
//! # Example
//!
//! ```no_run
//! use herald_core::Repository;
//! use herald_core::Account;
//! use store::Store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let store = Store::connect("sqlite:herald.db?mode=rwc").await?;
//!     store.migrate().await?;
//!
//!     // Register an account
//!     let account = Account::new("+15550001111").with_label("primary");
//!     store.upsert_account(&account).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod campaign;
pub mod conversation;
pub mod error;
pub mod lead;
pub mod models;

mod memory;
mod repository;

pub use error::{Result, StoreError};
pub use memory::MemoryRepository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Default pool size for database connections.
    /// Set high enough to handle concurrent queues and sessions.
    const DEFAULT_POOL_SIZE: u32 = 20;

    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    /// Use `?mode=rwc` to create the database file if it doesn't exist.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example() -> store::Result<()> {
    /// // File database
    /// let store = store::Store::connect("sqlite:data/herald.db?mode=rwc").await?;
    ///
    /// // In-memory database (for testing)
    /// let store = store::Store::connect_with_pool_size("sqlite::memory:", 1).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect to a SQLite database with a custom pool size.
    ///
    /// In-memory databases should use a pool size of 1: each SQLite
    /// `:memory:` connection is its own database.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(
            "Connected to database: {} (pool size: {})",
            url,
            pool_size
        );

        Ok(Self { pool })
    }

    /// Run database migrations.
    ///
    /// This should be called once after connecting to ensure the schema is up to date.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
