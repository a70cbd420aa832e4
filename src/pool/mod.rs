//! Bounded connection pool for the Postgres store.

pub mod config;
pub mod manager;

pub use config::DatabaseConfig;
pub use manager::{ConnectionPool, PooledConnection};
