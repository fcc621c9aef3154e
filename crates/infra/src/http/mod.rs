//! Pooled, authenticated HTTP access to a CPD cluster
//!
//! - **[`pool`]**: bounded connection pool with RAII checkout
//! - **[`connection`]**: one reqwest session with its headers
//! - **[`client`]**: request executor with 401 token refresh

pub mod client;
pub mod connection;
pub mod pool;

pub use client::{ApiResponse, CpdClient, HttpError};
pub use connection::{Connection, ConnectionSettings, HttpConnectionManager};
pub use pool::{
    ConnectionPool, ManageConnection, PoolConfig, PoolError, PoolStatus, PooledConnection,
};
