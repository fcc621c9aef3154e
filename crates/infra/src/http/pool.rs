//! Bounded connection pool
//!
//! Connections are created on demand by a [`ManageConnection`] implementation
//! and handed out as [`PooledConnection`] guards. A semaphore with one permit
//! per connection keeps the number of outstanding connections at or below the
//! capacity; the guard returns its connection (after [`ManageConnection::reset`])
//! when dropped, on every exit path.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, instrument, warn};

/// Pool failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Every connection stayed checked out for the whole acquire timeout
    #[error("connection pool exhausted: {capacity} connections busy for {waited:?}")]
    Exhausted { capacity: usize, waited: Duration },

    #[error("connection pool is closed")]
    Closed,

    /// The manager could not open a new connection
    #[error("failed to create connection: {0}")]
    Connect(String),
}

/// Creates and recycles pooled connections.
pub trait ManageConnection: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open a new connection.
    ///
    /// # Errors
    /// Returns [`PoolError::Connect`] when the connection cannot be built.
    fn connect(&self) -> Result<Self::Connection, PoolError>;

    /// Clear per-checkout state before a connection goes back to the pool.
    fn reset(&self, _conn: &mut Self::Connection) {}
}

/// Pool sizing.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub capacity: usize,
    /// Connections created eagerly; clamped to `capacity`
    pub initial_size: usize,
    pub acquire_timeout: Duration,
}

/// Point-in-time pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub capacity: usize,
    pub idle: usize,
    pub outstanding: usize,
    pub closed: bool,
}

struct Shared<M: ManageConnection> {
    manager: M,
    idle: Mutex<VecDeque<M::Connection>>,
    permits: Arc<Semaphore>,
    capacity: usize,
    acquire_timeout: Duration,
    outstanding: AtomicUsize,
    closed: AtomicBool,
}

impl<M: ManageConnection> Shared<M> {
    fn give_back(&self, mut conn: M::Connection) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.manager.reset(&mut conn);
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push_back(conn);
        }
    }
}

/// Connection pool; cheap to clone, all clones share the same connections.
pub struct ConnectionPool<M: ManageConnection> {
    shared: Arc<Shared<M>>,
}

impl<M: ManageConnection> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<M: ManageConnection> fmt::Debug for ConnectionPool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool").field("status", &self.status()).finish()
    }
}

impl<M: ManageConnection> ConnectionPool<M> {
    /// Build a pool and eagerly open `initial_size` connections.
    ///
    /// # Errors
    /// Returns [`PoolError::Connect`] if an initial connection fails, or if
    /// the capacity is zero.
    #[instrument(skip(manager), fields(capacity = config.capacity, initial = config.initial_size))]
    pub fn new(manager: M, config: PoolConfig) -> Result<Self, PoolError> {
        if config.capacity == 0 {
            return Err(PoolError::Connect("pool capacity must be greater than 0".into()));
        }
        let initial = config.initial_size.min(config.capacity);
        let mut idle = VecDeque::with_capacity(config.capacity);
        for _ in 0..initial {
            idle.push_back(manager.connect()?);
        }
        info!(idle = idle.len(), "connection pool ready");

        Ok(Self {
            shared: Arc::new(Shared {
                manager,
                idle: Mutex::new(idle),
                permits: Arc::new(Semaphore::new(config.capacity)),
                capacity: config.capacity,
                acquire_timeout: config.acquire_timeout,
                outstanding: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Check out a connection, reusing an idle one when available.
    ///
    /// # Errors
    /// - [`PoolError::Exhausted`] after waiting the acquire timeout
    /// - [`PoolError::Closed`] once [`close_all`](Self::close_all) ran
    /// - [`PoolError::Connect`] if a new connection cannot be opened
    pub async fn acquire(&self) -> Result<PooledConnection<M>, PoolError> {
        let shared = &self.shared;
        if shared.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }

        let acquire = shared.permits.clone().acquire_owned();
        let permit = match tokio::time::timeout(shared.acquire_timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => {
                warn!(capacity = shared.capacity, "timed out waiting for a pooled connection");
                return Err(PoolError::Exhausted {
                    capacity: shared.capacity,
                    waited: shared.acquire_timeout,
                });
            }
        };

        let reused = shared.idle.lock().pop_front();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                debug!("opening new pooled connection");
                shared.manager.connect()?
            }
        };
        shared.outstanding.fetch_add(1, Ordering::SeqCst);

        Ok(PooledConnection { conn: Some(conn), shared: shared.clone(), _permit: permit })
    }

    /// Return a connection early; equivalent to dropping the guard.
    pub fn release(&self, conn: PooledConnection<M>) {
        drop(conn);
    }

    /// Destroy a checked-out connection instead of returning it.
    pub fn close(&self, mut conn: PooledConnection<M>) {
        if conn.conn.take().is_some() {
            self.shared.outstanding.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Destroy idle connections and refuse further checkouts. Connections
    /// still checked out are destroyed when their guards drop.
    pub fn close_all(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained = {
            let mut idle = self.shared.idle.lock();
            let n = idle.len();
            idle.clear();
            n
        };
        self.shared.permits.close();
        info!(closed = drained, "connection pool closed");
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            capacity: self.shared.capacity,
            idle: self.shared.idle.lock().len(),
            outstanding: self.shared.outstanding.load(Ordering::SeqCst),
            closed: self.shared.closed.load(Ordering::SeqCst),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

/// Checked-out connection; returns to the pool on drop.
pub struct PooledConnection<M: ManageConnection> {
    conn: Option<M::Connection>,
    shared: Arc<Shared<M>>,
    _permit: OwnedSemaphorePermit,
}

impl<M: ManageConnection> fmt::Debug for PooledConnection<M>
where
    M::Connection: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection").field("conn", &self.conn).finish()
    }
}

impl<M: ManageConnection> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        // Only `close` and `drop` take the connection, both by value.
        self.conn.as_ref().unwrap_or_else(|| unreachable!("pooled connection used after close"))
    }
}

impl<M: ManageConnection> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().unwrap_or_else(|| unreachable!("pooled connection used after close"))
    }
}

impl<M: ManageConnection> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.give_back(conn);
        }
    }
}
