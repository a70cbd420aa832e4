//! Connection slots handed out to units of work.
//!
//! Idle clients sit in a bounded `crossbeam-channel` used as a free list. Slots are
//! opened lazily up to `max_connections`; once all are out, [`ConnectionPool::acquire`]
//! waits until one is returned or freed, or the pool timeout passes. A slot whose
//! connection misbehaved is marked broken and closed instead of being returned, which
//! frees its slot for a replacement.

use crate::connection;
use crate::error::StoreError;
use crate::pool::config::DatabaseConfig;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use may_postgres::Client;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Longest single wait on the free list before re-checking for a freed slot.
const SLOT_POLL: Duration = Duration::from_millis(50);

/// What a waiter obtained: an idle client, or the right to open a new one.
enum Checkout {
    Idle(Client),
    Reserved,
}

pub struct ConnectionPool {
    url: String,
    max_size: usize,
    timeout: Duration,
    idle_tx: Sender<Client>,
    idle_rx: Receiver<Client>,
    /// Connections currently open, idle or checked out.
    open: AtomicUsize,
}

impl ConnectionPool {
    /// Build a pool and open its first connection, so a bad URL fails here rather than
    /// on the first ledger operation.
    pub fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        connection::validate_connection_string(&config.url)?;
        let max_size = config.max_connections.max(1);
        let (idle_tx, idle_rx) = bounded(max_size);

        let pool = Self {
            url: config.url.clone(),
            max_size,
            timeout: config.pool_timeout(),
            idle_tx,
            idle_rx,
            open: AtomicUsize::new(0),
        };

        let first = pool.acquire()?;
        drop(first);
        log::info!("connection pool ready (max {} connections)", max_size);
        Ok(pool)
    }

    pub fn acquire(&self) -> Result<PooledConnection<'_>, StoreError> {
        match self.checkout()? {
            Checkout::Idle(client) => Ok(self.slot(client)),
            Checkout::Reserved => match connection::connect(&self.url) {
                Ok(client) => {
                    log::debug!(
                        "opened pooled connection {}/{}",
                        self.open.load(Ordering::Relaxed),
                        self.max_size
                    );
                    Ok(self.slot(client))
                }
                Err(e) => {
                    self.open.fetch_sub(1, Ordering::AcqRel);
                    Err(StoreError::Connection(e))
                }
            },
        }
    }

    /// Wait for an idle client or a free slot until the pool timeout. A discarded
    /// connection frees a slot without sending anything, so the free list is only
    /// waited on in short slices.
    fn checkout(&self) -> Result<Checkout, StoreError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Ok(client) = self.idle_rx.try_recv() {
                return Ok(Checkout::Idle(client));
            }
            if self.reserve_slot() {
                return Ok(Checkout::Reserved);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(self.exhausted());
            }
            match self.idle_rx.recv_timeout((deadline - now).min(SLOT_POLL)) {
                Ok(client) => return Ok(Checkout::Idle(client)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(self.exhausted()),
            }
        }
    }

    fn exhausted(&self) -> StoreError {
        StoreError::Pool(format!(
            "no connection available within {:?} ({} in use)",
            self.timeout, self.max_size
        ))
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    fn reserve_slot(&self) -> bool {
        self.open
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_size).then_some(n + 1)
            })
            .is_ok()
    }

    fn slot(&self, client: Client) -> PooledConnection<'_> {
        PooledConnection {
            client: Some(client),
            pool: self,
            broken: false,
        }
    }

    fn release(&self, client: Client, broken: bool) {
        if broken || self.idle_tx.try_send(client).is_err() {
            self.open.fetch_sub(1, Ordering::AcqRel);
            log::debug!("discarded pooled connection");
        }
    }
}

/// A checked-out connection; returned to the pool on drop.
pub struct PooledConnection<'p> {
    client: Option<Client>,
    pool: &'p ConnectionPool,
    broken: bool,
}

impl PooledConnection<'_> {
    /// Close this connection on release instead of reusing it.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Client;

    fn deref(&self) -> &Client {
        // Only taken in Drop.
        match &self.client {
            Some(client) => client,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client, self.broken);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// A pool with every slot counted as checked out and no idle clients.
    fn saturated(max_size: usize, timeout: Duration) -> ConnectionPool {
        let (idle_tx, idle_rx) = bounded(max_size);
        ConnectionPool {
            url: "postgresql://localhost/safeledger".to_string(),
            max_size,
            timeout,
            idle_tx,
            idle_rx,
            open: AtomicUsize::new(max_size),
        }
    }

    #[test]
    fn test_waiter_takes_slot_freed_by_discard() {
        let pool = saturated(1, Duration::from_secs(10));
        let started = Instant::now();
        let checkout = thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(100));
                // What `release` does with a broken connection.
                pool.open.fetch_sub(1, Ordering::AcqRel);
            });
            pool.checkout()
        });
        assert!(matches!(checkout, Ok(Checkout::Reserved)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(pool.open_connections(), 1);
    }

    #[test]
    fn test_saturated_pool_times_out() {
        let pool = saturated(2, Duration::from_millis(120));
        let started = Instant::now();
        assert!(matches!(pool.checkout(), Err(StoreError::Pool(_))));
        assert!(started.elapsed() >= Duration::from_millis(120));
        assert_eq!(pool.open_connections(), 2);
    }
}
