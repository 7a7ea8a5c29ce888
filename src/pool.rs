use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, PoolConfig};
use crate::connection::{Connection, Health};
use crate::endpoint::Endpoint;
use crate::error::{ConnectionErrorKind, Error, ExhaustedReason};

/// Bounded set of connections per endpoint.
///
/// Cloning a `Pool` is cheap and every clone shares the same connections.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: PoolConfig,
    connection: ConnectionConfig,
    slots: Mutex<HashMap<Endpoint, Arc<Slot>>>,
    shutdown: CancellationToken,
}

/// Per-endpoint bookkeeping. A checked-out connection owns one permit; idle connections
/// own none.
struct Slot {
    endpoint: Arc<Endpoint>,
    max_size: usize,
    connection_ttl: Duration,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<Connection>>,
    opened: AtomicU64,
    discarded: AtomicU64,
}

/// Snapshot of one endpoint's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub max_size: usize,
    pub idle: usize,
    pub in_use: usize,
    /// Connections opened since the pool was created.
    pub opened: u64,
    /// Connections closed because they were dead, expired or dirty.
    pub discarded: u64,
}

impl Pool {
    /// Creates a pool. When called inside a Tokio runtime a background task closes
    /// expired idle connections every `health_check_interval`.
    pub fn new(config: PoolConfig, connection: ConnectionConfig) -> Pool {
        let inner = Arc::new(PoolInner {
            config,
            connection,
            slots: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        });

        if tokio::runtime::Handle::try_current().is_ok() {
            tokio::spawn(reap(Arc::downgrade(&inner), inner.shutdown.clone()));
        }

        Pool { inner }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn connection_config(&self) -> &ConnectionConfig {
        &self.inner.connection
    }

    /// Checks out a connection for `endpoint`, opening one when no idle connection is usable.
    ///
    /// `timeout` bounds the wait for a free slot. Opening a new connection is bounded by the
    /// connect timeout and the retry policy instead.
    pub async fn acquire(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<PooledConnection, Error> {
        let slot = self.slot(endpoint);

        let permit = match time::timeout(timeout, slot.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(Error::connection(
                    ConnectionErrorKind::Closed,
                    "connection pool is shut down",
                ))
            }
            Err(_) => {
                debug!("No free connection for {} within {:?}", endpoint.label(), timeout);
                return Err(Error::PoolExhausted {
                    endpoint: endpoint.label(),
                    reason: ExhaustedReason::Timeout,
                });
            }
        };

        while let Some(mut conn) = slot.pop_idle() {
            if conn.health() != Health::Healthy || conn.age() >= slot.connection_ttl {
                debug!(connection_id = %conn.id(), "Evicting expired idle connection");
                slot.discard(conn).await;
                continue;
            }
            if conn.idle_time() >= self.inner.config.health_check_interval
                && conn.ping().await != Health::Healthy
            {
                debug!(connection_id = %conn.id(), "Evicting idle connection that failed PING");
                slot.discard(conn).await;
                continue;
            }
            debug!(connection_id = %conn.id(), "Reusing idle connection");
            return Ok(PooledConnection::new(conn, permit, slot));
        }

        let conn = self.connect(&slot).await?;
        Ok(PooledConnection::new(conn, permit, slot))
    }

    /// Like [`Pool::acquire`], but gives up with `Error::Cancelled` once `token` fires.
    pub async fn acquire_cancellable(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<PooledConnection, Error> {
        tokio::select! {
            _ = token.cancelled() => Err(Error::Cancelled),
            result = self.acquire(endpoint, timeout) => result,
        }
    }

    /// Returns a connection to the pool. Equivalent to dropping it.
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    pub fn stats(&self, endpoint: &Endpoint) -> PoolStats {
        let slots = self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.get(endpoint) {
            Some(slot) => slot.stats(),
            None => PoolStats {
                max_size: self.inner.config.max_size,
                idle: 0,
                in_use: 0,
                opened: 0,
                discarded: 0,
            },
        }
    }

    /// Closes every idle connection and refuses further checkouts.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let slots: Vec<Arc<Slot>> = {
            let slots = self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.values().cloned().collect()
        };
        for slot in slots {
            slot.permits.close();
            for conn in slot.drain_idle() {
                slot.discard(conn).await;
            }
        }
        info!("Connection pool shut down");
    }

    fn slot(&self, endpoint: &Endpoint) -> Arc<Slot> {
        let mut slots = self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(endpoint.clone())
            .or_insert_with(|| {
                Arc::new(Slot {
                    endpoint: Arc::new(endpoint.clone()),
                    max_size: self.inner.config.max_size,
                    connection_ttl: self.inner.config.connection_ttl,
                    permits: Arc::new(Semaphore::new(self.inner.config.max_size)),
                    idle: Mutex::new(VecDeque::new()),
                    opened: AtomicU64::new(0),
                    discarded: AtomicU64::new(0),
                })
            })
            .clone()
    }

    async fn connect(&self, slot: &Slot) -> Result<Connection, Error> {
        let config = &self.inner.config;
        let mut last_error = String::new();

        for attempt in 1..=config.max_connect_attempts {
            match Connection::open(slot.endpoint.clone(), &self.inner.connection).await {
                Ok(conn) => {
                    slot.opened.fetch_add(1, Ordering::Relaxed);
                    return Ok(conn);
                }
                Err(e @ (Error::Connection { .. } | Error::Io(_) | Error::Protocol(_))) => {
                    warn!(
                        attempt,
                        "Failed to connect to {}: {}",
                        slot.endpoint.label(),
                        e
                    );
                    last_error = e.to_string();
                    if attempt < config.max_connect_attempts {
                        time::sleep(backoff_delay(config, attempt)).await;
                    }
                }
                // Bad credentials or configuration do not get better by retrying.
                Err(e) => return Err(e),
            }
        }

        Err(Error::PoolExhausted {
            endpoint: slot.endpoint.label(),
            reason: ExhaustedReason::ConnectFailed {
                attempts: config.max_connect_attempts,
                last_error,
            },
        })
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

const MIN_REAP_PERIOD: Duration = Duration::from_millis(100);

/// Exponential delay for the given attempt (1-based), capped, plus up to 50% random jitter.
fn backoff_delay(config: &PoolConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = config
        .backoff_base
        .saturating_mul(1 << exponent)
        .min(config.backoff_max);
    let jitter_ms = (delay.as_millis() as u64) / 2;
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
    delay + jitter
}

async fn reap(pool: Weak<PoolInner>, shutdown: CancellationToken) {
    let period = match pool.upgrade() {
        Some(inner) => inner.config.health_check_interval,
        None => return,
    };
    let mut interval = time::interval(period.max(MIN_REAP_PERIOD));
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }

        let Some(inner) = pool.upgrade() else {
            return;
        };
        let slots: Vec<Arc<Slot>> = {
            let slots = inner.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.values().cloned().collect()
        };
        drop(inner);

        for slot in slots {
            let expired = slot.take_expired();
            if !expired.is_empty() {
                debug!(
                    "Closing {} expired idle connections for {}",
                    expired.len(),
                    slot.endpoint.label()
                );
            }
            for conn in expired {
                slot.discard(conn).await;
            }
        }
    }
}

impl Slot {
    fn pop_idle(&self) -> Option<Connection> {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn drain_idle(&self) -> Vec<Connection> {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    fn take_expired(&self) -> Vec<Connection> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let (expired, fresh): (Vec<Connection>, Vec<Connection>) = idle
            .drain(..)
            .partition(|conn| conn.health() != Health::Healthy || conn.age() >= self.connection_ttl);
        idle.extend(fresh);
        expired
    }

    async fn discard(&self, mut conn: Connection) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
        conn.close().await;
    }

    /// Puts a returned connection back in the idle queue, or drops it when it cannot be
    /// handed to the next caller as-is.
    fn check_in(&self, conn: Connection) {
        let reusable = conn.is_reusable_for(&self.endpoint) && conn.age() < self.connection_ttl;
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if reusable && idle.len() < self.max_size {
            // Most recently used first, so the oldest connections age out.
            idle.push_front(conn);
        } else {
            drop(idle);
            debug!(
                connection_id = %conn.id(),
                health = %conn.health(),
                "Discarding returned connection"
            );
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            max_size: self.max_size,
            idle: self.idle.lock().unwrap_or_else(PoisonError::into_inner).len(),
            in_use: self.max_size - self.permits.available_permits(),
            opened: self.opened.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// A checked-out connection. Dropping it returns the connection to its pool.
pub struct PooledConnection {
    conn: Option<Connection>,
    permit: Option<OwnedSemaphorePermit>,
    slot: Arc<Slot>,
}

impl PooledConnection {
    fn new(conn: Connection, permit: OwnedSemaphorePermit, slot: Arc<Slot>) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            permit: Some(permit),
            slot,
        }
    }

    /// Takes the connection out of the pool for good and frees its slot.
    pub fn detach(mut self) -> Connection {
        self.permit.take();
        self.conn
            .take()
            .expect("pooled connection is present until dropped")
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection is present until dropped")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .expect("pooled connection is present until dropped")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.slot.check_in(conn);
        }
        // Release the slot only after the connection is back in the idle queue, so the
        // next waiter finds it.
        self.permit.take();
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PooledConnection").field(&self.conn).finish()
    }
}
