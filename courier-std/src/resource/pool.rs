//! # Connection Pool Component
//!
//! [`Database`] is a bounded pool of driver connections with the
//! [`Component`] lifecycle. Capacity is a semaphore sized by
//! [`PoolSettings::max_size`]: every checked-out [`PooledConnection`] holds
//! one permit, and callers wait for a permit up to
//! [`PoolSettings::acquire_timeout`].
//!
//! ```rust,ignore
//! let db = Database::new(PgManager::default());
//! db.configure(PoolSettings::new("postgres://localhost/app").with_max_size(16))?;
//! db.initialize().await?;
//!
//! let id = db
//!     .transaction(|tx| Box::pin(async move { insert_widget(tx, "a").await }))
//!     .await?;
//! ```

use super::manager::ConnectionManager;
use super::settings::PoolSettings;
use super::transaction::Transaction;
use courier_core::{Component, ComponentState, Configurable, ResourceError};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

struct Pool {
    settings: PoolSettings,
    semaphore: Arc<Semaphore>,
}

pub(super) struct Shared<M: ConnectionManager> {
    name: &'static str,
    manager: M,
    state: AtomicU8,
    // Serializes configure/initialize/shutdown.
    lifecycle: tokio::sync::Mutex<()>,
    pool: Mutex<Option<Arc<Pool>>>,
    idle: Mutex<VecDeque<M::Connection>>,
    open: AtomicUsize,
}

impl<M: ConnectionManager> Shared<M> {
    fn state(&self) -> ComponentState {
        ComponentState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ComponentState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn idle(&self) -> MutexGuard<'_, VecDeque<M::Connection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pool_slot(&self) -> MutexGuard<'_, Option<Arc<Pool>>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pool(&self) -> Option<Arc<Pool>> {
        self.pool_slot().clone()
    }

    /// Return a connection to the idle queue, or retire it when the pool is
    /// shut down or the driver reports it unusable.
    fn checkin(self: &Arc<Self>, conn: M::Connection) {
        let valid = self.manager.is_valid(&conn);
        {
            let mut idle = self.idle();
            if valid && self.state() != ComponentState::ShutDown {
                idle.push_back(conn);
                return;
            }
        }
        if !valid {
            tracing::warn!(component = self.name, "discarding invalid connection");
        }
        self.retire(conn);
    }

    /// Close a connection that will not be reused.
    fn retire(self: &Arc<Self>, conn: M::Connection) {
        self.open.fetch_sub(1, Ordering::AcqRel);
        match Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(self);
                handle.spawn(async move { shared.manager.close(conn).await });
            }
            Err(_) => drop(conn),
        }
    }
}

/// A snapshot of pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Lifecycle state.
    pub state: ComponentState,
    /// Configured capacity, zero before `configure`.
    pub max_size: usize,
    /// Open connections, idle or checked out.
    pub open: usize,
    /// Connections waiting in the pool.
    pub idle: usize,
    /// Connections checked out by callers.
    pub in_use: usize,
}

/// A pooled database handle and async resource component.
///
/// Cloning is cheap and every clone shares the same pool, so one value can
/// be handed to the runtime as a component and to handlers as a resource.
pub struct Database<M: ConnectionManager> {
    shared: Arc<Shared<M>>,
}

impl<M: ConnectionManager> Clone for Database<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: ConnectionManager> Database<M> {
    /// An unconfigured pool named `database`.
    pub fn new(manager: M) -> Self {
        Self::named("database", manager)
    }

    /// An unconfigured pool with a name for logs and errors.
    pub fn named(name: &'static str, manager: M) -> Self {
        Self {
            shared: Arc::new(Shared {
                name,
                manager,
                state: AtomicU8::new(ComponentState::Unconfigured as u8),
                lifecycle: tokio::sync::Mutex::new(()),
                pool: Mutex::new(None),
                idle: Mutex::new(VecDeque::new()),
                open: AtomicUsize::new(0),
            }),
        }
    }

    /// The driver.
    pub fn manager(&self) -> &M {
        &self.shared.manager
    }

    /// The bound settings, if configured.
    pub fn settings(&self) -> Option<PoolSettings> {
        self.shared.pool().map(|pool| pool.settings.clone())
    }

    /// Check out a connection, waiting for capacity if the pool is full.
    ///
    /// Idle connections are reused first; a new one is opened otherwise.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::ComponentNotAvailable`] unless initialized, or when
    ///   the pool shuts down while waiting.
    /// - [`ResourceError::ConnectionTimeout`] when no capacity frees up within
    ///   the acquire timeout.
    /// - [`ResourceError::Driver`] when opening a connection fails.
    pub async fn get_connection(&self) -> Result<PooledConnection<M>, ResourceError> {
        self.ensure_available()?;
        let shared = &self.shared;
        let pool = shared.pool().ok_or(ResourceError::NotConfigured(shared.name))?;
        let wait = pool.settings.acquire_timeout;

        let permit = match timeout(wait, Arc::clone(&pool.semaphore).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_closed)) => {
                return Err(ResourceError::ComponentNotAvailable {
                    component: shared.name,
                    state: shared.state(),
                });
            }
            Err(_) => {
                tracing::warn!(component = shared.name, timeout = ?wait, "pool exhausted");
                return Err(ResourceError::ConnectionTimeout(wait));
            }
        };

        let conn = loop {
            let candidate = shared.idle().pop_front();
            match candidate {
                Some(conn) if shared.manager.is_valid(&conn) => break conn,
                Some(conn) => {
                    tracing::warn!(component = shared.name, "discarding invalid idle connection");
                    shared.retire(conn);
                }
                None => {
                    let conn = shared
                        .manager
                        .connect(&pool.settings.url)
                        .await
                        .map_err(ResourceError::driver)?;
                    shared.open.fetch_add(1, Ordering::AcqRel);
                    break conn;
                }
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            permit: Some(permit),
            shared: Arc::clone(shared),
            in_transaction: false,
            broken: false,
        })
    }

    /// Return a connection to the pool.
    ///
    /// An open transaction on it is rolled back first. Never fails: a
    /// connection that cannot be reused is closed and logged instead.
    /// Dropping a [`PooledConnection`] has the same effect.
    pub async fn release_connection(&self, mut conn: PooledConnection<M>) {
        if conn.in_transaction {
            let result = {
                let (manager, raw) = conn.split();
                manager.rollback(raw).await
            };
            if let Err(err) = result {
                tracing::warn!(component = self.shared.name, error = %err, "rollback on release failed");
                conn.broken = true;
            }
            conn.in_transaction = false;
        }
        drop(conn);
    }

    /// Start a transaction on `conn`.
    ///
    /// # Errors
    ///
    /// [`ResourceError::Driver`] when the driver refuses to begin.
    pub async fn begin(&self, conn: PooledConnection<M>) -> Result<Transaction<M>, ResourceError> {
        Transaction::begin(conn).await
    }

    /// Run `f` inside a transaction on `conn`.
    ///
    /// Commits when `f` succeeds and rolls back when it fails; either way
    /// the connection goes back to the pool exactly once. The error of `f`
    /// is returned unchanged.
    ///
    /// # Errors
    ///
    /// The error of `f`, or a [`ResourceError`] from begin or commit.
    pub async fn with_transaction<T, E, F>(&self, conn: PooledConnection<M>, f: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut Transaction<M>) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: From<ResourceError> + Send,
    {
        let mut tx = self.begin(conn).await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(component = self.shared.name, error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Check out a connection and run `f` inside a transaction on it.
    ///
    /// # Errors
    ///
    /// As [`get_connection`](Self::get_connection) and
    /// [`with_transaction`](Self::with_transaction).
    pub async fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut Transaction<M>) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: From<ResourceError> + Send,
    {
        let conn = self.get_connection().await?;
        self.with_transaction(conn, f).await
    }

    /// Current usage.
    pub fn status(&self) -> PoolStatus {
        let idle = self.shared.idle().len();
        let open = self.shared.open.load(Ordering::Acquire);
        PoolStatus {
            state: self.shared.state(),
            max_size: self.shared.pool().map_or(0, |pool| pool.settings.max_size),
            open,
            idle,
            in_use: open.saturating_sub(idle),
        }
    }
}

impl<M: ConnectionManager> Component for Database<M> {
    fn name(&self) -> &'static str {
        self.shared.name
    }

    fn state(&self) -> ComponentState {
        self.shared.state()
    }

    async fn initialize(&self) -> Result<(), ResourceError> {
        let shared = &self.shared;
        let _lifecycle = shared.lifecycle.lock().await;
        match shared.state() {
            ComponentState::Initialized => return Ok(()),
            ComponentState::Unconfigured => return Err(ResourceError::NotConfigured(shared.name)),
            state @ ComponentState::ShutDown => {
                return Err(ResourceError::ComponentNotAvailable {
                    component: shared.name,
                    state,
                });
            }
            ComponentState::Configured => {}
        }

        let pool = shared.pool().ok_or(ResourceError::NotConfigured(shared.name))?;
        let mut warmed = Vec::with_capacity(pool.settings.min_idle);
        for _ in 0..pool.settings.min_idle {
            match shared.manager.connect(&pool.settings.url).await {
                Ok(conn) => warmed.push(conn),
                Err(err) => {
                    tracing::warn!(component = shared.name, error = %err, "pool warm-up failed");
                    for conn in warmed {
                        shared.manager.close(conn).await;
                    }
                    return Err(ResourceError::driver(err));
                }
            }
        }

        shared.open.fetch_add(warmed.len(), Ordering::AcqRel);
        shared.idle().extend(warmed);
        shared.set_state(ComponentState::Initialized);
        tracing::info!(
            component = shared.name,
            max_size = pool.settings.max_size,
            min_idle = pool.settings.min_idle,
            "component initialized"
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ResourceError> {
        let shared = &self.shared;
        let _lifecycle = shared.lifecycle.lock().await;
        if shared.state() == ComponentState::ShutDown {
            return Ok(());
        }

        let drained: Vec<_> = {
            let mut idle = shared.idle();
            shared.set_state(ComponentState::ShutDown);
            idle.drain(..).collect()
        };
        if let Some(pool) = shared.pool() {
            pool.semaphore.close();
        }

        let closed = drained.len();
        for conn in drained {
            shared.manager.close(conn).await;
        }
        shared.open.fetch_sub(closed, Ordering::AcqRel);

        tracing::info!(
            component = shared.name,
            closed,
            outstanding = shared.open.load(Ordering::Acquire),
            "component shut down"
        );
        Ok(())
    }
}

impl<M: ConnectionManager> Configurable for Database<M> {
    type Settings = PoolSettings;

    fn configure(&self, settings: PoolSettings) -> Result<(), ResourceError> {
        let shared = &self.shared;
        settings.validate()?;

        let Ok(_lifecycle) = shared.lifecycle.try_lock() else {
            return Err(ResourceError::InvalidTransition {
                component: shared.name,
                operation: "configure",
                state: shared.state(),
            });
        };
        match shared.state() {
            ComponentState::Unconfigured | ComponentState::Configured => {}
            state => {
                return Err(ResourceError::InvalidTransition {
                    component: shared.name,
                    operation: "configure",
                    state,
                });
            }
        }

        let semaphore = Arc::new(Semaphore::new(settings.max_size));
        *shared.pool_slot() = Some(Arc::new(Pool {
            settings,
            semaphore,
        }));
        shared.set_state(ComponentState::Configured);
        tracing::debug!(component = shared.name, "component configured");
        Ok(())
    }
}

impl<M: ConnectionManager> fmt::Debug for Database<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.shared.name)
            .field("status", &self.status())
            .finish()
    }
}

/// A connection checked out of a [`Database`].
///
/// Dropping it returns the connection to the pool and frees its slot. If a
/// transaction is still open (the owning future was cancelled or panicked),
/// the rollback runs on the current tokio runtime first and the slot stays
/// taken until it finishes. Without a runtime the connection is discarded.
pub struct PooledConnection<M: ConnectionManager> {
    // Present until drop.
    conn: Option<M::Connection>,
    permit: Option<OwnedSemaphorePermit>,
    shared: Arc<Shared<M>>,
    pub(super) in_transaction: bool,
    pub(super) broken: bool,
}

impl<M: ConnectionManager> PooledConnection<M> {
    /// Whether a transaction is open on this connection.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Close this connection on release instead of reusing it.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// The driver and the raw connection, borrowed together.
    pub(super) fn split(&mut self) -> (&M, &mut M::Connection) {
        let manager = &self.shared.manager;
        match self.conn.as_mut() {
            Some(conn) => (manager, conn),
            None => unreachable!("pooled connection used after release"),
        }
    }

    fn raw(&self) -> &M::Connection {
        match self.conn.as_ref() {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }

    pub(super) fn component(&self) -> &'static str {
        self.shared.name
    }
}

impl<M: ConnectionManager> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &M::Connection {
        self.raw()
    }
}

impl<M: ConnectionManager> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut M::Connection {
        self.split().1
    }
}

impl<M: ConnectionManager> fmt::Debug for PooledConnection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("component", &self.shared.name)
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let permit = self.permit.take();

        if self.broken {
            self.shared.retire(conn);
            drop(permit);
            return;
        }
        if !self.in_transaction {
            self.shared.checkin(conn);
            drop(permit);
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(&self.shared);
                handle.spawn(async move {
                    let mut conn = conn;
                    match shared.manager.rollback(&mut conn).await {
                        Ok(()) => {
                            tracing::debug!(component = shared.name, "rolled back abandoned transaction");
                            shared.checkin(conn);
                        }
                        Err(err) => {
                            tracing::warn!(component = shared.name, error = %err, "rollback of abandoned transaction failed");
                            shared.retire(conn);
                        }
                    }
                    drop(permit);
                });
            }
            Err(_) => {
                tracing::warn!(
                    component = self.shared.name,
                    "transaction dropped outside a tokio runtime; discarding connection"
                );
                self.shared.retire(conn);
                drop(permit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryManager;
    use std::time::Duration;

    fn settings() -> PoolSettings {
        PoolSettings::new("mem://widgets")
            .with_max_size(2)
            .with_acquire_timeout(Duration::from_millis(50))
    }

    async fn ready(manager: &MemoryManager, settings: PoolSettings) -> Database<MemoryManager> {
        let db = Database::new(manager.clone());
        db.configure(settings).unwrap();
        db.initialize().await.unwrap();
        db
    }

    #[derive(Debug, thiserror::Error)]
    enum AppError {
        #[error("widget rejected")]
        Rejected,
        #[error(transparent)]
        Resource(#[from] ResourceError),
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let manager = MemoryManager::new();
        let db = Database::new(manager.clone());
        assert_eq!(db.state(), ComponentState::Unconfigured);
        assert!(matches!(db.initialize().await, Err(ResourceError::NotConfigured(_))));
        assert!(matches!(
            db.get_connection().await,
            Err(ResourceError::ComponentNotAvailable { .. })
        ));

        db.configure(settings().with_min_idle(2)).unwrap();
        assert_eq!(db.state(), ComponentState::Configured);
        assert_eq!(manager.connects(), 0);

        db.initialize().await.unwrap();
        db.initialize().await.unwrap();
        assert_eq!(db.state(), ComponentState::Initialized);
        assert_eq!(manager.connects(), 2);
        assert_eq!(db.status().idle, 2);
        assert!(matches!(
            db.configure(settings()),
            Err(ResourceError::InvalidTransition { .. })
        ));

        db.shutdown().await.unwrap();
        db.shutdown().await.unwrap();
        assert_eq!(db.state(), ComponentState::ShutDown);
        assert_eq!(manager.closes(), 2);
        assert!(matches!(
            db.initialize().await,
            Err(ResourceError::ComponentNotAvailable { .. })
        ));
        assert!(matches!(
            db.get_connection().await,
            Err(ResourceError::ComponentNotAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected() {
        let db = Database::new(MemoryManager::new());
        assert!(matches!(
            db.configure(PoolSettings::default()),
            Err(ResourceError::InvalidSettings(_))
        ));
        assert_eq!(db.state(), ComponentState::Unconfigured);
    }

    #[tokio::test]
    async fn connections_are_reused() {
        let manager = MemoryManager::new();
        let db = ready(&manager, settings()).await;

        let conn = db.get_connection().await.unwrap();
        assert_eq!(db.status().in_use, 1);
        db.release_connection(conn).await;
        let _conn = db.get_connection().await.unwrap();

        assert_eq!(manager.connects(), 1);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let manager = MemoryManager::new();
        let db = ready(&manager, settings().with_max_size(1)).await;

        let _held = db.get_connection().await.unwrap();
        let err = db.get_connection().await.unwrap_err();

        assert!(matches!(err, ResourceError::ConnectionTimeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn with_transaction_commits_on_success() {
        let manager = MemoryManager::new();
        let db = ready(&manager, settings()).await;
        let conn = db.get_connection().await.unwrap();

        let id = db
            .with_transaction(conn, |tx| {
                Box::pin(async move {
                    tx.execute("INSERT INTO widgets (name) VALUES ('a')");
                    Ok::<_, AppError>(1u64)
                })
            })
            .await
            .unwrap();

        assert_eq!(id, 1);
        assert_eq!((manager.begins(), manager.commits(), manager.rollbacks()), (1, 1, 0));
        assert_eq!(db.status().in_use, 0);
        assert_eq!(db.status().idle, 1);
    }

    #[tokio::test]
    async fn with_transaction_rolls_back_on_error() {
        let manager = MemoryManager::new();
        let db = ready(&manager, settings()).await;
        let conn = db.get_connection().await.unwrap();

        let err = db
            .with_transaction(conn, |tx| {
                Box::pin(async move {
                    tx.execute("INSERT INTO widgets (name) VALUES ('')");
                    Err::<u64, _>(AppError::Rejected)
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Rejected));
        assert_eq!((manager.begins(), manager.commits(), manager.rollbacks()), (1, 0, 1));
        let status = db.status();
        assert_eq!((status.open, status.idle, status.in_use), (1, 1, 0));
    }

    #[tokio::test]
    async fn failed_commit_rolls_back_and_reports() {
        let manager = MemoryManager::new();
        let db = ready(&manager, settings()).await;
        manager.fail_commits(true);

        let err = db
            .transaction(|_tx| Box::pin(async { Ok::<_, AppError>(()) }))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Resource(ResourceError::Driver(_))));
        assert_eq!(manager.rollbacks(), 1);
        assert_eq!(db.status().in_use, 0);
    }

    #[tokio::test]
    async fn abandoned_transaction_rolls_back_in_background() {
        let manager = MemoryManager::new();
        let db = ready(&manager, settings()).await;

        let tx = db.begin(db.get_connection().await.unwrap()).await.unwrap();
        drop(tx);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(manager.rollbacks(), 1);
        assert_eq!(db.status().idle, 1);
        assert_eq!(db.status().in_use, 0);
    }

    #[tokio::test]
    async fn invalid_connection_is_discarded_on_release() {
        let manager = MemoryManager::new();
        let db = ready(&manager, settings()).await;

        let mut conn = db.get_connection().await.unwrap();
        conn.invalidate();
        db.release_connection(conn).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let status = db.status();
        assert_eq!((status.open, status.idle), (0, 0));
        assert_eq!(manager.closes(), 1);
    }

    #[tokio::test]
    async fn broken_connection_is_closed_instead_of_reused() {
        let manager = MemoryManager::new();
        let db = ready(&manager, settings()).await;

        let mut conn = db.get_connection().await.unwrap();
        assert_eq!(conn.id(), 1);
        conn.mark_broken();
        drop(conn);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(manager.closes(), 1);
        assert_eq!(db.status().idle, 0);
        let conn = db.get_connection().await.unwrap();
        assert_eq!(conn.id(), 2);
    }

    #[tokio::test]
    async fn failed_warm_up_closes_warmed_connections() {
        let manager = MemoryManager::new();
        let db = Database::new(manager.clone());
        db.configure(settings().with_max_size(4).with_min_idle(3)).unwrap();
        manager.fail_connects_after(2);

        let err = db.initialize().await.unwrap_err();

        assert!(matches!(err, ResourceError::Driver(_)));
        assert_eq!((manager.connects(), manager.closes()), (2, 2));
        assert_eq!(db.state(), ComponentState::Configured);
        assert_eq!(db.status().open, 0);
    }

    #[tokio::test]
    async fn outstanding_connection_closes_after_shutdown() {
        let manager = MemoryManager::new();
        let db = ready(&manager, settings()).await;

        let conn = db.get_connection().await.unwrap();
        db.shutdown().await.unwrap();
        assert_eq!(db.status().open, 1);

        drop(conn);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(db.status().open, 0);
        assert_eq!(manager.closes(), 1);
    }

    #[tokio::test]
    async fn waiters_fail_when_the_pool_shuts_down() {
        let manager = MemoryManager::new();
        let db = ready(
            &manager,
            settings().with_max_size(1).with_acquire_timeout(Duration::from_secs(5)),
        )
        .await;

        let _held = db.get_connection().await.unwrap();
        let waiter = tokio::spawn({
            let db = db.clone();
            async move { db.get_connection().await.map(drop) }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        db.shutdown().await.unwrap();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ResourceError::ComponentNotAvailable { .. })));
    }
}
