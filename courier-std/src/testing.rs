//! Testing utilities for Courier.
//!
//! This module provides doubles for exercising dispatchers, middleware
//! chains and resource components without real infrastructure.
//!
//! # Features
//!
//! - [`CallLog`]: a shared, ordered log of named calls
//! - [`RecordingMiddleware`]: logs `name:pre` / `name:post` around the chain
//! - [`RecordingEventHandler`]: records every event it receives
//! - [`FailingEventHandler`]: always fails with [`TestFailure`]
//! - [`MemoryManager`]: an in-memory [`ConnectionManager`] counting driver calls

use crate::resource::ConnectionManager;
use courier_core::{Context, DispatchError, Envelope, Event, EventHandler, Middleware, Next, Reply};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ============================================================================
// Call Log
// ============================================================================

/// A cloneable, ordered log shared between test doubles.
///
/// # Example
///
/// ```rust,ignore
/// let log = CallLog::new();
/// let commands = CommandDispatcher::builder()
///     .middleware(RecordingMiddleware::new("A", log.clone()))
///     .middleware(RecordingMiddleware::new("B", log.clone()))
///     .build();
///
/// // ... dispatch ...
/// assert_eq!(log.entries(), ["A:pre", "B:pre", "B:post", "A:post"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.lock().push(entry.into());
    }

    /// A copy of every entry, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing was logged.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

// ============================================================================
// Recording Middleware
// ============================================================================

/// A middleware that logs `"{name}:pre"` before and `"{name}:post"` after
/// the rest of the chain, on success and on failure alike.
#[derive(Debug, Clone)]
pub struct RecordingMiddleware {
    name: &'static str,
    log: CallLog,
}

impl RecordingMiddleware {
    /// Create a recording middleware writing to `log`.
    pub fn new(name: &'static str, log: CallLog) -> Self {
        Self { name, log }
    }
}

impl Middleware for RecordingMiddleware {
    async fn process(
        &self,
        envelope: Envelope,
        ctx: &Context,
        next: Next<'_>,
    ) -> Result<Reply, DispatchError> {
        self.log.push(format!("{}:pre", self.name));
        let result = next.run(envelope, ctx).await;
        self.log.push(format!("{}:post", self.name));
        result
    }
}

// ============================================================================
// Event Handlers
// ============================================================================

/// An event handler that records every event it receives.
///
/// Clones share the recording, so keep one clone for assertions and
/// register the other.
pub struct RecordingEventHandler<E> {
    name: &'static str,
    events: Arc<Mutex<Vec<E>>>,
    log: Option<CallLog>,
}

impl<E: Clone> RecordingEventHandler<E> {
    /// Create a recording handler.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            events: Arc::new(Mutex::new(Vec::new())),
            log: None,
        }
    }

    /// Also log the handler's name to `log` on each call.
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Vec<E>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the recorded events.
    pub fn events(&self) -> Vec<E> {
        self.lock().clone()
    }

    /// Number of recorded events.
    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

impl<E> Clone for RecordingEventHandler<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            events: Arc::clone(&self.events),
            log: self.log.clone(),
        }
    }
}

impl<E: Event + Clone> EventHandler<E> for RecordingEventHandler<E> {
    type Error = std::convert::Infallible;

    async fn handle(&self, event: &E, _ctx: &Context) -> Result<(), Self::Error> {
        self.lock().push(event.clone());
        if let Some(log) = &self.log {
            log.push(self.name);
        }
        Ok(())
    }
}

/// The error returned by [`FailingEventHandler`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("handler `{0}` failed")]
pub struct TestFailure(pub &'static str);

/// An event handler that always fails with [`TestFailure`].
#[derive(Debug, Clone)]
pub struct FailingEventHandler {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    log: Option<CallLog>,
}

impl FailingEventHandler {
    /// Create a failing handler.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            calls: Arc::new(AtomicUsize::new(0)),
            log: None,
        }
    }

    /// Also log the handler's name to `log` on each call.
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// How many times the handler ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<E: Event> EventHandler<E> for FailingEventHandler {
    type Error = TestFailure;

    async fn handle(&self, _event: &E, _ctx: &Context) -> Result<(), TestFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.push(self.name);
        }
        Err(TestFailure(self.name))
    }
}

// ============================================================================
// In-memory Connection Manager
// ============================================================================

/// The error returned by [`MemoryManager`] when told to fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// `connect` was told to fail.
    #[error("connection refused")]
    ConnectionRefused,
    /// `commit` was told to fail.
    #[error("commit failed")]
    CommitFailed,
}

/// A connection handed out by [`MemoryManager`].
#[derive(Debug)]
pub struct MemoryConnection {
    id: usize,
    statements: Vec<String>,
    valid: bool,
}

impl MemoryConnection {
    /// Identifier, unique per manager, in connect order starting at 1.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Record a statement.
    pub fn execute(&mut self, statement: impl Into<String>) {
        self.statements.push(statement.into());
    }

    /// Every statement run on this connection.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Make the manager report this connection as unusable.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

#[derive(Debug, Default)]
struct Counters {
    next_id: AtomicUsize,
    connects: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closes: AtomicUsize,
    fail_connects: AtomicBool,
    connect_limit: Mutex<Option<usize>>,
    fail_commits: AtomicBool,
}

/// An in-memory [`ConnectionManager`] that counts every driver call.
///
/// Clones share their counters and switches.
#[derive(Debug, Clone, Default)]
pub struct MemoryManager {
    counters: Arc<Counters>,
}

impl MemoryManager {
    /// A manager whose calls all succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `connect` fail (or succeed again).
    pub fn fail_connects(&self, fail: bool) {
        self.counters.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Let the next `n` connects succeed and refuse every one after.
    pub fn fail_connects_after(&self, n: usize) {
        let limit = self.connects() + n;
        *self
            .counters
            .connect_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(limit);
    }

    /// Make `commit` fail (or succeed again).
    pub fn fail_commits(&self, fail: bool) {
        self.counters.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Successful `connect` calls.
    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// `begin` calls.
    pub fn begins(&self) -> usize {
        self.counters.begins.load(Ordering::SeqCst)
    }

    /// Successful `commit` calls.
    pub fn commits(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    /// `rollback` calls.
    pub fn rollbacks(&self) -> usize {
        self.counters.rollbacks.load(Ordering::SeqCst)
    }

    /// `close` calls.
    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }
}

impl ConnectionManager for MemoryManager {
    type Connection = MemoryConnection;
    type Error = MemoryError;

    async fn connect(&self, _url: &str) -> Result<MemoryConnection, MemoryError> {
        let limit = *self
            .counters
            .connect_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.counters.fail_connects.load(Ordering::SeqCst)
            || limit.is_some_and(|limit| self.connects() >= limit)
        {
            return Err(MemoryError::ConnectionRefused);
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            id: self.counters.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            statements: Vec::new(),
            valid: true,
        })
    }

    async fn begin(&self, conn: &mut MemoryConnection) -> Result<(), MemoryError> {
        self.counters.begins.fetch_add(1, Ordering::SeqCst);
        conn.execute("BEGIN");
        Ok(())
    }

    async fn commit(&self, conn: &mut MemoryConnection) -> Result<(), MemoryError> {
        if self.counters.fail_commits.load(Ordering::SeqCst) {
            return Err(MemoryError::CommitFailed);
        }
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        conn.execute("COMMIT");
        Ok(())
    }

    async fn rollback(&self, conn: &mut MemoryConnection) -> Result<(), MemoryError> {
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        conn.execute("ROLLBACK");
        Ok(())
    }

    fn is_valid(&self, conn: &MemoryConnection) -> bool {
        conn.valid
    }

    async fn close(&self, _conn: MemoryConnection) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}
