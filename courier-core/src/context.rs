//! # Dispatch Context
//!
//! Per-call data threaded through one dispatch: correlation identifiers,
//! typed extensions, shared runtime resources and a cancellation token.
//!
//! A [`Context`] is owned by the caller and borrowed by every middleware and
//! handler of the call. It is discarded when the call returns.
//!
//! ```rust,ignore
//! let ctx = Context::new().with_trace_id("4bf92f3577b34da6a3ce929d0e0e4736");
//! let id = commands.dispatch(CreateWidget { name: "a".into() }, &ctx).await?;
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use uuid::Uuid;

/// A type map holding at most one value per type.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|prev| prev.downcast::<T>().ok().map(|boxed| *boxed))
    }

    /// Borrow the value of type `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Mutably borrow the value of type `T`.
    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Remove and return the value of type `T`.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok().map(|boxed| *boxed))
    }

    /// Whether a value of type `T` is present.
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions").field("len", &self.len()).finish()
    }
}

/// A cloneable cancellation signal shared between a caller and a dispatch.
///
/// Cancelling is sticky: once cancelled, every clone reports cancellation
/// and every pending or future [`cancelled`](Self::cancelled) call resolves.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<CancelState>,
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let mut notified = std::pin::pin!(self.inner.notify.notified());
            // Register before checking the flag so a concurrent cancel is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Correlation and tracing data for a single dispatch call.
pub struct Context {
    correlation_id: Uuid,
    causation_id: Option<Uuid>,
    trace_id: Option<String>,
    span_id: Option<String>,
    extensions: Extensions,
    resources: Option<Arc<Extensions>>,
    cancellation: CancellationToken,
}

impl Context {
    /// A fresh context with a random correlation id.
    pub fn new() -> Self {
        Self::with_correlation_id(Uuid::new_v4())
    }

    /// A fresh context that continues an existing correlation.
    pub fn with_correlation_id(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            causation_id: None,
            trace_id: None,
            span_id: None,
            extensions: Extensions::new(),
            resources: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// A context for work triggered by `parent`, such as an event published
    /// by a command handler.
    ///
    /// Keeps the correlation id, trace ids, resources and cancellation token;
    /// records the parent's correlation id as the causation id. Per-call
    /// extensions are not inherited.
    pub fn caused_by(parent: &Context) -> Self {
        Self {
            correlation_id: parent.correlation_id,
            causation_id: Some(parent.correlation_id),
            trace_id: parent.trace_id.clone(),
            span_id: parent.span_id.clone(),
            extensions: Extensions::new(),
            resources: parent.resources.clone(),
            cancellation: parent.cancellation.clone(),
        }
    }

    /// Set the distributed trace id.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Set the parent span id.
    pub fn with_span_id(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }

    /// Bind a cancellation token owned by the caller.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Insert a per-call extension.
    pub fn with_extension<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    /// Attach the runtime's shared resources. Replaces any previous set.
    pub fn attach_resources(&mut self, resources: Arc<Extensions>) {
        self.resources = Some(resources);
    }

    /// The correlation id shared by every dispatch of one logical operation.
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// The correlation id of the dispatch that caused this one.
    pub fn causation_id(&self) -> Option<Uuid> {
        self.causation_id
    }

    /// The distributed trace id, if any.
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// The parent span id, if any.
    pub fn span_id(&self) -> Option<&str> {
        self.span_id.as_deref()
    }

    /// Per-call extensions.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutable per-call extensions.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// A shared resource attached by the runtime, such as a database pool.
    pub fn resource<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.resources.as_deref().and_then(|resources| resources.get::<T>())
    }

    /// The cancellation token of this call.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the caller has cancelled this call.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("correlation_id", &self.correlation_id)
            .field("causation_id", &self.causation_id)
            .field("trace_id", &self.trace_id)
            .field("span_id", &self.span_id)
            .field("extensions", &self.extensions)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    struct TenantId(u32);

    #[test]
    fn extensions_hold_one_value_per_type() {
        let mut ext = Extensions::new();
        assert!(ext.insert(TenantId(1)).is_none());
        assert_eq!(ext.insert(TenantId(2)), Some(TenantId(1)));
        assert_eq!(ext.get::<TenantId>(), Some(&TenantId(2)));
        assert_eq!(ext.len(), 1);
        assert_eq!(ext.remove::<TenantId>(), Some(TenantId(2)));
        assert!(ext.is_empty());
    }

    #[test]
    fn caused_by_keeps_correlation() {
        let parent = Context::new().with_trace_id("t-1").with_extension(TenantId(7));
        let child = Context::caused_by(&parent);

        assert_eq!(child.correlation_id(), parent.correlation_id());
        assert_eq!(child.causation_id(), Some(parent.correlation_id()));
        assert_eq!(child.trace_id(), Some("t-1"));
        assert!(child.extensions().get::<TenantId>().is_none());
    }

    #[test]
    fn resources_are_shared() {
        let mut resources = Extensions::new();
        resources.insert(TenantId(9));
        let mut ctx = Context::new();
        assert!(ctx.resource::<TenantId>().is_none());

        ctx.attach_resources(Arc::new(resources));
        assert_eq!(ctx.resource::<TenantId>(), Some(&TenantId(9)));
    }

    #[tokio::test]
    async fn cancellation_wakes_waiters() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }
}
