//! Message traits for commands, queries and events.

use std::any::TypeId;
use std::fmt;

/// A marker trait for every value that travels through a dispatcher.
///
/// Messages must be `Send + Sync + 'static` to be safe for async use. The
/// blanket implementation covers every such type; the meaningful contracts
/// are [`Request`] and [`Event`].
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a valid Message",
    label = "must be `Send + Sync + 'static`",
    note = "All messages in Courier must be thread-safe and static."
)]
pub trait Message: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Message for T {}

/// Which side of the command/query split a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// The request changes state.
    Command,
    /// The request reads state.
    Query,
}

impl Intent {
    /// Lower-case label used in logs and error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Intent::Command => "command",
            Intent::Query => "query",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-level tag binding a [`Request`] to one dispatcher.
///
/// Implemented only by the uninhabited types in [`kind`].
pub trait RequestKind: Send + Sync + 'static {
    /// The runtime value of this tag.
    const INTENT: Intent;
}

/// Request kind tags.
///
/// ```rust,ignore
/// impl Request for CreateWidget {
///     type Response = WidgetId;
///     type Kind = kind::Command;
/// }
/// ```
pub mod kind {
    use super::{Intent, RequestKind};

    /// Tag for requests that change state.
    #[derive(Debug)]
    pub enum Command {}

    /// Tag for requests that read state.
    #[derive(Debug)]
    pub enum Query {}

    impl RequestKind for Command {
        const INTENT: Intent = Intent::Command;
    }

    impl RequestKind for Query {
        const INTENT: Intent = Intent::Query;
    }
}

/// A command or query: exactly one handler, exactly one response.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a Request",
    label = "missing `Request` implementation",
    note = "Derive `Command` or `Query`, or implement `Request` with a `Response` and a `Kind`."
)]
pub trait Request: Message {
    /// The value a successful handler returns.
    type Response: Send + 'static;

    /// [`kind::Command`] or [`kind::Query`].
    type Kind: RequestKind;
}

/// A fact that already happened: zero or more handlers, no response.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an Event",
    label = "missing `Event` implementation",
    note = "Derive `Event` or add `impl Event for {Self} {{}}`."
)]
pub trait Event: Message {}

/// What kind of message an [`Envelope`](crate::Envelope) carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A state-changing request.
    Command,
    /// A state-reading request.
    Query,
    /// A published fact.
    Event,
}

impl MessageKind {
    /// Lower-case label used in logs and error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageKind::Command => "command",
            MessageKind::Query => "query",
            MessageKind::Event => "event",
        }
    }
}

impl From<Intent> for MessageKind {
    fn from(intent: Intent) -> Self {
        match intent {
            Intent::Command => MessageKind::Command,
            Intent::Query => MessageKind::Query,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a concrete message type in a registry.
///
/// Equality and hashing use only the [`TypeId`]; the name is carried for
/// diagnostics.
#[derive(Clone, Copy)]
pub struct HandlerKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl HandlerKey {
    /// The key for message type `M`.
    pub fn of<M: Message>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
        }
    }

    /// The [`TypeId`] of the message type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The fully-qualified type name of the message type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for HandlerKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for HandlerKey {}

impl std::hash::Hash for HandlerKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandlerKey").field(&self.type_name).finish()
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}
