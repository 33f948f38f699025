//! Dispatchers and the middleware chain they run requests through.
//!
//! - [`CommandDispatcher`] / [`QueryDispatcher`]: exactly one handler per type.
//! - [`EventDispatcher`]: zero or more handlers per type, in order.

pub mod chain;
pub mod erased;
pub mod event;
pub mod request;

pub use chain::Chain;
pub use event::{DeliveryPolicy, EventDispatcher, EventDispatcherBuilder};
pub use request::{CommandDispatcher, QueryDispatcher, RequestDispatcher, RequestDispatcherBuilder};
