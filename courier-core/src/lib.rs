//! # courier-core
//!
//! Core traits for the Courier command/query/event dispatch framework.
//!
//! This crate has minimal dependencies and is designed to be imported by
//! handler crates and infrastructure plugins that don't need the full
//! `courier-std` implementation.
//!
//! # Building Blocks
//!
//! ## Messages ([`Request`], [`Event`])
//!
//! A request is a command (changes state) or a query (reads state) with
//! exactly one handler. An event is a fact with zero or more handlers.
//!
//! ## Handlers ([`Handler`], [`EventHandler`])
//!
//! The terminal business logic, bound to one message type through an
//! explicit trait instead of duck typing.
//!
//! ## Middleware ([`Middleware`], [`Next`])
//!
//! Cross-cutting behaviour wrapped around dispatch. Each middleware gets an
//! explicit [`Next`] cursor for the rest of the chain.
//!
//! ## Components ([`Component`])
//!
//! The async lifecycle contract for shared infrastructure such as a
//! connection pool.
//!
//! # Error Types
//!
//! - [`DispatchError`] - everything a dispatch can fail with
//! - [`ResourceError`] - component lifecycle and pool errors

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod component;
mod context;
mod error;
mod handler;
mod message;
mod middleware;

// Re-exports
pub use component::{Component, ComponentState, Configurable, DynComponent};
pub use context::{CancellationToken, Context, Extensions};
pub use error::{BoxError, DispatchError, HandlerFailure, ResourceError};
pub use handler::{EventHandler, Handler};
pub use message::{Event, HandlerKey, Intent, Message, MessageKind, Request, RequestKind, kind};
pub use middleware::{DynMiddleware, Envelope, Middleware, Next, Reply, Terminal};
