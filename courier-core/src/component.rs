//! # Async Resource Components
//!
//! Lifecycle contract for infrastructure that handlers depend on, such as a
//! database connection pool. A component moves through
//!
//! ```text
//! Unconfigured -> Configured -> Initialized -> ShutDown
//! ```
//!
//! in lock-step with the runtime hosting it. `ShutDown` is terminal.

use crate::error::ResourceError;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

/// Lifecycle state of a [`Component`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ComponentState {
    /// No settings bound yet.
    Unconfigured = 0,
    /// Settings bound, nothing opened.
    Configured = 1,
    /// Resources open and usable.
    Initialized = 2,
    /// Resources released. Terminal.
    ShutDown = 3,
}

impl ComponentState {
    /// Decode the `repr(u8)` discriminant. Unknown values map to `ShutDown`.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => ComponentState::Unconfigured,
            1 => ComponentState::Configured,
            2 => ComponentState::Initialized,
            _ => ComponentState::ShutDown,
        }
    }

    /// Whether the component can serve requests.
    pub const fn is_available(self) -> bool {
        matches!(self, ComponentState::Initialized)
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComponentState::Unconfigured => "unconfigured",
            ComponentState::Configured => "configured",
            ComponentState::Initialized => "initialized",
            ComponentState::ShutDown => "shut down",
        })
    }
}

/// A resource with an explicit async lifecycle.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a Component",
    label = "missing `Component` implementation",
    note = "Components must report their state and implement `initialize` and `shutdown`."
)]
pub trait Component: Send + Sync + 'static {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Current lifecycle state.
    fn state(&self) -> ComponentState;

    /// Open the resource. Calling it again while initialized is a no-op.
    ///
    /// Fails with [`ResourceError::NotConfigured`] before `configure` and
    /// with [`ResourceError::ComponentNotAvailable`] after shutdown.
    fn initialize(&self) -> impl Future<Output = Result<(), ResourceError>> + Send;

    /// Drain and close the resource. Calling it again is a no-op.
    fn shutdown(&self) -> impl Future<Output = Result<(), ResourceError>> + Send;

    /// Fail unless the component is initialized.
    fn ensure_available(&self) -> Result<(), ResourceError> {
        let state = self.state();
        if state.is_available() {
            Ok(())
        } else {
            Err(ResourceError::ComponentNotAvailable {
                component: self.name(),
                state,
            })
        }
    }
}

/// A [`Component`] whose settings are bound before initialization.
pub trait Configurable: Component {
    /// The settings type.
    type Settings: Send;

    /// Bind settings without opening any resource.
    ///
    /// Valid while unconfigured or configured; fails with
    /// [`ResourceError::InvalidTransition`] afterwards.
    fn configure(&self, settings: Self::Settings) -> Result<(), ResourceError>;
}

/// Dynamic object-safe version of [`Component`].
pub trait DynComponent: Send + Sync + 'static {
    /// Name used in logs and errors (dynamic dispatch version).
    fn name_dyn(&self) -> &'static str;

    /// Current lifecycle state (dynamic dispatch version).
    fn state_dyn(&self) -> ComponentState;

    /// Open the resource (dynamic dispatch version).
    fn initialize_dyn(&self) -> BoxFuture<'_, Result<(), ResourceError>>;

    /// Close the resource (dynamic dispatch version).
    fn shutdown_dyn(&self) -> BoxFuture<'_, Result<(), ResourceError>>;
}

impl<T: Component> DynComponent for T {
    fn name_dyn(&self) -> &'static str {
        self.name()
    }

    fn state_dyn(&self) -> ComponentState {
        self.state()
    }

    fn initialize_dyn(&self) -> BoxFuture<'_, Result<(), ResourceError>> {
        Box::pin(self.initialize())
    }

    fn shutdown_dyn(&self) -> BoxFuture<'_, Result<(), ResourceError>> {
        Box::pin(self.shutdown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            ComponentState::Unconfigured,
            ComponentState::Configured,
            ComponentState::Initialized,
            ComponentState::ShutDown,
        ] {
            assert_eq!(ComponentState::from_u8(state as u8), state);
        }
        assert!(ComponentState::Initialized.is_available());
        assert!(!ComponentState::ShutDown.is_available());
    }
}
