//! Type-indexed handler registry.
//!
//! A registry maps a message type to its handler(s) and has two phases:
//!
//! 1. **Build**: registrations are accepted (mutex-guarded).
//! 2. **Sealed**: the table is frozen into an immutable snapshot; reads are
//!    lock-free and any further registration fails with
//!    [`DispatchError::RegistryFrozen`].
//!
//! Dispatchers seal their registry on first dispatch or on `validate()`.

use courier_core::{DispatchError, HandlerKey};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// How many handlers a message type may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// Commands and queries: exactly one handler; duplicates are rejected.
    ExactlyOnce,
    /// Events: any number of handlers, kept in registration order.
    FanOut,
}

/// One handler bound to one message type.
#[derive(Clone)]
pub struct Registration<T> {
    key: HandlerKey,
    handler_name: &'static str,
    handler: T,
}

impl<T> Registration<T> {
    /// The message type this handler serves.
    pub fn key(&self) -> HandlerKey {
        self.key
    }

    /// The handler's type name.
    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    /// The handler itself.
    pub fn handler(&self) -> &T {
        &self.handler
    }
}

impl<T> std::fmt::Debug for Registration<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("message", &self.key.type_name())
            .field("handler", &self.handler_name)
            .finish()
    }
}

/// The handlers resolved for one message type, in registration order.
///
/// Cheap to clone; it shares the registry's storage once sealed.
pub type Resolved<T> = Arc<[Registration<T>]>;

struct Table<T> {
    order: Vec<HandlerKey>,
    slots: HashMap<TypeId, Resolved<T>>,
}

struct BuildState<T> {
    sealed: bool,
    order: Vec<HandlerKey>,
    slots: HashMap<TypeId, Vec<Registration<T>>>,
}

/// A two-phase, type-indexed handler registry.
///
/// `T` is the type-erased handler stored per registration, usually an
/// `Arc<dyn ...>`.
pub struct HandlerRegistry<T> {
    multiplicity: Multiplicity,
    building: Mutex<BuildState<T>>,
    sealed: OnceLock<Table<T>>,
}

impl<T: Clone> HandlerRegistry<T> {
    /// Create an empty registry in the build phase.
    pub fn new(multiplicity: Multiplicity) -> Self {
        Self {
            multiplicity,
            building: Mutex::new(BuildState {
                sealed: false,
                order: Vec::new(),
                slots: HashMap::new(),
            }),
            sealed: OnceLock::new(),
        }
    }

    /// The registry's multiplicity.
    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    fn lock(&self) -> MutexGuard<'_, BuildState<T>> {
        self.building.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for the message type `key`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::RegistryFrozen`] once the registry is sealed.
    /// - [`DispatchError::DuplicateHandler`] when `key` already has a handler
    ///   and the registry is [`Multiplicity::ExactlyOnce`].
    pub fn register(
        &self,
        key: HandlerKey,
        handler_name: &'static str,
        handler: T,
    ) -> Result<(), DispatchError> {
        let mut state = self.lock();
        if state.sealed {
            return Err(DispatchError::RegistryFrozen {
                message_type: key.type_name(),
            });
        }

        let is_new = !state.slots.contains_key(&key.type_id());
        let slot = state.slots.entry(key.type_id()).or_default();
        if self.multiplicity == Multiplicity::ExactlyOnce {
            if let Some(existing) = slot.first() {
                return Err(DispatchError::DuplicateHandler {
                    message_type: key.type_name(),
                    existing: existing.handler_name,
                    rejected: handler_name,
                });
            }
        }
        slot.push(Registration {
            key,
            handler_name,
            handler,
        });
        if is_new {
            state.order.push(key);
        }

        tracing::debug!(
            message_type = key.type_name(),
            handler = handler_name,
            "registered handler"
        );
        Ok(())
    }

    /// Freeze the registry. Idempotent; later registrations fail.
    pub fn seal(&self) {
        self.sealed_table();
    }

    /// Whether the registry has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed.get().is_some()
    }

    fn sealed_table(&self) -> &Table<T> {
        self.sealed.get_or_init(|| {
            let mut state = self.lock();
            state.sealed = true;
            let order = std::mem::take(&mut state.order);
            let slots = std::mem::take(&mut state.slots)
                .into_iter()
                .map(|(type_id, regs)| (type_id, Resolved::from(regs)))
                .collect::<HashMap<_, _>>();
            tracing::debug!(types = order.len(), "sealed handler registry");
            Table { order, slots }
        })
    }

    /// Read from the sealed table, or from the build state under the lock.
    ///
    /// A seal racing with the read is resolved by waiting for the table.
    fn read<R>(
        &self,
        on_table: impl Fn(&Table<T>) -> R,
        on_build: impl FnOnce(&BuildState<T>) -> R,
    ) -> R {
        if let Some(table) = self.sealed.get() {
            return on_table(table);
        }
        let state = self.lock();
        if state.sealed {
            drop(state);
            return on_table(self.sealed_table());
        }
        on_build(&state)
    }

    /// Whether any handler is registered for the type.
    ///
    /// Pure lookup: never seals or mutates the registry.
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.read(
            |table| table.slots.contains_key(&type_id),
            |state| state.slots.contains_key(&type_id),
        )
    }

    /// Resolve the handlers for `key`.
    ///
    /// Pure lookup: never seals or mutates the registry. Lock-free once
    /// sealed.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NoHandlerRegistered`] when nothing is registered and
    /// the registry is [`Multiplicity::ExactlyOnce`]. A fan-out registry
    /// returns an empty list instead.
    pub fn resolve(&self, key: &HandlerKey) -> Result<Resolved<T>, DispatchError> {
        let type_id = key.type_id();
        let found = self.read(
            |table| table.slots.get(&type_id).cloned(),
            |state| state.slots.get(&type_id).map(|regs| Resolved::from(regs.as_slice())),
        );

        match (found, self.multiplicity) {
            (Some(regs), _) => Ok(regs),
            (None, Multiplicity::ExactlyOnce) => Err(DispatchError::NoHandlerRegistered {
                message_type: key.type_name(),
            }),
            (None, Multiplicity::FanOut) => Ok(Resolved::from(Vec::new())),
        }
    }

    /// The registered message types, in first-registration order.
    ///
    /// The iterator is finite and `Clone`, so it can be restarted. Before
    /// sealing it iterates a snapshot taken at call time.
    pub fn list_types(&self) -> impl Iterator<Item = HandlerKey> + Clone + '_ {
        let keys: Arc<[HandlerKey]> = self.read(
            |table| Arc::from(table.order.as_slice()),
            |state| Arc::from(state.order.as_slice()),
        );
        (0..keys.len()).map(move |i| keys[i])
    }

    /// Number of registered message types.
    pub fn len(&self) -> usize {
        self.read(|table| table.order.len(), |state| state.order.len())
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> std::fmt::Debug for HandlerRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("multiplicity", &self.multiplicity)
            .field("sealed", &self.sealed.get().is_some())
            .finish_non_exhaustive()
    }
}
