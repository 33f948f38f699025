//! Validation middleware for per-type message rules.

use courier_core::{Context, DispatchError, Envelope, Message, Middleware, Next, Reply};
use std::any::{Any, TypeId};
use std::collections::HashMap;

type Rule = Box<dyn Fn(&(dyn Any + Send + Sync)) -> Result<(), String> + Send + Sync>;

/// Rejects a message before it reaches its handler when one of the rules
/// registered for its type fails.
///
/// Rules run in the order they were added; the first failure wins and is
/// reported as [`DispatchError::Validation`]. Types without rules pass.
///
/// ```rust,ignore
/// let validation = ValidationMiddleware::new()
///     .rule(|cmd: &CreateWidget| {
///         if cmd.name.is_empty() { Err("name must not be empty".into()) } else { Ok(()) }
///     });
/// ```
#[derive(Default)]
pub struct ValidationMiddleware {
    rules: HashMap<TypeId, Vec<Rule>>,
}

impl ValidationMiddleware {
    /// A middleware without rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule for messages of type `M`.
    pub fn rule<M, F>(mut self, rule: F) -> Self
    where
        M: Message,
        F: Fn(&M) -> Result<(), String> + Send + Sync + 'static,
    {
        let erased: Rule = Box::new(move |payload: &(dyn Any + Send + Sync)| {
            match payload.downcast_ref::<M>() {
                Some(message) => rule(message),
                None => Ok(()),
            }
        });
        self.rules.entry(TypeId::of::<M>()).or_default().push(erased);
        self
    }

    fn check(&self, envelope: &Envelope) -> Result<(), DispatchError> {
        let Some(rules) = self.rules.get(&envelope.key().type_id()) else {
            return Ok(());
        };
        for rule in rules {
            rule(envelope.payload()).map_err(|reason| DispatchError::Validation {
                message_type: envelope.type_name(),
                reason,
            })?;
        }
        Ok(())
    }
}

impl Middleware for ValidationMiddleware {
    async fn process(
        &self,
        envelope: Envelope,
        ctx: &Context,
        next: Next<'_>,
    ) -> Result<Reply, DispatchError> {
        self.check(&envelope)?;
        next.run(envelope, ctx).await
    }
}

impl std::fmt::Debug for ValidationMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationMiddleware")
            .field("types", &self.rules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{DynMiddleware, MessageKind, Terminal};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CreateWidget {
        name: String,
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl Terminal for Counting {
        fn invoke<'a>(
            &'a self,
            _envelope: Envelope,
            _ctx: &'a Context,
        ) -> BoxFuture<'a, Result<Reply, DispatchError>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(Reply::empty()) })
        }
    }

    fn chain() -> Vec<Arc<dyn DynMiddleware>> {
        vec![Arc::new(ValidationMiddleware::new().rule(|cmd: &CreateWidget| {
            if cmd.name.is_empty() {
                Err("name must not be empty".to_owned())
            } else {
                Ok(())
            }
        }))]
    }

    #[tokio::test]
    async fn invalid_message_never_reaches_the_handler() {
        let chain = chain();
        let terminal = Counting::default();
        let ctx = Context::new();

        let err = Next::new(&chain, &terminal)
            .run(
                Envelope::new(CreateWidget { name: String::new() }, MessageKind::Command),
                &ctx,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Validation { ref reason, .. } if reason == "name must not be empty"));
        assert_eq!(terminal.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_and_unruled_messages_pass() {
        let chain = chain();
        let terminal = Counting::default();
        let ctx = Context::new();

        Next::new(&chain, &terminal)
            .run(
                Envelope::new(CreateWidget { name: "a".into() }, MessageKind::Command),
                &ctx,
            )
            .await
            .unwrap();
        Next::new(&chain, &terminal)
            .run(Envelope::new(3u8, MessageKind::Query), &ctx)
            .await
            .unwrap();

        assert_eq!(terminal.0.load(Ordering::SeqCst), 2);
    }
}
