//! Error translation middleware.

use courier_core::{Context, DispatchError, Envelope, Middleware, Next, Reply};

/// Replaces every error coming back up the chain with `translate(error)`.
///
/// Successes pass through untouched and an error can only become another
/// error, never a success.
///
/// ```rust,ignore
/// let to_validation = TranslateErrors::new(|err| match err.handler_error::<NameTaken>() {
///     Some(taken) => DispatchError::Validation { message_type: "CreateWidget", reason: taken.to_string() },
///     None => err,
/// });
/// ```
pub struct TranslateErrors<F> {
    translate: F,
}

impl<F> TranslateErrors<F>
where
    F: Fn(DispatchError) -> DispatchError + Send + Sync + 'static,
{
    /// Wrap a translation function.
    pub const fn new(translate: F) -> Self {
        Self { translate }
    }
}

impl<F> Middleware for TranslateErrors<F>
where
    F: Fn(DispatchError) -> DispatchError + Send + Sync + 'static,
{
    async fn process(
        &self,
        envelope: Envelope,
        ctx: &Context,
        next: Next<'_>,
    ) -> Result<Reply, DispatchError> {
        next.run(envelope, ctx).await.map_err(&self.translate)
    }
}

impl<F> std::fmt::Debug for TranslateErrors<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslateErrors").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{DynMiddleware, MessageKind, Terminal};
    use futures::future::BoxFuture;
    use std::sync::Arc;

    struct Missing;

    impl Terminal for Missing {
        fn invoke<'a>(
            &'a self,
            envelope: Envelope,
            _ctx: &'a Context,
        ) -> BoxFuture<'a, Result<Reply, DispatchError>> {
            let message_type = envelope.type_name();
            Box::pin(async move { Err(DispatchError::NoHandlerRegistered { message_type }) })
        }
    }

    #[tokio::test]
    async fn errors_are_replaced() {
        let translate = TranslateErrors::new(|err: DispatchError| DispatchError::Validation {
            message_type: "boundary",
            reason: err.to_string(),
        });
        let chain: Vec<Arc<dyn DynMiddleware>> = vec![Arc::new(translate)];
        let ctx = Context::new();

        let err = Next::new(&chain, &Missing)
            .run(Envelope::new(5u32, MessageKind::Command), &ctx)
            .await
            .unwrap_err();

        match err {
            DispatchError::Validation { reason, .. } => assert!(reason.contains("u32")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
