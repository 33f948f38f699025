//! Ordered middleware chain.

use courier_core::{
    Context, DispatchError, DynMiddleware, Envelope, Middleware, Next, Reply, Terminal,
};
use std::sync::Arc;

/// An ordered list of middlewares, run outermost first.
///
/// Given `[A, B]` and a terminal `T`, a call runs A-pre, B-pre, T, B-post,
/// A-post. The order is exactly the order of [`push`](Self::push) calls.
#[derive(Clone, Default)]
pub struct Chain {
    middlewares: Vec<Arc<dyn DynMiddleware>>,
}

impl Chain {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware inside every middleware already pushed.
    pub fn push<M: Middleware>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Append an already shared middleware.
    pub fn push_shared(&mut self, middleware: Arc<dyn DynMiddleware>) {
        self.middlewares.push(middleware);
    }

    /// Number of middlewares.
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Whether the chain has no middleware.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run `envelope` through every middleware and then `terminal`.
    pub async fn run(
        &self,
        envelope: Envelope,
        ctx: &Context,
        terminal: &dyn Terminal,
    ) -> Result<Reply, DispatchError> {
        Next::new(&self.middlewares, terminal).run(envelope, ctx).await
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::MessageKind;
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Record {
        async fn process(
            &self,
            envelope: Envelope,
            ctx: &Context,
            next: Next<'_>,
        ) -> Result<Reply, DispatchError> {
            self.log.lock().unwrap().push(format!("{}:pre", self.name));
            let result = next.run(envelope, ctx).await;
            self.log.lock().unwrap().push(format!("{}:post", self.name));
            result
        }
    }

    struct ShortCircuit;

    impl Middleware for ShortCircuit {
        async fn process(
            &self,
            _envelope: Envelope,
            _ctx: &Context,
            _next: Next<'_>,
        ) -> Result<Reply, DispatchError> {
            Ok(Reply::new(42u32))
        }
    }

    struct Terminus(Arc<Mutex<Vec<String>>>);

    impl Terminal for Terminus {
        fn invoke<'a>(
            &'a self,
            _envelope: Envelope,
            _ctx: &'a Context,
        ) -> BoxFuture<'a, Result<Reply, DispatchError>> {
            self.0.lock().unwrap().push("terminal".to_owned());
            Box::pin(async { Ok(Reply::new(7u32)) })
        }
    }

    #[tokio::test]
    async fn onion_ordering() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = Chain::new();
        chain.push(Record {
            name: "A",
            log: log.clone(),
        });
        chain.push(Record {
            name: "B",
            log: log.clone(),
        });

        let reply = chain
            .run(
                Envelope::new("payload", MessageKind::Command),
                &Context::new(),
                &Terminus(log.clone()),
            )
            .await
            .unwrap();

        assert_eq!(reply.into_inner::<u32>().unwrap(), 7);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["A:pre", "B:pre", "terminal", "B:post", "A:post"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = Chain::new();
        chain.push(ShortCircuit);
        chain.push(Record {
            name: "B",
            log: log.clone(),
        });

        let reply = chain
            .run(
                Envelope::new("payload", MessageKind::Query),
                &Context::new(),
                &Terminus(log.clone()),
            )
            .await
            .unwrap();

        assert_eq!(reply.into_inner::<u32>().unwrap(), 42);
        assert!(log.lock().unwrap().is_empty());
    }
}
