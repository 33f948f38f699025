#![allow(dead_code)]

use courier::{Context, Event, Handler, Request, kind};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

// ============================================================================
// Test Message Types
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct CreateWidget {
    pub name: String,
}

impl Request for CreateWidget {
    type Response = u64;
    type Kind = kind::Command;
}

pub fn create(name: &str) -> CreateWidget {
    CreateWidget { name: name.into() }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FindWidget(pub u64);

impl Request for FindWidget {
    type Response = Option<String>;
    type Kind = kind::Query;
}

#[derive(Clone, Debug, PartialEq)]
pub struct WidgetCreated {
    pub id: u64,
}

impl Event for WidgetCreated {}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum WidgetError {
    #[error("widget name `{0}` is taken")]
    NameTaken(String),
}

// ============================================================================
// Test Handlers
// ============================================================================

/// Hands out increasing ids and remembers every name it saw.
#[derive(Clone, Default)]
pub struct CreateWidgetHandler {
    pub next_id: Arc<AtomicU64>,
    pub names: Arc<Mutex<Vec<String>>>,
}

impl CreateWidgetHandler {
    pub fn names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

impl Handler<CreateWidget> for CreateWidgetHandler {
    type Error = WidgetError;

    async fn handle(&self, cmd: CreateWidget, _ctx: &Context) -> Result<u64, WidgetError> {
        self.names.lock().unwrap().push(cmd.name.clone());
        if cmd.name == "taken" {
            return Err(WidgetError::NameTaken(cmd.name));
        }
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
