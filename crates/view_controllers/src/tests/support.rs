use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use nav_core::{EventBus, MemoryPositionStore, Navigator};
use parking_lot::Mutex;
use serde_json::Value;

use crate::view::{LongTaskGate, View};

/// View keeping the calls it received.
#[derive(Default)]
pub(crate) struct StubView {
    pub calls: Mutex<Vec<String>>,
    pub bound: Mutex<Value>,
    events: EventBus<Value>,
    long_tasks: LongTaskGate,
}

impl StubView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn call(&self, name: &str) {
        self.calls.lock().push(name.to_string());
    }
}

#[async_trait]
impl View for StubView {
    async fn open(&self, data: &Value) -> Result<()> {
        self.call("open");
        *self.bound.lock() = data.clone();
        Ok(())
    }

    fn render(&self, data: &Value) {
        self.call("render");
        *self.bound.lock() = data.clone();
    }

    fn close(&self) {
        self.call("close");
    }

    fn hide(&self) {
        self.call("hide");
    }

    fn show(&self) {
        self.call("show");
    }

    fn bound_data(&self) -> Value {
        self.bound.lock().clone()
    }

    fn read_data(&self) -> Value {
        self.bound_data()
    }

    fn set_read_only(&self, read_only: bool) {
        self.call(if read_only { "read-only" } else { "editable" });
    }

    async fn confirm(&self, _message: &str) -> bool {
        true
    }

    fn events(&self) -> &EventBus<Value> {
        &self.events
    }

    fn long_tasks(&self) -> &LongTaskGate {
        &self.long_tasks
    }
}

pub(crate) fn navigator() -> Arc<Navigator> {
    Navigator::new(MemoryPositionStore::new())
}

pub(crate) async fn settle(navigator: &Navigator) {
    while navigator.registry().pending_inits() > 0 {
        tokio::task::yield_now().await;
    }
}
