use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use nav_core::EventBus;
use parking_lot::Mutex;
use serde_json::Value;
use view_controllers::{LongTaskGate, View};

/// Prints what it is asked to display.
pub struct TerminalView {
    name: String,
    bound: Mutex<Value>,
    events: EventBus<Value>,
    long_tasks: LongTaskGate,
}

impl TerminalView {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            bound: Mutex::new(Value::Null),
            events: EventBus::default(),
            long_tasks: LongTaskGate::new(),
        })
    }

    fn print(&self, action: &str, data: Option<&Value>) {
        match data {
            Some(data) => println!("[{}] {action} {data}", self.name),
            None => println!("[{}] {action}", self.name),
        }
    }
}

#[async_trait]
impl View for TerminalView {
    async fn open(&self, data: &Value) -> Result<()> {
        self.print("open", Some(data));
        *self.bound.lock() = data.clone();
        Ok(())
    }

    fn render(&self, data: &Value) {
        self.print("render", Some(data));
        *self.bound.lock() = data.clone();
    }

    fn close(&self) {
        self.print("close", None);
    }

    fn hide(&self) {
        self.print("hide", None);
    }

    fn show(&self) {
        self.print("show", None);
    }

    fn bound_data(&self) -> Value {
        self.bound.lock().clone()
    }

    fn read_data(&self) -> Value {
        self.bound_data()
    }

    fn set_read_only(&self, _read_only: bool) {}

    fn show_error(&self, message: &str) {
        self.print("error", Some(&Value::String(message.to_string())));
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
