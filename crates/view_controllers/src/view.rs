use std::future::Future;

use anyhow::Result;
use async_trait::async_trait;
use nav_core::EventBus;
use serde_json::Value;
use tokio::sync::Mutex;

/// What a controller needs from the thing that displays its data.
#[async_trait]
pub trait View: Send + Sync {
    /// Shows the view for the first time with `data`.
    async fn open(&self, data: &Value) -> Result<()>;

    async fn open_in_popup(&self, data: &Value) -> Result<()> {
        self.open(data).await
    }

    fn render(&self, data: &Value);
    fn close(&self);
    fn hide(&self);
    fn show(&self);

    /// Data last given to `open`/`render`.
    fn bound_data(&self) -> Value;

    /// Bound data updated with the user's input.
    fn read_data(&self) -> Value;

    async fn check_form(&self) -> Result<bool> {
        Ok(true)
    }

    fn set_read_only(&self, read_only: bool);

    fn show_error(&self, _message: &str) {}

    async fn confirm(&self, message: &str) -> bool;

    /// User interactions (`btValidate`, `rowClick`, `close`, ...).
    fn events(&self) -> &EventBus<Value>;

    fn long_tasks(&self) -> &LongTaskGate;
}

/// Runs UI-blocking work one piece at a time. Work must not start another
/// long task on the same gate.
#[derive(Debug, Default)]
pub struct LongTaskGate {
    gate: Mutex<()>,
}

impl LongTaskGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<T, F>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _busy = self.gate.lock().await;
        work.await
    }

    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
