use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::Result;
use parking_lot::Mutex;
use tracing::debug;

use crate::handler::{Handler, Settled, Watchdog};

#[derive(Debug, Clone, PartialEq)]
pub struct Event<T> {
    pub name: String,
    pub data: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener<T> {
    id: ListenerId,
    handler: Handler<Event<T>>,
    once: bool,
}

/// String-keyed publish/subscribe. Listeners of an event run one after the
/// other; the first failure stops the series and is returned to the emitter.
pub struct EventBus<T> {
    listeners: Mutex<HashMap<String, Vec<Listener<T>>>>,
    next_id: AtomicU64,
    watchdog: Watchdog,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::with_watchdog(Watchdog::default())
    }
}

impl<T> EventBus<T> {
    pub fn with_watchdog(watchdog: Watchdog) -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            watchdog,
        }
    }

    pub fn on(&self, name: &str, handler: Handler<Event<T>>) -> ListenerId {
        self.register(name, handler, false)
    }

    /// Like [`EventBus::on`] but the listener is removed before its first run.
    pub fn once(&self, name: &str, handler: Handler<Event<T>>) -> ListenerId {
        self.register(name, handler, true)
    }

    pub fn off(&self, name: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(list) = listeners.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|listener| listener.id != id);
        before != list.len()
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.lock().get(name).map_or(0, Vec::len)
    }

    fn register(&self, name: &str, handler: Handler<Event<T>>, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(Listener { id, handler, once });
        id
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub async fn emit(&self, name: &str, data: T) -> Result<()> {
        let batch: Vec<Handler<Event<T>>> = {
            let mut listeners = self.listeners.lock();
            match listeners.get_mut(name) {
                Some(list) => {
                    let batch = list.iter().map(|l| l.handler.clone()).collect();
                    list.retain(|l| !l.once);
                    batch
                }
                None => Vec::new(),
            }
        };

        for handler in batch {
            let event = Event {
                name: name.to_string(),
                data: data.clone(),
            };
            match handler.invoke(event, &self.watchdog, name).await {
                Settled::Completed(Ok(())) => {}
                Settled::Completed(Err(err)) => return Err(err),
                Settled::Abandoned => {
                    debug!(event = name, "events: listener dropped its completion, series stopped");
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/event_bus_tests.rs"]
mod tests;
