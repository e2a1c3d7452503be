use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::url_codec::UrlCodec;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Where the current position lives (a browser location hash, a shell
/// prompt, a test fixture).
///
/// `write` is the programmatic path and must not notify subscribers; only
/// changes coming from outside the navigator are broadcast.
pub trait PositionStore: Send + Sync {
    fn read(&self) -> String;
    fn write(&self, position: &str);
    fn subscribe(&self) -> broadcast::Receiver<String>;
}

struct History {
    entries: Vec<String>,
}

impl History {
    fn current(&self) -> String {
        self.entries.last().cloned().unwrap_or_default()
    }
}

/// In-memory store with a history stack, like a browser tab.
pub struct MemoryPositionStore {
    history: Mutex<History>,
    changes: broadcast::Sender<String>,
}

impl MemoryPositionStore {
    pub fn new() -> Arc<Self> {
        Self::with_position("")
    }

    pub fn with_position(position: &str) -> Arc<Self> {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Arc::new(Self {
            history: Mutex::new(History {
                entries: vec![UrlCodec::normalize(position)],
            }),
            changes,
        })
    }

    /// A change made outside the navigator, such as a typed URL.
    pub fn push_external(&self, position: &str) {
        let position = UrlCodec::normalize(position);
        self.history.lock().entries.push(position.clone());
        let _ = self.changes.send(position);
    }

    /// Goes one entry back and notifies subscribers. Returns false at the
    /// start of the history.
    pub fn back(&self) -> bool {
        let position = {
            let mut history = self.history.lock();
            if history.entries.len() < 2 {
                return false;
            }
            history.entries.pop();
            history.current()
        };
        let _ = self.changes.send(position);
        true
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().entries.clone()
    }
}

impl PositionStore for MemoryPositionStore {
    fn read(&self) -> String {
        self.history.lock().current()
    }

    fn write(&self, position: &str) {
        self.history.lock().entries.push(UrlCodec::normalize(position));
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}
