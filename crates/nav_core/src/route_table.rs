use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use shared::protocol::RouteSnapshot;
use uuid::Uuid;

use crate::{error::NavigationError, handler::Handler};

pub const ANONYMOUS_MARKER: char = '£';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Enter,
    Leave,
    Stack,
    Unstack,
    Modify,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enter => "enter",
            Self::Leave => "leave",
            Self::Stack => "stack",
            Self::Unstack => "unstack",
            Self::Modify => "modify",
        })
    }
}

/// Lifecycle callbacks of a route. Missing entries are no-ops.
#[derive(Debug, Clone, Default)]
pub struct LifecycleHandlers {
    pub on_enter: Option<Handler<Value>>,
    pub on_leave: Option<Handler<()>>,
    pub on_stack: Option<Handler<()>>,
    pub on_unstack: Option<Handler<Value>>,
    pub on_modify: Option<Handler<Value>>,
}

impl LifecycleHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(mut self, handler: Handler<Value>) -> Self {
        self.on_enter = Some(handler);
        self
    }

    pub fn leave(mut self, handler: Handler<()>) -> Self {
        self.on_leave = Some(handler);
        self
    }

    pub fn stack(mut self, handler: Handler<()>) -> Self {
        self.on_stack = Some(handler);
        self
    }

    pub fn unstack(mut self, handler: Handler<Value>) -> Self {
        self.on_unstack = Some(handler);
        self
    }

    pub fn modify(mut self, handler: Handler<Value>) -> Self {
        self.on_modify = Some(handler);
        self
    }
}

pub struct Route {
    pattern: String,
    handlers: LifecycleHandlers,
    default_data: Option<Value>,
    anonymous_data: Mutex<Vec<(String, Value)>>,
    active: AtomicBool,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("default_data", &self.default_data)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Route {
    pub fn new(
        pattern: impl Into<String>,
        handlers: LifecycleHandlers,
        default_data: Option<Value>,
    ) -> Result<Self, NavigationError> {
        let pattern = pattern.into();
        validate_pattern(&pattern)?;
        Ok(Self {
            pattern,
            handlers,
            default_data,
            anonymous_data: Mutex::new(Vec::new()),
            active: AtomicBool::new(false),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn handlers(&self) -> &LifecycleHandlers {
        &self.handlers
    }

    pub fn default_data(&self) -> Option<&Value> {
        self.default_data.as_ref()
    }

    /// Data used when a position carries no data for this route.
    pub fn fallback_data(&self) -> Value {
        self.default_data.clone().unwrap_or(Value::Null)
    }

    pub fn is_default_data(&self, data: &Value) -> bool {
        match &self.default_data {
            Some(default) => default == data,
            None => data.is_null(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns the previous activity flag.
    pub(crate) fn set_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::SeqCst)
    }

    /// Id under which `data` is kept for anonymous positions. Deep-equal
    /// values share one id for the life of the route.
    pub fn anonymous_id(&self, data: &Value) -> String {
        let mut entries = self.anonymous_data.lock();
        if let Some((id, _)) = entries.iter().find(|(_, stored)| stored == data) {
            return id.clone();
        }
        let id = format!("{ANONYMOUS_MARKER}{}", Uuid::new_v4());
        entries.push((id.clone(), data.clone()));
        id
    }

    pub fn anonymous_data(&self, id: &str) -> Option<Value> {
        self.anonymous_data
            .lock()
            .iter()
            .find(|(stored_id, _)| stored_id == id)
            .map(|(_, data)| data.clone())
    }
}

fn validate_pattern(pattern: &str) -> Result<(), NavigationError> {
    let reason = if pattern.contains('#') {
        "must not contain '#'"
    } else if pattern.starts_with('/') {
        "must not start with '/'"
    } else if pattern.starts_with(ANONYMOUS_MARKER) {
        "must not start with the anonymous data marker"
    } else {
        return Ok(());
    };
    Err(NavigationError::MalformedPattern {
        pattern: pattern.to_string(),
        reason,
    })
}

/// A route as decoded from one segment of a position.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub route: Arc<Route>,
    pub data: Value,
    pub source_index: usize,
}

impl ResolvedRoute {
    pub fn name(&self) -> &str {
        self.route.pattern()
    }

    pub fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot {
            route: self.name().to_string(),
            data: self.data.clone(),
            source_index: self.source_index,
        }
    }
}

pub fn snapshots(routes: &[ResolvedRoute]) -> Vec<RouteSnapshot> {
    routes.iter().map(ResolvedRoute::snapshot).collect()
}

/// Registered routes in registration order.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: RwLock<Vec<Arc<Route>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, route: Route) -> Arc<Route> {
        let route = Arc::new(route);
        self.routes.write().push(Arc::clone(&route));
        route
    }

    pub fn all(&self) -> Vec<Arc<Route>> {
        self.routes.read().clone()
    }

    pub fn find(&self, pattern: &str) -> Option<Arc<Route>> {
        self.routes
            .read()
            .iter()
            .find(|route| route.pattern() == pattern)
            .cloned()
    }

    /// Longest registered pattern matching `chunk`, with the raw data
    /// suffix that follows it. Ties go to the first registered route.
    pub fn resolve<'a>(&self, chunk: &'a str) -> Option<(Arc<Route>, Option<&'a str>)> {
        let routes = self.routes.read();
        let mut best: Option<(&Arc<Route>, Option<&'a str>)> = None;

        for route in routes.iter() {
            let pattern = route.pattern();
            let suffix = if chunk == pattern {
                None
            } else if let Some(rest) = chunk
                .strip_prefix(pattern)
                .and_then(|rest| rest.strip_prefix('$'))
            {
                Some(rest)
            } else {
                continue;
            };

            let longer = best.map_or(true, |(current, _)| pattern.len() > current.pattern().len());
            if longer {
                best = Some((route, suffix));
            }
        }

        best.map(|(route, suffix)| (Arc::clone(route), suffix))
    }
}
