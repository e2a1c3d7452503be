use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A route as it appeared in a decoded position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub route: String,
    pub data: Value,
    pub source_index: usize,
}

/// Payload of the `routeChanged` event emitted after each transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteChange {
    pub previous: Vec<RouteSnapshot>,
    pub current: Vec<RouteSnapshot>,
    pub removed: Vec<RouteSnapshot>,
    pub added: Vec<RouteSnapshot>,
    pub stacked: Vec<RouteSnapshot>,
    pub unstacked: Vec<RouteSnapshot>,
    pub modified: Vec<RouteSnapshot>,
}

impl RouteChange {
    /// Route currently on top of the stack.
    pub fn top(&self) -> Option<&RouteSnapshot> {
        self.current.last()
    }
}

pub fn route_names(routes: &[RouteSnapshot]) -> Vec<&str> {
    routes.iter().map(|r| r.route.as_str()).collect()
}
