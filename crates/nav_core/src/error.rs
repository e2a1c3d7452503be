use shared::error::UnknownDataMode;
use thiserror::Error;
use tracing::error;

use crate::route_table::LifecyclePhase;

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("dataMode should be \"bookmarkable\" or \"anonymous\", got {0:?}")]
    InvalidDataMode(String),
    #[error("malformed route pattern {pattern:?}: {reason}")]
    MalformedPattern {
        pattern: String,
        reason: &'static str,
    },
    #[error("no route found for position {position:?}")]
    NoRouteFound { position: String },
    #[error("anonymous data {id} of route {route:?} is not available in this session")]
    AnonymousDataExpired { route: String, id: String },
    #[error("unknown route {0:?}")]
    UnknownRoute(String),
    #[error("route {0:?} is not part of the current position")]
    RouteNotInPosition(String),
    #[error("error while running {phase} on route {route:?}: {message}")]
    Lifecycle {
        route: String,
        phase: LifecyclePhase,
        message: String,
    },
    #[error("interceptor {scope:?} failed: {message}")]
    Interceptor { scope: String, message: String },
    #[error("navigator is no longer available")]
    Detached,
    #[error("invalid navigator settings: {0}")]
    Settings(String),
}

impl From<UnknownDataMode> for NavigationError {
    fn from(value: UnknownDataMode) -> Self {
        Self::InvalidDataMode(value.0)
    }
}

/// Receives failures of transitions that nobody awaits, such as the ones
/// started by external position changes.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &NavigationError);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, err: &NavigationError) {
        error!(error = %err, "nav: navigation failed");
    }
}
