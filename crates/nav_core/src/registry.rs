use std::{
    any::Any,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Weak,
    },
};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use shared::protocol::RouteSnapshot;
use tracing::{debug, error, warn};

use crate::{
    error::NavigationError,
    handler::{Completion, Handler, Settled, Watchdog},
    route_table::{LifecycleHandlers, Route},
    Destination, Navigator, RouteTarget, Suspension, TransitionOutcome,
};

pub type Injected = Arc<dyn Any + Send + Sync>;

/// Something that owns routes: usually a view controller.
pub trait Controller: Send + Sync + 'static {
    fn label(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// Called once, when the controller is registered.
    fn attach(&self, _context: ControllerContext) {}

    /// Work to finish before the first transition runs.
    fn initializer(self: Arc<Self>) -> Option<Handler<()>> {
        None
    }

    fn lifecycle(self: Arc<Self>) -> LifecycleHandlers {
        LifecycleHandlers::default()
    }
}

/// A controller's handle on its navigator.
#[derive(Clone)]
pub struct ControllerContext {
    navigator: Weak<Navigator>,
    injections: Vec<(String, Injected)>,
}

impl ControllerContext {
    pub(crate) fn new(navigator: Weak<Navigator>, injections: Vec<(String, Injected)>) -> Self {
        Self {
            navigator,
            injections,
        }
    }

    fn navigator(&self) -> Result<Arc<Navigator>, NavigationError> {
        self.navigator.upgrade().ok_or(NavigationError::Detached)
    }

    /// Shared object injected into the navigator before this controller
    /// was registered.
    pub fn injected<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.injections
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, object)| Arc::clone(object).downcast::<T>().ok())
    }

    pub async fn navigate(
        &self,
        destination: impl Into<Destination>,
    ) -> Result<TransitionOutcome, NavigationError> {
        self.navigator()?.navigate(destination).await
    }

    pub async fn resume_navigation(
        &self,
        default: Option<Destination>,
    ) -> Result<TransitionOutcome, NavigationError> {
        self.navigator()?.resume_navigation(default).await
    }

    pub async fn suspend_navigation(
        &self,
        route: &str,
        target: Option<RouteTarget>,
        data: Option<Value>,
    ) -> Result<TransitionOutcome, NavigationError> {
        self.navigator()?.suspend_navigation(route, target, data).await
    }

    pub async fn update_route_data(
        &self,
        route: &str,
        data: Value,
    ) -> Result<TransitionOutcome, NavigationError> {
        self.navigator()?.update_route_data(route, data).await
    }

    pub fn add_route(
        &self,
        pattern: &str,
        target: impl Into<RouteTarget>,
        default_data: Option<Value>,
    ) -> Result<Arc<Route>, NavigationError> {
        self.navigator()?.add_route(pattern, target, default_data)
    }

    pub fn register_controller(
        &self,
        controller: Arc<dyn Controller>,
    ) -> Result<Arc<dyn Controller>, NavigationError> {
        Ok(self.navigator()?.register_controller(controller))
    }

    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.navigator().map(|n| n.routes()).unwrap_or_default()
    }

    pub fn route(&self, name: &str) -> Option<Arc<Route>> {
        self.navigator().ok()?.route(name)
    }

    pub fn active_routes(&self) -> Vec<RouteSnapshot> {
        self.navigator().map(|n| n.active_routes()).unwrap_or_default()
    }

    pub fn is_suspended(&self) -> Suspension {
        self.navigator()
            .map(|n| n.is_suspended())
            .unwrap_or(Suspension::None)
    }
}

/// Controllers known to a navigator and the init work still outstanding.
#[derive(Default)]
pub struct ControllerRegistry {
    controllers: Mutex<Vec<Arc<dyn Controller>>>,
    injections: RwLock<Vec<(String, Injected)>>,
    pending_inits: Arc<AtomicUsize>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, name: &str, object: Injected) {
        let mut injections = self.injections.write();
        injections.retain(|(key, _)| key != name);
        injections.push((name.to_string(), object));
    }

    pub fn injections(&self) -> Vec<(String, Injected)> {
        self.injections.read().clone()
    }

    pub fn pending_inits(&self) -> usize {
        self.pending_inits.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.controllers.lock().len()
    }


    /// Returns false when the controller was already registered.
    pub(crate) fn insert(&self, controller: &Arc<dyn Controller>) -> bool {
        let key = identity(controller);
        let mut controllers = self.controllers.lock();
        if controllers.iter().any(|c| identity(c) == key) {
            return false;
        }
        controllers.push(Arc::clone(controller));
        true
    }

    /// Runs the controller's initializer. Asynchronous initializers keep
    /// the pending count raised until they settle.
    pub(crate) fn start_init(&self, controller: Arc<dyn Controller>, watchdog: Watchdog) {
        let label = controller.label();
        let Some(init) = controller.initializer() else {
            return;
        };

        self.pending_inits.fetch_add(1, Ordering::SeqCst);
        match init {
            Handler::Sync(f) => {
                if let Err(err) = f(()) {
                    error!(controller = %label, error = %err, "nav: controller init failed");
                }
                self.pending_inits.fetch_sub(1, Ordering::SeqCst);
            }
            Handler::Async(f) => {
                let (completion, settled) = Completion::channel();
                let pending = Arc::clone(&self.pending_inits);
                f((), completion);
                tokio::spawn(async move {
                    match watchdog.supervise(&label, settled).await {
                        Settled::Completed(Ok(())) => {
                            debug!(controller = %label, "nav: controller initialized");
                        }
                        Settled::Completed(Err(err)) => {
                            error!(controller = %label, error = %err, "nav: controller init failed");
                        }
                        Settled::Abandoned => {
                            warn!(controller = %label, "nav: controller init dropped its completion");
                        }
                    }
                    pending.fetch_sub(1, Ordering::SeqCst);
                });
            }
        }
    }
}

fn identity(controller: &Arc<dyn Controller>) -> *const () {
    Arc::as_ptr(controller) as *const ()
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
