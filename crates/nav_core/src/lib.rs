use std::{
    any::Any,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use shared::protocol::{RouteChange, RouteSnapshot};
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, info, warn};

pub mod config;
pub mod diff;
pub mod error;
pub mod event_bus;
pub mod handler;
pub mod position;
pub mod registry;
pub mod route_table;
pub mod url_codec;

pub use config::{load_settings, NavigatorOptions, Settings};
pub use diff::NavigationDiff;
pub use error::{ErrorSink, NavigationError, TracingErrorSink};
pub use event_bus::{Event, EventBus, ListenerId};
pub use handler::{Completion, Handler, Settled, Watchdog};
pub use position::{MemoryPositionStore, PositionStore};
pub use registry::{Controller, ControllerContext, ControllerRegistry};
pub use route_table::{LifecycleHandlers, LifecyclePhase, ResolvedRoute, Route, RouteTable};
pub use shared::domain::DataMode;
pub use url_codec::{Segment, UrlCodec};

use route_table::snapshots;

pub const ROUTE_CHANGED: &str = "routeChanged";

/// Where to go next, relative to the current position.
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    /// Re-run the current position.
    Current,
    /// Drop the last segment (`..`).
    Parent,
    /// Append segments, or replace the position when the first route is
    /// written `/name`.
    Segments(Vec<Segment>),
}

impl Destination {
    pub fn route(name: impl Into<String>) -> Self {
        Self::Segments(vec![Segment::new(name)])
    }

    pub fn absolute(name: &str) -> Self {
        Self::route(format!("/{}", name.trim_start_matches('/')))
    }

    /// Sets the data of the last segment.
    pub fn with_data(self, data: Value) -> Self {
        self.map_last(|segment| segment.with_data(data))
    }

    pub fn with_mode(self, mode: DataMode) -> Self {
        self.map_last(|segment| segment.with_mode(mode))
    }

    fn map_last(self, f: impl FnOnce(Segment) -> Segment) -> Self {
        match self {
            Self::Segments(mut segments) => {
                if let Some(last) = segments.pop() {
                    segments.push(f(last));
                }
                Self::Segments(segments)
            }
            other => other,
        }
    }
}

impl From<&str> for Destination {
    fn from(value: &str) -> Self {
        match value {
            ".." => Self::Parent,
            route => Self::route(route),
        }
    }
}

impl From<String> for Destination {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<Segment> for Destination {
    fn from(value: Segment) -> Self {
        Self::Segments(vec![value])
    }
}

impl From<Vec<Segment>> for Destination {
    fn from(value: Vec<Segment>) -> Self {
        Self::Segments(value)
    }
}

/// What a route is bound to.
pub enum RouteTarget {
    Controller(Arc<dyn Controller>),
    Handlers(LifecycleHandlers),
}

impl From<LifecycleHandlers> for RouteTarget {
    fn from(value: LifecycleHandlers) -> Self {
        Self::Handlers(value)
    }
}

impl<C: Controller> From<Arc<C>> for RouteTarget {
    fn from(value: Arc<C>) -> Self {
        Self::Controller(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Completed(RouteChange),
    /// Controllers are still initializing; the transition runs once they are done.
    Deferred,
    /// An interceptor dropped its completion.
    Halted,
    /// The position resolved to no registered route.
    NoRoute,
}

impl TransitionOutcome {
    pub fn change(&self) -> Option<&RouteChange> {
        match self {
            Self::Completed(change) => Some(change),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    AwaitingInit,
    Transitioning,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suspension {
    None,
    /// Suspended on a route with an empty name.
    Unnamed,
    Route(String),
}

/// Arguments of an interceptor.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptContext {
    pub position: String,
    /// Route matched by the interceptor scope, or the new top for global ones.
    pub route: String,
    pub data: Value,
    pub routes: Vec<RouteSnapshot>,
}

#[derive(Clone)]
struct Interceptor {
    scope: String,
    handler: Handler<InterceptContext>,
}

struct SuspendedState {
    route: Arc<Route>,
    data: Value,
    resume_to: Option<String>,
}

#[derive(Default)]
struct EngineMemory {
    position: Option<String>,
    routes: Vec<ResolvedRoute>,
    suspension: Option<SuspendedState>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Routing state machine: maps positions to route stacks and drives the
/// lifecycle handlers of the routes entering and leaving.
pub struct Navigator {
    options: NavigatorOptions,
    codec: UrlCodec,
    table: RouteTable,
    registry: ControllerRegistry,
    store: Arc<dyn PositionStore>,
    interceptors: RwLock<Vec<Interceptor>>,
    memory: Mutex<EngineMemory>,
    events: EventBus<RouteChange>,
    error_sink: RwLock<Arc<dyn ErrorSink>>,
    watchdog: Watchdog,
    in_flight: AtomicUsize,
    retry_scheduled: AtomicBool,
}

impl Navigator {
    pub fn new(store: Arc<dyn PositionStore>) -> Arc<Self> {
        Self::with_options(store, NavigatorOptions::default())
    }

    pub fn with_options(store: Arc<dyn PositionStore>, options: NavigatorOptions) -> Arc<Self> {
        let watchdog = Watchdog::new(options.watchdog);
        Arc::new(Self {
            codec: UrlCodec::new(options.data_mode),
            table: RouteTable::new(),
            registry: ControllerRegistry::new(),
            store,
            interceptors: RwLock::new(Vec::new()),
            memory: Mutex::new(EngineMemory::default()),
            events: EventBus::with_watchdog(watchdog.clone()),
            error_sink: RwLock::new(Arc::new(TracingErrorSink)),
            watchdog,
            in_flight: AtomicUsize::new(0),
            retry_scheduled: AtomicBool::new(false),
            options,
        })
    }

    pub fn options(&self) -> &NavigatorOptions {
        &self.options
    }

    /// `routeChanged` notifications.
    pub fn events(&self) -> &EventBus<RouteChange> {
        &self.events
    }

    pub fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    pub fn slow_callbacks(&self) -> u64 {
        self.watchdog.slow_callbacks()
    }

    pub fn set_error_sink(&self, sink: Arc<dyn ErrorSink>) {
        *self.error_sink.write() = sink;
    }

    /// Makes `object` available to controllers registered from now on.
    pub fn inject<T: Any + Send + Sync>(&self, name: &str, object: Arc<T>) {
        self.registry.inject(name, object);
    }

    pub fn state(&self) -> EngineState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            EngineState::Transitioning
        } else if self.registry.pending_inits() > 0 {
            EngineState::AwaitingInit
        } else if self.memory.lock().suspension.is_some() {
            EngineState::Suspended
        } else {
            EngineState::Idle
        }
    }

    pub fn position(&self) -> String {
        UrlCodec::normalize(&self.store.read())
    }

    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.table.all()
    }

    pub fn route(&self, name: &str) -> Option<Arc<Route>> {
        self.table.find(name)
    }

    /// Routes of the last transition, bottom first.
    pub fn active_routes(&self) -> Vec<RouteSnapshot> {
        snapshots(&self.memory.lock().routes)
    }

    pub fn is_suspended(&self) -> Suspension {
        match &self.memory.lock().suspension {
            None => Suspension::None,
            Some(suspended) if suspended.route.pattern().is_empty() => Suspension::Unnamed,
            Some(suspended) => Suspension::Route(suspended.route.pattern().to_string()),
        }
    }

    /// Interceptors run before routes are entered. An empty scope matches
    /// every transition, otherwise the scope must be among the new routes.
    pub fn add_interceptor(&self, scope: &str, handler: Handler<InterceptContext>) {
        self.interceptors.write().push(Interceptor {
            scope: scope.to_string(),
            handler,
        });
    }

    pub fn add_route(
        self: &Arc<Self>,
        pattern: &str,
        target: impl Into<RouteTarget>,
        default_data: Option<Value>,
    ) -> Result<Arc<Route>, NavigationError> {
        let handlers = self.lifecycle_for(target.into());
        let route = self.table.insert(Route::new(pattern, handlers, default_data)?);
        debug!(route = pattern, "nav: route added");
        Ok(route)
    }

    /// Registers a controller once; later calls with the same instance are
    /// no-ops.
    pub fn register_controller(self: &Arc<Self>, controller: Arc<dyn Controller>) -> Arc<dyn Controller> {
        if !self.registry.insert(&controller) {
            return controller;
        }
        let context = ControllerContext::new(Arc::downgrade(self), self.registry.injections());
        controller.attach(context);
        debug!(controller = %controller.label(), "nav: controller registered");
        self.registry
            .start_init(Arc::clone(&controller), self.watchdog.clone());
        controller
    }

    fn lifecycle_for(self: &Arc<Self>, target: RouteTarget) -> LifecycleHandlers {
        match target {
            RouteTarget::Handlers(handlers) => handlers,
            RouteTarget::Controller(controller) => {
                let controller = self.register_controller(controller);
                controller.lifecycle()
            }
        }
    }

    pub async fn navigate(
        self: &Arc<Self>,
        destination: impl Into<Destination>,
    ) -> Result<TransitionOutcome, NavigationError> {
        let current = self.position();
        let path = match destination.into() {
            Destination::Current => return self.on_navigate().await,
            Destination::Parent => UrlCodec::parent(&current),
            Destination::Segments(segments) if segments.is_empty() => {
                return self.on_navigate().await
            }
            Destination::Segments(segments) => {
                self.codec.encode_destination(&self.table, &current, &segments)
            }
        };
        self.go_to(path, &current).await
    }

    async fn go_to(
        self: &Arc<Self>,
        path: String,
        current: &str,
    ) -> Result<TransitionOutcome, NavigationError> {
        let path = UrlCodec::normalize(&path);
        if path == current {
            debug!(position = %path, "nav: already there, re-running current routes");
        } else {
            self.store.write(&path);
        }
        self.on_navigate().await
    }

    /// Rewrites the data of `route` in the current position and navigates
    /// to the result.
    pub async fn update_route_data(
        self: &Arc<Self>,
        route: &str,
        data: Value,
    ) -> Result<TransitionOutcome, NavigationError> {
        let current = self.position();
        let path = self
            .codec
            .rewrite_route_data(&current, &self.table, route, &data)?;
        self.go_to(path, &current).await
    }

    /// Forces every transition to `route` until resumed. Without a target
    /// the registered route of that name is used.
    pub async fn suspend_navigation(
        self: &Arc<Self>,
        route: &str,
        target: Option<RouteTarget>,
        data: Option<Value>,
    ) -> Result<TransitionOutcome, NavigationError> {
        let forced = match target {
            None => self
                .table
                .find(route)
                .ok_or_else(|| NavigationError::UnknownRoute(route.to_string()))?,
            Some(target) => {
                let handlers = self.lifecycle_for(target);
                Arc::new(Route::new(route, handlers, None)?)
            }
        };

        {
            let mut memory = self.memory.lock();
            let resume_to = match &memory.suspension {
                Some(existing) => existing.resume_to.clone(),
                None => memory.position.clone(),
            };
            let data = data.unwrap_or_else(|| forced.fallback_data());
            memory.suspension = Some(SuspendedState {
                route: forced,
                data,
                resume_to,
            });
        }
        info!(route, "nav: navigation suspended");
        self.on_navigate().await
    }

    /// Leaves the forced route and goes back to where navigation was
    /// suspended, or to `default` when nothing was saved.
    pub async fn resume_navigation(
        self: &Arc<Self>,
        default: Option<Destination>,
    ) -> Result<TransitionOutcome, NavigationError> {
        let suspended = self
            .memory
            .lock()
            .suspension
            .as_ref()
            .map(|s| (Arc::clone(&s.route), s.data.clone(), s.resume_to.clone()));

        let resume_to = match suspended {
            None => None,
            Some((route, data, resume_to)) => {
                let forced = ResolvedRoute {
                    route,
                    data,
                    source_index: 0,
                };
                if let Err(err) = self.leave_routes(std::slice::from_ref(&forced)).await {
                    self.report(&err);
                    return Err(err);
                }
                let mut memory = self.memory.lock();
                memory.suspension = None;
                memory.routes.clear();
                memory.position = None;
                info!(route = forced.name(), "nav: navigation resumed");
                resume_to
            }
        };

        match (resume_to.filter(|position| !position.is_empty()), default) {
            (Some(position), _) => {
                let current = self.position();
                self.go_to(position, &current).await
            }
            (None, Some(destination)) => self.navigate(destination).await,
            (None, None) => self.on_navigate().await,
        }
    }

    /// Reacts to external position changes until the navigator is dropped.
    pub fn spawn_position_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.store.subscribe();
        let navigator = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(position) => {
                        let Some(navigator) = navigator.upgrade() else {
                            break;
                        };
                        debug!(position = %position, "nav: external position change");
                        // failures already went to the error sink
                        let _ = navigator.on_navigate().await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "nav: position listener lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Runs the transition from the remembered routes to the ones of the
    /// current position.
    pub async fn on_navigate(self: &Arc<Self>) -> Result<TransitionOutcome, NavigationError> {
        if self.registry.pending_inits() > 0 {
            self.defer_until_initialized();
            return Ok(TransitionOutcome::Deferred);
        }
        let _in_flight = InFlight::enter(&self.in_flight);

        let position = self.position();
        let (current, suspended) = match self.resolve(&position) {
            Ok(resolved) => resolved,
            Err(err) => {
                self.report(&err);
                return Err(err);
            }
        };

        if current.is_empty() {
            warn!(position = %position, "nav: no route found");
            if !position.is_empty() {
                self.report(&NavigationError::NoRouteFound { position });
            }
            return Ok(TransitionOutcome::NoRoute);
        }

        let interceptors = if suspended {
            Vec::new()
        } else {
            self.interceptors_for(&current)
        };

        let previous = {
            let mut memory = self.memory.lock();
            memory.position = (!suspended).then(|| position.clone());
            std::mem::replace(&mut memory.routes, current.clone())
        };

        let diff = NavigationDiff::compute(&previous, &current);
        debug!(
            position = %position,
            removed = diff.removed.len(),
            added = diff.added.len(),
            stacked = diff.stacked.len(),
            unstacked = diff.unstacked.len(),
            modified = diff.modified.len(),
            "nav: transition planned"
        );

        match self.run_phases(&position, &current, &diff, interceptors).await {
            Ok(true) => {}
            Ok(false) => return Ok(TransitionOutcome::Halted),
            Err(err) => {
                self.report(&err);
                return Err(err);
            }
        }

        let change = diff.to_change(&previous, &current);
        if let Err(err) = self.events.emit(ROUTE_CHANGED, change.clone()).await {
            warn!(error = %err, "nav: routeChanged listener failed");
        }
        Ok(TransitionOutcome::Completed(change))
    }

    /// Schedules one retry for however many navigations arrive while
    /// controllers initialize.
    fn defer_until_initialized(self: &Arc<Self>) {
        if self.retry_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(
            pending = self.registry.pending_inits(),
            "nav: controllers still initializing, deferring navigation"
        );
        let navigator = Arc::clone(self);
        let poll = self.options.init_poll_interval;
        tokio::spawn(async move {
            while navigator.registry.pending_inits() > 0 {
                tokio::time::sleep(poll).await;
            }
            navigator.retry_scheduled.store(false, Ordering::SeqCst);
            let _ = navigator.on_navigate().await;
        });
    }

    fn resolve(&self, position: &str) -> Result<(Vec<ResolvedRoute>, bool), NavigationError> {
        if let Some(suspended) = &self.memory.lock().suspension {
            let forced = ResolvedRoute {
                route: Arc::clone(&suspended.route),
                data: suspended.data.clone(),
                source_index: 0,
            };
            return Ok((vec![forced], true));
        }
        Ok((self.codec.decode(position, &self.table)?, false))
    }

    fn interceptors_for(&self, routes: &[ResolvedRoute]) -> Vec<Interceptor> {
        self.interceptors
            .read()
            .iter()
            .filter(|i| i.scope.is_empty() || routes.iter().any(|r| r.name() == i.scope))
            .cloned()
            .collect()
    }

    /// Returns false when an interceptor halted the transition.
    async fn run_phases(
        &self,
        position: &str,
        current: &[ResolvedRoute],
        diff: &NavigationDiff,
        interceptors: Vec<Interceptor>,
    ) -> Result<bool, NavigationError> {
        self.leave_routes(&diff.removed).await?;

        if !self.run_interceptors(position, current, interceptors).await? {
            return Ok(false);
        }

        let mut to_stack = diff.stacked.clone();
        for route in &diff.added {
            route.route.set_active(true);
            let handlers = route.route.handlers();
            self.invoke(route, LifecyclePhase::Enter, handlers.on_enter.as_ref(), route.data.clone())
                .await?;
            if let Some(idx) = to_stack.iter().position(|s| s.name() == route.name()) {
                let stacked = to_stack.remove(idx);
                self.invoke(&stacked, LifecyclePhase::Stack, handlers.on_stack.as_ref(), ())
                    .await?;
            }
        }

        for route in &to_stack {
            if !route.route.is_active() {
                debug!(route = route.name(), "nav: skipping stack of inactive route");
                continue;
            }
            let handler = route.route.handlers().on_stack.as_ref();
            self.invoke(route, LifecyclePhase::Stack, handler, ()).await?;
        }

        for route in &diff.unstacked {
            if !route.route.is_active() {
                continue;
            }
            let handler = route.route.handlers().on_unstack.as_ref();
            self.invoke(route, LifecyclePhase::Unstack, handler, route.data.clone())
                .await?;
        }

        for route in &diff.modified {
            if !route.route.is_active() {
                continue;
            }
            let handler = route.route.handlers().on_modify.as_ref();
            self.invoke(route, LifecyclePhase::Modify, handler, route.data.clone())
                .await?;
        }

        Ok(true)
    }

    /// Leave handlers only run for routes that were entered.
    async fn leave_routes(&self, routes: &[ResolvedRoute]) -> Result<(), NavigationError> {
        for route in routes {
            if !route.route.set_active(false) {
                debug!(route = route.name(), "nav: skipping leave of never-entered route");
                continue;
            }
            let handler = route.route.handlers().on_leave.as_ref();
            self.invoke(route, LifecyclePhase::Leave, handler, ()).await?;
        }
        Ok(())
    }

    async fn run_interceptors(
        &self,
        position: &str,
        current: &[ResolvedRoute],
        interceptors: Vec<Interceptor>,
    ) -> Result<bool, NavigationError> {
        if interceptors.is_empty() {
            return Ok(true);
        }
        let routes = snapshots(current);

        for interceptor in interceptors {
            let target = if interceptor.scope.is_empty() {
                current.last()
            } else {
                current.iter().find(|r| r.name() == interceptor.scope)
            };
            let (route, data) = target
                .map(|r| (r.name().to_string(), r.data.clone()))
                .unwrap_or_default();
            let context = InterceptContext {
                position: position.to_string(),
                route,
                data,
                routes: routes.clone(),
            };
            let label = format!("interceptor '{}'", interceptor.scope);

            match interceptor.handler.invoke(context, &self.watchdog, &label).await {
                Settled::Completed(Ok(())) => {}
                Settled::Completed(Err(err)) => {
                    return Err(NavigationError::Interceptor {
                        scope: interceptor.scope,
                        message: format!("{err:#}"),
                    });
                }
                Settled::Abandoned => {
                    info!(scope = %interceptor.scope, position, "nav: interceptor halted navigation");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    async fn invoke<A: Send + 'static>(
        &self,
        route: &ResolvedRoute,
        phase: LifecyclePhase,
        handler: Option<&Handler<A>>,
        arg: A,
    ) -> Result<(), NavigationError> {
        let Some(handler) = handler else {
            return Ok(());
        };
        let label = format!("route '{}' {phase}", route.name());
        debug!(route = route.name(), phase = %phase, "nav: running lifecycle handler");

        let failure = match handler.invoke(arg, &self.watchdog, &label).await {
            Settled::Completed(Ok(())) => return Ok(()),
            Settled::Completed(Err(err)) => format!("{err:#}"),
            Settled::Abandoned => "completion dropped before being called".to_string(),
        };
        Err(NavigationError::Lifecycle {
            route: route.name().to_string(),
            phase,
            message: failure,
        })
    }

    fn report(&self, err: &NavigationError) {
        let sink = Arc::clone(&*self.error_sink.read());
        sink.report(err);
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
