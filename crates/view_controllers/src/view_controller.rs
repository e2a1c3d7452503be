use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use nav_core::{
    Controller, ControllerContext, Destination, EventBus, Handler, LifecycleHandlers, ListenerId,
    NavigationError, TransitionOutcome,
};
use parking_lot::Mutex;
use serde_json::Value;
use shared::{domain::Schema, error::CapabilityError};
use tracing::{debug, warn};

use crate::{
    database::{DatabaseApi, DatabaseHandle, DATABASE_INJECTION},
    view::View,
};

#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    pub route: String,
    /// Keep the controller out of the route table; something else drives it.
    pub no_routing: bool,
    pub open_in_popup: bool,
    /// Rendered when entering without data; forms start new records from it.
    pub default_data: Option<Value>,
}

impl ViewOptions {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct ViewState {
    data: Value,
    last_enter: Option<Value>,
    opened: bool,
    popup_close: Option<ListenerId>,
}

/// Binds a [`View`] to a route: enter opens it, leave closes it, stacking
/// hides it.
pub struct ViewController {
    view: Arc<dyn View>,
    options: ViewOptions,
    events: EventBus<Value>,
    context: OnceLock<ControllerContext>,
    state: Mutex<ViewState>,
}

impl ViewController {
    pub fn new(view: Arc<dyn View>, options: ViewOptions) -> Self {
        let data = options
            .default_data
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()));
        Self {
            view,
            options,
            events: EventBus::default(),
            context: OnceLock::new(),
            state: Mutex::new(ViewState {
                data,
                ..ViewState::default()
            }),
        }
    }

    pub fn view(&self) -> &Arc<dyn View> {
        &self.view
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    pub fn route(&self) -> &str {
        &self.options.route
    }

    /// Controller events: `beforeEnter`, `enter`, `beforeLeave`, `leave`,
    /// `beforeRefresh`, `refresh`, `initView`.
    pub fn events(&self) -> &EventBus<Value> {
        &self.events
    }

    pub fn attach(&self, context: ControllerContext) {
        if self.context.set(context).is_err() {
            warn!(route = %self.route(), "view: controller attached twice");
        }
    }

    pub fn context(&self) -> Result<&ControllerContext> {
        Ok(self.context.get().ok_or(NavigationError::Detached)?)
    }

    /// Data rendered by the last enter or refresh.
    pub fn data(&self) -> Value {
        self.state.lock().data.clone()
    }

    pub fn database(&self) -> Option<Arc<dyn DatabaseApi>> {
        self.context
            .get()?
            .injected::<DatabaseHandle>(DATABASE_INJECTION)
            .map(|handle| Arc::clone(&handle.0))
    }

    pub fn require_database(&self, operation: &'static str) -> Result<Arc<dyn DatabaseApi>> {
        self.database()
            .ok_or_else(|| CapabilityError::DatabaseUnavailable { operation }.into())
    }

    /// Empty without a database.
    pub async fn schema(&self) -> Result<Schema> {
        match self.database() {
            Some(database) => database.schema().await,
            None => Ok(Schema::default()),
        }
    }

    pub async fn navigate(&self, destination: impl Into<Destination>) -> Result<TransitionOutcome> {
        Ok(self.context()?.navigate(destination).await?)
    }

    pub async fn update_route_data(&self, data: Value) -> Result<TransitionOutcome> {
        Ok(self.context()?.update_route_data(self.route(), data).await?)
    }

    /// True when this controller's route is the top of the active stack.
    pub fn is_on_top(&self) -> bool {
        self.context.get().is_some_and(|context| {
            context
                .active_routes()
                .last()
                .is_some_and(|top| top.route == self.route())
        })
    }

    pub async fn enter_with<B>(&self, behavior: &B, data: Option<Value>) -> Result<()>
    where
        B: ViewBehavior + ?Sized,
    {
        self.state.lock().last_enter = data.clone();
        self.view
            .long_tasks()
            .run(async {
                self.events
                    .emit("beforeEnter", data.clone().unwrap_or(Value::Null))
                    .await?;
                let prepared = behavior.prepare_data(data).await?;
                let opened = {
                    let mut state = self.state.lock();
                    if !prepared.is_null() {
                        state.data = prepared.clone();
                    }
                    std::mem::replace(&mut state.opened, true)
                };

                if self.options.open_in_popup {
                    if !opened {
                        self.view.open_in_popup(&prepared).await?;
                        self.watch_popup_close();
                    }
                    self.view.render(&prepared);
                } else if opened {
                    self.view.render(&prepared);
                } else {
                    self.view.open(&prepared).await?;
                }
                debug!(route = %self.route(), "view: entered");
                self.events.emit("enter", prepared).await
            })
            .await
    }

    /// Closing the popup goes back to the parent position when this route
    /// is still on top.
    fn watch_popup_close(&self) {
        let Some(context) = self.context.get().cloned() else {
            return;
        };
        let route = self.route().to_string();
        let id = self.view.events().once(
            "close",
            Handler::task(move |_| {
                let context = context.clone();
                let route = route.clone();
                async move {
                    let on_top = context
                        .active_routes()
                        .last()
                        .is_some_and(|top| top.route == route);
                    if on_top {
                        context.navigate(Destination::Parent).await?;
                    }
                    Ok::<_, anyhow::Error>(())
                }
            }),
        );
        self.state.lock().popup_close = Some(id);
    }

    pub async fn leave(&self) -> Result<()> {
        self.events.emit("beforeLeave", Value::Null).await?;
        let popup_close = {
            let mut state = self.state.lock();
            state.opened = false;
            state.popup_close.take()
        };
        if let Some(id) = popup_close {
            self.view.events().off("close", id);
        }
        self.view.close();
        debug!(route = %self.route(), "view: left");
        self.events.emit("leave", Value::Null).await
    }

    pub fn stack(&self) {
        self.view.hide();
    }

    pub fn unstack(&self) {
        self.view.show();
    }

    /// Prepares and renders again, with the data of the last enter when
    /// none is given.
    pub async fn refresh_with<B>(&self, behavior: &B, data: Option<Value>) -> Result<()>
    where
        B: ViewBehavior + ?Sized,
    {
        let data = data.or_else(|| self.state.lock().last_enter.clone());
        self.view
            .long_tasks()
            .run(async {
                self.events.emit("beforeRefresh", Value::Null).await?;
                let prepared = behavior.prepare_data(data).await?;
                if !prepared.is_null() {
                    self.state.lock().data = prepared.clone();
                }
                self.view.render(&prepared);
                self.events.emit("refresh", Value::Null).await
            })
            .await
    }
}

/// Route lifecycle of a view-backed controller. Implementors override the
/// steps they customize and delegate the rest to [`ViewController`].
#[async_trait]
pub trait ViewBehavior: Send + Sync + 'static {
    fn base(&self) -> &ViewController;

    /// Turns route data into the data the view renders.
    async fn prepare_data(&self, data: Option<Value>) -> Result<Value> {
        Ok(data.unwrap_or_else(|| self.base().data()))
    }

    async fn enter(&self, data: Option<Value>) -> Result<()> {
        self.base().enter_with(self, data).await
    }

    async fn leave(&self) -> Result<()> {
        self.base().leave().await
    }

    async fn stack(&self) -> Result<()> {
        self.base().stack();
        Ok(())
    }

    async fn unstack(&self, _data: Option<Value>) -> Result<()> {
        self.base().unstack();
        Ok(())
    }

    async fn modify(&self, data: Option<Value>) -> Result<()> {
        self.enter(data).await
    }

    async fn refresh(&self, data: Option<Value>) -> Result<()> {
        self.base().refresh_with(self, data).await
    }
}

impl ViewBehavior for ViewController {
    fn base(&self) -> &ViewController {
        self
    }
}

impl Controller for ViewController {
    fn label(&self) -> String {
        format!("view {}", self.route())
    }

    fn attach(&self, context: ControllerContext) {
        ViewController::attach(self, context);
    }

    fn initializer(self: Arc<Self>) -> Option<Handler<()>> {
        view_initializer(self)
    }

    fn lifecycle(self: Arc<Self>) -> LifecycleHandlers {
        view_lifecycle(&self)
    }
}

fn non_null(data: Value) -> Option<Value> {
    (!data.is_null()).then_some(data)
}

/// Lifecycle handlers driving `behavior` from route transitions.
pub fn view_lifecycle<B: ViewBehavior>(behavior: &Arc<B>) -> LifecycleHandlers {
    let enter = Arc::clone(behavior);
    let leave = Arc::clone(behavior);
    let stack = Arc::clone(behavior);
    let unstack = Arc::clone(behavior);
    let modify = Arc::clone(behavior);
    LifecycleHandlers::new()
        .enter(Handler::task(move |data: Value| {
            let behavior = Arc::clone(&enter);
            async move { behavior.enter(non_null(data)).await }
        }))
        .leave(Handler::task(move |_| {
            let behavior = Arc::clone(&leave);
            async move { behavior.leave().await }
        }))
        .stack(Handler::task(move |_| {
            let behavior = Arc::clone(&stack);
            async move { behavior.stack().await }
        }))
        .unstack(Handler::task(move |data: Value| {
            let behavior = Arc::clone(&unstack);
            async move { behavior.unstack(non_null(data)).await }
        }))
        .modify(Handler::task(move |data: Value| {
            let behavior = Arc::clone(&modify);
            async move { behavior.modify(non_null(data)).await }
        }))
}

/// Adds the controller's route (unless routing is disabled) and emits
/// `initView`.
pub fn view_initializer<B>(controller: Arc<B>) -> Option<Handler<()>>
where
    B: ViewBehavior + Controller,
{
    Some(Handler::task(move |_| {
        let controller = Arc::clone(&controller);
        async move {
            let base = controller.base();
            if !base.options().no_routing {
                let route = base.route().to_string();
                base.context()?
                    .add_route(&route, Arc::clone(&controller), None)?;
            }
            base.events().emit("initView", Value::Null).await
        }
    }))
}

#[cfg(test)]
#[path = "tests/view_controller_tests.rs"]
mod tests;
