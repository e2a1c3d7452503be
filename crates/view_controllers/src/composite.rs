//! Ready-made pairings: a grid listing a table, the form opened from it and
//! optionally an importer.

use std::{
    future::Future,
    sync::{Arc, OnceLock},
};

use anyhow::Result;
use nav_core::{
    Controller, ControllerContext, DataMode, Destination, Event, Handler, LifecycleHandlers,
    NavigationError, Segment,
};
use serde_json::Value;
use shared::domain::JoinSpec;
use tracing::{debug, warn};

use crate::{
    database::{DatabaseHandle, DATABASE_INJECTION},
    form::{FormController, FormOptions},
    grid::{GridController, GridOptions},
    importer::ImporterController,
    view::View,
    view_controller::{view_lifecycle, ViewBehavior, ViewOptions},
};

#[derive(Debug, Clone, Default)]
pub struct GridAndFormOptions {
    pub grid: GridOptions,
    pub form: FormOptions,
    /// Applied to both grid and form when they have none of their own.
    pub join_fetch: Vec<JoinSpec>,
    pub no_routing: bool,
}

impl GridAndFormOptions {
    /// `<table>/list` and `<table>/form`, grid able to create and refresh.
    pub fn for_table(table: &str) -> Self {
        let mut grid = GridOptions::new(format!("{table}/list"));
        grid.can_create = true;
        grid.can_refresh = true;
        Self {
            grid,
            form: FormOptions::new(format!("{table}/form")),
            ..Self::default()
        }
    }
}

/// Grid of a table whose rows open in a form. The form's `back` returns
/// to the grid.
pub struct GridAndFormController {
    table: String,
    grid: Arc<GridController>,
    form: Arc<FormController>,
    context: OnceLock<ControllerContext>,
}

impl GridAndFormController {
    pub fn new(
        table: impl Into<String>,
        grid_view: Arc<dyn View>,
        form_view: Arc<dyn View>,
        mut options: GridAndFormOptions,
    ) -> Arc<Self> {
        let table = table.into();
        if options.grid.view.route.is_empty() {
            options.grid.view.route = format!("{table}/list");
        }
        if options.form.view.route.is_empty() {
            options.form.view.route = format!("{table}/form");
        }
        if options.no_routing {
            options.grid.view.no_routing = true;
            options.form.view.no_routing = true;
        }
        if !options.join_fetch.is_empty() {
            if options.grid.join_fetch.is_empty() {
                options.grid.join_fetch = options.join_fetch.clone();
            }
            if options.form.join_fetch.is_empty() {
                options.form.join_fetch = options.join_fetch;
            }
        }

        Arc::new(Self {
            grid: GridController::new(&table, grid_view, options.grid),
            form: FormController::new(&table, form_view, options.form),
            table,
            context: OnceLock::new(),
        })
    }

    pub fn grid(&self) -> &Arc<GridController> {
        &self.grid
    }

    pub fn form(&self) -> &Arc<FormController> {
        &self.form
    }

    pub fn grid_route(&self) -> &str {
        self.grid.base().route()
    }

    pub fn form_route(&self) -> &str {
        self.form.base().route()
    }

    fn context(&self) -> Result<&ControllerContext> {
        Ok(self.context.get().ok_or(NavigationError::Detached)?)
    }

    /// Opens `record` in the form: by primary key when a database is
    /// available, as anonymous data otherwise.
    pub async fn open_record(&self, record: Value) -> Result<()> {
        let database = self
            .context()?
            .injected::<DatabaseHandle>(DATABASE_INJECTION)
            .map(|handle| Arc::clone(&handle.0));
        let segment = match database {
            Some(database) => {
                let pk = self
                    .grid
                    .view()
                    .long_tasks()
                    .run(database.get_pk(&self.table, &record))
                    .await?;
                Segment::new(self.form_route()).with_data(pk)
            }
            None => Segment::new(self.form_route())
                .with_data(record)
                .with_mode(DataMode::Anonymous),
        };
        self.context()?.navigate(segment).await?;
        Ok(())
    }

    pub async fn create_new(&self) -> Result<()> {
        self.context()?
            .navigate(Destination::route(self.form_route()))
            .await?;
        Ok(())
    }

    pub async fn back_to_grid(&self) -> Result<()> {
        self.context()?.navigate(Destination::Parent).await?;
        Ok(())
    }
}

impl Controller for GridAndFormController {
    fn label(&self) -> String {
        format!("grid and form {}", self.table)
    }

    fn attach(&self, context: ControllerContext) {
        if self.context.set(context).is_err() {
            warn!(table = %self.table, "composite: controller attached twice");
        }
    }

    fn initializer(self: Arc<Self>) -> Option<Handler<()>> {
        Some(Handler::sync(move |_| {
            let context = self.context()?;
            context.register_controller(Arc::clone(&self.form) as Arc<dyn Controller>)?;
            context.register_controller(Arc::clone(&self.grid) as Arc<dyn Controller>)?;

            let grid_view = self.grid.view();
            on_view_event(grid_view, "rowClick", &self, |composite, record| async move {
                composite.open_record(record).await
            });
            on_view_event(grid_view, "createNew", &self, |composite, _| async move {
                composite.create_new().await
            });
            on_view_event(self.form.view(), "back", &self, |composite, _| async move {
                composite.back_to_grid().await
            });
            debug!(table = %self.table, "composite: grid and form wired");
            Ok(())
        }))
    }

    fn lifecycle(self: Arc<Self>) -> LifecycleHandlers {
        view_lifecycle(&self.grid)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GridFormImporterOptions {
    pub grid_and_form: GridAndFormOptions,
    pub importer: ViewOptions,
}

impl GridFormImporterOptions {
    /// Adds `<table>/importer`, opened in a popup, to the grid and form
    /// defaults.
    pub fn for_table(table: &str) -> Self {
        let mut grid_and_form = GridAndFormOptions::for_table(table);
        grid_and_form.grid.can_import = true;
        let mut importer = ViewOptions::new(format!("{table}/importer"));
        importer.open_in_popup = true;
        Self {
            grid_and_form,
            importer,
        }
    }
}

/// [`GridAndFormController`] whose grid can also open an importer.
pub struct GridFormImporterController {
    inner: Arc<GridAndFormController>,
    importer: Arc<ImporterController>,
    context: OnceLock<ControllerContext>,
}

impl GridFormImporterController {
    pub fn new(
        table: impl Into<String>,
        grid_view: Arc<dyn View>,
        form_view: Arc<dyn View>,
        importer_view: Arc<dyn View>,
        options: GridFormImporterOptions,
    ) -> Arc<Self> {
        let table = table.into();
        let mut importer = options.importer;
        if importer.route.is_empty() {
            importer.route = format!("{table}/importer");
        }
        if options.grid_and_form.no_routing {
            importer.no_routing = true;
        }
        Arc::new(Self {
            importer: ImporterController::new(&table, importer_view, importer),
            inner: GridAndFormController::new(table, grid_view, form_view, options.grid_and_form),
            context: OnceLock::new(),
        })
    }

    pub fn grid_and_form(&self) -> &Arc<GridAndFormController> {
        &self.inner
    }

    pub fn importer(&self) -> &Arc<ImporterController> {
        &self.importer
    }

    pub fn importer_route(&self) -> &str {
        self.importer.base().route()
    }

    fn context(&self) -> Result<&ControllerContext> {
        Ok(self.context.get().ok_or(NavigationError::Detached)?)
    }

    pub async fn open_importer(&self) -> Result<()> {
        self.context()?
            .navigate(Destination::route(self.importer_route()))
            .await?;
        Ok(())
    }

    pub async fn close_importer(&self) -> Result<()> {
        self.context()?.navigate(Destination::Parent).await?;
        Ok(())
    }
}

impl Controller for GridFormImporterController {
    fn label(&self) -> String {
        format!("grid form importer {}", self.inner.table)
    }

    fn attach(&self, context: ControllerContext) {
        if self.context.set(context).is_err() {
            warn!(table = %self.inner.table, "composite: controller attached twice");
        }
    }

    fn initializer(self: Arc<Self>) -> Option<Handler<()>> {
        Some(Handler::sync(move |_| {
            let context = self.context()?;
            context.register_controller(Arc::clone(&self.inner) as Arc<dyn Controller>)?;
            context.register_controller(Arc::clone(&self.importer) as Arc<dyn Controller>)?;

            on_view_event(self.inner.grid.view(), "import", &self, |composite, _| async move {
                composite.open_importer().await
            });
            for event in ["imported", "back"] {
                on_view_event(self.importer.view(), event, &self, |composite, _| async move {
                    composite.close_importer().await
                });
            }
            Ok(())
        }))
    }

    fn lifecycle(self: Arc<Self>) -> LifecycleHandlers {
        view_lifecycle(&self.inner.grid)
    }
}

/// Runs `action` on `owner` for each `event` of `view` while the owner is
/// alive. Failures are logged.
fn on_view_event<C, F, Fut>(view: &Arc<dyn View>, event: &'static str, owner: &Arc<C>, action: F)
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let owner = Arc::downgrade(owner);
    let listener = Handler::task(move |event_data: Event<Value>| {
        let work = owner.upgrade().map(|owner| action(owner, event_data.data));
        async move {
            if let Some(work) = work {
                if let Err(err) = work.await {
                    warn!(event, error = %err, "composite: view event failed");
                }
            }
            Ok::<_, anyhow::Error>(())
        }
    });
    view.events().on(event, listener);
}

#[cfg(test)]
#[path = "tests/composite_tests.rs"]
mod tests;
