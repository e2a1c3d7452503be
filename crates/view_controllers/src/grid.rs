use std::sync::{Arc, Weak};

use anyhow::Result;
use async_trait::async_trait;
use nav_core::{Controller, ControllerContext, Event, Handler, LifecycleHandlers};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use shared::domain::JoinSpec;
use tracing::{debug, warn};

use crate::{
    records,
    view::View,
    view_controller::{view_initializer, view_lifecycle, ViewBehavior, ViewController, ViewOptions},
};

/// A toggleable search condition shown above the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridFilter {
    pub name: String,
    pub label: String,
    pub search_field: String,
    pub search_value: Value,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GridOptions {
    pub view: ViewOptions,
    pub join_fetch: Vec<JoinSpec>,
    /// Defaults to the table's primary key columns.
    pub order_by: Option<String>,
    pub filters: Vec<GridFilter>,
    pub can_create: bool,
    pub can_refresh: bool,
    pub can_import: bool,
}

impl GridOptions {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            view: ViewOptions::new(route),
            ..Self::default()
        }
    }
}

/// Lists the records of a table matching the active filters.
pub struct GridController {
    table: String,
    base: ViewController,
    join_fetch: Vec<JoinSpec>,
    order_by: Option<String>,
    can_create: bool,
    can_refresh: bool,
    can_import: bool,
    filters: Mutex<Vec<GridFilter>>,
}

impl GridController {
    pub fn new(table: impl Into<String>, view: Arc<dyn View>, options: GridOptions) -> Arc<Self> {
        Arc::new(Self {
            table: table.into(),
            base: ViewController::new(view, options.view),
            join_fetch: options.join_fetch,
            order_by: options.order_by,
            can_create: options.can_create,
            can_refresh: options.can_refresh,
            can_import: options.can_import,
            filters: Mutex::new(options.filters),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn view(&self) -> &Arc<dyn View> {
        self.base.view()
    }

    pub fn filters(&self) -> Vec<GridFilter> {
        self.filters.lock().clone()
    }

    /// Returns false when no filter has that name.
    pub fn set_filter_active(&self, name: &str, active: bool) -> bool {
        let mut filters = self.filters.lock();
        match filters.iter_mut().find(|f| f.name == name) {
            Some(filter) => {
                filter.active = active;
                true
            }
            None => false,
        }
    }

    /// Search criteria from the active filters. Filters on the same field
    /// are merged into a list of accepted values.
    pub fn create_search(&self) -> Value {
        let mut search = Map::new();
        for filter in self.filters.lock().iter().filter(|f| f.active) {
            let value = filter.search_value.clone();
            match search.remove(&filter.search_field) {
                None => {
                    search.insert(filter.search_field.clone(), value);
                }
                Some(existing) => {
                    let mut merged = match existing {
                        Value::Array(values) => values,
                        other => vec![other],
                    };
                    match value {
                        Value::Array(values) => merged.extend(values),
                        other => merged.push(other),
                    }
                    search.insert(filter.search_field.clone(), Value::Array(merged));
                }
            }
        }
        Value::Object(search)
    }

    pub async fn search_records(&self) -> Result<Vec<Value>> {
        let database = self.base.require_database("search")?;
        let schema = database.schema().await?;
        let order_by = match &self.order_by {
            Some(order_by) => order_by.clone(),
            None => records::pk_columns(&schema, &self.table).join(","),
        };
        let criteria = self.create_search();
        let results = database
            .search(&self.table, &criteria, &self.join_fetch, &order_by)
            .await?;
        debug!(table = %self.table, count = results.len(), "grid: records searched");
        Ok(results)
    }

    /// Grid toolbar flags as the view expects them.
    pub fn toolbar(&self) -> Value {
        json!({
            "canCreate": self.can_create,
            "canRefresh": self.can_refresh,
            "canImport": self.can_import,
        })
    }

    /// `filterChanged` and `refresh` from the view search again.
    fn bind_view_events(self: &Arc<Self>) {
        for event in ["filterChanged", "refresh"] {
            let grid = Arc::downgrade(self);
            let listener = Handler::task(move |_: Event<Value>| {
                let grid = Weak::clone(&grid);
                async move {
                    let Some(grid) = grid.upgrade() else {
                        return Ok(());
                    };
                    if let Err(err) = grid.refresh(None).await {
                        warn!(table = %grid.table, error = %err, "grid: refresh failed");
                        grid.view().show_error(&err.to_string());
                    }
                    Ok::<_, anyhow::Error>(())
                }
            });
            self.view().events().on(event, listener);
        }
    }
}

#[async_trait]
impl ViewBehavior for GridController {
    fn base(&self) -> &ViewController {
        &self.base
    }

    async fn prepare_data(&self, _data: Option<Value>) -> Result<Value> {
        let results = self.search_records().await?;
        Ok(json!({ "results": results, "toolbar": self.toolbar() }))
    }

    /// Records may have changed while the grid was stacked.
    async fn unstack(&self, data: Option<Value>) -> Result<()> {
        self.base.events().emit("beforeUnstack", Value::Null).await?;
        self.refresh(data).await?;
        self.base.unstack();
        self.base.events().emit("unstack", Value::Null).await
    }
}

impl Controller for GridController {
    fn label(&self) -> String {
        format!("grid {}", self.table)
    }

    fn attach(&self, context: ControllerContext) {
        self.base.attach(context);
    }

    fn initializer(self: Arc<Self>) -> Option<Handler<()>> {
        self.bind_view_events();
        view_initializer(self)
    }

    fn lifecycle(self: Arc<Self>) -> LifecycleHandlers {
        view_lifecycle(&self)
    }
}

#[cfg(test)]
#[path = "tests/grid_tests.rs"]
mod tests;
