use std::sync::{Arc, Weak};

use anyhow::Result;
use async_trait::async_trait;
use nav_core::{Controller, ControllerContext, Event, Handler, LifecycleHandlers};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::domain::{RecordChange, SavedRecord};
use tracing::{info, warn};

use crate::{
    records,
    view::View,
    view_controller::{view_initializer, view_lifecycle, ViewBehavior, ViewController, ViewOptions},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub table: String,
    pub imported: usize,
    pub saved: Vec<SavedRecord>,
}

/// Saves rows the view already parsed (`rows` in its data) into a table.
///
/// `btValidate` imports, `btBack` emits `back`; a successful import emits
/// `imported` with the report on the view bus.
pub struct ImporterController {
    table: String,
    base: ViewController,
}

impl ImporterController {
    pub fn new(table: impl Into<String>, view: Arc<dyn View>, options: ViewOptions) -> Arc<Self> {
        Arc::new(Self {
            table: table.into(),
            base: ViewController::new(view, options),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn view(&self) -> &Arc<dyn View> {
        self.base.view()
    }

    /// Fills auto-generated columns and saves every row in one transaction.
    pub async fn import_rows(&self, rows: Vec<Value>) -> Result<ImportReport> {
        let database = self.base.require_database("transactionalChanges")?;
        let schema = database.schema().await?;
        let mut changes = Vec::with_capacity(rows.len());
        for mut row in rows {
            records::prepare_record(&schema, &self.table, &mut row)?;
            changes.push(RecordChange::upsert(&self.table, row));
        }
        let imported = changes.len();
        let saved = if changes.is_empty() {
            Vec::new()
        } else {
            database.transactional_changes(changes).await?
        };
        info!(table = %self.table, imported, "importer: rows imported");
        Ok(ImportReport {
            table: self.table.clone(),
            imported,
            saved,
        })
    }

    pub async fn on_validate(&self) -> Result<()> {
        let rows = match self.view().read_data().get("rows") {
            Some(Value::Array(rows)) => rows.clone(),
            _ => Vec::new(),
        };
        let report = self
            .view()
            .long_tasks()
            .run(self.import_rows(rows))
            .await?;
        self.view().render(&json!({ "rows": [] }));
        self.view()
            .events()
            .emit("imported", serde_json::to_value(&report)?)
            .await
    }

    fn bind_view_events(self: &Arc<Self>) {
        let importer = Arc::downgrade(self);
        self.view().events().on(
            "btValidate",
            Handler::task(move |_: Event<Value>| {
                let importer = Weak::clone(&importer);
                async move {
                    let Some(importer) = importer.upgrade() else {
                        return Ok(());
                    };
                    if let Err(err) = importer.on_validate().await {
                        warn!(table = %importer.table, error = %err, "importer: import failed");
                        importer.view().show_error(&err.to_string());
                    }
                    Ok::<_, anyhow::Error>(())
                }
            }),
        );

        let importer = Arc::downgrade(self);
        self.view().events().on(
            "btBack",
            Handler::task(move |_: Event<Value>| {
                let importer = Weak::clone(&importer);
                async move {
                    match importer.upgrade() {
                        Some(importer) => importer.view().events().emit("back", Value::Null).await,
                        None => Ok(()),
                    }
                }
            }),
        );
    }
}

#[async_trait]
impl ViewBehavior for ImporterController {
    fn base(&self) -> &ViewController {
        &self.base
    }

    async fn prepare_data(&self, _data: Option<Value>) -> Result<Value> {
        Ok(json!({ "rows": [] }))
    }
}

impl Controller for ImporterController {
    fn label(&self) -> String {
        format!("importer {}", self.table)
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
