use std::{
    fmt,
    sync::{Arc, Weak},
};

use anyhow::Result;
use async_trait::async_trait;
use nav_core::{Controller, ControllerContext, DataMode, Event, Handler, LifecycleHandlers, Segment};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{
    domain::{JoinSpec, RecordChange},
    error::CapabilityError,
};
use tracing::{debug, info, warn};

use crate::{
    records,
    view::View,
    view_controller::{view_initializer, view_lifecycle, ViewBehavior, ViewController, ViewOptions},
};

/// Route data key selecting the mode a form opens in.
pub const FORM_MODE_KEY: &str = "$formMode";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormMode {
    #[default]
    Read,
    Create,
    Modify,
}

impl FormMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Modify => "modify",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read" => Some(Self::Read),
            "create" => Some(Self::Create),
            "modify" => Some(Self::Modify),
            _ => None,
        }
    }
}

impl fmt::Display for FormMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct FormLabels {
    pub confirm_delete: String,
    pub cant_delete: String,
}

impl Default for FormLabels {
    fn default() -> Self {
        Self {
            confirm_delete: "Are you sure to delete ?".to_string(),
            cant_delete: "Can't delete this element because it is already used".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormOptions {
    pub view: ViewOptions,
    pub join_fetch: Vec<JoinSpec>,
    pub labels: FormLabels,
}

impl FormOptions {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            view: ViewOptions::new(route),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct FormState {
    mode: FormMode,
    current_record: Option<Value>,
}

/// Displays one record of a table and edits it.
///
/// The view drives the form through `btCreate`, `btModify`, `btCancel`,
/// `btValidate`, `btDelete` and `btBack` events; the form answers with
/// `changeMode` and `back` on the same bus.
pub struct FormController {
    table: String,
    base: ViewController,
    join_fetch: Vec<JoinSpec>,
    labels: FormLabels,
    state: Mutex<FormState>,
}

impl FormController {
    pub fn new(table: impl Into<String>, view: Arc<dyn View>, options: FormOptions) -> Arc<Self> {
        Arc::new(Self {
            table: table.into(),
            base: ViewController::new(view, options.view),
            join_fetch: options.join_fetch,
            labels: options.labels,
            state: Mutex::new(FormState::default()),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn view(&self) -> &Arc<dyn View> {
        self.base.view()
    }

    pub fn mode(&self) -> FormMode {
        self.state.lock().mode
    }

    pub fn current_record(&self) -> Option<Value> {
        self.state.lock().current_record.clone()
    }

    /// Switches mode; only `read` leaves the view read-only.
    pub async fn set_mode(&self, mode: FormMode) -> Result<()> {
        self.state.lock().mode = mode;
        self.view().set_read_only(mode == FormMode::Read);
        debug!(table = %self.table, mode = %mode, "form: mode changed");
        self.view()
            .events()
            .emit("changeMode", Value::String(mode.as_str().to_string()))
            .await
    }

    /// Data of a new record: the configured default data with its
    /// auto-generated columns filled.
    pub async fn default_data(&self) -> Result<Value> {
        let mut data = self
            .base
            .options()
            .default_data
            .clone()
            .unwrap_or_else(|| json!({}));
        let schema = self.base.schema().await?;
        records::prepare_record(&schema, &self.table, &mut data)?;
        Ok(data)
    }

    /// Fresh copy of the record identified by `data`. Without a database
    /// `data` is the record.
    pub async fn search_record(&self, data: &Value) -> Result<Value> {
        let Some(database) = self.base.database() else {
            return Ok(data.clone());
        };
        let pk = database.get_pk(&self.table, data).await?;
        database
            .get_by_pk(&self.table, &pk, &self.join_fetch)
            .await?
            .ok_or_else(|| {
                CapabilityError::RecordNotFound {
                    table: self.table.clone(),
                }
                .into()
            })
    }

    pub async fn records_to_save(&self, view_data: Value, before: &Value) -> Result<Vec<RecordChange>> {
        let schema = self.base.schema().await?;
        Ok(records::records_to_save(
            &schema,
            &self.table,
            &self.join_fetch,
            view_data,
            before,
        )?)
    }

    /// Saves in one transaction and returns the record to display. Joined
    /// records are read back from the database.
    pub async fn save_records(&self, changes: Vec<RecordChange>) -> Result<Value> {
        let database = self.base.require_database("transactionalChanges")?;
        let change_count = changes.len();
        let saved = database.transactional_changes(changes).await?;
        let record = saved
            .into_iter()
            .find(|saved| saved.table == self.table)
            .map(|saved| saved.record)
            .ok_or_else(|| CapabilityError::RecordNotSaved {
                table: self.table.clone(),
            })?;
        if change_count == 1 {
            Ok(record)
        } else {
            self.search_record(&record).await
        }
    }

    /// Checks and saves what the user typed. `None` when the form check
    /// failed.
    pub async fn validate(&self) -> Result<Option<Value>> {
        let before = self.view().bound_data();
        let view_data = self.view().read_data();
        if !self.view().check_form().await? {
            debug!(table = %self.table, "form: check failed");
            return Ok(None);
        }
        let changes = self.records_to_save(view_data, &before).await?;
        self.save_records(changes).await.map(Some)
    }

    /// A new record moves the route onto its primary key; an edited one is
    /// displayed again.
    pub async fn on_validate(&self) -> Result<()> {
        let saved = self.view().long_tasks().run(self.validate()).await?;
        let Some(saved) = saved else {
            return Ok(());
        };
        info!(table = %self.table, mode = %self.mode(), "form: record saved");

        if self.mode() == FormMode::Create {
            match self.base.database() {
                Some(database) => {
                    let pk = database.get_pk(&self.table, &saved).await?;
                    self.base.update_route_data(pk).await?;
                }
                None => {
                    self.state.lock().current_record = Some(saved.clone());
                    let segment = Segment::new(self.base.route())
                        .with_data(saved)
                        .with_mode(DataMode::Anonymous);
                    self.base.navigate(segment).await?;
                }
            }
            Ok(())
        } else {
            self.state.lock().current_record = Some(saved);
            self.refresh(None).await
        }
    }

    /// True when another table still references `record`.
    pub async fn check_before_delete(&self, record: &Value) -> Result<bool> {
        let database = self.base.require_database("multiread")?;
        let schema = database.schema().await?;
        let reads = records::usage_reads(&schema, &self.table, record);
        if reads.is_empty() {
            return Ok(false);
        }
        let found = database.multiread(reads).await?;
        Ok(found.values().any(|read| read.as_ref().is_some_and(|r| !r.is_null())))
    }

    pub async fn delete_record(&self, record: &Value) -> Result<()> {
        let database = self.base.require_database("transactionalChanges")?;
        if self.check_before_delete(record).await? {
            return Err(CapabilityError::RecordInUse {
                table: self.table.clone(),
                message: self.labels.cant_delete.clone(),
            }
            .into());
        }
        let changes = vec![RecordChange::remove(&self.table, record.clone())];
        database.transactional_changes(changes).await?;
        info!(table = %self.table, "form: record deleted");
        Ok(())
    }

    pub async fn on_create(&self) -> Result<()> {
        let data = self.default_data().await?;
        self.view().render(&data);
        self.set_mode(FormMode::Create).await
    }

    pub async fn on_modify(&self) -> Result<()> {
        self.set_mode(FormMode::Modify).await
    }

    pub async fn on_cancel(&self) -> Result<()> {
        match self.current_record() {
            Some(record) => {
                self.view().render(&record);
                self.set_mode(FormMode::Read).await
            }
            None => {
                // render nothing in case nobody listens to back
                self.view().render(&json!({}));
                self.set_mode(FormMode::Read).await?;
                self.on_back().await
            }
        }
    }

    pub async fn on_delete(&self) -> Result<()> {
        if !self.view().confirm(&self.labels.confirm_delete).await {
            return Ok(());
        }
        let record = self
            .current_record()
            .unwrap_or_else(|| self.view().bound_data());
        self.view()
            .long_tasks()
            .run(self.delete_record(&record))
            .await?;
        self.state.lock().current_record = None;
        self.view().render(&json!({}));
        self.set_mode(FormMode::Read).await?;
        self.on_back().await
    }

    pub async fn on_back(&self) -> Result<()> {
        self.view().events().emit("back", Value::Null).await
    }

    async fn on_button(&self, button: &str) -> Result<()> {
        match button {
            "btCreate" => self.on_create().await,
            "btModify" => self.on_modify().await,
            "btCancel" => self.on_cancel().await,
            "btValidate" => self.on_validate().await,
            "btDelete" => self.on_delete().await,
            "btBack" => self.on_back().await,
            _ => Ok(()),
        }
    }

    /// Failed actions are shown on the view instead of failing the emitter.
    fn bind_view_events(self: &Arc<Self>) {
        for button in BUTTONS {
            let form = Arc::downgrade(self);
            let listener = Handler::task(move |_: Event<Value>| {
                let form = Weak::clone(&form);
                async move {
                    let Some(form) = form.upgrade() else {
                        return Ok(());
                    };
                    if let Err(err) = form.on_button(button).await {
                        warn!(table = %form.table, button, error = %err, "form: action failed");
                        form.view().show_error(&err.to_string());
                    }
                    Ok::<_, anyhow::Error>(())
                }
            });
            self.view().events().on(button, listener);
        }
    }
}

const BUTTONS: [&str; 6] = ["btCreate", "btModify", "btCancel", "btValidate", "btDelete", "btBack"];

#[async_trait]
impl ViewBehavior for FormController {
    fn base(&self) -> &ViewController {
        &self.base
    }

    /// No data starts a new record; otherwise the record is read again and
    /// shown in `$formMode` (read by default).
    async fn prepare_data(&self, data: Option<Value>) -> Result<Value> {
        match data {
            None => {
                self.state.lock().mode = FormMode::Create;
                self.default_data().await
            }
            Some(data) => {
                let mode = data
                    .get(FORM_MODE_KEY)
                    .and_then(Value::as_str)
                    .and_then(FormMode::parse)
                    .unwrap_or_default();
                self.state.lock().mode = mode;
                let record = self.search_record(&data).await?;
                self.state.lock().current_record = Some(record.clone());
                Ok(record)
            }
        }
    }

    async fn enter(&self, data: Option<Value>) -> Result<()> {
        self.base.enter_with(self, data).await?;
        self.set_mode(self.mode()).await
    }

    async fn leave(&self) -> Result<()> {
        self.base.leave().await?;
        self.state.lock().current_record = None;
        Ok(())
    }

    async fn refresh(&self, _data: Option<Value>) -> Result<()> {
        self.enter(self.current_record()).await
    }
}

impl Controller for FormController {
    fn label(&self) -> String {
        format!("form {}", self.table)
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
#[path = "tests/form_tests.rs"]
mod tests;
