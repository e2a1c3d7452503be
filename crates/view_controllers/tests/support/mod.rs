#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::Result;
use async_trait::async_trait;
use nav_core::{EventBus, MemoryPositionStore, Navigator};
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared::domain::{JoinSpec, MultiRead, RecordAction, RecordChange, SavedRecord, Schema};
use view_controllers::{DatabaseApi, DatabaseHandle, LongTaskGate, View, DATABASE_INJECTION};

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// View double writing `<name>:<call>` entries into a shared journal.
pub struct RecordingView {
    name: String,
    journal: Journal,
    bound: Mutex<Value>,
    input: Mutex<Option<Value>>,
    read_only: Mutex<Option<bool>>,
    errors: Mutex<Vec<String>>,
    confirm_answer: AtomicBool,
    form_ok: AtomicBool,
    events: EventBus<Value>,
    long_tasks: LongTaskGate,
}

impl RecordingView {
    pub fn new(name: &str, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            journal: Arc::clone(journal),
            bound: Mutex::new(Value::Null),
            input: Mutex::new(None),
            read_only: Mutex::new(None),
            errors: Mutex::new(Vec::new()),
            confirm_answer: AtomicBool::new(true),
            form_ok: AtomicBool::new(true),
            events: EventBus::default(),
            long_tasks: LongTaskGate::new(),
        })
    }

    fn record(&self, call: &str) {
        self.journal.lock().push(format!("{}:{call}", self.name));
    }

    /// What the user typed; returned by `read_data` until the next render.
    pub fn type_in(&self, data: Value) {
        *self.input.lock() = Some(data);
    }

    pub fn answer_confirm(&self, yes: bool) {
        self.confirm_answer.store(yes, Ordering::SeqCst);
    }

    pub fn fail_form_check(&self) {
        self.form_ok.store(false, Ordering::SeqCst);
    }

    pub fn rendered(&self) -> Value {
        self.bound.lock().clone()
    }

    pub fn read_only(&self) -> Option<bool> {
        *self.read_only.lock()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub async fn click(&self, event: &str, data: Value) {
        self.events.emit(event, data).await.expect("view event");
    }
}

#[async_trait]
impl View for RecordingView {
    async fn open(&self, data: &Value) -> Result<()> {
        self.record("open");
        *self.bound.lock() = data.clone();
        *self.input.lock() = None;
        Ok(())
    }

    async fn open_in_popup(&self, data: &Value) -> Result<()> {
        self.record("popup");
        *self.bound.lock() = data.clone();
        Ok(())
    }

    fn render(&self, data: &Value) {
        self.record("render");
        *self.bound.lock() = data.clone();
        *self.input.lock() = None;
    }

    fn close(&self) {
        self.record("close");
    }

    fn hide(&self) {
        self.record("hide");
    }

    fn show(&self) {
        self.record("show");
    }

    fn bound_data(&self) -> Value {
        self.bound.lock().clone()
    }

    fn read_data(&self) -> Value {
        let input = self.input.lock().clone();
        input.unwrap_or_else(|| self.bound_data())
    }

    async fn check_form(&self) -> Result<bool> {
        Ok(self.form_ok.load(Ordering::SeqCst))
    }

    fn set_read_only(&self, read_only: bool) {
        *self.read_only.lock() = Some(read_only);
    }

    fn show_error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }

    async fn confirm(&self, _message: &str) -> bool {
        self.confirm_answer.load(Ordering::SeqCst)
    }

    fn events(&self) -> &EventBus<Value> {
        &self.events
    }

    fn long_tasks(&self) -> &LongTaskGate {
        &self.long_tasks
    }
}

/// Customers with contacts (2many) and invoices referencing them.
pub fn shop_schema() -> Schema {
    serde_json::from_value(json!({
        "customer": {
            "columns": [
                { "name": "id", "autoGen": "uuid" },
                { "name": "name" },
                { "name": "label", "autoGen": { "type": "copy", "column": "name" } }
            ],
            "pk": ["id"]
        },
        "contact": {
            "columns": [{ "name": "id", "autoGen": "uuid" }, { "name": "email" }],
            "pk": ["id"],
            "fk": [{ "thisColumn": "customer_id", "targetTable": "customer", "targetColumn": "id" }]
        },
        "invoice": {
            "columns": [{ "name": "id", "autoGen": "uuid" }],
            "pk": ["id"],
            "fk": [{ "thisColumn": "customer_id", "targetTable": "customer", "targetColumn": "id" }]
        }
    }))
    .expect("schema")
}

/// In-memory tables keyed by primary key.
pub struct MemoryDatabase {
    schema: Schema,
    tables: Mutex<BTreeMap<String, Vec<Value>>>,
    transactions: Mutex<Vec<Vec<RecordChange>>>,
    searches: Mutex<Vec<(String, Value, String)>>,
}

impl MemoryDatabase {
    pub fn new(schema: Schema) -> Arc<Self> {
        Arc::new(Self {
            schema,
            tables: Mutex::new(BTreeMap::new()),
            transactions: Mutex::new(Vec::new()),
            searches: Mutex::new(Vec::new()),
        })
    }

    pub fn insert(&self, table: &str, record: Value) {
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    pub fn transactions(&self) -> Vec<Vec<RecordChange>> {
        self.transactions.lock().clone()
    }

    /// `(table, criteria, order_by)` of every search.
    pub fn searches(&self) -> Vec<(String, Value, String)> {
        self.searches.lock().clone()
    }

    fn pk_of(&self, table: &str, record: &Value) -> Value {
        let mut pk = serde_json::Map::new();
        if let Some(schema) = self.schema.get(table) {
            for column in &schema.pk {
                pk.insert(column.clone(), record.get(column).cloned().unwrap_or(Value::Null));
            }
        }
        Value::Object(pk)
    }

    fn matches(record: &Value, criteria: &Value) -> bool {
        let Some(criteria) = criteria.as_object() else {
            return true;
        };
        criteria.iter().all(|(field, expected)| {
            let actual = record.get(field).unwrap_or(&Value::Null);
            match expected {
                Value::Array(accepted) => accepted.contains(actual),
                other => actual == other,
            }
        })
    }
}

/// Attaches a database to a fresh navigator.
pub fn navigator_with(database: Option<Arc<MemoryDatabase>>) -> Arc<Navigator> {
    let navigator = Navigator::new(MemoryPositionStore::new());
    if let Some(database) = database {
        navigator.inject(DATABASE_INJECTION, Arc::new(DatabaseHandle(database)));
    }
    navigator
}

/// Lets spawned init tasks run until every controller is ready.
pub async fn settle(navigator: &Navigator) {
    for _ in 0..100 {
        if navigator.registry().pending_inits() == 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("controllers never finished initializing");
}

#[async_trait]
impl DatabaseApi for MemoryDatabase {
    async fn schema(&self) -> Result<Schema> {
        Ok(self.schema.clone())
    }

    async fn search(
        &self,
        table: &str,
        criteria: &Value,
        _joins: &[JoinSpec],
        order_by: &str,
    ) -> Result<Vec<Value>> {
        self.searches
            .lock()
            .push((table.to_string(), criteria.clone(), order_by.to_string()));
        let mut rows: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| Self::matches(row, criteria))
            .collect();
        let key = order_by.split(',').next().unwrap_or_default().to_string();
        rows.sort_by_key(|row| row.get(&key).map(|v| v.to_string()).unwrap_or_default());
        Ok(rows)
    }

    async fn get_pk(&self, table: &str, record: &Value) -> Result<Value> {
        Ok(self.pk_of(table, record))
    }

    async fn get_by_pk(&self, table: &str, pk: &Value, joins: &[JoinSpec]) -> Result<Option<Value>> {
        let Some(mut record) = self.rows(table).into_iter().find(|row| Self::matches(row, pk)) else {
            return Ok(None);
        };
        for join in joins {
            let (Some(this_column), Some(other_column)) = (&join.this_column, &join.other_column) else {
                continue;
            };
            let mut criteria = serde_json::Map::new();
            criteria.insert(
                other_column.clone(),
                record.get(this_column).cloned().unwrap_or(Value::Null),
            );
            let criteria = Value::Object(criteria);
            let related: Vec<Value> = self
                .rows(&join.other_table)
                .into_iter()
                .filter(|row| Self::matches(row, &criteria))
                .collect();
            if let Some(fields) = record.as_object_mut() {
                fields.insert(join.property().to_string(), Value::Array(related));
            }
        }
        Ok(Some(record))
    }

    async fn remove(&self, table: &str, record: &Value) -> Result<()> {
        let pk = self.pk_of(table, record);
        if let Some(rows) = self.tables.lock().get_mut(table) {
            rows.retain(|row| !Self::matches(row, &pk));
        }
        Ok(())
    }

    async fn multiread(
        &self,
        reads: BTreeMap<String, MultiRead>,
    ) -> Result<BTreeMap<String, Option<Value>>> {
        Ok(reads
            .into_iter()
            .map(|(key, read)| {
                let found = self
                    .rows(&read.table)
                    .into_iter()
                    .find(|row| Self::matches(row, &read.search_first));
                (key, found)
            })
            .collect())
    }

    async fn transactional_changes(&self, changes: Vec<RecordChange>) -> Result<Vec<SavedRecord>> {
        self.transactions.lock().push(changes.clone());
        let mut saved = Vec::with_capacity(changes.len());
        for change in changes {
            let pk = self.pk_of(&change.table, &change.record);
            let mut tables = self.tables.lock();
            let rows = tables.entry(change.table.clone()).or_default();
            rows.retain(|row| !Self::matches(row, &pk));
            if change.action != Some(RecordAction::Remove) {
                rows.push(change.record.clone());
            }
            saved.push(SavedRecord {
                table: change.table,
                record: change.record,
            });
        }
        Ok(saved)
    }
}
