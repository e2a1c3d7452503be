use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{JoinSpec, MultiRead, RecordChange, SavedRecord, Schema},
    error::CapabilityError,
};

/// Injection name under which a [`DatabaseHandle`] is looked up.
pub const DATABASE_INJECTION: &str = "database";

#[async_trait]
pub trait DatabaseApi: Send + Sync {
    async fn schema(&self) -> Result<Schema>;
    async fn search(
        &self,
        table: &str,
        criteria: &Value,
        joins: &[JoinSpec],
        order_by: &str,
    ) -> Result<Vec<Value>>;
    async fn get_pk(&self, table: &str, record: &Value) -> Result<Value>;
    async fn get_by_pk(&self, table: &str, pk: &Value, joins: &[JoinSpec]) -> Result<Option<Value>>;
    async fn remove(&self, table: &str, record: &Value) -> Result<()>;
    async fn multiread(
        &self,
        reads: BTreeMap<String, MultiRead>,
    ) -> Result<BTreeMap<String, Option<Value>>>;
    /// Applies every change or none of them.
    async fn transactional_changes(&self, changes: Vec<RecordChange>) -> Result<Vec<SavedRecord>>;
}

/// Injectable wrapper; injected objects are looked up by concrete type.
#[derive(Clone)]
pub struct DatabaseHandle(pub Arc<dyn DatabaseApi>);

pub struct MissingDatabaseApi;

fn unavailable<T>(operation: &'static str) -> Result<T> {
    Err(CapabilityError::DatabaseUnavailable { operation }.into())
}

#[async_trait]
impl DatabaseApi for MissingDatabaseApi {
    async fn schema(&self) -> Result<Schema> {
        unavailable("schema")
    }

    async fn search(
        &self,
        _table: &str,
        _criteria: &Value,
        _joins: &[JoinSpec],
        _order_by: &str,
    ) -> Result<Vec<Value>> {
        unavailable("search")
    }

    async fn get_pk(&self, _table: &str, _record: &Value) -> Result<Value> {
        unavailable("getPk")
    }

    async fn get_by_pk(&self, _table: &str, _pk: &Value, _joins: &[JoinSpec]) -> Result<Option<Value>> {
        unavailable("getByPk")
    }

    async fn remove(&self, _table: &str, _record: &Value) -> Result<()> {
        unavailable("remove")
    }

    async fn multiread(
        &self,
        _reads: BTreeMap<String, MultiRead>,
    ) -> Result<BTreeMap<String, Option<Value>>> {
        unavailable("multiread")
    }

    async fn transactional_changes(&self, _changes: Vec<RecordChange>) -> Result<Vec<SavedRecord>> {
        unavailable("transactionalChanges")
    }
}
