use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UnknownDataMode;

/// How route data is carried in a position string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataMode {
    /// Data is percent-encoded into the position and survives a reload.
    #[default]
    Bookmarkable,
    /// Data stays in memory; the position only carries an opaque id.
    Anonymous,
}

impl DataMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bookmarkable => "bookmarkable",
            Self::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for DataMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataMode {
    type Err = UnknownDataMode;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "bookmarkable" => Ok(Self::Bookmarkable),
            "anonymous" => Ok(Self::Anonymous),
            other => Err(UnknownDataMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    Insert,
    Update,
    Remove,
}

/// One entry of a transactional change set. Without an action the
/// database updates the record when it exists and inserts it otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordChange {
    pub table: String,
    pub record: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<RecordAction>,
}

impl RecordChange {
    pub fn upsert(table: impl Into<String>, record: Value) -> Self {
        Self {
            table: table.into(),
            record,
            action: None,
        }
    }

    pub fn remove(table: impl Into<String>, record: Value) -> Self {
        Self {
            table: table.into(),
            record,
            action: Some(RecordAction::Remove),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedRecord {
    pub table: String,
    pub record: Value,
}

/// Column auto-generation rule, either a bare strategy name (`"uuid"`) or
/// a rule object such as `{"type": "copy", "column": "code"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AutoGen {
    Strategy(String),
    Rule {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        column: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_gen: Option<AutoGen>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub this_column: String,
    pub target_table: String,
    pub target_column: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub pk: Vec<String>,
    #[serde(default)]
    pub fk: Vec<ForeignKey>,
}

pub type Schema = BTreeMap<String, TableSchema>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    #[serde(rename = "2one")]
    ToOne,
    #[serde(rename = "2many")]
    ToMany,
}

/// A related table fetched and saved alongside a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSpec {
    pub other_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub this_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_column: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<JoinKind>,
}

impl JoinSpec {
    pub fn to_one(other_table: impl Into<String>) -> Self {
        Self {
            other_table: other_table.into(),
            name: None,
            this_column: None,
            other_column: None,
            kind: Some(JoinKind::ToOne),
        }
    }

    pub fn to_many(other_table: impl Into<String>) -> Self {
        Self {
            kind: Some(JoinKind::ToMany),
            ..Self::to_one(other_table)
        }
    }

    /// Property of the parent record holding the joined data.
    pub fn property(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.other_table)
    }
}

/// First record of `table` matching `search_first`, read as part of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiRead {
    pub table: String,
    pub search_first: Value,
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
