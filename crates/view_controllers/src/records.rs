//! Record preparation shared by forms and importers.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use shared::{
    domain::{AutoGen, JoinKind, JoinSpec, MultiRead, RecordChange, Schema},
    error::CapabilityError,
};
use uuid::Uuid;

/// Fills the auto-generated columns of `record` that are still blank.
pub fn prepare_record(schema: &Schema, table: &str, record: &mut Value) -> Result<(), CapabilityError> {
    let Some(table_schema) = schema.get(table) else {
        return Ok(());
    };
    let Some(fields) = record.as_object_mut() else {
        return Ok(());
    };

    for column in &table_schema.columns {
        let Some(auto_gen) = &column.auto_gen else {
            continue;
        };
        if !is_blank(fields.get(&column.name)) {
            continue;
        }
        let generated = match auto_gen {
            AutoGen::Strategy(strategy) if strategy == "uuid" => Value::String(Uuid::new_v4().to_string()),
            AutoGen::Rule {
                kind,
                column: Some(source),
            } if kind == "copy" => fields.get(source).cloned().unwrap_or(Value::Null),
            _ => {
                return Err(CapabilityError::IllegalAutoGen {
                    table: table.to_string(),
                    column: column.name.clone(),
                })
            }
        };
        fields.insert(column.name.clone(), generated);
    }
    Ok(())
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

/// Change set saving `view_data` and its joined sub-records. Sub-records
/// of a `2many` join present in `before` but gone from `view_data` are
/// removed.
pub fn records_to_save(
    schema: &Schema,
    table: &str,
    joins: &[JoinSpec],
    mut view_data: Value,
    before: &Value,
) -> Result<Vec<RecordChange>, CapabilityError> {
    prepare_record(schema, table, &mut view_data)?;
    let mut related = Vec::new();

    for join in joins {
        // joins without a link back to this table are fetched for display only
        let Some((this_column, other_column)) = join_columns(schema, table, join) else {
            continue;
        };
        let name = join.property();
        let Some(joined) = view_data.get(name).filter(|v| !v.is_null()).cloned() else {
            continue;
        };
        let parent_key = view_data.get(&this_column).cloned().unwrap_or(Value::Null);

        match join.kind {
            Some(JoinKind::ToMany) => {
                let Value::Array(rows) = joined else {
                    return Err(invalid_join(table, join, format!("2many join expects an array in {name}")));
                };
                let mut kept = Vec::with_capacity(rows.len());
                for mut row in rows {
                    set_field(&mut row, &other_column, parent_key.clone());
                    prepare_record(schema, &join.other_table, &mut row)?;
                    kept.push(row.clone());
                    related.push(RecordChange::upsert(&join.other_table, row));
                }
                if let Some(Value::Array(old_rows)) = before.get(name) {
                    let pk = pk_columns(schema, &join.other_table);
                    for old in old_rows {
                        if !kept.iter().any(|row| same_pk(pk, row, old)) {
                            related.push(RecordChange::remove(&join.other_table, old.clone()));
                        }
                    }
                }
            }
            Some(JoinKind::ToOne) => {
                let mut row = joined;
                set_field(&mut row, &other_column, parent_key);
                prepare_record(schema, &join.other_table, &mut row)?;
                related.push(RecordChange::upsert(&join.other_table, row));
            }
            None => {
                return Err(invalid_join(table, join, "join type should be 2one or 2many".into()));
            }
        }

        if let Some(fields) = view_data.as_object_mut() {
            fields.remove(name);
        }
    }

    let mut changes = vec![RecordChange::upsert(table, view_data)];
    changes.extend(related);
    Ok(changes)
}

/// Columns linking `table` (this side) to the joined table (other side).
fn join_columns(schema: &Schema, table: &str, join: &JoinSpec) -> Option<(String, String)> {
    if let (Some(this_column), Some(other_column)) = (&join.this_column, &join.other_column) {
        return Some((this_column.clone(), other_column.clone()));
    }
    schema
        .get(&join.other_table)?
        .fk
        .iter()
        .find(|fk| fk.target_table == table)
        .map(|fk| (fk.target_column.clone(), fk.this_column.clone()))
}

fn invalid_join(table: &str, join: &JoinSpec, reason: String) -> CapabilityError {
    CapabilityError::InvalidJoin {
        table: table.to_string(),
        other_table: join.other_table.clone(),
        reason,
    }
}

fn set_field(record: &mut Value, column: &str, value: Value) {
    if let Some(fields) = record.as_object_mut() {
        fields.insert(column.to_string(), value);
    }
}

pub fn pk_columns<'a>(schema: &'a Schema, table: &str) -> &'a [String] {
    schema.get(table).map(|t| t.pk.as_slice()).unwrap_or(&[])
}

fn same_pk(pk: &[String], left: &Value, right: &Value) -> bool {
    pk.iter().all(|column| left.get(column) == right.get(column))
}

/// One read per foreign key pointing at `table`, keyed `<table>_<column>`.
/// Any hit means `record` is still referenced.
pub fn usage_reads(schema: &Schema, table: &str, record: &Value) -> BTreeMap<String, MultiRead> {
    let mut reads = BTreeMap::new();
    for (other_table, other_schema) in schema {
        for fk in other_schema.fk.iter().filter(|fk| fk.target_table == table) {
            let mut search = Map::new();
            search.insert(
                fk.this_column.clone(),
                record.get(&fk.target_column).cloned().unwrap_or(Value::Null),
            );
            reads.insert(
                format!("{other_table}_{}", fk.this_column),
                MultiRead {
                    table: other_table.clone(),
                    search_first: Value::Object(search),
                },
            );
        }
    }
    reads
}

#[cfg(test)]
#[path = "tests/records_tests.rs"]
mod tests;
