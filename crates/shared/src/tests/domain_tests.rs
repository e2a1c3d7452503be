use super::*;
use serde_json::json;

#[test]
fn data_mode_parses_known_values() {
    assert_eq!(
        "bookmarkable".parse::<DataMode>().expect("bookmarkable"),
        DataMode::Bookmarkable
    );
    assert_eq!(
        "anonymous".parse::<DataMode>().expect("anonymous"),
        DataMode::Anonymous
    );
    let err = "secret".parse::<DataMode>().expect_err("unknown mode");
    assert_eq!(err, UnknownDataMode("secret".into()));
}

#[test]
fn table_schema_reads_camel_case_fields() {
    let schema: TableSchema = serde_json::from_value(json!({
        "columns": [
            {"name": "id", "autoGen": "uuid"},
            {"name": "code", "autoGen": {"type": "copy", "column": "id"}},
            {"name": "label"}
        ],
        "pk": ["id"],
        "fk": [{"thisColumn": "owner", "targetTable": "person", "targetColumn": "id"}]
    }))
    .expect("schema");

    assert_eq!(
        schema.columns[0].auto_gen,
        Some(AutoGen::Strategy("uuid".into()))
    );
    assert_eq!(
        schema.columns[1].auto_gen,
        Some(AutoGen::Rule {
            kind: "copy".into(),
            column: Some("id".into())
        })
    );
    assert_eq!(schema.columns[2].auto_gen, None);
    assert_eq!(schema.fk[0].target_table, "person");
}

#[test]
fn join_kind_uses_short_names() {
    let join: JoinSpec = serde_json::from_value(json!({
        "otherTable": "line",
        "name": "lines",
        "type": "2many"
    }))
    .expect("join");
    assert_eq!(join.kind, Some(JoinKind::ToMany));
    assert_eq!(join.property(), "lines");
    assert_eq!(JoinSpec::to_one("person").property(), "person");
}

#[test]
fn record_change_omits_missing_action() {
    let change = RecordChange::upsert("person", json!({"id": 1}));
    let raw = serde_json::to_value(&change).expect("serialize");
    assert_eq!(raw, json!({"table": "person", "record": {"id": 1}}));

    let removal = RecordChange::remove("person", json!({"id": 1}));
    let raw = serde_json::to_value(&removal).expect("serialize");
    assert_eq!(raw["action"], json!("remove"));
}
