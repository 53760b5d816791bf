// SPDX-License-Identifier: Apache-2.0

mod support;

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{json, Value};
use support::{
    harness, harness_with, library_tables, test_config, FakeProcessRunner, MockEngine, MockTable,
};
use tablegate::{dispatch, CallContext, ToolResponse};
use tablegate_core::{ErrorCode, Operation, Whitelist};

async fn call(state: &tablegate::AppState, tool: &str, arguments: Value) -> ToolResponse {
    dispatch(state, tool, arguments, &CallContext::default()).await
}

fn error_code(response: &ToolResponse) -> ErrorCode {
    assert!(!response.success, "expected failure, got {:?}", response.result);
    response.error.as_ref().expect("error payload").code
}

fn result(response: ToolResponse) -> Value {
    assert!(response.success, "expected success, got {:?}", response.error);
    response.result.expect("result")
}

#[tokio::test]
async fn unknown_table_is_rejected_before_any_sql() {
    let h = harness();
    let response = call(&h.state, "query_records", json!({ "table": "users" })).await;

    assert_eq!(error_code(&response), ErrorCode::NotWhitelisted);
    assert!(h.engine.statements().is_empty());
}

#[tokio::test]
async fn unknown_operator_is_rejected_before_any_sql() {
    let h = harness();
    let response = call(
        &h.state,
        "query_records",
        json!({ "table": "books", "where": { "title": { "$regex": "^Dune" } } }),
    )
    .await;

    assert_eq!(error_code(&response), ErrorCode::InvalidOperator);
    assert!(h.engine.statements().is_empty());
}

#[tokio::test]
async fn unknown_column_in_filter_is_rejected() {
    let h = harness();
    let response = call(
        &h.state,
        "query_records",
        json!({ "table": "books", "where": { "password": "x" } }),
    )
    .await;

    assert_eq!(error_code(&response), ErrorCode::InvalidColumn);
    assert!(h.engine.statements().is_empty());
}

#[tokio::test]
async fn updates_and_deletes_need_a_filter() {
    let h = harness();

    let update = call(
        &h.state,
        "update_records",
        json!({ "table": "books", "data": { "status": "draft" }, "where": {} }),
    )
    .await;
    assert_eq!(error_code(&update), ErrorCode::EmptyWhereClause);

    let delete = call(&h.state, "delete_records", json!({ "table": "books" })).await;
    assert_eq!(error_code(&delete), ErrorCode::EmptyWhereClause);

    assert!(h.engine.statements().is_empty());
    assert_eq!(h.engine.begun(), 0);
}

#[tokio::test]
async fn unknown_tool_is_reported() {
    let h = harness();
    let response = call(&h.state, "drop_database", json!({})).await;
    assert_eq!(error_code(&response), ErrorCode::UnknownOperation);
}

#[tokio::test]
async fn audit_table_is_not_reachable_through_record_tools() {
    let h = harness();
    let response = call(&h.state, "query_records", json!({ "table": "audit_logs" })).await;

    assert_eq!(error_code(&response), ErrorCode::AccessDenied);
    assert!(h.engine.statements().is_empty());
}

#[tokio::test]
async fn audit_table_schema_stays_inspectable() {
    let mut tables = library_tables();
    tables.insert(
        "audit_logs".to_string(),
        MockTable::new()
            .column("id", "bigint", false, Some("nextval('audit_logs_id_seq'::regclass)"))
            .column("timestamp", "timestamp with time zone", false, Some("now()"))
            .column("operation", "text", false, None)
            .column("table_name", "text", true, None)
            .column("success", "boolean", false, None),
    );
    let engine = MockEngine::new(tables);
    let dir = tempfile::tempdir().unwrap();
    let state = tablegate::AppState::with_engine(
        test_config(dir.path()),
        Whitelist::builtin(),
        engine.clone(),
        FakeProcessRunner::new(""),
    )
    .unwrap();

    let schema = result(call(&state, "get_schema", json!({ "table": "audit_logs" })).await);
    assert_eq!(schema["table"], "audit_logs");
    let columns = result(call(&state, "list_table_columns", json!({ "table": "audit_logs" })).await);
    assert_eq!(columns["columns"].as_array().unwrap().len(), 5);

    let read = call(&state, "query_records", json!({ "table": "audit_logs" })).await;
    assert_eq!(error_code(&read), ErrorCode::AccessDenied);
    assert!(engine.data_statements().is_empty());
}

#[tokio::test]
async fn books_filter_compiles_to_three_parameters() {
    let h = harness();
    let response = call(
        &h.state,
        "query_records",
        json!({
            "table": "books",
            "where": {
                "word_count": { "$gte": 80000, "$lte": 120000 },
                "genre": { "$in": ["fantasy", "epic fantasy"] }
            },
            "limit": 50
        }),
    )
    .await;
    let page = result(response);
    assert!(page["count"].as_u64().unwrap() <= 50);

    let selects: Vec<_> = h
        .engine
        .data_statements()
        .into_iter()
        .filter(|s| s.text.starts_with("SELECT * FROM \"books\""))
        .collect();
    assert_eq!(selects.len(), 1);
    let select = &selects[0];

    let where_clause = select
        .text
        .split(" WHERE ")
        .nth(1)
        .and_then(|rest| rest.split(" LIMIT ").next())
        .unwrap();
    assert_eq!(where_clause.matches('$').count(), 3, "{}", where_clause);
    assert!(where_clause.contains("\"deleted_at\" IS NULL"));

    assert_eq!(select.values.len(), 4);
    assert!(select.values.contains(&json!(80000)));
    assert!(select.values.contains(&json!(120000)));
    assert!(select.values.contains(&json!(["fantasy", "epic fantasy"])));
    assert_eq!(select.values.last(), Some(&json!(50)));

    for value in &select.values {
        if let Some(text) = value.as_str() {
            assert!(!select.text.contains(text));
        }
    }
}

#[tokio::test]
async fn insert_then_query_returns_the_row() {
    let h = harness();
    let inserted = result(
        call(
            &h.state,
            "insert_record",
            json!({ "table": "authors", "data": { "name": "Ursula", "email": "ursula@example.com" } }),
        )
        .await,
    );
    assert_eq!(inserted["name"], "Ursula");
    assert!(inserted["id"].is_number());
    assert!(inserted.get("created_at").is_some());

    let page = result(call(&h.state, "query_records", json!({ "table": "authors" })).await);
    assert_eq!(page["total"], 1);
    assert_eq!(page["records"][0]["email"], "ursula@example.com");

    assert_eq!(h.engine.committed(), 1);
    let insert = h
        .engine
        .data_statements()
        .into_iter()
        .find(|s| s.text.starts_with("INSERT INTO \"authors\""))
        .unwrap();
    assert!(insert.in_transaction);
    assert!(insert.text.ends_with("RETURNING *"));
}

#[tokio::test]
async fn invalid_payload_reports_every_field() {
    let h = harness();
    let response = call(
        &h.state,
        "insert_record",
        json!({ "table": "books", "data": { "word_count": "lots", "author_id": -3 } }),
    )
    .await;

    assert_eq!(error_code(&response), ErrorCode::ValidationError);
    let details = &response.error.as_ref().unwrap().details;
    let fields: Vec<&str> = details["errors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["field"].as_str())
        .collect();
    assert!(fields.contains(&"title"));
    assert!(fields.contains(&"word_count"));
    assert!(fields.contains(&"author_id"));

    assert!(h.engine.data_statements().iter().all(|s| !s.text.starts_with("INSERT")));
    assert_eq!(h.engine.rolled_back(), 1);
}

#[tokio::test]
async fn duplicate_unique_value_is_rejected() {
    let h = harness();
    h.engine.respond(|s| {
        (s.text.starts_with("SELECT 1 AS \"found\" FROM \"authors\" WHERE \"email\""))
            .then(|| Ok(vec![json!({ "found": 1 }).as_object().cloned().unwrap()]))
    });

    let response = call(
        &h.state,
        "insert_record",
        json!({ "table": "authors", "data": { "name": "Ursula", "email": "ursula@example.com" } }),
    )
    .await;

    assert_eq!(error_code(&response), ErrorCode::UniqueViolation);
    let details = &response.error.as_ref().unwrap().details;
    assert_eq!(details["errors"][0]["field"], "email");
    assert_eq!(details["errors"][0]["constraint"], "uq_authors_email");
}

#[tokio::test]
async fn soft_delete_is_idempotent() {
    let h = harness();
    let first = AtomicBool::new(true);
    h.engine.respond(move |s| {
        if !s.text.starts_with("UPDATE \"books\" SET \"deleted_at\" = CURRENT_TIMESTAMP") {
            return None;
        }
        let rows = if first.swap(false, Ordering::SeqCst) {
            vec![json!({ "id": 7, "title": "Dune" }).as_object().cloned().unwrap()]
        } else {
            Vec::new()
        };
        Some(Ok(rows))
    });

    let args = json!({ "table": "books", "where": { "id": 7 } });
    let once = result(call(&h.state, "delete_records", args.clone()).await);
    let twice = result(call(&h.state, "delete_records", args).await);

    assert_eq!(once["deleted"], 1);
    assert_eq!(once["type"], "soft");
    assert_eq!(twice["deleted"], 0);

    let updates: Vec<_> = h
        .engine
        .data_statements()
        .into_iter()
        .filter(|s| s.text.starts_with("UPDATE"))
        .collect();
    assert_eq!(updates.len(), 2);
    assert!(updates[0].text.contains("\"deleted_at\" IS NULL"));
}

#[tokio::test]
async fn hard_delete_issues_delete() {
    let h = harness();
    let response = result(
        call(
            &h.state,
            "delete_records",
            json!({ "table": "books", "where": { "id": 7 }, "hard": true }),
        )
        .await,
    );
    assert_eq!(response["type"], "hard");
    assert!(h
        .engine
        .data_statements()
        .iter()
        .any(|s| s.text.starts_with("DELETE FROM \"books\"")));
}

#[tokio::test]
async fn batch_insert_rolls_back_on_missing_reference() {
    let h = harness();
    h.engine.respond(|s| {
        (s.text.starts_with("SELECT 1 AS \"found\" FROM \"authors\"") && s.values.first() == Some(&json!(999)))
            .then(|| Ok(Vec::new()))
    });

    let response = call(
        &h.state,
        "batch_insert",
        json!({
            "table": "books",
            "records": [
                { "title": "A Wizard of Earthsea", "author_id": 1 },
                { "title": "The Tombs of Atuan", "author_id": 1 },
                { "title": "Tehanu", "author_id": 999 }
            ]
        }),
    )
    .await;

    assert_eq!(error_code(&response), ErrorCode::ForeignKeyViolation);
    let details = &response.error.as_ref().unwrap().details;
    assert_eq!(details["batchIndex"], 2);
    assert_eq!(details["errors"][0]["field"], "author_id");
    assert_eq!(details["errors"][0]["value"], 999);

    assert_eq!(h.engine.begun(), 1);
    assert_eq!(h.engine.committed(), 0);
    assert_eq!(h.engine.rolled_back(), 1);
    assert!(h
        .engine
        .data_statements()
        .iter()
        .filter(|s| s.text.starts_with("INSERT"))
        .all(|s| s.in_transaction));
}

#[tokio::test]
async fn batch_insert_can_omit_records() {
    let h = harness();
    let outcome = result(
        call(
            &h.state,
            "batch_insert",
            json!({
                "table": "series",
                "records": [{ "title": "Earthsea" }, { "title": "Hainish" }],
                "returnRecords": false
            }),
        )
        .await,
    );
    assert_eq!(outcome["inserted"], 2);
    assert!(outcome.get("records").is_none());
    assert_eq!(h.engine.committed(), 1);
}

#[tokio::test]
async fn concurrent_batches_commit_independently() {
    let h = harness();
    let left = call(
        &h.state,
        "batch_update",
        json!({ "table": "books", "updates": [{ "where": { "id": 1 }, "data": { "status": "draft" } }] }),
    );
    let right = call(
        &h.state,
        "batch_update",
        json!({ "table": "books", "updates": [{ "where": { "id": 2 }, "data": { "status": "published" } }] }),
    );
    let (left, right) = tokio::join!(left, right);

    assert!(left.success);
    assert!(right.success);
    assert_eq!(h.engine.begun(), 2);
    assert_eq!(h.engine.committed(), 2);
    assert_eq!(h.engine.rolled_back(), 0);
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let h = harness();
    let response = call(&h.state, "batch_delete", json!({ "table": "books", "deletes": [] })).await;
    assert_eq!(error_code(&response), ErrorCode::ValidationError);
    assert_eq!(h.engine.begun(), 0);
}

#[tokio::test]
async fn schema_tools_describe_live_tables() {
    let h = harness();

    let tables = result(call(&h.state, "list_tables", json!({})).await);
    let names: Vec<&str> = tables
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names.len(), 3);
    assert!(names.contains(&"books"));
    assert!(!names.contains(&"chapters"));

    let schema = result(call(&h.state, "get_schema", json!({ "table": "books" })).await);
    assert_eq!(schema["table"], "books");
    assert_eq!(schema["primaryKey"], json!(["id"]));

    let relationships = result(call(&h.state, "get_relationships", json!({ "table": "books" })).await);
    assert!(!relationships["relationships"].as_array().unwrap().is_empty());

    let too_deep = call(&h.state, "get_relationships", json!({ "table": "books", "depth": 9 })).await;
    assert_eq!(error_code(&too_deep), ErrorCode::ValidationError);
}

#[tokio::test]
async fn list_tools_covers_every_operation() {
    let h = harness();
    let tools = result(call(&h.state, "list_tools", json!({})).await);
    let tools = tools.as_array().unwrap();
    assert_eq!(tools.len(), Operation::ALL.len());
    assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
}

#[tokio::test]
async fn writes_are_audited_with_a_statement_hash() {
    let h = harness_with(|config| config.audit.enabled = true);
    let context = CallContext {
        user_id: Some("librarian".into()),
    };
    let response = dispatch(
        &h.state,
        "insert_record",
        json!({ "table": "series", "data": { "title": "Earthsea" } }),
        &context,
    )
    .await;
    assert!(response.success);

    let denied = call(&h.state, "query_records", json!({ "table": "users" })).await;
    assert!(!denied.success);

    h.state.audit.shutdown().await;

    let audits: Vec<_> = h
        .engine
        .statements()
        .into_iter()
        .filter(|s| s.text.starts_with("INSERT INTO \"audit_logs\""))
        .collect();
    assert_eq!(audits.len(), 1);
    let values = &audits[0].values;
    assert!(values.contains(&json!("insert_record")));
    assert!(values.contains(&json!("librarian")));
    assert!(values.iter().any(|v| v
        .as_str()
        .is_some_and(|s| s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()))));
    assert!(!audits[0].in_transaction);
}
