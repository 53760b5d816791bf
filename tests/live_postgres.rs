// SPDX-License-Identifier: Apache-2.0

//! Runs against a real PostgreSQL when `TABLEGATE_TEST_DATABASE_URL` is set.
//! Read-only: nothing here writes to the target database.

use serde_json::json;
use tablegate::config::AdminConfig;
use tablegate::observability::Sensitive;
use tablegate::{dispatch, AppState, CallContext};
use tablegate_core::ErrorCode;

fn database_url() -> Option<String> {
    std::env::var("TABLEGATE_TEST_DATABASE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
}

async fn connect() -> Option<(AppState, tempfile::TempDir)> {
    let Some(url) = database_url() else {
        eprintln!("TABLEGATE_TEST_DATABASE_URL not set; skipping");
        return None;
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = AdminConfig::default();
    config.database_url = Sensitive::new(url);
    config.audit.enabled = false;
    config.backup.directory = dir.path().to_path_buf();
    let state = AppState::new(config).await.expect("connect to test database");
    Some((state, dir))
}

#[tokio::test]
async fn live_introspection_and_reads() {
    let Some((state, _dir)) = connect().await else {
        return;
    };
    let context = CallContext::default();

    let listed = dispatch(&state, "list_tables", json!({}), &context).await;
    assert!(listed.success, "{:?}", listed.error);
    let tables = listed.result.unwrap();

    if let Some(table) = tables.as_array().and_then(|t| t.first()).and_then(|t| t["name"].as_str()) {
        let schema = dispatch(&state, "get_schema", json!({ "table": table }), &context).await;
        assert!(schema.success, "{:?}", schema.error);

        let page = dispatch(
            &state,
            "query_records",
            json!({ "table": table, "limit": 1, "includeDeleted": true }),
            &context,
        )
        .await;
        assert!(page.success, "{:?}", page.error);
        assert!(page.result.unwrap()["count"].as_u64().unwrap() <= 1);
    }

    state.shutdown().await;
}

#[tokio::test]
async fn live_rejections_need_no_round_trip() {
    let Some((state, _dir)) = connect().await else {
        return;
    };
    let response = dispatch(
        &state,
        "delete_records",
        json!({ "table": "pg_authid", "where": { "rolname": "postgres" } }),
        &CallContext::default(),
    )
    .await;
    assert_eq!(response.error.unwrap().code, ErrorCode::NotWhitelisted);
    state.shutdown().await;
}
