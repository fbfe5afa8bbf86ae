//! Export from one database, import into another.

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use cmdb_core::Role;

use super::common::{
    authed_request, create_test_router, create_user_with_key, send_request, send_request_raw,
    upload_request,
};

#[tokio::test]
async fn test_round_trip_between_databases() {
    let (source, source_state) = create_test_router().await;
    let (_, source_key) = create_user_with_key(&source_state, "admin", Role::Admin).await;

    let (_, tag): (StatusCode, Value) = send_request(
        source.clone(),
        authed_request(
            Method::POST,
            "/api/v1/tags",
            &source_key,
            Some(json!({"key": "env", "value": "prod"})),
        ),
    )
    .await;
    for name in ["db-1", "db-2"] {
        let (status, _): (StatusCode, Value) = send_request(
            source.clone(),
            authed_request(
                Method::POST,
                "/api/v1/assets",
                &source_key,
                Some(json!({
                    "asset_type": "database",
                    "name": name,
                    "db_type": "PostgreSQL",
                    "host": "10.0.0.5",
                    "port": 5432,
                    "tag_ids": [tag["id"]],
                    "credentials": [{"credential_type": "password", "key": "postgres", "value": "pg-secret"}]
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, snapshot) = send_request_raw(
        source,
        authed_request(Method::GET, "/api/v1/migration/export", &source_key, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // same cipher key on both sides, so ciphertext stays readable
    let (target, target_state) = create_test_router().await;
    let (_, target_key) = create_user_with_key(&target_state, "admin", Role::Admin).await;

    let (status, result): (StatusCode, Value) = send_request(
        target.clone(),
        upload_request("/api/v1/migration/import", &target_key, "cmdb.json", &snapshot),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["imported"]["assets"], 2);
    assert_eq!(result["imported"]["tags"], 1);
    assert_eq!(result["imported"]["credentials"], 2);
    assert_eq!(result["skipped"]["users"], 1);
    assert_eq!(result["errors"], json!([]));

    let (_, page): (StatusCode, Value) = send_request(
        target,
        authed_request(
            Method::GET,
            "/api/v1/assets?asset_type=database&tags=env=prod",
            &target_key,
            None,
        ),
    )
    .await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"][0]["credentials"][0]["value"], "pg-secret");
}
