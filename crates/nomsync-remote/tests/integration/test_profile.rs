//! Integration tests for nickname resolution

use nomsync_core::ports::IProfileResolver;
use serde_json::json;

use crate::common;

#[tokio::test]
async fn test_resolve_nested_nickname() {
    let (server, client) = common::setup_profile_mock().await;
    common::mount_profile(&server, 200, json!({"result": {"nickname": "agent", "level": 12}})).await;

    let nickname = client.resolve_nickname().await.expect("resolve failed");
    assert_eq!(nickname, "agent");
}

#[tokio::test]
async fn test_resolve_top_level_nickname() {
    let (server, client) = common::setup_profile_mock().await;
    common::mount_profile(&server, 200, json!({"nickname": "scout"})).await;

    assert_eq!(client.fetch_nickname().await.unwrap(), "scout");
}

#[tokio::test]
async fn test_missing_nickname_is_an_error() {
    let (server, client) = common::setup_profile_mock().await;
    common::mount_profile(&server, 200, json!({"result": {}})).await;

    assert!(client.resolve_nickname().await.is_err());
}

#[tokio::test]
async fn test_profile_error_status() {
    let (server, client) = common::setup_profile_mock().await;
    common::mount_profile(&server, 401, json!({"error": "login required"})).await;

    assert!(client.resolve_nickname().await.is_err());
}
