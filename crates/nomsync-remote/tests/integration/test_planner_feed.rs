//! Integration tests for reading the planner listing

use nomsync_core::domain::{CandidateSet, CandidateStatus, DEFAULT_CELL_LEVEL};
use nomsync_core::ports::IPlannerFeed;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_fetch_planner_returns_rows() {
    let (server, client) = common::setup_planner_mock().await;
    common::mount_planner_rows(
        &server,
        json!([
            {"id": "a1", "status": "submitted", "title": "Fountain", "description": "Stone", "lat": 52.52, "lng": 13.405},
            {"id": "p7", "status": "potential", "title": "Mural", "description": "", "lat": "52.5201", "lng": "13.4051"}
        ]),
    )
    .await;

    let rows = client.fetch_planner().await.expect("fetch_planner failed");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id.as_deref(), Some("a1"));
    assert_eq!(rows[1].lat, Some(52.5201));

    let import = CandidateSet::from_planner_records(rows, DEFAULT_CELL_LEVEL);
    assert_eq!(import.set.len(), 2);
    assert_eq!(
        import.set.get("p7").unwrap().status,
        CandidateStatus::Potential
    );
}

#[tokio::test]
async fn test_fetch_planner_unwraps_result_and_skips_junk() {
    let (server, client) = common::setup_planner_mock().await;
    common::mount_planner_rows(
        &server,
        json!({"result": [
            {"id": 10, "status": "held", "title": "t", "description": "d", "lat": 1, "lng": 2},
            "not a row",
            {"id": 11, "status": "live", "title": "t", "description": "d", "lat": 1, "lng": 2}
        ]}),
    )
    .await;

    // Through the port, as the session sees it
    let feed: &dyn IPlannerFeed = &client;
    let rows = feed.fetch_planner().await.unwrap();
    assert_eq!(rows.len(), 2);

    let import = CandidateSet::from_planner_records(rows, DEFAULT_CELL_LEVEL);
    assert_eq!(import.set.len(), 1);
    assert!(import.set.contains("10"));
    assert_eq!(import.unrecognized, 1);
}

#[tokio::test]
async fn test_fetch_planner_error_status() {
    let (server, client) = common::setup_planner_mock().await;
    Mock::given(method("GET"))
        .and(path(common::PLANNER_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client.fetch_planner().await.unwrap_err();
    assert!(err.to_string().contains("500"), "unexpected error: {err}");
}

#[tokio::test]
async fn test_fetch_planner_rejects_non_list_body() {
    let (server, client) = common::setup_planner_mock().await;
    common::mount_planner_rows(&server, json!({"error": "script failed"})).await;

    assert!(client.fetch_planner().await.is_err());
}
