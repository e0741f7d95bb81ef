//! Integration tests for change event delivery

use nomsync_core::domain::{CandidateStatus, ChangeEvent, EventPayload};
use nomsync_core::ports::ISyncEndpoint;
use wiremock::matchers::{body_string, body_string_contains, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn payload() -> EventPayload {
    EventPayload {
        lat: 52.52,
        lng: 13.405,
        title: "Old Mill".to_string(),
        description: "Water & wheel".to_string(),
        submitted_date: Some("2024-05-01".to_string()),
        image_url: None,
        author_nickname: "agent".to_string(),
    }
}

#[tokio::test]
async fn test_deliver_delete_posts_status_and_id() {
    let (server, client) = common::setup_planner_mock().await;
    Mock::given(method("POST"))
        .and(path(common::PLANNER_PATH))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("status=delete&id=sub-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client
        .deliver(&ChangeEvent::delete("sub-1"))
        .await
        .expect("deliver failed");
}

#[tokio::test]
async fn test_deliver_status_event_encodes_payload() {
    let (server, client) = common::setup_planner_mock().await;
    Mock::given(method("POST"))
        .and(path(common::PLANNER_PATH))
        .and(body_string_contains("status=voting"))
        .and(body_string_contains("id=sub-2"))
        .and(body_string_contains("title=Old+Mill"))
        .and(body_string_contains("description=Water+%26+wheel"))
        .and(body_string_contains("submitteddate=2024-05-01"))
        .and(body_string_contains("candidateimageurl=&"))
        .and(body_string_contains("nickname=agent"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let event = ChangeEvent::status("sub-2", CandidateStatus::Voting, payload());
    let endpoint: &dyn ISyncEndpoint = &client;
    endpoint.deliver(&event).await.expect("deliver failed");
}

#[tokio::test]
async fn test_deliver_non_success_is_an_error() {
    let (server, client) = common::setup_planner_mock().await;
    Mock::given(method("POST"))
        .and(path(common::PLANNER_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .deliver(&ChangeEvent::delete("sub-3"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("delete sub-3"), "unexpected error: {err}");
}

#[tokio::test]
async fn test_deliver_unreachable_endpoint_is_an_error() {
    let client = nomsync_remote::PlannerClient::new("http://127.0.0.1:9/exec").unwrap();
    assert!(client.deliver(&ChangeEvent::delete("x")).await.is_err());
}
