//! Shared test helpers for remote integration tests
//!
//! Each helper mounts the necessary mock endpoints and returns a client
//! pointing at the mock server.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nomsync_remote::{PlannerClient, ProfileClient};

/// Path the planner endpoint is served under
pub const PLANNER_PATH: &str = "/macros/exec";

/// Path the profile API is served under
pub const PROFILE_PATH: &str = "/api/v1/vault/properties";

/// Starts a mock server and returns a planner client pointing at it
pub async fn setup_planner_mock() -> (MockServer, PlannerClient) {
    let server = MockServer::start().await;
    let client = PlannerClient::new(format!("{}{}", server.uri(), PLANNER_PATH))
        .expect("mock server URI is valid");
    (server, client)
}

/// Starts a mock server and returns a profile client pointing at it
pub async fn setup_profile_mock() -> (MockServer, ProfileClient) {
    let server = MockServer::start().await;
    let client = ProfileClient::new(format!("{}{}", server.uri(), PROFILE_PATH))
        .expect("mock server URI is valid");
    (server, client)
}

/// Mounts a planner listing
pub async fn mount_planner_rows(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(PLANNER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts a profile response
pub async fn mount_profile(server: &MockServer, status: u16, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(PROFILE_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}
