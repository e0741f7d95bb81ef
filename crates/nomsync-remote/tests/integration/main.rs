//! Integration tests for nomsync-remote
//!
//! Uses wiremock to simulate the planner endpoint and the profile API and
//! verifies end-to-end behavior of the planner feed, change delivery and
//! nickname resolution.

mod common;

mod test_planner_feed;
mod test_profile;
mod test_sync_endpoint;
