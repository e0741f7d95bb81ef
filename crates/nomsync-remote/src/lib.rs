//! nomsync Remote - HTTP adapters for the planner and profile APIs
//!
//! Provides async clients for:
//! - Reading the full candidate listing from the planner endpoint
//! - Delivering change events to the same endpoint as form posts
//! - Resolving the uploader's display name from the profile API
//!
//! ## Modules
//!
//! - [`client`] - Planner endpoint client (`IPlannerFeed` + `ISyncEndpoint`)
//! - [`profile`] - Profile API client (`IProfileResolver`)

pub mod client;
pub mod profile;

use std::time::Duration;

use thiserror::Error;

pub use client::PlannerClient;
pub use profile::ProfileClient;

/// Errors that can occur when talking to the remote planner or profile API
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The configured URL cannot be used
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The server answered with a non-success status
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The response could not be parsed or was missing expected fields
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Builds the shared HTTP client with a per-request timeout
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, RemoteError> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("nomsync/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Parses and checks an http(s) URL
pub(crate) fn parse_http_url(raw: &str) -> Result<url::Url, RemoteError> {
    let parsed = url::Url::parse(raw.trim()).map_err(|e| RemoteError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(RemoteError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_http_url() {
        assert!(parse_http_url("https://planner.example/exec").is_ok());
        assert!(parse_http_url(" http://localhost:8080/x ").is_ok());
        assert!(matches!(
            parse_http_url("ftp://planner.example"),
            Err(RemoteError::InvalidUrl { .. })
        ));
        assert!(matches!(
            parse_http_url("not a url"),
            Err(RemoteError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_status_error_display() {
        let err = RemoteError::Status {
            url: "https://planner.example/exec".into(),
            status: 503,
        };
        assert_eq!(err.to_string(), "https://planner.example/exec returned HTTP 503");
    }

    #[test]
    fn test_http_client_builds() {
        assert!(http_client(Duration::from_secs(5)).is_ok());
    }
}
