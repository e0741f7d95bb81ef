//! Planner endpoint client
//!
//! The planner serves both directions on one URL: a plain `GET` returns
//! every row as JSON, and a form-encoded `POST` applies one change.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nomsync_remote::client::PlannerClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = PlannerClient::new("https://planner.example/exec")?;
//! let rows = client.fetch_planner().await?;
//! println!("{} planner rows", rows.len());
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use nomsync_core::domain::{ChangeEvent, PlannerRecord};
use nomsync_core::ports::{IPlannerFeed, ISyncEndpoint};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{parse_http_url, RemoteError};

/// HTTP client for the planner endpoint
#[derive(Debug, Clone)]
pub struct PlannerClient {
    client: Client,
    endpoint_url: String,
}

impl PlannerClient {
    /// Creates a client with default HTTP settings
    ///
    /// # Errors
    /// [`RemoteError::InvalidUrl`] when `endpoint_url` is not an http(s) URL.
    pub fn new(endpoint_url: impl AsRef<str>) -> Result<Self, RemoteError> {
        Self::with_client(Client::new(), endpoint_url)
    }

    /// Creates a client sharing an existing `reqwest::Client`
    pub fn with_client(client: Client, endpoint_url: impl AsRef<str>) -> Result<Self, RemoteError> {
        let url = parse_http_url(endpoint_url.as_ref())?;
        Ok(Self {
            client,
            endpoint_url: url.to_string(),
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Reads every planner row
    ///
    /// Accepts a bare JSON array or an object wrapping it under `result`.
    /// Entries that are not objects are skipped with a warning.
    pub async fn fetch_planner(&self) -> Result<Vec<PlannerRecord>> {
        debug!(url = %self.endpoint_url, "Fetching planner rows");

        let response = self
            .client
            .get(&self.endpoint_url)
            .send()
            .await
            .context("Failed to fetch planner")?;
        let body: Value = check_status(response)?
            .json()
            .await
            .context("Failed to parse planner response")?;

        let entries = planner_entries(body)?;
        let total = entries.len();
        let rows: Vec<PlannerRecord> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable planner row");
                    None
                }
            })
            .collect();

        debug!(total, decoded = rows.len(), "Planner rows fetched");
        Ok(rows)
    }

    /// Applies one change event
    pub async fn deliver(&self, event: &ChangeEvent) -> Result<()> {
        debug!(%event, "Posting change event");

        let response = self
            .client
            .post(&self.endpoint_url)
            .form(&event.form_fields())
            .send()
            .await
            .with_context(|| format!("Failed to send {event}"))?;
        check_status(response).with_context(|| format!("Planner rejected {event}"))?;

        Ok(())
    }
}

fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(RemoteError::Status {
            url: response.url().to_string(),
            status: status.as_u16(),
        })
    }
}

fn planner_entries(body: Value) -> Result<Vec<Value>, RemoteError> {
    match body {
        Value::Array(entries) => Ok(entries),
        Value::Object(mut map) => match map.remove("result") {
            Some(Value::Array(entries)) => Ok(entries),
            _ => Err(RemoteError::InvalidResponse(
                "planner response has no row list".to_string(),
            )),
        },
        other => Err(RemoteError::InvalidResponse(format!(
            "expected a JSON array of rows, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Port implementations
// ============================================================================

#[async_trait::async_trait]
impl IPlannerFeed for PlannerClient {
    async fn fetch_planner(&self) -> anyhow::Result<Vec<PlannerRecord>> {
        PlannerClient::fetch_planner(self).await
    }
}

#[async_trait::async_trait]
impl ISyncEndpoint for PlannerClient {
    async fn deliver(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        PlannerClient::deliver(self, event).await
    }
}
