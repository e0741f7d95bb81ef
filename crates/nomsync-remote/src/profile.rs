//! Profile API client
//!
//! Resolves the display name that is attached to every non-delete change
//! event. Caching and fallback are the caller's concern; this client only
//! reports what the API says.

use anyhow::{Context, Result};
use nomsync_core::ports::IProfileResolver;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{parse_http_url, RemoteError};

/// Profile response, either `{"result": {"nickname": ..}}` or `{"nickname": ..}`
#[derive(Debug, Deserialize)]
struct ProfileResponse {
    result: Option<ProfileBody>,
    nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileBody {
    nickname: Option<String>,
}

impl ProfileResponse {
    fn into_nickname(self) -> Option<String> {
        self.result
            .and_then(|body| body.nickname)
            .or(self.nickname)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }
}

/// HTTP client for the profile API
#[derive(Debug, Clone)]
pub struct ProfileClient {
    client: Client,
    profile_url: String,
}

impl ProfileClient {
    pub fn new(profile_url: impl AsRef<str>) -> Result<Self, RemoteError> {
        Self::with_client(Client::new(), profile_url)
    }

    pub fn with_client(client: Client, profile_url: impl AsRef<str>) -> Result<Self, RemoteError> {
        let url = parse_http_url(profile_url.as_ref())?;
        Ok(Self {
            client,
            profile_url: url.to_string(),
        })
    }

    /// Fetches the current user's nickname
    pub async fn fetch_nickname(&self) -> Result<String> {
        debug!(url = %self.profile_url, "Fetching profile");

        let profile: ProfileResponse = self
            .client
            .get(&self.profile_url)
            .send()
            .await
            .context("Failed to fetch profile")?
            .error_for_status()
            .context("Profile request returned error status")?
            .json()
            .await
            .context("Failed to parse profile response")?;

        let nickname = profile
            .into_nickname()
            .ok_or_else(|| RemoteError::InvalidResponse("profile has no nickname".to_string()))?;
        debug!(%nickname, "Resolved nickname");
        Ok(nickname)
    }
}

#[async_trait::async_trait]
impl IProfileResolver for ProfileClient {
    async fn resolve_nickname(&self) -> anyhow::Result<String> {
        self.fetch_nickname().await
    }
}
