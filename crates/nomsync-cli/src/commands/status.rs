//! Status command - Display the state of the local candidate cache
//!
//! Provides the `nomsync status` CLI command which shows:
//! 1. When the cache was last rebuilt and whether it is stale
//! 2. Candidate counts by planner status
//! 3. The planner endpoint in effect and the cached nickname
//!
//! Nothing here touches the network.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use nomsync_core::ports::ICandidateStore;
use nomsync_sync::{resolve_endpoint_url, SyncError};

use super::AppContext;
use crate::output::{get_formatter, OutputFormat};

/// Show cache and endpoint status
#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let (pool, store) = ctx.open_store().await?;
        let snapshot = store.snapshot().await?;
        let nickname = store.cached_nickname().await?;
        let endpoint = match resolve_endpoint_url(store.as_ref(), &ctx.config).await {
            Ok(url) => Some(url),
            Err(SyncError::EndpointNotConfigured) => None,
            Err(e) => return Err(e.into()),
        };
        pool.close().await;

        let now = Utc::now();
        let stale = snapshot.is_stale(now, ctx.config.cache_max_age());
        let counts: BTreeMap<&str, usize> = snapshot
            .candidates
            .as_ref()
            .map(|set| set.count_by_status())
            .unwrap_or_default();
        let total: usize = counts.values().sum();

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "endpoint_url": endpoint,
                "nickname": nickname,
                "last_update": snapshot.last_update.map(|t| t.to_rfc3339()),
                "stale": stale,
                "candidates": total,
                "by_status": counts,
            }));
            return Ok(());
        }

        match &endpoint {
            Some(url) => formatter.success(&format!("Planner endpoint: {url}")),
            None => formatter.warn(
                "No planner endpoint configured. Run 'nomsync config set-endpoint <URL>'.",
            ),
        }
        formatter.info(&format!(
            "Last reload:  {}",
            describe_last_update(snapshot.last_update, now)
        ));
        if stale {
            formatter.info("Cache is stale and will be rebuilt on the next sync");
        }
        if let Some(name) = nickname {
            formatter.info(&format!("Nickname:     {name}"));
        }

        formatter.info(&format!("Candidates:   {total}"));
        for (status, count) in &counts {
            formatter.info(&format!("  {:<15} {}", status, count));
        }
        Ok(())
    }
}

fn describe_last_update(last_update: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = last_update else {
        return "never".to_string();
    };

    let age = now.signed_duration_since(at);
    let ago = if age.num_days() > 0 {
        format!("{}d ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{}h ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{}m ago", age.num_minutes())
    } else {
        "just now".to_string()
    };
    format!("{} ({ago})", at.format("%Y-%m-%d %H:%M UTC"))
}
