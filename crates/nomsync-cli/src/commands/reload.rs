//! Reload command - Rebuild the candidate cache from the planner

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use nomsync_core::ports::NullProgressSink;
use nomsync_sync::ReloadSummary;

use super::{plural, AppContext};
use crate::output::{get_formatter, OutputFormat};

/// Force a full reload of the candidate cache
#[derive(Debug, Args)]
pub struct ReloadCommand {}

impl ReloadCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let (pool, store) = ctx.open_store().await?;
        let session = ctx.build_session(store, Arc::new(NullProgressSink)).await?;

        formatter.info("Fetching planner rows...");
        let summary = session.reload().await?;
        pool.close().await;

        if format.is_json() {
            formatter.print_json(&summary_json(&summary));
            return Ok(());
        }

        formatter.success(&format!(
            "Cached {} candidate{}",
            summary.loaded,
            plural(summary.loaded)
        ));
        if summary.unrecognized > 0 {
            formatter.info(&format!(
                "Ignored {} row{} with an untracked status",
                summary.unrecognized,
                plural(summary.unrecognized)
            ));
        }
        if summary.malformed > 0 {
            formatter.warn(&format!(
                "Skipped {} incomplete row{}",
                summary.malformed,
                plural(summary.malformed)
            ));
        }
        Ok(())
    }
}

fn summary_json(summary: &ReloadSummary) -> serde_json::Value {
    serde_json::json!({
        "loaded": summary.loaded,
        "unrecognized": summary.unrecognized,
        "malformed": summary.malformed,
    })
}
