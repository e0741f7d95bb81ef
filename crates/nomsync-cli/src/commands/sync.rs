//! Sync command - Reconcile one submission batch against the planner
//!
//! Provides the `nomsync sync` CLI command which:
//! 1. Loads configuration and opens the cache database
//! 2. Resolves the planner endpoint and builds a session
//! 3. Processes one batch file (given, or the first to land in the inbox)
//! 4. Waits for every change event to be delivered and prints a summary

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use nomsync_sync::watcher::is_file_stable;
use nomsync_sync::{is_batch_file, pending_batch_files, watch_once, BatchOutcome, QueueStats};
use tracing::info;

use super::{plural, AppContext};
use crate::output::{get_formatter, ConsoleProgress, OutputFormat, OutputFormatter};

/// Process a submission batch file
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Batch file to process
    #[arg(required_unless_present = "wait")]
    pub file: Option<PathBuf>,

    /// Wait for the first batch file to appear in the inbox
    #[arg(long, conflicts_with = "file")]
    pub wait: bool,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let (pool, store) = ctx.open_store().await?;
        let session = ctx
            .build_session(store, Arc::new(ConsoleProgress::new(format)))
            .await?;

        let (path, remove) = match &self.file {
            Some(file) => (file.clone(), false),
            None => (
                self.wait_for_inbox(ctx, &*formatter).await?,
                ctx.config.inbox.remove_processed,
            ),
        };

        info!(path = %path.display(), "Processing batch file");
        let outcome = session.process_file(&path, remove).await?;

        if !outcome.report.events.is_empty() {
            formatter.info(&format!(
                "Sending {} planner update{}...",
                outcome.report.events.len(),
                plural(outcome.report.events.len())
            ));
        }
        session.queue().wait_idle().await;
        let stats = session.queue().stats();
        pool.close().await;

        if format.is_json() {
            formatter.print_json(&summary_json(&path, &outcome, &stats));
        } else {
            print_summary(&*formatter, &outcome, &stats);
        }
        Ok(())
    }

    async fn wait_for_inbox(
        &self,
        ctx: &AppContext,
        formatter: &dyn OutputFormatter,
    ) -> Result<PathBuf> {
        let inbox = &ctx.config.inbox.directory;
        tokio::fs::create_dir_all(inbox)
            .await
            .with_context(|| format!("Failed to create inbox {}", inbox.display()))?;

        let path = match pending_batch_files(inbox).await?.into_iter().next() {
            Some(existing) => existing,
            None => {
                formatter.info(&format!("Waiting for a batch file in {}", inbox.display()));
                watch_once(inbox, is_batch_file).await?
            }
        };

        // Let the writer finish before reading
        let settle = Duration::from_millis(ctx.config.inbox.debounce_ms);
        while !is_file_stable(&path, settle).await {
            if !path.exists() {
                anyhow::bail!("Batch file {} disappeared", path.display());
            }
        }
        Ok(path)
    }
}

fn summary_json(path: &Path, outcome: &BatchOutcome, stats: &QueueStats) -> serde_json::Value {
    let report = &outcome.report;
    serde_json::json!({
        "file": path.display().to_string(),
        "created": report.created,
        "updated": report.updated,
        "deleted": report.deleted,
        "placeholders_removed": report.placeholders_removed,
        "skipped": report.skipped,
        "ignored": report.ignored,
        "undecodable": outcome.undecodable,
        "cache_updated": outcome.persisted,
        "delivered": stats.delivered,
        "failed": stats.failed,
    })
}

fn print_summary(formatter: &dyn OutputFormatter, outcome: &BatchOutcome, stats: &QueueStats) {
    let report = &outcome.report;

    if report.events.is_empty() {
        formatter.success("Planner already up to date");
    } else if stats.failed == 0 {
        formatter.success(&format!(
            "Applied {} planner update{}",
            stats.delivered,
            plural(stats.delivered as usize)
        ));
    } else {
        formatter.warn(&format!(
            "{} of {} planner update{} failed",
            stats.failed,
            report.events.len(),
            plural(report.events.len())
        ));
    }

    let lines = [
        ("Created", report.created),
        ("Updated", report.updated),
        ("Deleted", report.deleted),
        ("Placeholders", report.placeholders_removed),
        ("Skipped", report.skipped),
    ];
    for (label, count) in lines {
        if count > 0 {
            formatter.info(&format!("{:<13} {}", format!("{label}:"), count));
        }
    }
    if outcome.undecodable > 0 {
        formatter.warn(&format!(
            "{} entr{} in the batch could not be read",
            outcome.undecodable,
            if outcome.undecodable == 1 { "y" } else { "ies" }
        ));
    }
}
