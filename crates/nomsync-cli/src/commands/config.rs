//! Config command - View and manage nomsync configuration
//!
//! Provides the `nomsync config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Stores the planner endpoint in the cache database
//! 3. Sets individual configuration values via dot-notation keys
//! 4. Validates the configuration file and reports errors

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use nomsync_core::config::Config;
use nomsync_core::domain::StatusTableVersion;
use nomsync_core::ports::ICandidateStore;
use nomsync_remote::PlannerClient;
use tracing::info;

use super::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Store the planner endpoint URL
    SetEndpoint {
        /// Planner web app URL (http or https)
        url: String,
    },
    /// Set a configuration file value
    Set {
        /// Configuration key (e.g., "sync.concurrency")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx, format),
            ConfigCommand::SetEndpoint { url } => {
                self.execute_set_endpoint(ctx, url, format).await
            }
            ConfigCommand::Set { key, value } => self.execute_set(ctx, key, value, format),
            ConfigCommand::Validate => self.execute_validate(ctx, format),
        }
    }

    fn execute_show(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        if format.is_json() {
            let json = serde_json::to_value(&ctx.config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&ctx.config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    async fn execute_set_endpoint(
        &self,
        ctx: &AppContext,
        url: &str,
        format: OutputFormat,
    ) -> Result<()> {
        let formatter = get_formatter(format);

        // Only used to validate the URL
        let client = PlannerClient::new(url.trim())?;
        let endpoint = client.endpoint_url().to_string();

        let (pool, store) = ctx.open_store().await?;
        store.set_endpoint_url(&endpoint).await?;
        pool.close().await;

        info!(endpoint = %endpoint, "Stored planner endpoint");
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "endpoint_url": endpoint,
            }));
        } else {
            formatter.success(&format!("Planner endpoint set to {endpoint}"));
        }
        Ok(())
    }

    fn execute_set(
        &self,
        ctx: &AppContext,
        key: &str,
        value: &str,
        format: OutputFormat,
    ) -> Result<()> {
        let formatter = get_formatter(format);

        let mut config = ctx.config.clone();
        if let Err(e) = apply_config_value(&mut config, key, value) {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{}': {:#}", key, e));
                formatter.info("");
                formatter.info("Supported keys:");
                for (name, help) in SUPPORTED_KEYS {
                    formatter.info(&format!("  {:<30} - {}", name, help));
                }
            }
            anyhow::bail!("configuration unchanged");
        }

        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "errors": messages,
                }));
            } else {
                formatter.error(&format!(
                    "Invalid value for '{}': {}",
                    key,
                    messages.join("; ")
                ));
            }
            anyhow::bail!("configuration unchanged");
        }

        config
            .save(&ctx.config_path)
            .context("Failed to write configuration file")?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": ctx.config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {} = {}", key, value));
            formatter.info(&format!("Saved to {}", ctx.config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let path = &ctx.config_path;

        // Load explicitly: a parse error must be reported, not defaulted
        let config = match Config::load(path) {
            Ok(cfg) => cfg,
            Err(_) if !path.exists() => {
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": true,
                        "config_path": path.display().to_string(),
                        "errors": [],
                        "defaults": true,
                    }));
                } else {
                    formatter.success("No configuration file, defaults are in effect");
                    formatter.info(&format!("Expected at {}", path.display()));
                }
                return Ok(());
            }
            Err(e) => {
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {e:#}")],
                    }));
                } else {
                    formatter.error(&format!("Failed to parse configuration: {e:#}"));
                    formatter.info(&format!("File: {}", path.display()));
                }
                anyhow::bail!("invalid configuration");
            }
        };

        let errors = config.validate();

        if format.is_json() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path.display().to_string(),
                "errors": messages,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                super::plural(errors.len())
            ));
            formatter.info(&format!("File: {}", path.display()));
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("invalid configuration")
        }
    }
}

const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("sync.concurrency", "Parallel planner requests"),
    ("sync.retry_limit", "Attempts per planner request"),
    ("sync.cache_max_age_hours", "Hours before the cache is rebuilt"),
    ("matching.cell_level", "Cell subdivision level"),
    ("matching.same_title_meters", "Placeholder radius, same title"),
    ("matching.cross_title_meters", "Placeholder radius, other titles"),
    ("matching.status_table", "v1|v2"),
    ("remote.endpoint_url", "Fallback planner endpoint (or 'none')"),
    ("remote.profile_url", "Profile API URL"),
    ("remote.nickname_fallback", "Nickname when the profile is unavailable"),
    ("remote.request_timeout_secs", "HTTP timeout in seconds"),
    ("storage.database", "Cache database path"),
    ("inbox.directory", "Directory watched for batch files"),
    ("inbox.debounce_ms", "Quiet period before a batch is read"),
    ("inbox.remove_processed", "true|false"),
    ("logging.level", "trace|debug|info|warn|error"),
];

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- sync ---
        "sync.concurrency" => {
            config.sync.concurrency = value
                .parse()
                .context("Expected a positive integer for sync.concurrency")?;
        }
        "sync.retry_limit" => {
            config.sync.retry_limit = value
                .parse()
                .context("Expected a positive integer for sync.retry_limit")?;
        }
        "sync.cache_max_age_hours" => {
            config.sync.cache_max_age_hours = value
                .parse()
                .context("Expected a positive integer for sync.cache_max_age_hours")?;
        }

        // --- matching ---
        "matching.cell_level" => {
            config.matching.cell_level = value.parse().context("Expected a cell level")?;
        }
        "matching.same_title_meters" => {
            config.matching.same_title_meters = value.parse().context("Expected a distance")?;
        }
        "matching.cross_title_meters" => {
            config.matching.cross_title_meters = value.parse().context("Expected a distance")?;
        }
        "matching.status_table" => {
            config.matching.status_table = serde_yaml::from_str::<StatusTableVersion>(value)
                .context("Expected v1 or v2")?;
        }

        // --- remote ---
        "remote.endpoint_url" => {
            config.remote.endpoint_url = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.to_string())
            };
        }
        "remote.profile_url" => config.remote.profile_url = value.to_string(),
        "remote.nickname_fallback" => config.remote.nickname_fallback = value.to_string(),
        "remote.request_timeout_secs" => {
            config.remote.request_timeout_secs =
                value.parse().context("Expected a positive integer")?;
        }

        // --- storage / inbox ---
        "storage.database" => config.storage.database = PathBuf::from(value),
        "inbox.directory" => config.inbox.directory = PathBuf::from(value),
        "inbox.debounce_ms" => {
            config.inbox.debounce_ms = value.parse().context("Expected a positive integer")?;
        }
        "inbox.remove_processed" => {
            config.inbox.remove_processed = value.parse().context("Expected true or false")?;
        }

        // --- logging ---
        "logging.level" => config.logging.level = value.to_string(),

        _ => anyhow::bail!("Unknown configuration key: '{}'", key),
    }

    Ok(())
}
