use nomsync_core::domain::ChangeEvent;
use nomsync_core::ports::{IProgressSink, ProgressUpdate};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
    /// Human output reduced to warnings and errors
    Quiet,
}

impl OutputFormat {
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        match (json, quiet) {
            (true, _) => OutputFormat::Json,
            (false, true) => OutputFormat::Quiet,
            (false, false) => OutputFormat::Human,
        }
    }

    pub fn is_json(self) -> bool {
        self == OutputFormat::Json
    }
}

/// Trait for formatting CLI output
pub trait OutputFormatter: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// Human formatter that only surfaces problems
pub struct QuietFormatter;

impl OutputFormatter for QuietFormatter {
    fn success(&self, _message: &str) {}
    fn error(&self, message: &str) {
        HumanFormatter.error(message);
    }
    fn warn(&self, message: &str) {
        HumanFormatter.warn(message);
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({"success": true, "message": message})
        );
    }
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn warn(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"level": "warning", "message": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Human => Box::new(HumanFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Quiet => Box::new(QuietFormatter),
    }
}

/// Shows delivery progress while the queue drains
///
/// Human output prints the remaining count; JSON output emits one
/// [`ProgressUpdate`] object per line on stderr so stdout stays a single
/// document.
pub struct ConsoleProgress {
    format: OutputFormat,
}

impl ConsoleProgress {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn emit(&self, update: &ProgressUpdate) {
        if let Ok(line) = serde_json::to_string(update) {
            eprintln!("{line}");
        }
    }
}

impl IProgressSink for ConsoleProgress {
    fn report_depth(&self, remaining: usize) {
        match self.format {
            OutputFormat::Json => self.emit(&ProgressUpdate::Depth { remaining }),
            OutputFormat::Human => println!("  {remaining} planner update(s) remaining"),
            OutputFormat::Quiet => {}
        }
    }

    fn report_failure(&self, event: &ChangeEvent, error: &str) {
        match self.format {
            OutputFormat::Json => self.emit(&ProgressUpdate::Failed {
                event: event.clone(),
                error: error.to_string(),
            }),
            _ => HumanFormatter.error(&format!("Giving up on {event}: {error}")),
        }
    }
}
