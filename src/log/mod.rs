//! Structured execution log: JSON lines per run.
//!
//! Every script run appends to a `.jsonl` file: where the script came from,
//! each command that ran, was skipped or failed, directory changes, and the
//! final tally. Each line is a self-contained JSON object carrying a
//! timestamp and the run id, so runs can be grepped and post-processed.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::{ScriptEvent, ScriptObserver};
use crate::report::ErrorCategory;

/// Default log location, kept outside the sandbox so scripts never see it.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| log_path_under(&dir))
}

fn log_path_under(base: &Path) -> PathBuf {
    base.join("sandscript").join("logs").join("runs.jsonl")
}

/// A structured event in the execution log.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// RFC 3339 timestamp (UTC).
    pub timestamp: String,
    pub run_id: String,
    #[serde(flatten)]
    pub event: LogEvent,
}

/// All event types that can appear in the execution log.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    /// A run began.
    RunStarted { source: String, query: String },
    /// Script text was obtained.
    ScriptReceived { lines: usize },
    /// The script source failed; nothing was parsed.
    BackendFailed { reason: String },
    CommandExecuted { command: String, output_bytes: usize },
    /// Recorded after an earlier failure, not run.
    CommandSkipped { command: String },
    DirectoryChanged { command: String, directory: String },
    CommandFailed {
        command: String,
        category: ErrorCategory,
        message: String,
    },
    /// The model emitted an `error:` line.
    DirectiveReceived { detail: String },
    RunCompleted {
        commands: usize,
        results: usize,
        errors: usize,
        is_error: bool,
    },
}

/// Writer for JSON lines execution logs.
pub struct ExecutionLog {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
    run_id: String,
}

impl ExecutionLog {
    /// Open the log at `path` for a new run.
    ///
    /// Creates the file (and parent directories) if they don't exist.
    /// Appends to an existing file.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file: {}", path.display()))?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
            run_id: Uuid::new_v4().to_string(),
        })
    }

    /// Log an event.
    pub fn log(&self, event: LogEvent) -> Result<()> {
        let entry = LogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            run_id: self.run_id.clone(),
            event,
        };

        let json = serde_json::to_string(&entry).context("failed to serialize log entry")?;

        debug!(event = %json, "execution log");

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("execution log writer poisoned"))?;
        writeln!(writer, "{json}").context("failed to write log entry")?;
        writer.flush().context("failed to flush log")?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl From<&ScriptEvent<'_>> for LogEvent {
    fn from(event: &ScriptEvent<'_>) -> Self {
        match event {
            ScriptEvent::CommandExecuted { command, output } => LogEvent::CommandExecuted {
                command: command.to_string(),
                output_bytes: output.len(),
            },
            ScriptEvent::CommandSkipped { command } => LogEvent::CommandSkipped {
                command: command.to_string(),
            },
            ScriptEvent::DirectoryChanged { command, directory } => LogEvent::DirectoryChanged {
                command: command.to_string(),
                directory: directory.display().to_string(),
            },
            ScriptEvent::CommandFailed { command, failure } => LogEvent::CommandFailed {
                command: command.to_string(),
                category: failure.category(),
                message: failure.to_string(),
            },
            ScriptEvent::DirectiveReceived { detail } => LogEvent::DirectiveReceived {
                detail: detail.to_string(),
            },
            ScriptEvent::Finished { report } => LogEvent::RunCompleted {
                commands: report.commands.len(),
                results: report.results.len(),
                errors: report.errors.len(),
                is_error: report.is_error,
            },
        }
    }
}

/// Forwards engine events into an [`ExecutionLog`].
///
/// Write failures are reported through `tracing` and otherwise ignored so a
/// broken log file never changes the outcome of a run.
pub struct LogObserver<'a> {
    log: &'a ExecutionLog,
}

impl<'a> LogObserver<'a> {
    pub fn new(log: &'a ExecutionLog) -> Self {
        Self { log }
    }
}

impl ScriptObserver for LogObserver<'_> {
    fn on_event(&mut self, event: &ScriptEvent<'_>) {
        if let Err(error) = self.log.log(event.into()) {
            warn!(error = %error, path = %self.log.path().display(), "failed to write execution log");
        }
    }
}
