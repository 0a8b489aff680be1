//! The structured result of one script run and the failure taxonomy.

use serde::Serialize;
use thiserror::Error;

/// Broad failure kinds, used for logging and presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Placeholder,
    MissingDependency,
    Unknown,
    Directive,
    Unsupported,
    Escape,
    TimedOut,
    Cancelled,
}

/// Why a command line failed. The `Display` text is what ends up in the
/// report's `errors` list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandFailure {
    #[error("You can replace {token} with appropriate value.")]
    Placeholder { token: String },

    #[error(
        "Running `{command}` returned in error as the required package to run the command not found."
    )]
    MissingDependency { command: String },

    #[error("Unknown error occurred while running: {command}")]
    Unknown { command: String },

    #[error("Unsupported compound directory change in: `{command}`")]
    UnsupportedCompound { command: String },

    #[error("Unsupported directory change form in: `{command}`")]
    UnsupportedDirectoryForm { command: String },

    #[error("Directory change escapes the sandbox: `{command}`")]
    SandboxEscape { command: String },

    #[error("Command timed out after {secs}s: {command}")]
    TimedOut { command: String, secs: u64 },

    #[error("Execution cancelled before completion: {command}")]
    Cancelled { command: String },
}

impl CommandFailure {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CommandFailure::Placeholder { .. } => ErrorCategory::Placeholder,
            CommandFailure::MissingDependency { .. } => ErrorCategory::MissingDependency,
            CommandFailure::Unknown { .. } => ErrorCategory::Unknown,
            CommandFailure::UnsupportedCompound { .. }
            | CommandFailure::UnsupportedDirectoryForm { .. } => ErrorCategory::Unsupported,
            CommandFailure::SandboxEscape { .. } => ErrorCategory::Escape,
            CommandFailure::TimedOut { .. } => ErrorCategory::TimedOut,
            CommandFailure::Cancelled { .. } => ErrorCategory::Cancelled,
        }
    }
}

/// What happened to a single command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Ran successfully; captured stdout.
    Executed(String),
    /// Recorded but not run: a directory change, or a line after a failure.
    Skipped,
    Failed(CommandFailure),
}

/// Aggregate result of one parse, in encounter order.
///
/// Serializes as `{"commands", "results", "errors", "messages", "isError"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptReport {
    pub commands: Vec<String>,
    pub results: Vec<String>,
    pub errors: Vec<String>,
    pub messages: Vec<String>,
    pub is_error: bool,
}

impl ScriptReport {
    /// Record a command line and its outcome.
    pub fn record_command(&mut self, command: &str, outcome: &CommandOutcome) {
        self.commands.push(command.to_string());
        match outcome {
            CommandOutcome::Executed(output) => self.results.push(output.clone()),
            CommandOutcome::Skipped => {}
            CommandOutcome::Failed(failure) => {
                self.errors.push(failure.to_string());
                self.is_error = true;
            }
        }
    }

    /// Record the model's own `error:` directive.
    pub fn record_directive(&mut self, detail: &str) {
        self.errors.push(detail.to_string());
        self.is_error = true;
    }

    pub fn record_message(&mut self, text: &str) {
        self.messages.push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_messages_match_presentation_text() {
        assert_eq!(
            CommandFailure::Placeholder {
                token: "<name>".to_string()
            }
            .to_string(),
            "You can replace <name> with appropriate value."
        );
        assert_eq!(
            CommandFailure::MissingDependency {
                command: "npm init".to_string()
            }
            .to_string(),
            "Running `npm init` returned in error as the required package to run the command not found."
        );
        assert_eq!(
            CommandFailure::Unknown {
                command: "false".to_string()
            }
            .to_string(),
            "Unknown error occurred while running: false"
        );
    }

    #[test]
    fn failure_categories() {
        let failure = CommandFailure::TimedOut {
            command: "sleep 10".to_string(),
            secs: 2,
        };
        assert_eq!(failure.category(), ErrorCategory::TimedOut);
        assert_eq!(failure.to_string(), "Command timed out after 2s: sleep 10");
        assert_eq!(
            CommandFailure::SandboxEscape {
                command: "cd ..".to_string()
            }
            .category(),
            ErrorCategory::Escape
        );
    }

    #[test]
    fn record_command_routes_outcomes() {
        let mut report = ScriptReport::default();
        report.record_command("echo hi", &CommandOutcome::Executed("hi\n".to_string()));
        report.record_command("cd x", &CommandOutcome::Skipped);
        report.record_command(
            "false",
            &CommandOutcome::Failed(CommandFailure::Unknown {
                command: "false".to_string(),
            }),
        );

        assert_eq!(report.commands, vec!["echo hi", "cd x", "false"]);
        assert_eq!(report.results, vec!["hi\n"]);
        assert_eq!(report.errors, vec!["Unknown error occurred while running: false"]);
        assert!(report.is_error);
    }

    #[test]
    fn directive_sets_error_flag() {
        let mut report = ScriptReport::default();
        report.record_directive("missing info");
        assert_eq!(report.errors, vec!["missing info"]);
        assert!(report.is_error);
        assert!(report.commands.is_empty());
    }

    #[test]
    fn serializes_with_presentation_field_names() {
        let mut report = ScriptReport::default();
        report.record_message("");
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["isError"], false);
        assert_eq!(value["messages"][0], "");
        for key in ["commands", "results", "errors", "messages"] {
            assert!(value[key].is_array(), "missing array field {key}");
        }
    }

    #[test]
    fn category_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorCategory::MissingDependency).unwrap();
        assert_eq!(json, "\"missing-dependency\"");
    }
}
