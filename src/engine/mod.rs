//! Script engine: walks a model reply line by line and produces a report.
//!
//! ## State machine
//!
//! ```text
//! SCANNING → command lines run, directory changes tracked
//!          → first failed command or `error:` directive → FAILED
//! FAILED   → lines still classified and recorded, nothing runs
//! ```
//!
//! Every line is accounted for in the report regardless of state. Failures
//! are data in the report; nothing here returns an error.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::CompoundCd;
use crate::exec::{CancelToken, CommandRunner, RunOutput};
use crate::report::{CommandFailure, CommandOutcome, ScriptReport};
use crate::sandbox::{SandboxError, SandboxState};
use crate::script::chain::{DirectoryChange, directory_change};
use crate::script::placeholder::find_placeholder;
use crate::script::{Classification, classify_script};

/// Per-line notifications for callers that want a trace of a run.
#[derive(Debug, Clone)]
pub enum ScriptEvent<'a> {
    CommandExecuted {
        command: &'a str,
        output: &'a str,
    },
    /// Recorded but not run because an earlier line failed.
    CommandSkipped { command: &'a str },
    DirectoryChanged {
        command: &'a str,
        directory: &'a Path,
    },
    CommandFailed {
        command: &'a str,
        failure: &'a CommandFailure,
    },
    DirectiveReceived { detail: &'a str },
    Finished { report: &'a ScriptReport },
}

/// Receives [`ScriptEvent`]s as the engine processes a script.
pub trait ScriptObserver {
    fn on_event(&mut self, event: &ScriptEvent<'_>);
}

/// Observer that ignores everything.
pub struct NullObserver;

impl ScriptObserver for NullObserver {
    fn on_event(&mut self, _event: &ScriptEvent<'_>) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Scanning,
    Failed,
}

/// Behaviour switches for the engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub compound_cd: CompoundCd,
    pub confine_to_sandbox: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            compound_cd: CompoundCd::default(),
            confine_to_sandbox: true,
        }
    }
}

/// Interprets scripts using a [`CommandRunner`].
///
/// The engine holds no per-run state, so one engine can serve concurrent
/// parses; each parse owns its own [`SandboxState`].
pub struct ScriptEngine<R> {
    runner: R,
    options: EngineOptions,
}

impl<R: CommandRunner> ScriptEngine<R> {
    pub fn new(runner: R, options: EngineOptions) -> Self {
        Self { runner, options }
    }

    /// Interpret `text` with the sandbox root as the starting directory.
    pub fn parse(&self, text: &str, sandbox_root: &Path) -> ScriptReport {
        self.parse_with(text, sandbox_root, &CancelToken::new(), &mut NullObserver)
    }

    /// Like [`parse`](Self::parse), with cancellation and an observer.
    pub fn parse_with(
        &self,
        text: &str,
        sandbox_root: &Path,
        cancel: &CancelToken,
        observer: &mut dyn ScriptObserver,
    ) -> ScriptReport {
        let mut sandbox = SandboxState::new(sandbox_root);
        let mut state = ParseState::Scanning;
        let mut report = ScriptReport::default();

        info!(root = %sandbox_root.display(), "interpreting script");

        for line in classify_script(text) {
            match line {
                Classification::Command(command) => {
                    let outcome = match state {
                        ParseState::Scanning => {
                            self.run_line(&command, &mut sandbox, cancel, observer)
                        }
                        ParseState::Failed => {
                            debug!(command = %command, "skipping command after failure");
                            observer.on_event(&ScriptEvent::CommandSkipped { command: &command });
                            CommandOutcome::Skipped
                        }
                    };
                    if let CommandOutcome::Failed(failure) = &outcome {
                        warn!(command = %command, error = %failure, "script command failed");
                        observer.on_event(&ScriptEvent::CommandFailed {
                            command: &command,
                            failure,
                        });
                        state = ParseState::Failed;
                    }
                    report.record_command(&command, &outcome);
                }
                Classification::ErrorDirective(detail) => {
                    warn!(detail = %detail, "model emitted an error directive");
                    observer.on_event(&ScriptEvent::DirectiveReceived { detail: &detail });
                    report.record_directive(&detail);
                    state = ParseState::Failed;
                }
                Classification::Message(text) => report.record_message(&text),
            }
        }

        info!(
            commands = report.commands.len(),
            results = report.results.len(),
            errors = report.errors.len(),
            is_error = report.is_error,
            "script finished"
        );
        observer.on_event(&ScriptEvent::Finished { report: &report });
        report
    }

    fn run_line(
        &self,
        command: &str,
        sandbox: &mut SandboxState,
        cancel: &CancelToken,
        observer: &mut dyn ScriptObserver,
    ) -> CommandOutcome {
        match directory_change(command) {
            DirectoryChange::None => self.execute(command, sandbox.current(), cancel, observer),
            DirectoryChange::Only { target } => {
                self.change_dir(command, &target, sandbox, observer)
            }
            DirectoryChange::Unsupported => {
                CommandOutcome::Failed(CommandFailure::UnsupportedDirectoryForm {
                    command: command.to_string(),
                })
            }
            DirectoryChange::Compound { target } => match self.options.compound_cd {
                CompoundCd::Reject => {
                    CommandOutcome::Failed(CommandFailure::UnsupportedCompound {
                        command: command.to_string(),
                    })
                }
                CompoundCd::CdOnly => {
                    warn!(
                        command = %command,
                        "only the directory change of a compound line is honoured"
                    );
                    self.change_dir(command, &target, sandbox, observer)
                }
            },
        }
    }

    fn change_dir(
        &self,
        command: &str,
        target: &str,
        sandbox: &mut SandboxState,
        observer: &mut dyn ScriptObserver,
    ) -> CommandOutcome {
        if let Some(placeholder) = find_placeholder(target) {
            debug!(placeholder = placeholder.name, "directory target is unresolved");
            return CommandOutcome::Failed(CommandFailure::Placeholder {
                token: placeholder.token.to_string(),
            });
        }

        match sandbox.change_dir(target, self.options.confine_to_sandbox) {
            Ok(directory) => {
                debug!(directory = %directory.display(), "changed directory");
                observer.on_event(&ScriptEvent::DirectoryChanged { command, directory });
                CommandOutcome::Skipped
            }
            Err(error) => {
                debug!(error = %error, "refused directory change");
                let command = command.to_string();
                CommandOutcome::Failed(match error {
                    SandboxError::Escape { .. } => CommandFailure::SandboxEscape { command },
                    _ => CommandFailure::Unknown { command },
                })
            }
        }
    }

    fn execute(
        &self,
        command: &str,
        work_dir: &Path,
        cancel: &CancelToken,
        observer: &mut dyn ScriptObserver,
    ) -> CommandOutcome {
        let output = self.runner.run(command, work_dir, cancel);

        let failure = match output {
            RunOutput::Success { stdout } => {
                observer.on_event(&ScriptEvent::CommandExecuted {
                    command,
                    output: &stdout,
                });
                return CommandOutcome::Executed(stdout);
            }
            RunOutput::TimedOut { after } => CommandFailure::TimedOut {
                command: command.to_string(),
                secs: after.as_secs(),
            },
            RunOutput::Cancelled => CommandFailure::Cancelled {
                command: command.to_string(),
            },
            other => classify_failure(command, &other),
        };
        CommandOutcome::Failed(failure)
    }
}

/// Pick the user-facing failure for a command that exited unsuccessfully.
fn classify_failure(command: &str, output: &RunOutput) -> CommandFailure {
    if let Some(placeholder) = find_placeholder(command) {
        debug!(placeholder = placeholder.name, "failed command has an unresolved value");
        return CommandFailure::Placeholder {
            token: placeholder.token.to_string(),
        };
    }

    match output {
        RunOutput::CommandNotFound { .. } => CommandFailure::MissingDependency {
            command: command.to_string(),
        },
        _ => CommandFailure::Unknown {
            command: command.to_string(),
        },
    }
}
