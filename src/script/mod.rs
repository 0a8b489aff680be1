//! Line-level interpretation of a model-generated automation script.
//!
//! A script is plain text, one directive per line:
//!
//! ```text
//! - mkdir project          → command, run in the sandbox
//! error: not enough info   → the model gave up; surfaced verbatim
//! anything else            → message for the user (blank lines included)
//! ```

pub mod chain;
pub mod placeholder;

const COMMAND_PREFIX: &str = "-";
const COMMAND_MARKER: &str = "- ";
const ERROR_PREFIX: &str = "error:";

/// What a single script line means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A shell command; the text has the leading `- ` marker removed.
    Command(String),
    /// The model's own `error:` directive, trimmed.
    ErrorDirective(String),
    /// Any other line, verbatim.
    Message(String),
}

/// Classify one line. The caller is expected to trim it first.
pub fn classify_line(line: &str) -> Classification {
    if line.starts_with(COMMAND_PREFIX) {
        let text = line.strip_prefix(COMMAND_MARKER).unwrap_or(line);
        return Classification::Command(text.to_string());
    }

    if let Some(rest) = line.strip_prefix(ERROR_PREFIX) {
        return Classification::ErrorDirective(rest.trim().to_string());
    }

    Classification::Message(line.to_string())
}

/// Split raw model output into trimmed lines and classify each of them.
///
/// Splits on `\n` only, so a trailing newline yields a final empty message,
/// the same as any other blank line.
pub fn classify_script(text: &str) -> impl Iterator<Item = Classification> + '_ {
    text.split('\n').map(|line| classify_line(line.trim()))
}

/// Command texts of a script, in order, without running anything.
pub fn script_commands(text: &str) -> Vec<String> {
    classify_script(text)
        .filter_map(|line| match line {
            Classification::Command(command) => Some(command),
            _ => None,
        })
        .collect()
}
