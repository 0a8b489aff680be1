//! Unresolved `<value>` tokens left in a command by the model.

use std::sync::LazyLock;

use regex::Regex;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(.*?)>").expect("placeholder pattern is valid"));

/// The first bracketed token found in a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'a> {
    /// The token including its brackets, e.g. `<username>`.
    pub token: &'a str,
    /// The text between the brackets, e.g. `username`.
    pub name: &'a str,
}

/// Find the first `<...>` token, taking the shortest inner content.
pub fn find_placeholder(command: &str) -> Option<Placeholder<'_>> {
    let caps = PLACEHOLDER.captures(command)?;
    let token = caps.get(0)?.as_str();
    let name = caps.get(1)?.as_str();
    Some(Placeholder { token, name })
}
