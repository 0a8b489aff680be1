//! Script sources: where automation scripts come from.
//!
//! The CLI asks a [`ScriptSource`] to turn a user request into script text
//! before the engine ever runs. [`OllamaBackend`] makes one blocking HTTP call
//! to a local text-generation server; [`FixtureSource`] answers from a TOML
//! table so runs can be reproduced offline.
//!
//! Failures here are [`BackendError`]s and never reach the script report:
//! if no script text is obtained, nothing is parsed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("could not reach model backend at {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("model backend returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("could not decode model backend response: {0}")]
    Decode(String),

    #[error("no fixture answer for query: {0}")]
    UnknownQuery(String),

    #[error("failed to load fixtures from {}: {reason}", path.display())]
    Fixture { path: PathBuf, reason: String },
}

/// Turns a user request into script text.
pub trait ScriptSource {
    /// Short description for logs, e.g. `ollama:mistral`.
    fn describe(&self) -> String;

    fn fetch(&self, query: &str) -> Result<String, BackendError>;
}

impl<S: ScriptSource + ?Sized> ScriptSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn fetch(&self, query: &str) -> Result<String, BackendError> {
        (**self).fetch(query)
    }
}

/// Wrap a user request with the line format the engine understands.
pub fn compose_prompt(query: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You translate requests into shell commands for a POSIX shell. \
         The commands run inside an empty working directory.\n\n\
         Reply using only these line forms:\n\
         - <command>            one shell command per line, prefixed with \"- \"\n\
         error: <reason>        if the request cannot be turned into commands\n\
         any other text         a short note for the user\n\n\
         Write a value you do not know as <name> so the user can fill it in.\n\n",
    );

    prompt.push_str("## Request\n\n");
    prompt.push_str(query);
    prompt.push('\n');

    prompt
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    model: String,
    response: String,
    #[serde(default)]
    created_at: String,
}

/// Client for an Ollama-style `/api/generate` endpoint.
pub struct OllamaBackend {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    raw_prompt: bool,
}

impl OllamaBackend {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            raw_prompt: false,
        }
    }

    /// Send the query as-is instead of wrapping it with format instructions.
    pub fn with_raw_prompt(mut self, raw: bool) -> Self {
        self.raw_prompt = raw;
        self
    }
}

impl ScriptSource for OllamaBackend {
    fn describe(&self) -> String {
        format!("ollama:{}", self.model)
    }

    fn fetch(&self, query: &str) -> Result<String, BackendError> {
        let prompt = if self.raw_prompt {
            query.to_string()
        } else {
            compose_prompt(query)
        };
        let request = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: false,
        };

        info!(endpoint = %self.endpoint, model = %self.model, "requesting script from model backend");
        debug!(prompt_len = prompt.len(), "backend prompt");

        let response = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_json(&request);

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                warn!(code, "model backend returned an error status");
                return Err(BackendError::Status { code, body });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(BackendError::Transport {
                    endpoint: self.endpoint.clone(),
                    reason: transport.to_string(),
                });
            }
        };

        let decoded: GenerateResponse = response
            .into_json()
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        debug!(
            model = %decoded.model,
            created_at = %decoded.created_at,
            response_len = decoded.response.len(),
            "model backend answered"
        );
        Ok(decoded.response)
    }
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    answers: HashMap<String, String>,
}

/// Canned answers keyed by query.
///
/// ```toml
/// [answers]
/// "initialize a new git repo" = """
/// - git init
/// """
/// ```
#[derive(Debug, Default)]
pub struct FixtureSource {
    answers: HashMap<String, String>,
}

impl FixtureSource {
    pub fn new(answers: HashMap<String, String>) -> Self {
        Self { answers }
    }

    pub fn load(path: &Path) -> Result<Self, BackendError> {
        let contents = std::fs::read_to_string(path).map_err(|e| BackendError::Fixture {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let file: FixtureFile = toml::from_str(&contents).map_err(|e| BackendError::Fixture {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(file.answers))
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

impl ScriptSource for FixtureSource {
    fn describe(&self) -> String {
        format!("fixtures({} answers)", self.answers.len())
    }

    fn fetch(&self, query: &str) -> Result<String, BackendError> {
        self.answers
            .get(query.trim())
            .cloned()
            .ok_or_else(|| BackendError::UnknownQuery(query.to_string()))
    }
}
