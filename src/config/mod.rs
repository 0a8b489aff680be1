use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::EngineOptions;
use crate::exec::ShellSettings;

const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIR: &str = ".sandscript";

/// How to treat a `cd` clause that shares a line with other clauses.
#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CompoundCd {
    /// Fail the line as an unsupported construct.
    #[default]
    Reject,
    /// Apply the directory change and drop the rest of the line.
    CdOnly,
}

fn default_endpoint() -> String {
    "http://localhost:11434/api/generate".to_string()
}

fn default_model() -> String {
    "mistral".to_string()
}

fn default_backend_timeout_secs() -> u64 {
    120
}

fn default_shell_program() -> String {
    "sh".to_string()
}

fn default_shell_args() -> Vec<String> {
    vec!["-c".to_string()]
}

fn default_not_found_exit_codes() -> Vec<i32> {
    vec![127]
}

fn default_shell_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

/// Model backend section.
///
/// ```toml
/// [backend]
/// endpoint = "http://localhost:11434/api/generate"
/// model = "mistral"
/// ```
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            timeout_secs: default_backend_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct SandboxConfig {
    /// Sandbox root; defaults to `<home>/Desktop/sandbox`.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_shell_program")]
    pub program: String,
    #[serde(default = "default_shell_args")]
    pub args: Vec<String>,
    #[serde(default = "default_not_found_exit_codes")]
    pub not_found_exit_codes: Vec<i32>,
    /// Per-command limit; 0 disables it.
    #[serde(default = "default_shell_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: default_shell_program(),
            args: default_shell_args(),
            not_found_exit_codes: default_not_found_exit_codes(),
            timeout_secs: default_shell_timeout_secs(),
            path: None,
        }
    }
}

impl ShellConfig {
    pub fn settings(&self) -> ShellSettings {
        ShellSettings {
            program: self.program.clone(),
            args: self.args.clone(),
            not_found_exit_codes: self.not_found_exit_codes.clone(),
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            path: self.path.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScriptConfig {
    #[serde(default)]
    pub compound_cd: CompoundCd,
    #[serde(default = "default_true")]
    pub confine_to_sandbox: bool,
    /// Ask before running a fetched script.
    #[serde(default = "default_true")]
    pub confirm: bool,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            compound_cd: CompoundCd::default(),
            confine_to_sandbox: true,
            confirm: true,
        }
    }
}

impl ScriptConfig {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            compound_cd: self.compound_cd,
            confine_to_sandbox: self.confine_to_sandbox,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub script: ScriptConfig,
}

impl ProjectConfig {
    /// Search upward from `start` for a `.sandscript/config.toml` file and
    /// load it. Returns the default config if no file is found.
    pub fn load(start: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = Self::find_config_file(start) {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config: ProjectConfig = toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            Ok((config, Some(path)))
        } else {
            Ok((ProjectConfig::default(), None))
        }
    }

    fn find_config_file(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILENAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn default_config_values() {
        let config = ProjectConfig::default();
        assert_eq!(config.backend.endpoint, "http://localhost:11434/api/generate");
        assert_eq!(config.backend.model, "mistral");
        assert_eq!(config.backend.timeout_secs, 120);
        assert!(config.sandbox.root.is_none());
        assert_eq!(config.shell.program, "sh");
        assert_eq!(config.shell.args, vec!["-c"]);
        assert_eq!(config.shell.not_found_exit_codes, vec![127]);
        assert_eq!(config.shell.timeout_secs, 300);
        assert!(config.shell.path.is_none());
        assert_eq!(config.script.compound_cd, CompoundCd::Reject);
        assert!(config.script.confine_to_sandbox);
        assert!(config.script.confirm);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[backend]
endpoint = "http://gpu-box:11434/api/generate"
model = "llama3"
timeout_secs = 30

[sandbox]
root = "/srv/sandbox"

[shell]
program = "bash"
args = ["--noprofile", "-c"]
not_found_exit_codes = [127, 126]
timeout_secs = 10
path = "/usr/bin:/bin"

[script]
compound_cd = "cd-only"
confine_to_sandbox = false
confirm = false
"#;
        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.backend.endpoint, "http://gpu-box:11434/api/generate");
        assert_eq!(config.backend.model, "llama3");
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.sandbox.root, Some(PathBuf::from("/srv/sandbox")));
        assert_eq!(config.shell.program, "bash");
        assert_eq!(config.shell.args, vec!["--noprofile", "-c"]);
        assert_eq!(config.shell.not_found_exit_codes, vec![127, 126]);
        assert_eq!(config.shell.path.as_deref(), Some("/usr/bin:/bin"));
        assert_eq!(config.script.compound_cd, CompoundCd::CdOnly);
        assert!(!config.script.confine_to_sandbox);
        assert!(!config.script.confirm);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[backend]
model = "codellama"
"#;
        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.backend.model, "codellama");
        assert_eq!(config.backend.endpoint, "http://localhost:11434/api/generate");
        assert_eq!(config.shell.program, "sh");
        assert!(config.script.confirm);
    }

    #[test]
    fn shell_settings_from_config() {
        let mut shell = ShellConfig::default();
        let settings = shell.settings();
        assert_eq!(settings.timeout, Some(Duration::from_secs(300)));
        assert_eq!(settings.not_found_exit_codes, vec![127]);

        shell.timeout_secs = 0;
        assert_eq!(shell.settings().timeout, None);
    }

    #[test]
    fn engine_options_from_config() {
        let script = ScriptConfig {
            compound_cd: CompoundCd::CdOnly,
            confine_to_sandbox: false,
            confirm: true,
        };
        let options = script.engine_options();
        assert_eq!(options.compound_cd, CompoundCd::CdOnly);
        assert!(!options.confine_to_sandbox);
    }

    #[test]
    fn rejects_unknown_compound_mode() {
        let toml = r#"
[script]
compound_cd = "run-everything"
"#;
        assert!(toml::from_str::<ProjectConfig>(toml).is_err());
    }

    #[test]
    fn load_from_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let config_dir = tmp.path().join(".sandscript");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(
            config_dir.join("config.toml"),
            r#"
[backend]
model = "phi3"

[shell]
timeout_secs = 5
"#,
        )
        .unwrap();

        let (config, path) = ProjectConfig::load(tmp.path()).unwrap();
        assert!(path.is_some());
        assert_eq!(config.backend.model, "phi3");
        assert_eq!(config.shell.timeout_secs, 5);
    }

    #[test]
    fn load_returns_default_when_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, path) = ProjectConfig::load(tmp.path()).unwrap();
        assert!(path.is_none());
        assert_eq!(config.backend.model, "mistral");
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let tmp = tempfile::tempdir().unwrap();
        let config_dir = tmp.path().join(".sandscript");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("config.toml"), "[backend\nmodel =").unwrap();

        let err = ProjectConfig::load(tmp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse"));
    }

    #[test]
    fn load_walks_up_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let config_dir = tmp.path().join(".sandscript");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(
            config_dir.join("config.toml"),
            r#"
[backend]
model = "qwen"
"#,
        )
        .unwrap();

        let nested = tmp.path().join("src").join("deep").join("nested");
        fs::create_dir_all(&nested).unwrap();

        let (config, path) = ProjectConfig::load(&nested).unwrap();
        assert!(path.is_some());
        assert_eq!(config.backend.model, "qwen");
    }
}
