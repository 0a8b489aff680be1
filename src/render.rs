//! Human and JSON rendering for the CLI.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::{CompoundCd, ProjectConfig};
use crate::report::ScriptReport;

fn compound_cd_label(mode: CompoundCd) -> &'static str {
    match mode {
        CompoundCd::Reject => "reject",
        CompoundCd::CdOnly => "cd-only",
    }
}

fn config_source_label(config_path: Option<&Path>) -> String {
    config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults, no .sandscript/config.toml found)".to_string())
}

fn sandbox_root_label(config: &ProjectConfig) -> String {
    config
        .sandbox
        .root
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(default: ~/Desktop/sandbox)".to_string())
}

fn push_kv(output: &mut String, key: &str, value: impl std::fmt::Display) {
    output.push_str(&format!("  {key:<22} {value}\n"));
}

pub fn render_config_human(config: &ProjectConfig, config_path: Option<&Path>) -> String {
    let mut output = String::new();
    output.push_str("Backend\n");
    push_kv(&mut output, "endpoint", &config.backend.endpoint);
    push_kv(&mut output, "model", &config.backend.model);
    push_kv(&mut output, "timeout_secs", config.backend.timeout_secs);
    output.push('\n');

    output.push_str("Sandbox\n");
    push_kv(&mut output, "root", sandbox_root_label(config));
    output.push('\n');

    output.push_str("Shell\n");
    push_kv(&mut output, "program", &config.shell.program);
    if config.shell.args.is_empty() {
        push_kv(&mut output, "args", "(none)");
    } else {
        push_kv(&mut output, "args", config.shell.args.join(", "));
    }
    let codes: Vec<String> = config
        .shell
        .not_found_exit_codes
        .iter()
        .map(ToString::to_string)
        .collect();
    push_kv(&mut output, "not_found_exit_codes", codes.join(", "));
    if config.shell.timeout_secs == 0 {
        push_kv(&mut output, "timeout", "(none)");
    } else {
        push_kv(&mut output, "timeout", format!("{}s", config.shell.timeout_secs));
    }
    push_kv(
        &mut output,
        "path",
        config.shell.path.as_deref().unwrap_or("(inherited)"),
    );
    output.push('\n');

    output.push_str("Script\n");
    push_kv(&mut output, "compound_cd", compound_cd_label(config.script.compound_cd));
    push_kv(&mut output, "confine_to_sandbox", config.script.confine_to_sandbox);
    push_kv(&mut output, "confirm", config.script.confirm);
    output.push('\n');

    output.push_str("Source Path\n");
    push_kv(&mut output, "path", config_source_label(config_path));

    output
}

pub fn render_config_json(config: &ProjectConfig, config_path: Option<&Path>) -> Result<String> {
    let payload = serde_json::json!({
        "backend": {
            "endpoint": &config.backend.endpoint,
            "model": &config.backend.model,
            "timeout_secs": config.backend.timeout_secs
        },
        "sandbox": {
            "root": config.sandbox.root.as_ref().map(|p| p.display().to_string())
        },
        "shell": {
            "program": &config.shell.program,
            "args": &config.shell.args,
            "not_found_exit_codes": &config.shell.not_found_exit_codes,
            "timeout_secs": config.shell.timeout_secs,
            "path": &config.shell.path
        },
        "script": {
            "compound_cd": compound_cd_label(config.script.compound_cd),
            "confine_to_sandbox": config.script.confine_to_sandbox,
            "confirm": config.script.confirm
        },
        "source_path": config_source_label(config_path)
    });

    serde_json::to_string_pretty(&payload).context("failed to serialize config to JSON")
}

pub fn render_report_json(report: &ScriptReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize report to JSON")
}

pub fn render_report_human(report: &ScriptReport) -> String {
    let mut output = String::new();

    output.push_str("Commands\n");
    if report.commands.is_empty() {
        output.push_str("  (none)\n");
    }
    for command in &report.commands {
        output.push_str(&format!("  $ {command}\n"));
    }

    if report.results.iter().any(|r| !r.is_empty()) {
        output.push_str("\nOutput\n");
        for result in report.results.iter().filter(|r| !r.is_empty()) {
            for line in result.lines() {
                output.push_str(&format!("  {line}\n"));
            }
        }
    }

    if !report.errors.is_empty() {
        output.push_str("\nErrors\n");
        for error in &report.errors {
            output.push_str(&format!("  ✗ {error}\n"));
        }
    }

    let messages: Vec<&String> = report.messages.iter().filter(|m| !m.is_empty()).collect();
    if !messages.is_empty() {
        output.push_str("\nNotes\n");
        for message in messages {
            output.push_str(&format!("  {message}\n"));
        }
    }

    output.push('\n');
    if report.is_error {
        output.push_str("Status: failed\n");
    } else {
        output.push_str("Status: ok\n");
    }

    output
}

/// Preview shown before asking to run a fetched script.
pub fn render_plan(commands: &[String]) -> String {
    let mut output = String::from("The script will run these commands:\n");
    for command in commands {
        output.push_str(&format!("  $ {command}\n"));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> ScriptReport {
        ScriptReport {
            commands: vec!["mkdir x".to_string(), "echo done".to_string()],
            results: vec![String::new(), "done\n".to_string()],
            errors: vec![],
            messages: vec![String::new(), "All set.".to_string()],
            is_error: false,
        }
    }

    #[test]
    fn render_config_human_groups_sections() {
        let config = ProjectConfig::default();
        let rendered = render_config_human(&config, None);

        for section in ["Backend", "Sandbox", "Shell", "Script", "Source Path"] {
            assert!(rendered.contains(section), "missing section {section}");
        }
        assert!(rendered.contains("mistral"));
        assert!(rendered.contains("300s"));
        assert!(rendered.contains("(inherited)"));
        assert!(rendered.contains("(defaults, no .sandscript/config.toml found)"));
    }

    #[test]
    fn render_config_json_is_valid_and_contains_expected_fields() {
        let config = ProjectConfig::default();
        let json = render_config_json(&config, Some(Path::new("/p/.sandscript/config.toml"))).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["backend"]["model"], "mistral");
        assert_eq!(value["shell"]["not_found_exit_codes"][0], 127);
        assert_eq!(value["script"]["compound_cd"], "reject");
        assert!(value["sandbox"]["root"].is_null());
        assert_eq!(value["source_path"], "/p/.sandscript/config.toml");
    }

    #[test]
    fn report_json_uses_presentation_field_names() {
        let json = render_report_json(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["commands"][1], "echo done");
        assert_eq!(value["results"][0], "");
        assert_eq!(value["isError"], false);
    }

    #[test]
    fn report_human_lists_commands_output_and_notes() {
        let rendered = render_report_human(&sample_report());
        assert!(rendered.contains("  $ mkdir x\n"));
        assert!(rendered.contains("Output\n  done\n"));
        assert!(rendered.contains("Notes\n  All set.\n"));
        assert!(!rendered.contains("Errors"));
        assert!(rendered.ends_with("Status: ok\n"));
    }

    #[test]
    fn report_human_shows_errors_and_failed_status() {
        let report = ScriptReport {
            commands: vec!["false".to_string()],
            errors: vec!["Unknown error occurred while running: false".to_string()],
            is_error: true,
            ..ScriptReport::default()
        };
        let rendered = render_report_human(&report);
        assert!(rendered.contains("✗ Unknown error occurred while running: false"));
        assert!(rendered.ends_with("Status: failed\n"));
    }

    #[test]
    fn plan_lists_commands() {
        let plan = render_plan(&["git init".to_string()]);
        assert!(plan.contains("$ git init"));
    }
}
