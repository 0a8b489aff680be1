use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use sandscript::backend::{FixtureSource, OllamaBackend, ScriptSource};
use sandscript::cli::{Cli, Command};
use sandscript::config::ProjectConfig;
use sandscript::engine::{NullObserver, ScriptEngine, ScriptObserver};
use sandscript::exec::{CancelToken, ShellRunner};
use sandscript::log::{self, ExecutionLog, LogEvent, LogObserver};
use sandscript::report::ScriptReport;
use sandscript::{render, sandbox, script, shell_completion};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let is_quiet_command = matches!(
        &cli.command,
        Command::Config { .. } | Command::Completions { .. } | Command::Sandbox
    );

    let filter = match cli.verbose {
        0 if is_quiet_command => "sandscript=warn",
        0 => "sandscript=info",
        1 => "sandscript=debug",
        _ => "sandscript=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cwd = std::env::current_dir().context("failed to get current directory (was it deleted?)")?;
    let (config, config_path) = ProjectConfig::load(&cwd)?;

    match config_path {
        Some(ref p) => info!("loaded config from {}", p.display()),
        None => info!("no .sandscript/config.toml found, using defaults"),
    }

    match cli.command {
        Command::Ask {
            query,
            json,
            yes,
            fixtures,
            model,
            raw_prompt,
        } => {
            let source: Box<dyn ScriptSource> = match fixtures {
                Some(path) => Box::new(FixtureSource::load(&path)?),
                None => {
                    let model = model.as_deref().unwrap_or(&config.backend.model);
                    Box::new(
                        OllamaBackend::new(
                            &config.backend.endpoint,
                            model,
                            Duration::from_secs(config.backend.timeout_secs),
                        )
                        .with_raw_prompt(raw_prompt),
                    )
                }
            };
            run_ask(&config, source.as_ref(), &query, json, yes)
        }
        Command::Run { script, json } => {
            let text = read_script(&script)?;
            let log = open_execution_log();
            if let Some(log) = &log {
                log_event(
                    log,
                    LogEvent::RunStarted {
                        source: format!("file:{script}"),
                        query: String::new(),
                    },
                );
            }
            let report = execute_script(&config, &text, log.as_ref())?;
            print_report(&report, json)
        }
        Command::Sandbox => {
            let root = sandbox::resolve_root(config.sandbox.root.as_deref())?;
            let root = sandbox::ensure_sandbox(&root)?;
            println!("{}", root.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { json } => {
            if json {
                println!(
                    "{}",
                    render::render_config_json(&config, config_path.as_deref())?
                );
            } else {
                print!(
                    "{}",
                    render::render_config_human(&config, config_path.as_deref())
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Completions { shell } => {
            shell_completion::print(shell)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_ask(
    config: &ProjectConfig,
    source: &dyn ScriptSource,
    query: &str,
    json: bool,
    yes: bool,
) -> Result<ExitCode> {
    let log = open_execution_log();
    if let Some(log) = &log {
        log_event(
            log,
            LogEvent::RunStarted {
                source: source.describe(),
                query: query.to_string(),
            },
        );
    }

    info!(source = %source.describe(), "requesting script");
    let text = match source.fetch(query) {
        Ok(text) => text,
        Err(error) => {
            if let Some(log) = &log {
                log_event(
                    log,
                    LogEvent::BackendFailed {
                        reason: error.to_string(),
                    },
                );
            }
            return Err(error).context("failed to obtain a script");
        }
    };

    let commands = script::script_commands(&text);
    if !commands.is_empty() && config.script.confirm && !yes {
        eprint!("{}", render::render_plan(&commands));
        let proceed = dialoguer::Confirm::new()
            .with_prompt("Run these commands in the sandbox?")
            .default(false)
            .interact()
            .context("confirmation needs an interactive terminal; pass --yes to skip it")?;
        if !proceed {
            eprintln!("Aborted; nothing was run.");
            return Ok(ExitCode::FAILURE);
        }
    }

    let report = execute_script(config, &text, log.as_ref())?;
    print_report(&report, json)
}

fn execute_script(
    config: &ProjectConfig,
    text: &str,
    log: Option<&ExecutionLog>,
) -> Result<ScriptReport> {
    let root = sandbox::resolve_root(config.sandbox.root.as_deref())?;
    let root = sandbox::ensure_sandbox(&root)
        .with_context(|| format!("failed to prepare sandbox at {}", root.display()))?;

    if let Some(log) = log {
        log_event(
            log,
            LogEvent::ScriptReceived {
                lines: text.split('\n').count(),
            },
        );
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })
    .ok(); // best-effort; a handler may already be installed

    let engine = ScriptEngine::new(
        ShellRunner::new(config.shell.settings()),
        config.script.engine_options(),
    );

    let mut log_observer = log.map(LogObserver::new);
    let mut null_observer = NullObserver;
    let observer: &mut dyn ScriptObserver = match log_observer.as_mut() {
        Some(observer) => observer,
        None => &mut null_observer,
    };

    Ok(engine.parse_with(text, &root, &cancel, observer))
}

fn print_report(report: &ScriptReport, json: bool) -> Result<ExitCode> {
    if json {
        println!("{}", render::render_report_json(report)?);
    } else {
        print!("{}", render::render_report_human(report));
    }

    Ok(if report.is_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn read_script(script: &str) -> Result<String> {
    if script == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read script from stdin")?;
        Ok(text)
    } else {
        let path = Path::new(script);
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))
    }
}

fn open_execution_log() -> Option<ExecutionLog> {
    let path = log::default_log_path()?;
    match ExecutionLog::new(&path) {
        Ok(log) => {
            info!(path = %path.display(), run_id = log.run_id(), "execution log");
            Some(log)
        }
        Err(error) => {
            warn!(error = %error, "execution log disabled");
            None
        }
    }
}

fn log_event(log: &ExecutionLog, event: LogEvent) {
    if let Err(error) = log.log(event) {
        warn!(error = %error, path = %log.path().display(), "failed to write execution log");
    }
}
