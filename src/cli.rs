use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "sandscript",
    about = "Run model-generated automation scripts inside a sandbox directory",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask the model for a script and run it in the sandbox
    Ask {
        /// What you want done, in plain language
        query: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Run without asking for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Answer from a TOML fixture file instead of the model backend
        #[arg(long)]
        fixtures: Option<PathBuf>,

        /// Override the configured model
        #[arg(long)]
        model: Option<String>,

        /// Send the query to the model as-is, without the line-format preamble
        #[arg(long)]
        raw_prompt: bool,
    },

    /// Run a script file ("-" reads stdin) in the sandbox
    Run {
        /// Path to the script
        script: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create the sandbox if needed and print its path
    Sandbox,

    /// Show effective configuration
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ask_with_flags() {
        let cli = Cli::parse_from([
            "sandscript",
            "-vv",
            "ask",
            "create a folder named py",
            "--json",
            "-y",
            "--model",
            "llama3",
            "--raw-prompt",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Ask {
                query,
                json,
                yes,
                fixtures,
                model,
                raw_prompt,
            } => {
                assert_eq!(query, "create a folder named py");
                assert!(json);
                assert!(yes);
                assert!(fixtures.is_none());
                assert_eq!(model.as_deref(), Some("llama3"));
                assert!(raw_prompt);
            }
            other => panic!("expected Ask, got: {other:?}"),
        }
    }

    #[test]
    fn parses_run_from_stdin() {
        let cli = Cli::parse_from(["sandscript", "run", "-"]);
        assert!(matches!(cli.command, Command::Run { ref script, json: false } if script == "-"));
    }

    #[test]
    fn parses_completions_shell() {
        let cli = Cli::parse_from(["sandscript", "completions", "zsh"]);
        assert!(matches!(
            cli.command,
            Command::Completions {
                shell: CompletionShell::Zsh
            }
        ));
    }
}
