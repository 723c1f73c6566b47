//! Command line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// GuildBridge bot console
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "GUILDBRIDGE_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Log level, overrides the configuration file
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// What to do
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Run a single bot command, e.g. `run join 1234 40`
    Run {
        /// Command name and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        line: Vec<String>,
    },
    /// Read commands from stdin, one per line, and print JSON replies
    Repl,
    /// Follow a transfer until it finishes
    Watch {
        /// Transfer identifier
        transfer_id: String,
    },
    /// Probe the bot connection
    Check,
}

impl CliCommand {
    /// Command line passed to `run`, joined by single spaces
    pub fn command_line(&self) -> Option<String> {
        match self {
            Self::Run { line } => Some(line.join(" ")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_collects_arguments() {
        let cli = Cli::try_parse_from(["guildbridge-bot", "run", "getMembers", "12", "-5"]).unwrap();
        assert_eq!(cli.command.command_line().as_deref(), Some("getMembers 12 -5"));
    }

    #[test]
    fn test_global_options() {
        let cli = Cli::try_parse_from([
            "guildbridge-bot",
            "--config",
            "bot.yaml",
            "--log-level",
            "debug",
            "check",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("bot.yaml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.command, CliCommand::Check);
    }

    #[test]
    fn test_run_requires_a_command() {
        assert!(Cli::try_parse_from(["guildbridge-bot", "run"]).is_err());
    }
}
