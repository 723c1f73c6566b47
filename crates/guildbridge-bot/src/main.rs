//! Main entry point for GuildBridge Bot.

use anyhow::{Context, Result};
use clap::Parser;
use guildbridge_bot::repl::{run_repl, watch_transfer};
use guildbridge_bot::{App, Cli, CliCommand};
use guildbridge_common::init_logging;
use guildbridge_config::{Config, ConfigLoader};
use guildbridge_transfer::TransferId;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{error, info};

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_config(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigLoader::load()?,
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_logging(config.logging.to_logging_config())?;

    info!("Starting GuildBridge");
    let app = App::from_config(config)?;
    let mut stdout = tokio::io::stdout();

    match &cli.command {
        CliCommand::Run { .. } => {
            let line = cli.command.command_line().unwrap_or_default();
            let reply = app.run_command(&line).await;
            stdout.write_all(format!("{}\n", reply).as_bytes()).await?;
            if reply["success"] != true {
                stdout.flush().await?;
                app.shutdown().await;
                std::process::exit(1);
            }
        }
        CliCommand::Repl => {
            let stdin = BufReader::new(tokio::io::stdin());
            tokio::select! {
                result = run_repl(&app, stdin, tokio::io::stdout()) => {
                    let handled = result?;
                    info!(handled, "REPL finished");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                }
            }
        }
        CliCommand::Watch { transfer_id } => {
            let transfer_id: TransferId = transfer_id.parse()?;
            if let Err(e) = watch_transfer(&app, transfer_id, &mut stdout).await {
                error!(error = %e, "Watch failed");
                app.shutdown().await;
                return Err(e.into());
            }
        }
        CliCommand::Check => {
            let state = app.check().await;
            stdout
                .write_all(format!("{}\n", serde_json::to_string(&state)?).as_bytes())
                .await?;
        }
    }

    stdout.flush().await?;
    app.shutdown().await;
    Ok(())
}
