use anyhow::Context;
use clap::Parser;
use tracing::Level;

use meshchat::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    let settings = args.settings().context("failed to load configuration")?;

    match &args.command {
        Commands::ServeTool { host, port } => {
            cli::serve::run_serve(&settings, host.as_deref(), *port).await?
        }
        Commands::Chat { task_id } => cli::chat::run_chat(&settings, task_id).await?,
        Commands::Translate { message, offline } => {
            cli::translate::run_translate(&settings, message, *offline).await?
        }
        Commands::Call { method, params } => {
            cli::call::run_call(&settings, method, params.as_deref()).await?
        }
    }

    Ok(())
}
