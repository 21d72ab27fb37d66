use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use affilink::app::AppContext;
use affilink::cli::{commands, CacheAction, Cli, Commands, SessionAction};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; stdout carries command output, so logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::new(cli.config.as_deref())?;

    match cli.command {
        Commands::Enrich { urls } => {
            commands::enrich_urls(&ctx, &urls).await?;
        }
        Commands::Rewrite => {
            commands::rewrite_stdin(&ctx).await?;
        }
        Commands::Check { url } => {
            commands::check_url(&ctx, &url)?;
        }
        Commands::Cache { action } => match action {
            CacheAction::List { network } => {
                commands::list_cache(&ctx, network.as_deref())?;
            }
        },
        Commands::Session { action } => match action {
            SessionAction::Status => {
                commands::session_status(&ctx)?;
            }
            SessionAction::Refresh { network } => {
                commands::refresh_sessions(&ctx, network.as_deref()).await?;
            }
        },
    }

    Ok(())
}
