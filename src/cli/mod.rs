pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "affilink")]
#[command(about = "Rewrite shop links into affiliate links", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/affilink/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enrich URLs and print one result per line
    Enrich {
        /// URLs to enrich
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Read text from stdin and print it with every URL enriched
    Rewrite,
    /// Show how each network canonicalizes a URL (no network calls)
    Check {
        url: String,
    },
    /// Inspect the link caches
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Inspect or refresh partner sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// List cached links, newest first
    List {
        /// Only this network
        #[arg(short, long)]
        network: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Show the credential state of every network
    Status,
    /// Obtain a fresh credential now
    Refresh {
        /// Only this network
        #[arg(short, long)]
        network: Option<String>,
    },
}
