//! Banter CLI: the main entry point.
//!
//! Commands:
//! - `run`: Connect to Discord and start chatting
//! - `ask`: Answer one question from the terminal, grounded in history
//! - `search`: Show the knowledge snippets a query retrieves
//! - `status`: Show the effective configuration
//! - `onboard`: Write a starter config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "banter",
    about = "Banter — a Discord community bot with a searchable memory",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and run the bot
    Run,

    /// Answer a single question as the bot would
    Ask {
        /// The question to answer
        question: String,

        /// Skip the history scan and answer without knowledge
        #[arg(long)]
        offline: bool,
    },

    /// Print the snippets retrieved for a query
    Search {
        /// Text to search for
        query: String,

        /// Override the number of snippets
        #[arg(short, long)]
        limit: Option<usize>,

        /// Emit JSON instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Status,

    /// Write a default config file
    Onboard,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run => commands::run::run().await?,
        Commands::Ask { question, offline } => commands::ask::run(question, offline).await?,
        Commands::Search { query, limit, json } => commands::search::run(query, limit, json).await?,
        Commands::Status => commands::status::run().await?,
        Commands::Onboard => commands::onboard::run().await?,
    }

    Ok(())
}
