//! Botly CLI - manage your Botly chatbots from the terminal.

mod commands;
mod output;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use botly_core::models::ChatbotUpdate;
use botly_core::Config;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::Ctx;
use output::OutputFormat;

/// Botly CLI - sign in and manage chatbots.
#[derive(Parser)]
#[command(name = "botly")]
#[command(about = "Botly CLI for authentication and chatbot management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend URL (overrides the config file)
    #[arg(long, env = "BOTLY_API_URL", global = true)]
    api_url: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login {
        /// Account email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Create an account and login
    Register {
        #[arg(short, long)]
        email: Option<String>,
        /// OpenAI API key, must start with "sk-" (prompted when omitted)
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Logout and clear the stored token
    Logout,

    /// Check authentication status
    #[command(alias = "whoami")]
    Status,

    /// Replace the OpenAI API key on the account
    SetApiKey {
        api_key: Option<String>,
    },

    /// Keep the session open and report when it ends
    Watch,

    /// Manage chatbots
    #[command(alias = "bots")]
    Chatbots {
        #[command(subcommand)]
        command: ChatbotCommands,
    },
}

#[derive(Subcommand)]
enum ChatbotCommands {
    /// List chatbots
    List {
        /// Also fetch the number of questions each bot has answered
        #[arg(long)]
        stats: bool,
    },
    /// Show chatbot details and recent questions
    Show {
        id: i64,
        /// Show every recorded question
        #[arg(long)]
        all: bool,
    },
    /// Create a chatbot
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        instructions: Option<String>,
    },
    /// Update a chatbot
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        instructions: Option<String>,
        /// Make the chatbot public (true) or private (false)
        #[arg(long)]
        public: Option<bool>,
    },
    /// Delete a chatbot
    Delete {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Upload training data
    Train {
        id: i64,
        /// Document to learn from
        #[arg(long)]
        file: Option<PathBuf>,
        /// Website to learn from
        #[arg(long)]
        website: Option<String>,
    },
    /// Ask a chatbot a question
    Ask {
        id: i64,
        question: String,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=botly_core=debug).
fn init_tracing() -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing();

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url.filter(|u| !u.trim().is_empty()) {
        config.api_base_url = url.trim().to_string();
    }
    info!(api_url = %config.api_base_url, "Botly CLI starting");

    let mut ctx = Ctx::new(config, cli.format);
    match cli.command {
        Commands::Login { email } => commands::login(&mut ctx, email).await,
        Commands::Register { email, api_key } => commands::register(&mut ctx, email, api_key).await,
        Commands::Logout => commands::logout(&ctx).await,
        Commands::Status => commands::status(&ctx).await,
        Commands::SetApiKey { api_key } => commands::set_api_key(&ctx, api_key).await,
        Commands::Watch => commands::watch(&ctx).await,
        Commands::Chatbots { command } => match command {
            ChatbotCommands::List { stats } => commands::chatbots_list(&ctx, stats).await,
            ChatbotCommands::Show { id, all } => commands::chatbots_show(&ctx, id, all).await,
            ChatbotCommands::Create {
                name,
                description,
                instructions,
            } => commands::chatbots_create(&ctx, name, description, instructions).await,
            ChatbotCommands::Update {
                id,
                name,
                description,
                instructions,
                public,
            } => {
                let update = ChatbotUpdate {
                    name,
                    description,
                    instructions,
                    is_public: public,
                };
                commands::chatbots_update(&ctx, id, update).await
            }
            ChatbotCommands::Delete { id, yes } => commands::chatbots_delete(&ctx, id, yes).await,
            ChatbotCommands::Train { id, file, website } => {
                commands::chatbots_train(&ctx, id, file.as_deref(), website).await
            }
            ChatbotCommands::Ask { id, question } => {
                commands::chatbots_ask(&ctx, id, question).await
            }
        },
    }
}
