//! Parley - command-line chat client
//!
//! Main entry point for the parley CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod state;

use commands::{ask, auth, chat, config, session, transcribe};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Parley - chat with your assistant from the terminal
#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// API base URL (default: current context, then http://localhost:8000/api)
    #[arg(long, global = true, env = "PARLEY_SERVER_URL")]
    pub server: Option<String>,

    /// Use a named context instead of the current one
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Keep credentials in memory only for this run
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store credentials
    Login(auth::LoginArgs),

    /// Create an account and sign in
    Register(auth::RegisterArgs),

    /// Sign out and clear stored credentials
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Send a one-shot prompt
    Ask(ask::AskArgs),

    /// Enter interactive chat mode (REPL)
    Chat(chat::ChatArgs),

    /// List chat sessions
    History,

    /// Inspect and manage a chat session
    Session(session::SessionArgs),

    /// Transcribe an audio file to text
    Transcribe(transcribe::TranscribeArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing: console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "parley=debug,parley_client=debug,parley_config=debug,info"
    } else {
        "parley=info,parley_client=info,warn"
    };

    let file_appender = tracing_appender::rolling::daily(parley_config::log_dir(), "parley.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "parley=trace,parley_client=trace,parley_config=trace,info",
                )),
        )
        .init();

    // Create context for commands
    let ctx = commands::Context {
        server: cli.server,
        context: cli.context,
        json_output: cli.json,
        verbose: cli.verbose,
        ephemeral: cli.ephemeral,
    };

    // Dispatch to command handlers
    let result = match cli.command {
        Commands::Login(args) => auth::login(args, &ctx).await,
        Commands::Register(args) => auth::register(args, &ctx).await,
        Commands::Logout => auth::logout(&ctx).await,
        Commands::Whoami => auth::whoami(&ctx).await,
        Commands::Ask(args) => ask::run(args, &ctx).await,
        Commands::Chat(args) => chat::run(args, &ctx).await,
        Commands::History => session::history(&ctx).await,
        Commands::Session(args) => session::run(args, &ctx).await,
        Commands::Transcribe(args) => transcribe::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    };

    if let Err(e) = &result
        && commands::session_ended(e)
    {
        commands::print_session_expired();
        drop(_guard);
        std::process::exit(1);
    }

    result
}
