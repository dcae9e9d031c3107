//! Velour CLI - manage the local Velour sign-in session.

mod commands;
mod output;

use clap::{Parser, Subcommand};

/// Velour CLI - sign in, sign out and inspect the current session.
#[derive(Parser)]
#[command(name = "velour")]
#[command(about = "Velour CLI for authentication and session management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(long, global = true, env = "VELOUR_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the restored session
    Status,

    /// Sign in with the device code flow
    Login,

    /// Sign out locally and at the identity provider
    Logout,

    /// Print a valid access token, refreshing it if due
    Refresh {
        /// Refresh even if the current token is still fresh
        #[arg(long)]
        force: bool,
    },

    /// Keep the session fresh until interrupted
    Watch {
        /// Seconds between refresh checks
        #[arg(short, long, default_value = "60")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let ctx = match commands::Context::bootstrap(cli.log_level.as_deref(), cli.format) {
        Ok(ctx) => ctx,
        Err(e) => {
            output::print_error(&format!("{:#}", e), &cli.format);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Status => commands::status(&ctx).await,
        Commands::Login => commands::login(&ctx).await,
        Commands::Logout => commands::logout(&ctx).await,
        Commands::Refresh { force } => commands::refresh(&ctx, force).await,
        Commands::Watch { interval } => commands::watch(&ctx, interval).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e), &cli.format);
        std::process::exit(1);
    }
}
