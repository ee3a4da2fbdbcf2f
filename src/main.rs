//! kslive CLI - watch a live room and act on it from the terminal.
//!
//! This is the main binary entry point. See the `kslive` library for the
//! protocol client itself.

use anyhow::Result;
use clap::{Parser, Subcommand};
use kslive::{commands, Config};
use mimalloc::MiMalloc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "kslive")]
#[command(version)]
#[command(about = "Live-room protocol client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the configured room and print chat until Ctrl-C
    Watch {
        /// Reconnect with backoff when the session drops
        #[arg(long)]
        reconnect: bool,
    },
    /// Post a chat message
    Send {
        /// Message text
        content: String,
        /// Room id; resolved from the room page when omitted
        #[arg(long)]
        room: Option<String>,
        /// Text colour (`#RRGGBB`)
        #[arg(long)]
        color: Option<String>,
    },
    /// Follow a user
    Follow {
        /// Principal id of the user
        user_id: String,
        /// Unfollow instead
        #[arg(long)]
        unfollow: bool,
    },
    /// Show a user's profile card
    Profile {
        /// Principal id of the user
        user_id: String,
    },
    /// List the gift catalog
    Gifts {
        /// Print the raw catalog document
        #[arg(long)]
        raw: bool,
    },
    /// Decode a captured frame given as hex (`-` reads stdin)
    Inspect {
        /// Hex bytes of one frame
        hex: String,
    },
    /// Show or edit the configuration
    Config {
        key: Option<String>,
        value: Option<String>,
    },
}

fn init_logging() -> Result<()> {
    // KSLIVE_LOG_FILE keeps logs out of the chat output
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Ok(path) = std::env::var("KSLIVE_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .map_err(|e| anyhow::anyhow!("Failed to create log file at {path}: {e}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.format_timestamp_secs().init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { reconnect } => {
            let config = Config::load()?;
            commands::watch::run(&config, reconnect).await?;
        }
        Commands::Send {
            content,
            room,
            color,
        } => {
            let config = Config::load()?;
            commands::actions::send(&config, &content, room.as_deref(), color.as_deref()).await?;
        }
        Commands::Follow { user_id, unfollow } => {
            let config = Config::load()?;
            commands::actions::follow(&config, &user_id, !unfollow).await?;
        }
        Commands::Profile { user_id } => {
            let config = Config::load()?;
            commands::actions::profile(&config, &user_id).await?;
        }
        Commands::Gifts { raw } => {
            let config = Config::load()?;
            commands::actions::gifts(&config, raw).await?;
        }
        Commands::Inspect { hex } => {
            commands::inspect::run(&hex)?;
        }
        Commands::Config { key, value } => match (key, value) {
            (None, _) => commands::settings::show(&Config::load()?)?,
            (Some(k), None) => commands::settings::get(&Config::load()?, &k)?,
            (Some(k), Some(v)) => commands::settings::set(&k, &v)?,
        },
    }

    Ok(())
}
