use std::path::PathBuf;

use clap::{Parser, Subcommand};
use feedmux::app::{Command, RunOptions};
use feedmux::types::AuthorFeedFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "feedmux", version)]
#[command(about = "Merge, slice and tune paginated social feeds")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true, env = "FEEDMUX_CONFIG")]
    config: Option<PathBuf>,

    /// Hide reposts made by this actor (repeatable)
    #[arg(long = "hide-reposts-from", value_name = "DID", global = true)]
    hide_reposts_from: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one actor's feed
    Author {
        /// Handle or DID
        actor: String,
        /// posts_with_replies, posts_no_replies, posts_with_media,
        /// posts_and_author_threads or posts_with_video
        #[arg(long)]
        filter: Option<AuthorFeedFilter>,
        /// Stop after this many entries
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 1)]
        pages: usize,
        #[arg(long)]
        hide_reposts: bool,
    },
    /// Print the merged feed of the accounts that block a DID
    BlockedBy {
        did: String,
        /// Merge at most this many blocking accounts
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
}

impl From<Commands> for Command {
    fn from(cmd: Commands) -> Self {
        match cmd {
            Commands::Author {
                actor,
                filter,
                limit,
                pages,
                hide_reposts,
            } => Command::Author {
                actor,
                filter,
                limit,
                pages,
                hide_reposts,
            },
            Commands::BlockedBy { did, limit, pages } => Command::BlockedBy { did, limit, pages },
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feedmux=info")),
        )
        .init();

    let options = RunOptions {
        config_file: cli.config,
        hide_reposts_from: cli.hide_reposts_from,
        command: cli.command.into(),
    };
    if let Err(err) = feedmux::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
