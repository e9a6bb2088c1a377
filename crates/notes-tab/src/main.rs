//! notes-tab: one note-editor tab per process, replicated through a relay.
//!
//! `notes-tab relay` runs the broadcast medium; `notes-tab tab` runs an
//! editor session reading commands from stdin.

use anyhow::Result;
use clap::{Parser, Subcommand};
use notes_core::{NoteStore, OriginTag, Replicator, Unavailable};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use notes_tab::config::{
    DEFAULT_CONTENT_DELAY_MS, DEFAULT_DATA_DIR, DEFAULT_RELAY_LISTEN, DEFAULT_TITLE_DELAY_MS,
    TabConfig,
};
use notes_tab::{FileStorage, RelayBroadcast, RelayServer, Tab};

#[derive(Parser, Debug)]
#[command(name = "notes-tab")]
#[command(about = "Local-first note editor with cross-tab replication")]
struct Args {
    #[command(subcommand)]
    command: Mode,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the relay that carries the replication channel between tabs
    Relay {
        /// Address to listen on
        #[arg(short, long, env = "NOTES_RELAY_LISTEN", default_value = DEFAULT_RELAY_LISTEN)]
        listen: String,
    },

    /// Run an editor tab
    Tab {
        /// Directory holding the persisted notes
        #[arg(short, long, env = "NOTES_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
        data_dir: String,

        /// Relay to join, e.g. ws://127.0.0.1:4517 (single-tab mode if unset)
        #[arg(short, long, env = "NOTES_RELAY_URL")]
        relay: Option<String>,

        /// Replication channel name
        #[arg(long, env = "NOTES_CHANNEL", default_value = notes_core::DEFAULT_CHANNEL)]
        channel: String,

        /// Quiet period before a title edit is saved
        #[arg(long, env = "NOTES_TITLE_DELAY_MS", default_value_t = DEFAULT_TITLE_DELAY_MS)]
        title_delay_ms: u64,

        /// Quiet period before a content edit is saved and broadcast
        #[arg(long, env = "NOTES_CONTENT_DELAY_MS", default_value_t = DEFAULT_CONTENT_DELAY_MS)]
        content_delay_ms: u64,
    },
}

async fn run_relay(listen: &str) -> Result<()> {
    let listener = RelayServer::bind(listen).await?;
    info!("Relay running. Press Ctrl+C to stop.");

    tokio::select! {
        _ = RelayServer::new().run(listener) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }
    Ok(())
}

async fn run_tab(config: TabConfig) -> Result<()> {
    info!("Data directory: {:?}", config.data_dir);

    let store: NoteStore<FileStorage> =
        NoteStore::open(FileStorage::new(config.data_dir.clone())).await;
    info!("Loaded {} note(s)", store.notes().len());

    let origin = OriginTag::generate();
    info!("Origin tag: {}", origin);
    let replicator = Replicator::new(config.channel.clone(), origin);

    let mut tab = Tab::new(store, replicator, config.title_delay, config.content_delay);
    match &config.relay_url {
        Some(url) => tab.connect(&RelayBroadcast::new(url.clone())).await,
        None => tab.connect(&Unavailable).await,
    };

    println!("notes-tab ready. Type `help` for commands.");
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    tab.run(stdin, &mut stdout).await?;

    info!("Shutting down");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info (or debug with --verbose). Logs go to
    // stderr, stdout belongs to the session.
    let default_filter = if args.verbose {
        "debug,notes_tab=debug,notes_core=debug"
    } else {
        "info,notes_tab=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Mode::Relay { listen } => run_relay(&listen).await,
        Mode::Tab {
            data_dir,
            relay,
            channel,
            title_delay_ms,
            content_delay_ms,
        } => {
            let config =
                TabConfig::new(&data_dir, relay, &channel, title_delay_ms, content_delay_ms)?;
            run_tab(config).await
        }
    }
}
