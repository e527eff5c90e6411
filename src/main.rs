//! twinkv - An Embedded Key-Value Store with Two Engines
//!
//! This is the interactive shell. It builds a store on the chosen engine,
//! starts the expiry sweeper and executes commands read from stdin.

use clap::{Parser, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use twinkv::commands::{CommandHandler, SharedStore};
use twinkv::storage::{start_expiry_sweeper, ExpirySweeper, HashedEngine, OrderedStore, Store};
use twinkv::{KeyValueStore, Record};

/// Which structure backs the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    /// Red-black tree, keys kept sorted
    Ordered,
    /// Chained hash table with dynamic resizing
    Hashed,
}

/// twinkv - interactive key-value shell
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Config {
    /// Storage engine
    #[arg(short, long, value_enum, default_value_t = EngineKind::Ordered)]
    engine: EngineKind,

    /// Initial bucket count for the hashed engine
    #[arg(short, long, default_value_t = 1)]
    buckets: usize,

    /// File of `<key> <record>` lines to load at startup
    #[arg(short, long)]
    upload: Option<PathBuf>,
}

/// Builds the store and its sweeper. Must run inside the Tokio runtime.
fn open_store(config: &Config) -> (SharedStore, ExpirySweeper) {
    match config.engine {
        EngineKind::Ordered => {
            let store: OrderedStore<String, Record> = OrderedStore::ordered();
            let sweeper = start_expiry_sweeper(store.clone());
            (Arc::new(store), sweeper)
        }
        EngineKind::Hashed => {
            let store = Store::new(HashedEngine::<String, Record>::with_buckets(config.buckets));
            let sweeper = start_expiry_sweeper(store.clone());
            (Arc::new(store), sweeper)
        }
    }
}

fn print_banner(config: &Config) {
    println!(
        r#"
twinkv v{} - Embedded Key-Value Store
──────────────────────────────────────────────────────────────
Engine: {:?}
Type 'help' for available commands, 'exit' to quit.
"#,
        twinkv::VERSION,
        config.engine
    );
}

fn prompt() -> std::io::Result<()> {
    print!("> ");
    std::io::stdout().flush()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::parse();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    print_banner(&config);

    let (store, _sweeper) = open_store(&config);
    info!(engine = ?config.engine, "Store initialized");

    if let Some(path) = &config.upload {
        match store.upload(path) {
            Ok(count) => info!(path = %path.display(), count = count, "Initial upload done"),
            Err(e) => warn!(path = %path.display(), error = %e, "Initial upload failed"),
        }
    }

    let handler = CommandHandler::new(store);

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = repl(handler) => result?,
        _ = shutdown => {}
    }

    info!("Shutdown complete");
    Ok(())
}

/// Reads commands from stdin until `exit`, `quit` or end of input.
async fn repl(handler: CommandHandler) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        if !input.is_empty() {
            let reply = handler.execute(input).to_string();
            if !reply.is_empty() {
                println!("{}", reply);
            }
        }
        prompt()?;
    }

    Ok(())
}
