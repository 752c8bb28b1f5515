//! Operator CLI for vocasync.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;
use vocasync_core::config::AppConfig;
use vocasync_core::{VocabEntry, now_millis};
use vocasync_sync::{SyncEngine, SyncOutcome};

#[derive(Parser)]
#[command(name = "vocasyncctl")]
#[command(about = "Operator CLI for the vocasync sync engine")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(long, global = true, env = "VOCASYNC_CONFIG", default_value = "vocasync.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct OfflineArgs {
    /// Only change the local store; the edit is pushed by the next sync
    #[arg(long, default_value_t = false)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full sync cycle
    Sync,
    /// Push the pending dirty partitions
    Flush,
    /// Compare local and remote state without changing anything
    Diagnose,
    /// Add or replace a vocabulary entry
    AddEntry {
        /// Word or expression
        word: String,
        /// Meaning
        meaning: String,
        /// Entry id (default: a random UUID)
        #[arg(long)]
        id: Option<String>,
        /// Reading or pronunciation
        #[arg(long)]
        reading: Option<String>,
        /// Example sentence
        #[arg(long)]
        sentence: Option<String>,
        /// Tag, repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[command(flatten)]
        offline: OfflineArgs,
    },
    /// Delete a vocabulary entry everywhere
    DeleteEntry {
        /// Entry id
        id: String,
        #[command(flatten)]
        offline: OfflineArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Cli { config, command } = Cli::parse();
    let config = load_config(Path::new(&config))?;

    let engine = SyncEngine::from_config(&config)
        .await
        .context("failed to open sync engine")?;

    let result = run(&engine, command).await;
    // Saves the dirty set even when the command failed.
    engine
        .shutdown()
        .await
        .context("failed to save pending partitions")?;
    result
}

async fn run(engine: &SyncEngine, command: Commands) -> Result<()> {
    match command {
        Commands::Sync => report(engine.full_sync().await),
        Commands::Flush => report(engine.flush().await),
        Commands::Diagnose => {
            let report = engine.diagnose().await.context("diagnose failed")?;
            print!("{report}");
            Ok(())
        }
        Commands::AddEntry {
            word,
            meaning,
            id,
            reading,
            sentence,
            tags,
            offline,
        } => {
            let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let mut entry = VocabEntry::new(&id, word, meaning, now_millis())
                .context("failed to build entry")?;
            entry.reading = reading;
            entry.sentence = sentence;
            entry.tags = tags.into_iter().collect();

            let day = engine
                .put_entry(&entry)
                .await
                .context("failed to store entry")?;
            println!("added {id} on {day}");
            push_unless_offline(engine, offline).await
        }
        Commands::DeleteEntry { id, offline } => {
            let existed = engine
                .delete_entry(&id)
                .await
                .context("failed to delete entry")?;
            if existed {
                println!("deleted {id}");
            } else {
                println!("{id} not found locally, tombstone recorded");
            }
            push_unless_offline(engine, offline).await
        }
    }
}

async fn push_unless_offline(engine: &SyncEngine, offline: OfflineArgs) -> Result<()> {
    if offline.offline {
        println!("{} partition(s) pending", engine.pending().await);
        return Ok(());
    }
    report(engine.flush().await)
}

/// Print a trigger outcome, failing on anything but completion.
fn report(outcome: SyncOutcome) -> Result<()> {
    match &outcome {
        SyncOutcome::Completed(summary) => {
            println!("{outcome}");
            if summary.failed > 0 {
                println!("{} partition(s) failed and will be retried", summary.failed);
            }
            Ok(())
        }
        SyncOutcome::Failed(detail) => bail!("{outcome}: {detail}"),
        other => bail!("{other}"),
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        tracing::debug!(path = %path.display(), "loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("VOCASYNC_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;
    Ok(config)
}
