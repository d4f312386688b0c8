//! # Blastline: bulk campaign messaging core
//!
//! Runs the campaign dispatch engine: a worker pool consuming the
//! campaign job queue, the watchdog that recovers stuck runs, and
//! operator commands for queueing, pausing and inspecting campaigns.
//!
//! Usage:
//!   blastline run                        # Start the dispatcher + watchdog
//!   blastline enqueue <campaign-id>      # Queue a campaign for dispatch
//!   blastline status <campaign-id>       # Progress counters
//!   blastline moderate "<text>"          # Evaluate text against the gate

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use blastline_core::config::BlastlineConfig;
use blastline_dispatch::worker::DispatchWorker;
use blastline_dispatch::{spawn_dispatcher_pool, watchdog};
use blastline_moderation::ModerationGate;
use blastline_store::Store;
use blastline_transport::http::HttpTransport;
use blastline_transport::media::HttpMediaStore;

#[derive(Parser)]
#[command(name = "blastline", version, about = "📨 Blastline — campaign dispatch engine")]
struct Cli {
    /// Path to config.toml (default: ~/.blastline/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the dispatcher pool and watchdog.
    Run,
    /// Queue a campaign for dispatch.
    Enqueue { campaign_id: String },
    /// Request a cooperative pause.
    Pause { campaign_id: String },
    /// Resume a paused campaign (re-queues it).
    Resume { campaign_id: String },
    /// Cancel a campaign. Terminal; already-delivered messages remain.
    Cancel { campaign_id: String },
    /// Show campaign progress.
    Status { campaign_id: String },
    /// Evaluate a message body against the moderation gate.
    Moderate { text: String },
    /// Show recent moderation incidents.
    Incidents {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "blastline=debug" } else { "blastline=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => {
            let expanded = shellexpand::tilde(path).to_string();
            BlastlineConfig::load_from(std::path::Path::new(&expanded))?
        }
        None => BlastlineConfig::load()?,
    };

    let db_path = shellexpand::tilde(&config.storage.db_path).to_string();
    let store = Arc::new(Store::open(std::path::Path::new(&db_path))?);

    match cli.command {
        Command::Run => run(store, &config).await,
        Command::Enqueue { campaign_id } => {
            // Fails loudly on unknown ids instead of queueing a ghost job.
            let campaign = store.get_campaign(&campaign_id)?;
            store.enqueue(&campaign.id)?;
            println!("✅ queued campaign '{}' ({})", campaign.name, campaign.id);
            Ok(())
        }
        Command::Pause { campaign_id } => {
            if store.pause_campaign(&campaign_id)? {
                println!("⏸️ pause requested for {campaign_id}");
            } else {
                println!("⚠️ {campaign_id} is not pending or running");
            }
            Ok(())
        }
        Command::Resume { campaign_id } => {
            if store.resume_campaign(&campaign_id)? {
                store.enqueue(&campaign_id)?;
                println!("▶️ {campaign_id} resumed and re-queued");
            } else {
                println!("⚠️ {campaign_id} is not paused");
            }
            Ok(())
        }
        Command::Cancel { campaign_id } => {
            if store.cancel_campaign(&campaign_id)? {
                println!("🛑 {campaign_id} cancelled");
            } else {
                println!("⚠️ {campaign_id} already finished");
            }
            Ok(())
        }
        Command::Status { campaign_id } => {
            let c = store.get_campaign(&campaign_id)?;
            println!("Campaign:  {} ({})", c.name, c.id);
            println!("Status:    {}", c.status);
            println!(
                "Progress:  {} sent, {} failed, {} recipients",
                c.messages_sent, c.messages_failed, c.total_recipients
            );
            if let Some(t) = c.started_at {
                println!("Started:   {t}");
            }
            if let Some(t) = c.completed_at {
                println!("Finished:  {t}");
            }
            Ok(())
        }
        Command::Moderate { text } => {
            let gate = ModerationGate::from_config(&config.moderation);
            let verdict = gate.evaluate(&text).await;
            println!("Decision:  {}", if verdict.allowed { "allow" } else { "deny" });
            println!("Risk:      {}/100", verdict.risk_score);
            println!("Blocked:   {}", verdict.blocked);
            println!("Review:    {}", verdict.requires_review);
            if !verdict.reasons.is_empty() {
                println!("Reasons:   {}", verdict.reasons.join(", "));
            }
            Ok(())
        }
        Command::Incidents { limit } => {
            for incident in store.recent_incidents(limit)? {
                println!(
                    "{}  risk={:<3} blocked={:<5} review={:<5} [{}]",
                    incident.created_at,
                    incident.risk_score,
                    incident.blocked,
                    incident.requires_review,
                    incident.reasons.join(", ")
                );
            }
            Ok(())
        }
    }
}

async fn run(store: Arc<Store>, config: &BlastlineConfig) -> Result<()> {
    let transport = Arc::new(HttpTransport::new(&config.transport));
    let media = Arc::new(HttpMediaStore::new(&config.media));
    let gate = Arc::new(ModerationGate::from_config(&config.moderation));
    let worker = Arc::new(DispatchWorker::new(
        store.clone(),
        transport,
        gate,
        media,
        config,
    ));

    let backlog = store.pending_jobs()?;
    if backlog > 0 {
        tracing::info!("📬 {backlog} campaign jobs already queued");
    }

    let watchdog_handle = watchdog::spawn_watchdog(store.clone(), config.watchdog.clone());
    let pool = spawn_dispatcher_pool(
        worker,
        config.dispatch.workers,
        config.dispatch.queue_poll_secs,
    );

    tracing::info!("📨 blastline running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("👋 shutting down");

    watchdog_handle.abort();
    for handle in pool {
        handle.abort();
    }
    Ok(())
}
