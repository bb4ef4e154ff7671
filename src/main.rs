//! streak-bot: watches outcome feeds for streaks and alerts subscribers.
//!
//! Single-binary Tokio application that:
//! 1. Reads outcome messages as JSON lines (stdin or a replay file)
//! 2. Parses, deduplicates and persists each outcome
//! 3. Evaluates streaks against subscriber rules
//! 4. Journals every notification and forwards it to an optional webhook

mod config;
mod journal;
mod notify;
mod render;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{error, info, warn};

use common::BotConfig;
use outcome_store::SqliteOutcomeStore;
use streak_engine::{
    Clock, MemoryOutcomeStore, Notifier, OutcomeStore, RuleEngine, SourceRouter,
    StaticRuleSource, SystemClock,
};

use crate::journal::{now_iso, write_event, EventJournal, JournalNotifier, SharedJournal};
use crate::notify::{FanoutNotifier, WebhookNotifier};
use crate::render::Labels;
use crate::transport::LineTransport;

/// Streak alert bot
#[derive(Parser)]
#[command(name = "streak-bot", about = "Outcome streak alert bot")]
struct Cli {
    /// Configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Ingest a JSON-lines file instead of stdin, then exit.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Keep outcome history in memory only.
    #[arg(long)]
    memory: bool,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "streak_bot=info,streak_engine=info,outcome_store=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    info!("🎲 Streak Bot starting up...");

    let cfg = Arc::new(config::load_config(&cli.config)?);
    info!(
        "History: capacity={} ttl={}s purge={}s | dedup={} | dispatch timeout={}s",
        cfg.history.capacity,
        cfg.history.ttl_secs,
        cfg.history.purge_interval_secs,
        cfg.dedup.capacity,
        cfg.dispatch.timeout_secs,
    );
    info!(
        "Rules: {} ({} enabled), labelled sources: {}",
        cfg.rules.len(),
        cfg.rules.iter().filter(|r| r.enabled).count(),
        cfg.sources.len()
    );

    let journal = EventJournal::open(PathBuf::from(&cfg.journal_dir))
        .context("failed to open notification journal")?;
    info!("Journal path: {}", journal.dir().display());
    let journal: SharedJournal = Arc::new(tokio::sync::Mutex::new(journal));

    let store: Arc<dyn OutcomeStore> = if cli.memory {
        warn!("Using in-memory outcome storage; history is lost on exit");
        Arc::new(MemoryOutcomeStore::new())
    } else {
        Arc::new(SqliteOutcomeStore::open(&cfg.storage.db_path)?)
    };

    let rules = StaticRuleSource::new(cfg.rules.clone());
    if rules.is_empty() {
        warn!("No subscriber rules configured; outcomes are stored but never alert");
    }
    let rule_count = rules.len();

    let notifier = build_notifier(&cfg, journal.clone())?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = Arc::new(RuleEngine::new(
        &cfg,
        store,
        Arc::new(rules),
        notifier,
        clock.clone(),
    ));

    write_event(
        &journal,
        json!({
            "ts": now_iso(),
            "kind": "bot_start",
            "mode": if cli.replay.is_some() { "replay" } else { "stream" },
            "storage": if cli.memory { "memory".to_string() } else { cfg.storage.db_path.clone() },
            "rules": rule_count,
            "webhook": !cfg.dispatch.webhook_url.is_empty(),
        }),
    )
    .await;

    // Task 1: cache purge
    let purge_engine = engine.clone();
    let purge_every = Duration::from_secs(cfg.history.purge_interval_secs);
    let purge_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            let purged = purge_engine.cache().purge_expired();
            let locks = purge_engine.prune_idle_locks();
            if purged > 0 || locks > 0 {
                info!(
                    "Purged {} idle source histories and {} source locks ({} cached)",
                    purged,
                    locks,
                    purge_engine.cache().len()
                );
            }
        }
    });

    // Task 2: heartbeat
    let hb_engine = engine.clone();
    let hb_journal = journal.clone();
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            let stats = hb_engine.stats();
            let cached = hb_engine.cache().len();
            info!(
                "HEARTBEAT: accepted={} dup={} rejected={} failed={} delivered={} delivery_failures={} cached_sources={}",
                stats.accepted,
                stats.duplicates,
                stats.rejected,
                stats.failed,
                stats.delivered,
                stats.delivery_failures,
                cached
            );
            write_event(
                &hb_journal,
                json!({
                    "ts": now_iso(),
                    "kind": "heartbeat",
                    "stats": stats,
                    "cached_sources": cached
                }),
            )
            .await;
        }
    });

    // Task 3: ingestion, until EOF or Ctrl+C
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &cli.replay {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open replay file {}", path.display()))?;
            info!("Replaying {}", path.display());
            Box::new(BufReader::new(file))
        }
        None => {
            info!("🚀 Streak Bot is reading stdin. Press Ctrl+C to stop.");
            Box::new(BufReader::new(tokio::io::stdin()))
        }
    };
    let mut transport = LineTransport::new(reader, clock);
    let mut router = SourceRouter::new(engine.clone());

    let shutdown_reason = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            "ctrl_c"
        }
        r = ingest_all(&mut transport, &mut router) => match r {
            Ok(()) => "end_of_input",
            Err(e) => {
                error!("Transport failed: {}", e);
                "transport_error"
            }
        }
    };

    let sources = router.sources();
    router.finish().await;
    info!("Ingestion drained for {} sources", sources);

    purge_handle.abort();
    heartbeat_handle.abort();

    drain_deliveries(&engine, Duration::from_secs(cfg.dispatch.timeout_secs)).await;

    let stats = engine.stats();
    info!(
        "Final: accepted={} dup={} rejected={} failed={} delivered={} delivery_failures={} malformed_lines={}",
        stats.accepted,
        stats.duplicates,
        stats.rejected,
        stats.failed,
        stats.delivered,
        stats.delivery_failures,
        transport.malformed()
    );
    write_event(
        &journal,
        json!({
            "ts": now_iso(),
            "kind": "bot_shutdown",
            "reason": shutdown_reason,
            "stats": stats
        }),
    )
    .await;

    info!("Streak Bot shut down.");
    Ok(())
}

/// Journal always; webhook too when configured.
fn build_notifier(
    cfg: &Arc<BotConfig>,
    journal: SharedJournal,
) -> anyhow::Result<Arc<dyn Notifier>> {
    let labels = Labels::new(cfg.clone());
    let journal_notifier: Arc<dyn Notifier> =
        Arc::new(JournalNotifier::new(journal, labels.clone()));

    let url = cfg.dispatch.webhook_url.trim();
    if url.is_empty() {
        return Ok(journal_notifier);
    }
    info!("Webhook delivery enabled: {}", url);
    let timeout = Duration::from_secs(cfg.dispatch.timeout_secs);
    let webhook: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(url, timeout, labels)?);
    Ok(Arc::new(FanoutNotifier::new(vec![journal_notifier, webhook])))
}

/// Hand every message to its source's queue until end of input.
async fn ingest_all<R>(
    transport: &mut LineTransport<R>,
    router: &mut SourceRouter,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(msg) = transport.next_message().await? {
        router.route(msg).await;
    }
    Ok(())
}

/// Wait for spawned deliveries to settle, at most `limit`.
async fn drain_deliveries(engine: &RuleEngine, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    while engine.stats().in_flight() > 0 {
        if tokio::time::Instant::now() >= deadline {
            warn!(
                "{} deliveries still in flight at shutdown",
                engine.stats().in_flight()
            );
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
