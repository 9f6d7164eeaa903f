//! Herald replay router.
//!
//! Feeds a capture of relay traffic through the router and logs every
//! delivery. Useful for checking configurations against real traffic and
//! for exercising the pipeline end to end.
//!
//! # Input
//!
//! One JSON object per line:
//!
//! ```text
//! {"relay": "wss://relay.example", "subscription": "sub-1", "message": ["EVENT", "sub-1", {...}]}
//! ```
//!
//! `message` may also be the raw relay text as a JSON string.
//!
//! Input is paced so the queue never overflows; `--no-pacing` submits as
//! fast as lines are read and lets drop-oldest kick in.
//!
//! # Usage
//!
//! ```bash
//! # Replay a capture file
//! herald-ingest --configurations configs.json capture.jsonl
//!
//! # Replay stdin, keeping dedupe state across runs
//! cat capture.jsonl | herald-ingest \
//!     --configurations configs.json \
//!     --dedupe-snapshot ./data/dedupe.json
//! ```
//!
//! # Graceful Shutdown
//!
//! Ctrl+C stops reading input, even while waiting on an idle stdin.
//! Messages already queued are still processed, the dedupe snapshot is
//! saved, and a summary is printed.

use anyhow::{Context, Result};
use clap::Parser;
use herald_core::metrics::{init_metrics, start_metrics_server};
use herald_ingest::{
    Collaborators, Configuration, DedupeCache, Diagnostics, LogSink, MemoryConfigurationRegistry,
    MemorySubscriptionRegistry, Router, RouterConfig,
};
use metrics::gauge;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::{Notify, mpsc};
use tracing_subscriber::EnvFilter;

/// Herald replay router.
#[derive(Parser, Debug)]
#[command(name = "herald-ingest")]
#[command(about = "Replay captured relay traffic through the herald router")]
#[command(version)]
struct Args {
    /// JSONL capture to replay (stdin if omitted or "-")
    input: Option<PathBuf>,

    /// JSON array of configurations
    #[arg(long, short)]
    configurations: PathBuf,

    /// Dedupe snapshot, loaded at start and saved at shutdown
    #[arg(long)]
    dedupe_snapshot: Option<PathBuf>,

    /// Ingest queue capacity
    #[arg(long, default_value = "100")]
    queue_capacity: usize,

    /// Messages per dispatch batch
    #[arg(long, default_value = "10")]
    batch_size: usize,

    /// Pause between dispatch batches in milliseconds
    #[arg(long, default_value = "10")]
    batch_delay_ms: u64,

    /// Event ids remembered by the dedupe cache
    #[arg(long, default_value = "500")]
    dedupe_capacity: usize,

    /// Fraction of cache capacity reported as near-capacity
    #[arg(long, default_value = "0.9")]
    near_capacity_threshold: f64,

    /// Consecutive unmatched events before a subscription is flagged
    #[arg(long, default_value = "5")]
    unmatched_threshold: u32,

    /// Largest serialized event carried inline in a delivery URI
    #[arg(long, default_value = "512000")]
    max_inline_event_bytes: usize,

    /// Verify event signatures
    #[arg(long)]
    verify_signatures: bool,

    /// Buffered diagnostic records
    #[arg(long, default_value = "1024")]
    diagnostics_capacity: usize,

    /// Submit as fast as input is read, letting the queue overflow
    #[arg(long)]
    no_pacing: bool,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "0")]
    metrics_port: u16,
}

impl Args {
    fn router_config(&self) -> RouterConfig {
        RouterConfig {
            queue_capacity: self.queue_capacity,
            batch_size: self.batch_size,
            batch_delay_ms: self.batch_delay_ms,
            dedupe_capacity: self.dedupe_capacity,
            near_capacity_threshold: self.near_capacity_threshold,
            unmatched_threshold: self.unmatched_threshold,
            max_inline_event_bytes: self.max_inline_event_bytes,
            verify_signatures: self.verify_signatures,
            diagnostics_capacity: self.diagnostics_capacity,
        }
    }
}

/// One captured relay message.
#[derive(Debug, Deserialize)]
struct ReplayLine {
    relay: String,
    subscription: String,
    message: serde_json::Value,
}

impl ReplayLine {
    fn raw(&self) -> String {
        match &self.message {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Ctrl+C state shared between the signal handler and the replay loop.
#[derive(Default)]
struct Shutdown {
    requested: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
        // Stores a permit if the replay loop isn't waiting yet.
        self.notify.notify_one();
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Where replay lines come from.
enum Input<R> {
    Reader(Lines<R>),
    /// Lines read by a dedicated thread. Used for stdin, whose blocking
    /// read would otherwise hold up runtime shutdown.
    Channel(mpsc::Receiver<std::io::Result<String>>),
}

impl<R: AsyncBufRead + Unpin> Input<R> {
    fn reader(reader: R) -> Self {
        Self::Reader(reader.lines())
    }

    /// Cancel safe.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        match self {
            Self::Reader(lines) => lines.next_line().await,
            Self::Channel(rx) => rx.recv().await.transpose(),
        }
    }
}

/// Read stdin on its own thread. The thread is left behind if input is
/// still open at exit.
fn stdin_lines() -> Result<mpsc::Receiver<std::io::Result<String>>> {
    use std::io::BufRead;

    let (tx, rx) = mpsc::channel(1024);
    std::thread::Builder::new()
        .name("herald-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })
        .context("Failed to start stdin reader")?;
    Ok(rx)
}

#[derive(Debug, Default)]
struct ReplayStats {
    lines_read: usize,
    messages_submitted: usize,
    invalid_lines: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse()?)
                .add_directive("herald_ingest=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = args.router_config();
    config
        .validate()
        .context("Invalid router configuration")?;

    tracing::info!("Herald replay starting...");

    if args.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(args.metrics_port, metrics_handle).await?;
        gauge!("herald_replay_running").set(1.0);
    }

    // Set up graceful shutdown
    let shutdown = Arc::new(Shutdown::default());
    let shutdown_clone = Arc::clone(&shutdown);

    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, draining queue...");
        shutdown_clone.trigger();
    })
    .context("Failed to set Ctrl+C handler")?;

    let (subscriptions, configurations) = load_registries(&args.configurations)?;

    let dedupe = match &args.dedupe_snapshot {
        Some(path) => DedupeCache::load_snapshot(path, config.dedupe_capacity)
            .with_context(|| format!("Failed to load dedupe snapshot {}", path.display()))?,
        None => DedupeCache::new(config.dedupe_capacity),
    };

    let (diagnostics, worker) = Diagnostics::channel(config.diagnostics_capacity);
    let worker_handle = worker
        .start()
        .context("Failed to start diagnostics worker")?;

    tracing::info!("Configuration:");
    tracing::info!("  Configurations: {}", configurations.all().len());
    tracing::info!("  Active subscriptions: {}", subscriptions.active_count());
    tracing::info!("  Queue capacity: {}", config.queue_capacity);
    tracing::info!(
        "  Batches: {} every {}ms",
        config.batch_size,
        config.batch_delay_ms
    );
    tracing::info!(
        "  Dedupe: {}/{} ids loaded",
        dedupe.len(),
        config.dedupe_capacity
    );
    tracing::info!("  Verify signatures: {}", config.verify_signatures);

    let router = Router::with_dedupe(
        config,
        dedupe,
        Collaborators {
            subscriptions: subscriptions.clone(),
            configurations,
            sink: Arc::new(LogSink),
        },
        diagnostics,
        tokio::runtime::Handle::current(),
    )?;

    let stats = match args.input.as_deref() {
        Some(path) if path != Path::new("-") => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let input = Input::reader(BufReader::new(file));
            replay(input, &router, &shutdown, !args.no_pacing).await?
        }
        _ => {
            let input = Input::<BufReader<tokio::fs::File>>::Channel(stdin_lines()?);
            replay(input, &router, &shutdown, !args.no_pacing).await?
        }
    };

    tracing::info!("Input finished, waiting for queued messages...");
    router.wait_idle().await;

    if let Some(path) = &args.dedupe_snapshot {
        router
            .save_dedupe_snapshot(path)
            .with_context(|| format!("Failed to save dedupe snapshot {}", path.display()))?;
    }

    let cache = router.cache_stats();
    let candidates = router.cancellation_candidates();
    let queue_dropped = router.queue_dropped_total();
    let diagnostics_dropped = router.diagnostics_dropped_total();
    let near_capacity = router.is_cache_near_capacity();

    // Dropping the last handle lets the worker count what is still
    // buffered and exit.
    drop(router);
    if let Err(e) = worker_handle.join() {
        tracing::warn!("Diagnostics worker panicked: {:?}", e);
    }

    if args.metrics_port > 0 {
        gauge!("herald_replay_running").set(0.0);
    }

    // Print summary
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("REPLAY COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Lines read:           {}", stats.lines_read);
    tracing::info!("Messages submitted:   {}", stats.messages_submitted);
    tracing::info!("Invalid lines:        {}", stats.invalid_lines);
    tracing::info!("Queue drops:          {}", queue_dropped);
    tracing::info!(
        "Dedupe cache:         {}/{} ({:.1}%{})",
        cache.current_size,
        cache.max_size,
        cache.utilization_percent,
        if near_capacity { ", near capacity" } else { "" }
    );
    tracing::info!(
        "Newest cached id:     {}",
        cache.newest_id.as_deref().unwrap_or("-")
    );
    tracing::info!("Diagnostics dropped:  {}", diagnostics_dropped);
    if candidates.is_empty() {
        tracing::info!("Cancellation candidates: none");
    } else {
        tracing::info!("Cancellation candidates: {}", candidates.join(", "));
    }

    Ok(())
}

/// Read configurations and register a subscription for each enabled,
/// bound configuration.
fn load_registries(
    path: &Path,
) -> Result<(Arc<MemorySubscriptionRegistry>, Arc<MemoryConfigurationRegistry>)> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open configurations {}", path.display()))?;
    let loaded: Vec<Configuration> = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse configurations {}", path.display()))?;

    let subscriptions = Arc::new(MemorySubscriptionRegistry::new());
    let configurations = Arc::new(MemoryConfigurationRegistry::new());

    for configuration in loaded {
        match (&configuration.subscription_id, configuration.enabled) {
            (Some(subscription_id), true) => {
                subscriptions.register(subscription_id.clone(), configuration.id.clone());
            }
            (None, true) => {
                tracing::warn!(
                    "Configuration {} is enabled but has no subscription id",
                    configuration.id
                );
            }
            (_, false) => {
                tracing::debug!("Configuration {} is disabled", configuration.id);
            }
        }
        configurations.upsert(configuration);
    }

    Ok((subscriptions, configurations))
}

async fn replay<R: AsyncBufRead + Unpin>(
    mut input: Input<R>,
    router: &Router,
    shutdown: &Shutdown,
    paced: bool,
) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();
    let capacity = router.config().queue_capacity;
    let pause = Duration::from_millis(router.config().batch_delay_ms.max(1));

    'input: loop {
        let line = tokio::select! {
            line = input.next_line() => line.context("Failed to read input")?,
            _ = shutdown.notify.notified() => None,
        };
        let Some(line) = line else {
            break;
        };
        if shutdown.is_requested() {
            break;
        }
        stats.lines_read += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<ReplayLine>(line) {
            Ok(entry) => {
                // A capture reads far faster than live sockets deliver.
                while paced && router.queue_len() >= capacity {
                    if shutdown.is_requested() {
                        break 'input;
                    }
                    tokio::time::sleep(pause).await;
                }
                router.submit(entry.raw(), entry.subscription, entry.relay);
                stats.messages_submitted += 1;
            }
            Err(e) => {
                stats.invalid_lines += 1;
                tracing::warn!("Skipping line {}: {}", stats.lines_read, e);
            }
        }

        if stats.lines_read.is_multiple_of(1000) {
            tracing::info!(
                "Progress: {} lines, {} queued, {} cached ids",
                stats.lines_read,
                router.queue_len(),
                router.cache_len()
            );
            // Give the dispatch loop a turn on large captures.
            tokio::task::yield_now().await;
        }
    }

    if shutdown.is_requested() {
        tracing::info!("Stopping input after {} lines", stats.lines_read);
    }

    Ok(stats)
}
