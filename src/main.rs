use clap::{Parser, Subcommand};
use logbook::core::config::Config;
use logbook::core::{EventSink, JournalEvent, ScanIndex, TransientEvent};
use logbook::feeds::{HistoryRefresh, RefreshProgress};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "logbook", about = "Logbook: journal ingestion for a space-sim companion")]
struct Cli {
    /// Write debug logs to /tmp/logbook-debug.log (tail -f to inspect).
    #[arg(long, global = true)]
    debug: bool,

    /// Extra config file layered over ~/.config/logbook/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Tail the journal folder until Ctrl-C.
    Watch {
        /// Run a history refresh first and continue from its last file.
        #[arg(long)]
        refresh: bool,
    },
    /// Ingest every journal file above the history floor.
    Refresh {
        /// Reparse the newest N files from the start.
        #[arg(long)]
        reload_last: Option<usize>,
    },
    /// Drop a file's cursor and every event it produced.
    Forget { path: PathBuf },
    /// Print cursor, commander and event counts.
    Stats,
}

fn init_logging(debug: bool) -> anyhow::Result<()> {
    if debug {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open("/tmp/logbook-debug.log")?;
        tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .init();
        tracing::info!("logbook debug log started, tail -f /tmp/logbook-debug.log");
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
    Ok(())
}

/// Prints each stored or transient event as one line on stdout.
struct PrintSink;

impl EventSink for PrintSink {
    fn on_new_events(&mut self, stored: &[JournalEvent], transient: &[TransientEvent]) {
        for ev in stored {
            println!(
                "{} #{:<8} {:<12} {}",
                ev.timestamp.format("%Y-%m-%d %H:%M:%S"),
                ev.seq.unwrap_or_default(),
                ev.commander_id,
                ev.tag
            );
        }
        for ev in transient {
            println!("{} {:>9} {:<12} {}", ev.timestamp.format("%Y-%m-%d %H:%M:%S"), "-", ev.commander_id, ev.tag);
        }
    }
}

/// Run a refresh on a blocking thread; Ctrl-C cancels between files.
async fn run_refresh(
    cfg: &Config,
    mut store: logbook::core::JournalStore,
    reload_last_n: usize,
) -> anyhow::Result<(logbook::core::JournalStore, logbook::feeds::RefreshSummary)> {
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let watcher = logbook::watcher_from(cfg)?;
    let reader = logbook::reader_from(cfg);
    let task = tokio::task::spawn_blocking(move || {
        let summary = HistoryRefresh::new(&mut store, &watcher, reader, reload_last_n).run(
            &cancel,
            |p| match p {
                RefreshProgress::File { index, total, path } => {
                    tracing::info!(file = index + 1, total, path = %path.display(), "refreshing");
                }
                RefreshProgress::Done => tracing::info!("refresh complete"),
            },
        )?;
        Ok::<_, anyhow::Error>((store, summary))
    });
    let result = task.await?;
    ctrl_c.abort();
    result
}

async fn watch(cfg: Config, refresh_first: bool) -> anyhow::Result<()> {
    let mut store = logbook::open_store(&cfg)?;
    let mut handoff = None;
    if refresh_first {
        let (s, summary) = run_refresh(&cfg, store, cfg.refresh.reload_last_n).await?;
        store = s;
        if summary.cancelled {
            return Ok(());
        }
        handoff = summary.last;
    }

    let mut watcher = logbook::watcher_from(&cfg)?;
    watcher.start()?;
    let mut scheduler = logbook::scheduler_from(&cfg, store, watcher);
    scheduler.add_sink(Box::new(PrintSink));
    let index = Rc::new(RefCell::new(ScanIndex::new()));
    scheduler.add_sink(Box::new(Rc::clone(&index)));
    if let Some(cursor) = handoff {
        scheduler.set_active(cursor);
    }

    let mut interval = tokio::time::interval(Duration::from_millis(cfg.scheduler.poll_interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(folder = %cfg.journal.folder_path().display(), "watching journal folder");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = scheduler.tick() {
                    tracing::error!(error = %e, "ingestion tick failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("stopping");
                break;
            }
        }
    }
    scheduler.watcher_mut().stop();

    let index = index.borrow();
    println!(
        "this session: {} systems, {} scanned bodies{}",
        index.system_count(),
        index.scanned_body_count(),
        index
            .current_system()
            .map(|s| format!(", last in {s}"))
            .unwrap_or_default()
    );
    Ok(())
}

fn stats(cfg: &Config) -> anyhow::Result<()> {
    let store = logbook::open_store(cfg)?;
    let cursors = store.cursors()?;
    println!("files:      {}", cursors.len());
    println!("commanders: {}", store.commanders()?.len());
    println!("events:     {}", store.event_count()?);
    for c in cursors.iter().rev().take(5) {
        println!("  {:<8} {:>10}  {}", c.id, c.pos, c.path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug)?;
    let cfg = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Watch { refresh } => watch(cfg, refresh).await,
        Command::Refresh { reload_last } => {
            let store = logbook::open_store(&cfg)?;
            let n = reload_last.unwrap_or(cfg.refresh.reload_last_n);
            let (_, summary) = run_refresh(&cfg, store, n).await?;
            println!(
                "read {} files, stored {} events{}",
                summary.files_read,
                summary.events_stored,
                if summary.cancelled { " (cancelled)" } else { "" }
            );
            Ok(())
        }
        Command::Forget { path } => {
            let mut store = logbook::open_store(&cfg)?;
            let removed = store.forget(&path)?;
            println!("removed {removed} events for {}", path.display());
            Ok(())
        }
        Command::Stats => stats(&cfg),
    }
}
