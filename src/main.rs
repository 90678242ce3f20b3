use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use pagefeed::config::{load_feed_definitions, Config};
use pagefeed::feed::{build_client, Refresher, Scheduler, SchedulerHandle};
use pagefeed::storage::{Database, DatabaseError};

/// Get the config directory path (~/.config/pagefeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("pagefeed"))
}

#[derive(Parser, Debug)]
#[command(
    name = "pagefeed",
    version,
    about = "Turn HTML pages into feeds with CSS selectors"
)]
struct Args {
    /// Config file (default: ~/.config/pagefeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file (overrides config and PAGEFEED_DB_PATH)
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Sync feed definitions from a TOML file (matched by URL)
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Refresh every feed once and exit
    #[arg(long, conflicts_with_all = ["refresh", "preview", "reset"])]
    once: bool,

    /// Refresh one feed and exit
    #[arg(long, value_name = "ID", conflicts_with_all = ["preview", "reset"])]
    refresh: Option<i64>,

    /// Print the items a feed would produce, without storing them
    #[arg(long, value_name = "ID", conflicts_with = "reset")]
    preview: Option<i64>,

    /// Delete every stored item of a feed
    #[arg(long, value_name = "ID")]
    reset: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    // User-only access: the database may hold private feed URLs
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| config.resolve_database_path(&config_dir));
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };
    tracing::debug!(path = %db_path.display(), "Opened database");

    if let Some(import_file) = &args.import {
        let feeds = load_feed_definitions(import_file)
            .with_context(|| format!("Failed to read import file {}", import_file.display()))?;
        db.sync_feeds(&feeds)
            .await
            .context("Failed to sync feed definitions")?;
        println!("Imported {} feeds from {}", feeds.len(), import_file.display());
    }

    if let Some(feed_id) = args.reset {
        let removed = db
            .delete_items_for_feed(feed_id)
            .await
            .context("Failed to delete feed items")?;
        println!("Removed {} items from feed {}", removed, feed_id);
        return Ok(());
    }

    let limits = config.fetch_limits();
    let client =
        build_client(&config.user_agent, limits.timeout).context("Failed to build HTTP client")?;
    let refresher = Arc::new(Refresher::new(Arc::new(db.clone()), client, limits));

    if let Some(feed_id) = args.preview {
        let feed = db
            .get_feed(feed_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Feed {} not found", feed_id))?;
        let items = refresher
            .preview(&feed)
            .await
            .with_context(|| format!("Failed to preview feed {}", feed_id))?;
        for item in &items {
            let date = item
                .published
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "----------".to_string());
            println!("{}  {}\n            {}", date, item.title, item.link);
        }
        println!("{} items", items.len());
        return Ok(());
    }

    if let Some(feed_id) = args.refresh {
        let stats = refresher
            .refresh_by_id(feed_id)
            .await
            .with_context(|| format!("Failed to refresh feed {}", feed_id))?;
        println!(
            "Feed {}: {} matched, {} new, {} updated, {} failed",
            feed_id, stats.matched, stats.inserted, stats.updated, stats.failed
        );
        return Ok(());
    }

    if args.once {
        let summary = refresher.refresh_all().await;
        println!(
            "Refreshed {} feeds: {} succeeded, {} failed",
            summary.total, summary.succeeded, summary.failed
        );
        return Ok(());
    }

    let handle = Scheduler::new(refresher, config.refresh_interval()).start();
    wait_for_signals(&handle).await?;
    handle.shutdown().await;

    db.close().await;
    Ok(())
}

/// Block until SIGINT or SIGTERM. SIGHUP requests an immediate batch.
#[cfg(unix)]
async fn wait_for_signals(handle: &SchedulerHandle) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut hup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to listen for Ctrl+C")?;
                break;
            }
            _ = term.recv() => break,
            _ = hup.recv() => {
                tracing::info!("SIGHUP received, refreshing now");
                handle.run_now();
            }
        }
    }

    tracing::info!("Shutting down");
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signals(_handle: &SchedulerHandle) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Shutting down");
    Ok(())
}
