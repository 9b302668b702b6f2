use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use gator::config::{parse_interval, Config};
use gator::feed::FeedFetcher;
use gator::ingest::{CancellationToken, Scheduler};
use gator::storage::{Database, DatabaseError};
use gator::util::validate_feed_url;

#[derive(Parser, Debug)]
#[command(name = "gator", about = "Personal RSS aggregator", version)]
struct Args {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll feeds forever, one feed per interval (e.g. 30s, 1m, 1h30m)
    Agg {
        #[arg(value_name = "INTERVAL")]
        interval: String,
    },
    /// Run a single ingestion cycle and exit
    Scrape,
    /// Register a feed for the current user
    AddFeed { name: String, url: String },
    /// List registered feeds
    Feeds {
        /// Print feeds as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the newest posts from the current user's feeds
    Browse {
        #[arg(long, default_value_t = 2)]
        limit: u32,
        /// Print posts as JSON
        #[arg(long)]
        json: bool,
    },
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

    // HOME is only needed for whatever the command line and config leave unset.
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Validate the interval before touching the database.
    let interval = match &args.command {
        Command::Agg { interval } => Some(parse_interval(interval)?),
        _ => None,
    };

    let db_path = config.database_path(Config::default_dir)?;
    let db = open_database(&db_path).await?;

    match args.command {
        Command::Agg { .. } => {
            let interval = interval.context("Missing polling interval")?;
            let fetcher = FeedFetcher::from_config(&config).context("Failed to build HTTP client")?;
            let scheduler = Scheduler::new(db, fetcher, interval)?;

            let cancel = CancellationToken::new();
            tokio::spawn(shutdown_on_signal(cancel.clone()));

            println!("Collecting feeds every {:?}", scheduler.interval());
            scheduler.run(cancel).await;
        }
        Command::Scrape => {
            let fetcher = FeedFetcher::from_config(&config).context("Failed to build HTTP client")?;
            let cancel = CancellationToken::new();
            tokio::spawn(shutdown_on_signal(cancel.clone()));

            let report = gator::ingest::run_cycle(&db, &fetcher, &cancel).await?;
            println!("{report}");
            println!("{} posts stored in total", db.count_posts().await?);
        }
        Command::AddFeed { name, url } => {
            let url = validate_feed_url(&url).context("Refusing feed URL")?;
            let user = db.ensure_user(&config.current_user_name).await?;
            let feed = db.insert_feed(&name, url.as_str(), user.id).await?;
            println!("Added feed {} ({}) for {}", feed.name, feed.url, user.name);
        }
        Command::Feeds { json } => {
            let feeds = db.list_feeds().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&feeds)?);
                return Ok(());
            }
            if feeds.is_empty() {
                println!("No feeds registered. Add one with: gator add-feed <name> <url>");
            }
            for feed in feeds {
                println!(
                    "* {} ({})\n  owner: {}, last fetched: {}",
                    feed.name,
                    feed.url,
                    feed.user_name,
                    format_timestamp(feed.last_fetched_at, "never")
                );
            }
        }
        Command::Browse { limit, json } => {
            let user = match db.get_user_by_name(&config.current_user_name).await {
                Ok(user) => user,
                Err(DatabaseError::NotFound(_)) => {
                    eprintln!("No feeds added yet for {}", config.current_user_name);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            let posts = db.get_posts_for_user(user.id, limit).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&posts)?);
            } else {
                for post in posts {
                    println!(
                        "{}\n  {}\n  published: {}",
                        post.title,
                        post.url,
                        format_timestamp(post.published_at, "unknown")
                    );
                    if !post.description.is_empty() {
                        println!("  {}", post.description);
                    }
                }
            }
        }
    }

    Ok(())
}

async fn open_database(db_path: &Path) -> Result<Database> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;

            // SEC-007: user-only access to the directory holding the database
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) =
                    std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))
                {
                    tracing::warn!(path = %parent.display(), error = %e, "Failed to set directory permissions to 0700");
                }
            }
        }
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(db_path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: the database at {db_path_str} is locked by another process.");
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn shutdown_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                token.cancel();
                return;
            }
        };

        tokio::select! {
            biased;
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl-C, shutting down gracefully");
    }

    token.cancel();
}

fn format_timestamp(ts: Option<i64>, missing: &str) -> String {
    ts.and_then(DateTime::<Utc>::from_timestamp_micros)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| missing.to_string())
}
