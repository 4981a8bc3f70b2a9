use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use feedmirror::db::{Database, Post, PostField, PostQuery, PostStore};
use feedmirror::logging::configure_logging;
use feedmirror::{Config, FeedMap, Ingestor, TARGET_INGEST};

#[derive(Parser)]
#[clap(name = "feedmirror", about = "Mirror RSS/Atom feeds with locally stored images")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read every configured feed and store new posts
    Sync {
        /// JSON file mapping feed URLs to categories (overrides FEEDMIRROR_FEEDS*)
        #[clap(short, long)]
        feeds: Option<PathBuf>,
    },

    /// List stored posts, newest first
    List {
        /// Only posts of this category
        #[clap(short, long)]
        category: Option<String>,

        /// Number of posts to show
        #[clap(short, long, default_value = "20")]
        limit: u32,

        /// Number of posts to skip
        #[clap(short, long, default_value = "0")]
        offset: u32,

        /// Print JSON instead of a summary
        #[clap(long)]
        json: bool,
    },

    /// Print one stored post as JSON
    Show {
        #[clap(required = true)]
        hash_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;

    configure_logging(&config.log_dir);

    let db = Database::open(&config)
        .await
        .with_context(|| format!("cannot open database in {}", config.database_dir.display()))?;

    let result = match args.command {
        Commands::Sync { feeds } => sync(&config, &db, feeds).await,
        Commands::List {
            category,
            limit,
            offset,
            json,
        } => list(&db, category, limit, offset, json).await,
        Commands::Show { hash_id } => show(&db, &hash_id).await,
    };

    db.close().await;
    result
}

async fn sync(config: &Config, db: &Database, feeds: Option<PathBuf>) -> Result<()> {
    let feeds = match feeds {
        Some(path) => FeedMap::from_json_file(&path)
            .with_context(|| format!("cannot read feeds from {}", path.display()))?,
        None => FeedMap::from_env()?,
    };
    if feeds.is_empty() {
        println!(
            "{}",
            "No feeds configured. Set FEEDMIRROR_FEEDS, FEEDMIRROR_FEEDS_FILE or pass --feeds.".yellow()
        );
        return Ok(());
    }

    let ingestor = Ingestor::from_config(config, Arc::new(db.clone()))?;

    let report = tokio::select! {
        report = ingestor.run(&feeds) => report?,
        _ = signal::ctrl_c() => {
            info!(target: TARGET_INGEST, "Interrupted, stopping sync");
            return Ok(());
        }
    };

    let failed = if report.feeds_failed > 0 {
        report.feeds_failed.to_string().bright_red()
    } else {
        report.feeds_failed.to_string().normal()
    };
    println!(
        "{} feeds ok, {} failed",
        report.feeds_ok.to_string().bright_green(),
        failed
    );
    println!(
        "{} new posts, {} already stored, {} images localized, {} images kept remote",
        report.totals.committed.to_string().bright_green(),
        report.totals.skipped + report.totals.conflicts,
        report.totals.images_localized,
        report.totals.images_failed + report.totals.images_excluded
    );
    Ok(())
}

async fn list(db: &Database, category: Option<String>, limit: u32, offset: u32, json: bool) -> Result<()> {
    let mut query = PostQuery::new().limit(limit).offset(offset);
    if let Some(category) = category {
        query = query.filter(PostField::Category, category);
    }
    let posts = db.query(&query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&posts)?);
        return Ok(());
    }

    if posts.is_empty() {
        println!("{}", "No posts stored.".dimmed());
        return Ok(());
    }
    for post in &posts {
        print_post_line(post);
    }
    Ok(())
}

fn print_post_line(post: &Post) {
    let published = chrono::DateTime::from_timestamp(post.published, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| post.published.to_string());
    println!(
        "{}  {}  {}",
        published.dimmed(),
        format!("[{}]", post.category).bright_blue(),
        post.title.bold()
    );
    println!("    {}  {}", post.source, post.hash_id.dimmed());
}

async fn show(db: &Database, hash_id: &str) -> Result<()> {
    match db.find_by_hash_id(hash_id).await? {
        Some(post) => {
            println!("{}", serde_json::to_string_pretty(&post)?);
            Ok(())
        }
        None => {
            error!(target: TARGET_INGEST, "No post with hash_id {}", hash_id);
            anyhow::bail!("no post with hash_id {}", hash_id)
        }
    }
}
