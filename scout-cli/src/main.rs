//! karmascout CLI
//!
//! Finds the most active accounts across forums and keeps a ranked registry.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use scout_core::RandomPacing;
use scout_forum::RedditSource;
use scout_outreach::{
    JsonFileRegistry, LogNotifier, RegistryStore, SharedNotifier, TelegramConfig, TelegramNotifier,
};
use scout_runtime::{LeaseFile, Pipeline, RunLease, RunOutcome, RunSummary, Scheduler};

use crate::config::{Config, Secrets, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "karmascout")]
#[command(author, version, about = "karmascout: active-account discovery across forums", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ./karmascout.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (0-3)
    #[arg(short, long, global = true, default_value = "1")]
    verbose: u8,

    #[command(flatten)]
    secrets: Secrets,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the discovery pipeline once
    Run {
        /// Log notifications instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run now and then on a fixed interval until Ctrl-C
    Watch {
        /// Seconds between runs (default from config, 600)
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Log notifications instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve and print the forum list
    Forums,

    /// Print the persisted registry
    Registry {
        /// Number of accounts to show
        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// Check access to the forum source
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::load(path, true)?,
        None => Config::load(Path::new(DEFAULT_CONFIG_PATH), false)?,
    };
    config.apply_secrets(&cli.secrets);

    match cli.command {
        Commands::Run { dry_run } => {
            let pipeline = build_pipeline(&config, dry_run)?;
            println!("🔎 karmascout - active-account discovery\n");
            match pipeline.run_once().await? {
                RunOutcome::Completed(summary) => print_summary(&summary),
                RunOutcome::Skipped => {
                    println!("⏭️  Another run holds the registry lease, nothing done.")
                }
            }
        }
        Commands::Watch {
            interval_secs,
            dry_run,
        } => {
            let pipeline = Arc::new(build_pipeline(&config, dry_run)?);
            let interval =
                Duration::from_secs(interval_secs.unwrap_or(config.schedule.interval_secs));
            println!(
                "⏰ Running every {}s, press Ctrl-C to stop",
                interval.as_secs()
            );

            let stats = Scheduler::new(pipeline, interval).run().await;
            println!(
                "\n📊 {} runs completed, {} skipped, {} failed",
                stats.completed, stats.skipped, stats.failed
            );
        }
        Commands::Forums => {
            let pipeline = build_pipeline(&config, true)?;
            let forums = pipeline.resolve_forums().await?;
            println!("📋 {} forums:", forums.len());
            for forum in forums {
                println!("   {}", forum);
            }
        }
        Commands::Registry { top } => {
            show_registry(&config, top).await?;
        }
        Commands::Status => {
            check_status(&config).await?;
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over `--verbose` when set
fn init_logging(verbose: u8) {
    if std::env::var_os("RUST_LOG").is_some() {
        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .with_thread_ids(false)
            .compact()
            .init();
        return;
    }

    let log_level = match verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();
}

fn build_source(config: &Config) -> Result<Arc<RedditSource>> {
    let source = RedditSource::new(config.reddit_config())
        .context("Failed to create Reddit client")?
        .with_profile_base(&config.outreach.profile_url_base);
    Ok(Arc::new(source))
}

fn build_notifier(config: &Config, dry_run: bool) -> Result<SharedNotifier> {
    if dry_run {
        return Ok(Arc::new(LogNotifier));
    }

    match config.telegram_target() {
        Some((token, chat_id)) => {
            let notifier = TelegramNotifier::new(TelegramConfig::new(&token, &chat_id))
                .context("Failed to create Telegram notifier")?;
            Ok(Arc::new(notifier))
        }
        None => {
            tracing::warn!("Telegram is not configured, notifications go to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}

fn build_pipeline(config: &Config, dry_run: bool) -> Result<Pipeline> {
    let source = build_source(config)?;
    let notifier = build_notifier(config, dry_run)?;
    let registry = Arc::new(JsonFileRegistry::new(&config.registry.path));

    let lease = RunLease::new(config.registry.overlap).with_file(LeaseFile::for_registry(
        &config.registry.path,
        Duration::from_secs(config.registry.stale_after_secs),
    ));
    let pacing = RandomPacing::from_millis(config.pacing.min_ms, config.pacing.max_ms);

    Ok(Pipeline::new(config.pipeline_config(), source, registry, notifier)
        .with_pacing(Arc::new(pacing))
        .with_template(config.outreach_template())
        .with_lease(lease))
}

fn print_summary(summary: &RunSummary) {
    let elapsed = summary.finished_at - summary.started_at;

    println!("✅ Run {} complete in {}s", summary.run_id, elapsed.num_seconds());
    println!("📡 Listing: {}", summary.plan);
    println!(
        "📋 Forums: {} processed, {} skipped",
        summary.forums.len() - summary.abandoned.len(),
        summary.abandoned.len()
    );
    for (forum, reason) in &summary.abandoned {
        println!("   ⚠️  {}: {}", forum, reason);
    }
    println!(
        "👥 Accounts: {} seen in {} posts, {} above thresholds",
        summary.accounts_seen,
        summary.posts_sampled,
        summary.candidates.len()
    );
    println!(
        "💾 Registry: {} accounts ({} new, {} updated){}",
        summary.merge.total,
        summary.merge.inserted,
        summary.merge.updated,
        if summary.merge.persisted { "" } else { ", not rewritten" }
    );
    println!(
        "📨 Notifications: {} sent, {} failed, summary {}",
        summary.notify.sent,
        summary.notify.failed,
        if summary.notify.summary_sent { "sent" } else { "not sent" }
    );

    if !summary.candidates.is_empty() {
        println!("\n🏆 Top accounts this run:");
        for (i, c) in summary.candidates.iter().take(10).enumerate() {
            println!(
                "   {:>2}. {} - {} karma, {} posts, {} forums",
                i + 1,
                c.handle,
                c.karma_sum,
                c.post_count,
                c.cross_forum_score
            );
        }
    }
}

async fn show_registry(config: &Config, top: usize) -> Result<()> {
    let registry = JsonFileRegistry::new(&config.registry.path);
    let records = registry.load().await?;

    if records.is_empty() {
        println!("📭 Registry {} is empty", registry.location());
        return Ok(());
    }

    println!(
        "📒 {} accounts in {} (showing {})\n",
        records.len(),
        registry.location(),
        top.min(records.len())
    );
    for (i, r) in records.iter().take(top).enumerate() {
        let forums: Vec<&str> = r.forums.iter().map(String::as_str).collect();
        println!(
            "{:>4}. {} - {} karma, {} posts in {}",
            i + 1,
            r.handle,
            r.karma_sum,
            r.post_count,
            forums.join(", ")
        );
        println!(
            "      first seen {} | updated {}",
            r.first_seen.format("%Y-%m-%d %H:%M"),
            r.last_updated.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

async fn check_status(config: &Config) -> Result<()> {
    println!("🔌 Checking Reddit access...\n");

    let source = build_source(config)?;
    let mode = if source.config().is_authenticated() {
        "script app"
    } else {
        "anonymous"
    };

    match source.check_connection().await {
        Ok(detail) => {
            println!("✅ Reddit reachable ({})", detail);
            println!("   Mode: {} | API: {}", mode, source.config().api_base);
        }
        Err(e) => {
            println!("❌ Reddit check failed: {}", e);
            println!("   Mode: {} | API: {}", mode, source.config().api_base);
        }
    }

    match config.telegram_target() {
        Some((_, chat_id)) => println!("📨 Telegram: chat {}", chat_id),
        None => println!("📨 Telegram: not configured, notifications go to the log"),
    }
    println!("💾 Registry: {}", config.registry.path.display());

    Ok(())
}
