use anyhow::{Context, Result};
use chrono::DateTime;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use changeover_watchbot::config;
use changeover_watchbot::db;
use changeover_watchbot::notify;
use changeover_watchbot::run::Runner;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Run a single tick and exit
    #[arg(long)]
    once: bool,

    /// Log drafted messages instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Pretend the current time is this RFC 3339 instant (implies --once)
    #[arg(long)]
    now: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let window = cfg.schedule.window()?;
    let notifier = notify::from_config(&cfg.notify, args.dry_run)?;
    let runner = Runner::new(
        pool,
        window,
        notifier,
        PathBuf::from(cfg.app.resolved_output_dir()),
    )?;

    if let Some(raw) = &args.now {
        let now = DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("--now '{raw}' is not an RFC 3339 timestamp"))?;
        let now = window.observe(&now);
        runner.run_once(&cfg.properties, &now).await;
        return Ok(());
    }

    if args.once {
        runner.run_once(&cfg.properties, &window.now()).await;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(cfg.app.interval_minutes * 60));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(interval_minutes = cfg.app.interval_minutes, "starting scheduler");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcomes = runner.run_once(&cfg.properties, &window.now()).await;
                if outcomes.len() < cfg.properties.len() {
                    warn!(
                        failed = cfg.properties.len() - outcomes.len(),
                        "some properties failed this tick"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}
