use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use changeover_watchbot::config;
use changeover_watchbot::db;

#[derive(Parser, Debug)]
#[command(about = "Print the stored state document of a property")]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Property to inspect; lists stored properties when omitted
    #[arg(long)]
    property: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let Some(property) = args.property else {
        for stored in db::list_states(&pool).await? {
            println!("{} (updated {})", stored.property, stored.updated_at);
        }
        return Ok(());
    };

    let state = db::load_state(&pool, &property)
        .await?
        .ok_or_else(|| anyhow!("no stored state for '{}'", property))?;
    println!("Property: {}", property);
    match state.last_full_message_sent_at {
        Some(at) => println!("Last weekly summary: {}", at.to_rfc3339()),
        None => println!("Last weekly summary: never"),
    }
    println!("Events ({}):", state.events.len());
    for (id, ev) in &state.events {
        println!(
            "  {} -> {{ date: {}, type: {}, cleaner: {} }}",
            id,
            ev.date.format("%d/%m/%Y"),
            ev.task_type.as_str(),
            ev.assigned_cleaner.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
