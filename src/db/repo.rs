use super::model::StoredState;
use super::StateError;
use crate::model::PropertyState;
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, instrument};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {normalized}"))?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Load the previous state of a property. `Ok(None)` when nothing was stored yet.
#[instrument(skip(pool))]
pub async fn load_state(pool: &Pool, property: &str) -> Result<Option<PropertyState>, StateError> {
    let document: Option<String> =
        sqlx::query_scalar("SELECT document FROM property_state WHERE property = ?")
            .bind(property)
            .fetch_optional(pool)
            .await?;
    let Some(document) = document else {
        debug!("no stored state");
        return Ok(None);
    };
    serde_json::from_str(&document)
        .map(Some)
        .map_err(|source| StateError::Corrupt {
            property: property.to_string(),
            source,
        })
}

/// Insert or replace the state document of a property.
#[instrument(skip(pool, state), fields(events = state.events.len()))]
pub async fn save_state(pool: &Pool, property: &str, state: &PropertyState) -> Result<(), StateError> {
    let document = serde_json::to_string_pretty(state).map_err(|source| StateError::Encode {
        property: property.to_string(),
        source,
    })?;
    sqlx::query(
        "INSERT INTO property_state (property, document, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP) \
         ON CONFLICT(property) DO UPDATE SET document = excluded.document, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(property)
    .bind(document)
    .execute(pool)
    .await?;
    Ok(())
}

/// All stored documents, ordered by property name.
#[instrument(skip_all)]
pub async fn list_states(pool: &Pool) -> Result<Vec<StoredState>, StateError> {
    let rows = sqlx::query(
        "SELECT property, document, updated_at FROM property_state ORDER BY property ASC",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|row| -> Result<StoredState, StateError> {
            Ok(StoredState {
                property: row.try_get("property")?,
                document: row.try_get("document")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .collect()
}
