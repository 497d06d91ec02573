//! Schedule export: CSV and ICS files per property.
use crate::model::{CleaningTask, DATE_FORMAT};
use icalendar::{Calendar, Component, Event, EventLike};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    date: String,
    property: &'a str,
    #[serde(rename = "type")]
    task_type: &'static str,
    assigned_cleaner: &'a str,
}

pub fn schedule_csv(tasks: &[CleaningTask]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for t in tasks {
        wtr.serialize(CsvRow {
            id: &t.id,
            date: t.date.format(DATE_FORMAT).to_string(),
            property: &t.property,
            task_type: t.task_type.label(),
            assigned_cleaner: t.assigned_cleaner.as_deref().unwrap_or(""),
        })?;
    }
    if tasks.is_empty() {
        wtr.write_record(["id", "date", "property", "type", "assigned_cleaner"])?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn schedule_ics(property_name: &str, tasks: &[CleaningTask]) -> String {
    let mut calendar = Calendar::new();
    calendar.name(&format!("{property_name} – Cleaning Schedule"));
    for t in tasks {
        let mut event = Event::new();
        event
            .uid(&t.id)
            .summary(&format!("{} – {}", t.task_type.label(), t.property))
            .all_day(t.date);
        if let Some(cleaner) = &t.assigned_cleaner {
            event.description(&format!("Cleaner: {cleaner}"));
        }
        calendar.push(event.done());
    }
    calendar.done().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub csv: PathBuf,
    pub ics: PathBuf,
}

/// Write `{name-without-spaces}.csv` and `.ics` into `output_dir`.
#[instrument(skip(tasks), fields(tasks = tasks.len()))]
pub async fn write_schedule(
    output_dir: &Path,
    property_name: &str,
    tasks: &[CleaningTask],
) -> Result<ExportedFiles, ExportError> {
    let safe_name = property_name.replace(' ', "");
    tokio::fs::create_dir_all(output_dir).await?;

    let csv = output_dir.join(format!("{safe_name}.csv"));
    tokio::fs::write(&csv, schedule_csv(tasks)?).await?;

    let ics = output_dir.join(format!("{safe_name}.ics"));
    tokio::fs::write(&ics, schedule_ics(property_name, tasks)).await?;

    info!(csv = %csv.display(), ics = %ics.display(), "schedule exported");
    Ok(ExportedFiles { csv, ics })
}
