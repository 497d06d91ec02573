//! Plain-text rendering of weekly summaries and change notifications.
use crate::diff::{Change, Diff};
use crate::model::EventRecord;
use crate::window::WeekRange;
use chrono::DateTime;
use chrono_tz::Tz;

const RULE: &str = "----------------------------------------";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

fn cleaner_name(cleaner: &Option<String>) -> &str {
    cleaner.as_deref().unwrap_or("Unassigned")
}

fn day_label(rec: &EventRecord) -> String {
    rec.date.format("%a %d %b").to_string()
}

/// `Tue 02 Dec – Cleaning: Checkin Not Same Day (Ana)`
pub fn format_event_line(rec: &EventRecord) -> String {
    format!(
        "{} – {} ({})",
        day_label(rec),
        rec.task_type.label(),
        cleaner_name(&rec.assigned_cleaner)
    )
}

fn sorted(events: &[EventRecord]) -> Vec<&EventRecord> {
    let mut out: Vec<&EventRecord> = events.iter().collect();
    out.sort_by_key(|e| e.date);
    out
}

/// Summary of the cleanings in `week`; `events` are already restricted to it.
pub fn format_weekly(property_name: &str, week: &WeekRange, events: &[EventRecord]) -> Message {
    let title = format!("Weekly Cleaning Schedule – {property_name}");
    let mut lines = vec![
        title.clone(),
        format!(
            "{} → {}",
            week.monday.format("%d %b"),
            week.sunday.format("%d %b")
        ),
        RULE.to_string(),
    ];
    if events.is_empty() {
        lines.push("No cleanings scheduled next week.".to_string());
    } else {
        lines.extend(sorted(events).into_iter().map(format_event_line));
    }
    Message {
        subject: title,
        body: lines.join("\n"),
    }
}

fn describe_change(change: &Change) -> String {
    let (old, new) = (&change.old, &change.new);
    let mut parts = Vec::new();
    if old.task_type != new.task_type {
        parts.push(format!(
            "type: {} → {}",
            old.task_type.label(),
            new.task_type.label()
        ));
    }
    if old.assigned_cleaner != new.assigned_cleaner {
        parts.push(format!(
            "cleaner: {} → {}",
            cleaner_name(&old.assigned_cleaner),
            cleaner_name(&new.assigned_cleaner)
        ));
    }
    if parts.is_empty() {
        "details updated".to_string()
    } else {
        parts.join(", ")
    }
}

/// Remaining schedule up to `cutoff` followed by the change log. `current`
/// holds the events dated from today through the cutoff day, `changes` the
/// filtered diff.
pub fn format_change(
    property_name: &str,
    now: &DateTime<Tz>,
    cutoff: &DateTime<Tz>,
    current: &[EventRecord],
    changes: &Diff,
) -> Message {
    let mut lines = vec![
        format!("Updated Cleaning Schedule – {property_name}"),
        format!("{} → {}", now.format("%d %b"), cutoff.format("%A %d %b %H:%M")),
        RULE.to_string(),
    ];
    if current.is_empty() {
        lines.push("No remaining cleanings for this week.".to_string());
    } else {
        lines.extend(sorted(current).into_iter().map(format_event_line));
    }

    let mut body = lines.join("\n");
    body.push_str("\n\nChanges since last update:\n");

    let mut added: Vec<&EventRecord> = changes.added.values().collect();
    added.sort_by_key(|e| e.date);
    for rec in added {
        body.push_str(&format!("+ Added: {}\n", format_event_line(rec)));
    }

    let mut removed: Vec<&EventRecord> = changes.removed.values().collect();
    removed.sort_by_key(|e| e.date);
    for rec in removed {
        body.push_str(&format!("- Removed: {}\n", format_event_line(rec)));
    }

    let mut changed: Vec<&Change> = changes.changed.values().collect();
    changed.sort_by_key(|c| c.new.date);
    for change in changed {
        body.push_str(&format!(
            "* Updated: {} ({})\n",
            day_label(&change.new),
            describe_change(change)
        ));
    }

    if !changes.has_changes() {
        body.push_str("No changes.\n");
    }

    Message {
        subject: format!("Cleaning Schedule Update – {property_name}"),
        body,
    }
}
