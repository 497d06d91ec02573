//! One scheduler tick: fetch, detect, diff, decide, deliver, persist.
use crate::calendar::{self, fetch_calendar, merge_bookings, parse_ical};
use crate::changeover::detect;
use crate::config::Property;
use crate::db::{self, Pool, StateError};
use crate::diff::{self, Diff};
use crate::export;
use crate::message::{format_change, format_weekly, Message};
use crate::model::{events_from_tasks, Booking, CleaningTask, EventMap, EventRecord, PropertyState};
use crate::notify::Notifier;
use crate::policy::{self, Action, Decision};
use crate::window::NotificationWindow;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::future::{join_all, try_join_all};
use reqwest::Client;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// Everything decided for one property before any delivery happens.
#[derive(Debug, Clone)]
pub struct Plan {
    pub events: EventMap,
    pub diff: Diff,
    pub cutoff: DateTime<Tz>,
    pub decision: Decision,
    pub message: Option<Message>,
}

/// Pure evaluation of a run against the state loaded at its start.
pub fn evaluate(
    window: &NotificationWindow,
    property_name: &str,
    tasks: &[CleaningTask],
    previous: &PropertyState,
    now: &DateTime<Tz>,
) -> Plan {
    let events = events_from_tasks(tasks);
    let diff = diff::diff(&previous.events, &events);
    let cutoff = window.next_cutoff(now);
    let weekly = window.is_weekly_summary_instant(now);
    let decision = policy::decide(
        window,
        &diff,
        now,
        &cutoff,
        weekly,
        previous.last_full_message_sent_at.as_ref(),
    );

    let message = match decision.action {
        Action::SendWeekly => {
            let week = window.next_week(now);
            let in_week: Vec<EventRecord> = events
                .values()
                .filter(|e| week.contains(e.date))
                .cloned()
                .collect();
            Some(format_weekly(property_name, &week, &in_week))
        }
        Action::SendChange => {
            let remaining = window.remaining_period(now, &cutoff);
            let current: Vec<EventRecord> = events
                .values()
                .filter(|e| remaining.contains(&e.date))
                .cloned()
                .collect();
            Some(format_change(
                property_name,
                now,
                &cutoff,
                &current,
                &decision.filtered,
            ))
        }
        Action::None => None,
    };

    Plan {
        events,
        diff,
        cutoff,
        decision,
        message,
    }
}

/// State to persist after delivery. Events are always refreshed; the weekly
/// marker only moves when a weekly summary was actually delivered.
pub fn apply_delivery(
    previous: &PropertyState,
    plan: &Plan,
    delivered: bool,
    now: &DateTime<Tz>,
) -> PropertyState {
    let last_full_message_sent_at = if plan.decision.action == Action::SendWeekly && delivered {
        Some(now.with_timezone(&Utc))
    } else {
        previous.last_full_message_sent_at
    };
    PropertyState {
        events: plan.events.clone(),
        last_full_message_sent_at,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub property: String,
    pub tasks: usize,
    pub action: Action,
    /// `None` when nothing had to be sent.
    pub delivered: Option<bool>,
}

pub struct Runner {
    pool: Pool,
    http: Client,
    window: NotificationWindow,
    notifier: Box<dyn Notifier>,
    output_dir: PathBuf,
}

impl Runner {
    pub fn new(
        pool: Pool,
        window: NotificationWindow,
        notifier: Box<dyn Notifier>,
        output_dir: PathBuf,
    ) -> Result<Self> {
        let http = calendar::http_client().context("failed to build calendar HTTP client")?;
        Ok(Self {
            pool,
            http,
            window,
            notifier,
            output_dir,
        })
    }

    async fn load_bookings(&self, property: &Property) -> Result<Vec<Booking>> {
        let fetches = property
            .calendars
            .iter()
            .filter(|src| !src.trim().is_empty())
            .map(|src| async move {
                let raw = fetch_calendar(&self.http, src).await?;
                parse_ical(&raw)
            });
        let lists = try_join_all(fetches)
            .await
            .with_context(|| format!("failed to load calendars for {}", property.name))?;
        Ok(merge_bookings(lists))
    }

    async fn load_previous(&self, property: &str) -> Result<PropertyState> {
        match db::load_state(&self.pool, property).await {
            Ok(Some(state)) => Ok(state),
            Ok(None) => {
                info!("no previous state");
                Ok(PropertyState::default())
            }
            Err(err @ StateError::Corrupt { .. }) => {
                warn!(%err, "previous state unreadable; starting fresh");
                Ok(PropertyState::default())
            }
            Err(err) => Err(err).context("failed to load previous state"),
        }
    }

    #[instrument(skip_all, fields(property = %property.name))]
    pub async fn process_property(
        &self,
        property: &Property,
        now: &DateTime<Tz>,
    ) -> Result<RunOutcome> {
        let bookings = self.load_bookings(property).await?;
        let tasks = detect(&bookings, &property.name, &property.cleaners);
        info!(bookings = bookings.len(), tasks = tasks.len(), "cleaning tasks found");

        if let Err(err) = export::write_schedule(&self.output_dir, &property.name, &tasks).await {
            error!(?err, "schedule export failed");
        }

        let previous = self.load_previous(&property.name).await?;
        let plan = evaluate(&self.window, &property.name, &tasks, &previous, now);
        info!(
            added = plan.diff.added.len(),
            removed = plan.diff.removed.len(),
            changed = plan.diff.changed.len(),
            cutoff = %plan.cutoff,
            action = plan.decision.action.as_str(),
            "decision made"
        );

        let delivered = match &plan.message {
            Some(message) => match self.notifier.send(message).await {
                Ok(()) => {
                    info!(notifier = self.notifier.name(), "message delivered");
                    Some(true)
                }
                Err(err) => {
                    error!(?err, notifier = self.notifier.name(), "message delivery failed");
                    Some(false)
                }
            },
            None => None,
        };

        let next = apply_delivery(&previous, &plan, delivered == Some(true), now);
        db::save_state(&self.pool, &property.name, &next)
            .await
            .context("failed to save state")?;

        Ok(RunOutcome {
            property: property.name.clone(),
            tasks: tasks.len(),
            action: plan.decision.action,
            delivered,
        })
    }

    /// Process every property concurrently. Failures are logged per property
    /// and do not stop the others.
    pub async fn run_once(&self, properties: &[Property], now: &DateTime<Tz>) -> Vec<RunOutcome> {
        info!(%now, properties = properties.len(), "tick");
        let results = join_all(properties.iter().map(|p| self.process_property(p, now))).await;
        results
            .into_iter()
            .zip(properties)
            .filter_map(|(res, p)| match res {
                Ok(outcome) => Some(outcome),
                Err(err) => {
                    error!(?err, property = %p.name, "property run failed");
                    None
                }
            })
            .collect()
    }
}
