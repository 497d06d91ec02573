//! Decide which notification, if any, a run should send.
use crate::diff::Diff;
use crate::window::NotificationWindow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    SendWeekly,
    SendChange,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::None => "none",
            Action::SendWeekly => "send_weekly",
            Action::SendChange => "send_change",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    /// The diff restricted to `[now, cutoff)`.
    pub filtered: Diff,
}

/// Pure decision function. Weekly summaries take priority and go out at most
/// once per ISO week; change notifications are suppressed during the weekly
/// trigger window. The caller owns updating `last_full_message_sent_at`.
pub fn decide(
    window: &NotificationWindow,
    diff: &Diff,
    now: &DateTime<Tz>,
    cutoff: &DateTime<Tz>,
    is_weekly_instant: bool,
    last_full_message_sent_at: Option<&DateTime<Utc>>,
) -> Decision {
    let already_sent_this_week =
        last_full_message_sent_at.is_some_and(|sent| window.same_iso_week(sent, now));
    let send_weekly = is_weekly_instant && !already_sent_this_week;

    let filtered = window.filter_diff_by_cutoff(diff, now, cutoff);
    let send_change = !is_weekly_instant && filtered.has_changes();

    let action = if send_weekly {
        Action::SendWeekly
    } else if send_change {
        Action::SendChange
    } else {
        Action::None
    };

    Decision { action, filtered }
}
