//! Notification window arithmetic in the observer timezone.
//!
//! Every "now", cutoff and relevance check in the crate goes through
//! [`NotificationWindow`]. Date-only event fields are anchored to local
//! midnight before they are compared with instants.
//!
//! Local wall times that do not exist (spring-forward gap) are shifted forward
//! by the length of the gap. Ambiguous wall times (fall-back overlap) resolve
//! to the earlier of the two instants.
use crate::diff::Diff;
use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyBoundary {
    pub weekday: Weekday,
    pub time: NaiveTime,
    pub trigger_window: Duration,
}

impl Default for WeeklyBoundary {
    fn default() -> Self {
        Self {
            weekday: Weekday::Sun,
            time: NaiveTime::from_hms_opt(14, 0, 0).unwrap_or(NaiveTime::MIN),
            trigger_window: Duration::minutes(10),
        }
    }
}

/// Inclusive Monday → Sunday range shown in the weekly summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekRange {
    pub monday: NaiveDate,
    pub sunday: NaiveDate,
}

impl WeekRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.monday <= date && date <= self.sunday
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationWindow {
    tz: Tz,
    boundary: WeeklyBoundary,
}

impl NotificationWindow {
    pub fn new(tz: Tz, boundary: WeeklyBoundary) -> Self {
        Self { tz, boundary }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn boundary(&self) -> WeeklyBoundary {
        self.boundary
    }

    /// Current instant in the observer timezone.
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    /// Convert an arbitrary instant to observer time.
    pub fn observe<T: TimeZone>(&self, instant: &DateTime<T>) -> DateTime<Tz> {
        instant.with_timezone(&self.tz)
    }

    /// Resolve a local wall time to a single instant.
    pub fn localize(&self, naive: NaiveDateTime) -> DateTime<Tz> {
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => t,
            LocalResult::Ambiguous(earlier, _later) => earlier,
            LocalResult::None => {
                // keep the offset that was in force before the gap
                let before = self
                    .tz
                    .offset_from_utc_datetime(&(naive - Duration::days(1)))
                    .fix();
                let utc = naive - Duration::seconds(i64::from(before.local_minus_utc()));
                self.tz.from_utc_datetime(&utc)
            }
        }
    }

    pub fn midnight(&self, date: NaiveDate) -> DateTime<Tz> {
        self.localize(date.and_time(NaiveTime::MIN))
    }

    /// The boundary instant on a given calendar date.
    pub fn boundary_on(&self, date: NaiveDate) -> DateTime<Tz> {
        self.localize(date.and_time(self.boundary.time))
    }

    /// True only inside `[boundary, boundary + trigger_window)` on the boundary day.
    pub fn is_weekly_summary_instant(&self, now: &DateTime<Tz>) -> bool {
        let today = now.date_naive();
        if today.weekday() != self.boundary.weekday {
            return false;
        }
        let start = self.boundary_on(today);
        *now >= start && *now < start + self.boundary.trigger_window
    }

    /// Next boundary instant strictly after `now` unless `now` is earlier on
    /// the boundary day itself.
    pub fn next_cutoff(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let today = now.date_naive();
        let target = self.boundary.weekday.num_days_from_monday();
        let current = today.weekday().num_days_from_monday();
        let days_ahead = (7 + target - current) % 7;
        let date = today + Duration::days(i64::from(days_ahead));
        let candidate = self.boundary_on(date);
        if *now < candidate {
            candidate
        } else {
            self.boundary_on(date + Duration::days(7))
        }
    }

    /// Half-open relevance check: `now`'s date <= `event_date` < `cutoff`'s date.
    pub fn is_event_relevant(
        &self,
        event_date: NaiveDate,
        now: &DateTime<Tz>,
        cutoff: &DateTime<Tz>,
    ) -> bool {
        let event_start = self.midnight(event_date);
        event_start >= self.midnight(now.date_naive())
            && event_start < self.midnight(cutoff.date_naive())
    }

    /// Dates listed as still to come in a change message: now's date through
    /// the cutoff's date, both inclusive. The change log keeps the half-open
    /// [`Self::is_event_relevant`] rule.
    pub fn remaining_period(
        &self,
        now: &DateTime<Tz>,
        cutoff: &DateTime<Tz>,
    ) -> RangeInclusive<NaiveDate> {
        now.date_naive()..=cutoff.date_naive()
    }

    /// Keep only the added/removed/changed entries inside `[now, cutoff)`.
    /// Unchanged entries are never carried through.
    pub fn filter_diff_by_cutoff(
        &self,
        diff: &Diff,
        now: &DateTime<Tz>,
        cutoff: &DateTime<Tz>,
    ) -> Diff {
        let relevant = |date: NaiveDate| self.is_event_relevant(date, now, cutoff);
        Diff {
            added: diff
                .added
                .iter()
                .filter(|(_, rec)| relevant(rec.date))
                .map(|(id, rec)| (id.clone(), rec.clone()))
                .collect(),
            removed: diff
                .removed
                .iter()
                .filter(|(_, rec)| relevant(rec.date))
                .map(|(id, rec)| (id.clone(), rec.clone()))
                .collect(),
            changed: diff
                .changed
                .iter()
                .filter(|(_, c)| relevant(c.new.date))
                .map(|(id, c)| (id.clone(), c.clone()))
                .collect(),
            unchanged: Default::default(),
        }
    }

    /// Next Monday through the Sunday after it. On a Monday this is the
    /// following week, never the current one.
    pub fn next_week(&self, now: &DateTime<Tz>) -> WeekRange {
        let today = now.date_naive();
        let offset = 7 - today.weekday().num_days_from_monday();
        let monday = today + Duration::days(i64::from(offset));
        WeekRange {
            monday,
            sunday: monday + Duration::days(6),
        }
    }

    /// Whether `instant` and `now` fall in the same ISO (year, week) bucket,
    /// both observed in the observer timezone.
    pub fn same_iso_week(&self, instant: &DateTime<Utc>, now: &DateTime<Tz>) -> bool {
        self.observe(instant).iso_week() == now.iso_week()
    }
}
