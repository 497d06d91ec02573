//! Booking calendars: fetch iCal sources, parse VEVENTs, merge per property.
use crate::model::Booking;
use chrono::NaiveDate;
use ical::parser::ical::component::IcalEvent;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Summary Airbnb uses for host-blocked days; these are not stays.
const BLOCKED_SUMMARY: &str = "airbnb (not available)";

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("failed to download calendar {source_url}: {error}")]
    Http {
        source_url: String,
        #[source]
        error: reqwest::Error,
    },
    #[error("calendar {source_url} returned status {status}")]
    Status {
        source_url: String,
        status: reqwest::StatusCode,
    },
    #[error("could not read calendar file {path}: {error}")]
    Io {
        path: String,
        #[source]
        error: std::io::Error,
    },
    #[error("invalid iCal data: {0}")]
    Parse(String),
}

pub fn http_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent("changeover-watchbot/0.1")
        .timeout(FETCH_TIMEOUT)
        .build()
}

/// Download an `http(s)://` source or read anything else as a local path.
#[instrument(skip(http))]
pub async fn fetch_calendar(http: &Client, source: &str) -> Result<String, CalendarError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let res = http
            .get(source)
            .send()
            .await
            .map_err(|error| CalendarError::Http {
                source_url: source.to_string(),
                error,
            })?;
        if !res.status().is_success() {
            return Err(CalendarError::Status {
                source_url: source.to_string(),
                status: res.status(),
            });
        }
        return res.text().await.map_err(|error| CalendarError::Http {
            source_url: source.to_string(),
            error,
        });
    }

    tokio::fs::read_to_string(source)
        .await
        .map_err(|error| CalendarError::Io {
            path: source.to_string(),
            error,
        })
}

/// `20250105`, `20250105T150000Z` and `20250105T150000` all map to the date.
fn parse_ical_date(value: &str) -> Option<NaiveDate> {
    let digits = value.trim().get(..8)?;
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}

fn property_value<'a>(event: &'a IcalEvent, name: &str) -> Option<&'a str> {
    event
        .properties
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .and_then(|p| p.value.as_deref())
}

fn to_booking(event: &IcalEvent) -> Option<Booking> {
    let summary = property_value(event, "SUMMARY").unwrap_or_default().to_string();
    if summary.trim().eq_ignore_ascii_case(BLOCKED_SUMMARY) {
        return None;
    }
    let uid = property_value(event, "UID").unwrap_or_default().to_string();

    let start = property_value(event, "DTSTART").and_then(parse_ical_date);
    let end = property_value(event, "DTEND").and_then(parse_ical_date);
    let (Some(start), Some(end)) = (start, end) else {
        warn!(%uid, "skipping event without usable DTSTART/DTEND");
        return None;
    };
    if end < start {
        warn!(%uid, %start, %end, "skipping event that ends before it starts");
        return None;
    }

    Some(Booking {
        start,
        end,
        summary,
        uid,
    })
}

/// Parse raw iCal text into bookings, in calendar order.
pub fn parse_ical(text: &str) -> Result<Vec<Booking>, CalendarError> {
    let mut bookings = Vec::new();
    for calendar in ical::IcalParser::new(text.as_bytes()) {
        let calendar = calendar.map_err(|e| CalendarError::Parse(e.to_string()))?;
        bookings.extend(calendar.events.iter().filter_map(to_booking));
    }
    debug!(count = bookings.len(), "parsed bookings");
    Ok(bookings)
}

/// Merge several calendars into one list sorted by start date, dropping
/// duplicate (start, end) stays. The first occurrence wins.
pub fn merge_bookings(lists: Vec<Vec<Booking>>) -> Vec<Booking> {
    let mut merged: Vec<Booking> = lists.into_iter().flatten().collect();
    merged.sort_by_key(|b| b.start);
    let mut seen = HashSet::new();
    merged.retain(|b| seen.insert((b.start, b.end)));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
PRODID:-//Airbnb Inc//Hosting Calendar 0.8.8//EN\r
BEGIN:VEVENT\r
DTSTART;VALUE=DATE:20250110\r
DTEND;VALUE=DATE:20250114\r
SUMMARY:Reserved\r
UID:stay-2@airbnb.com\r
END:VEVENT\r
BEGIN:VEVENT\r
DTSTART:20250105T150000Z\r
DTEND:20250110T100000Z\r
SUMMARY:Reserved\r
UID:stay-1@airbnb.com\r
END:VEVENT\r
BEGIN:VEVENT\r
DTSTART;VALUE=DATE:20250120\r
DTEND;VALUE=DATE:20250125\r
SUMMARY:Airbnb (Not available)\r
UID:blocked@airbnb.com\r
END:VEVENT\r
BEGIN:VEVENT\r
DTSTART;VALUE=DATE:20250130\r
SUMMARY:Broken\r
UID:broken@airbnb.com\r
END:VEVENT\r
END:VCALENDAR\r
";

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    #[test]
    fn parses_dates_and_skips_blocked() {
        let bookings = parse_ical(SAMPLE).unwrap();
        assert_eq!(bookings.len(), 2);
        assert_eq!(bookings[0].start, d(1, 10));
        assert_eq!(bookings[0].end, d(1, 14));
        assert_eq!(bookings[0].uid, "stay-2@airbnb.com");
        assert_eq!(bookings[1].start, d(1, 5));
        assert_eq!(bookings[1].end, d(1, 10));
        assert_eq!(bookings[1].summary, "Reserved");
    }

    #[test]
    fn empty_calendar_has_no_bookings() {
        let text = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nEND:VCALENDAR\r\n";
        assert!(parse_ical(text).unwrap().is_empty());
    }

    #[test]
    fn merge_sorts_and_dedups() {
        let b = |s: NaiveDate, e: NaiveDate, uid: &str| Booking {
            start: s,
            end: e,
            summary: String::new(),
            uid: uid.into(),
        };
        let airbnb = vec![b(d(1, 10), d(1, 14), "a2"), b(d(1, 5), d(1, 10), "a1")];
        let direct = vec![b(d(1, 5), d(1, 10), "dup"), b(d(1, 14), d(1, 16), "d1")];
        let merged = merge_bookings(vec![airbnb, direct]);
        let uids: Vec<&str> = merged.iter().map(|b| b.uid.as_str()).collect();
        assert_eq!(uids, vec!["a1", "a2", "d1"]);
    }

    #[tokio::test]
    async fn fetch_reads_local_file() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("stay.ics");
        std::fs::write(&path, SAMPLE).unwrap();
        let http = http_client().unwrap();
        let text = fetch_calendar(&http, &path.to_string_lossy()).await.unwrap();
        assert_eq!(parse_ical(&text).unwrap().len(), 2);

        let missing = td.path().join("missing.ics");
        let err = fetch_calendar(&http, &missing.to_string_lossy()).await.unwrap_err();
        assert!(matches!(err, CalendarError::Io { .. }));
    }
}
