use async_trait::async_trait;
use chrono::TimeZone;
use chrono_tz::Europe::London;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use changeover_watchbot::config::Property;
use changeover_watchbot::db;
use changeover_watchbot::message::Message;
use changeover_watchbot::notify::{DeliveryError, Notifier};
use changeover_watchbot::policy::Action;
use changeover_watchbot::run::Runner;
use changeover_watchbot::window::{NotificationWindow, WeeklyBoundary};

const STAYS: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
DTSTART;VALUE=DATE:20250103\r
DTEND;VALUE=DATE:20250108\r
SUMMARY:Reserved\r
UID:one@example.com\r
END:VEVENT\r
BEGIN:VEVENT\r
DTSTART;VALUE=DATE:20250108\r
DTEND;VALUE=DATE:20250111\r
SUMMARY:Reserved\r
UID:two@example.com\r
END:VEVENT\r
END:VCALENDAR\r
";

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    fail: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<Message>>>,
}

impl RecordingNotifier {
    fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    async fn sent(&self) -> Vec<Message> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Endpoint("unreachable".into()));
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

fn property(name: &str, calendar: &Path) -> Property {
    Property {
        name: name.into(),
        calendars: vec![calendar.to_string_lossy().to_string()],
        cleaners: vec!["Ana".into()],
    }
}

fn runner(pool: sqlx::SqlitePool, notifier: &RecordingNotifier, out: &Path) -> Runner {
    let window = NotificationWindow::new(London, WeeklyBoundary::default());
    Runner::new(pool, window, Box::new(notifier.clone()), out.to_path_buf()).unwrap()
}

#[tokio::test]
async fn change_then_quiet_then_weekly_once() {
    let td = tempfile::tempdir().unwrap();
    let cal = td.path().join("seaview.ics");
    std::fs::write(&cal, STAYS).unwrap();
    let out = td.path().join("out");

    let pool = setup_pool().await;
    let notifier = RecordingNotifier::default();
    let runner = runner(pool.clone(), &notifier, &out);
    let props = vec![property("Sea View", &cal)];

    // Monday morning, nothing stored yet: both cleanings are new and before the cutoff
    let monday = London.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
    let outcomes = runner.run_once(&props, &monday).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].tasks, 2);
    assert_eq!(outcomes[0].action, Action::SendChange);
    assert_eq!(outcomes[0].delivered, Some(true));

    let sent = notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0]
        .body
        .contains("+ Added: Wed 08 Jan – Cleaning: Checkin Same Day (Ana)"));
    assert!(sent[0]
        .body
        .contains("+ Added: Sat 11 Jan – Cleaning: Checkin Not Same Day (Ana)"));
    assert!(out.join("SeaView.csv").exists());
    assert!(out.join("SeaView.ics").exists());

    let stored = db::load_state(&pool, "Sea View").await.unwrap().unwrap();
    assert_eq!(stored.events.len(), 2);
    assert!(stored.events.contains_key("SeaView-08012025"));

    // same calendar ten minutes later: nothing to say
    let later = London.with_ymd_and_hms(2025, 1, 6, 10, 10, 0).unwrap();
    let outcomes = runner.run_once(&props, &later).await;
    assert_eq!(outcomes[0].action, Action::None);
    assert_eq!(outcomes[0].delivered, None);
    assert_eq!(notifier.sent().await.len(), 1);

    // Sunday trigger window, delivery fails: marker must not move
    notifier.set_failing(true);
    let sunday = London.with_ymd_and_hms(2025, 1, 12, 14, 3, 0).unwrap();
    let outcomes = runner.run_once(&props, &sunday).await;
    assert_eq!(outcomes[0].action, Action::SendWeekly);
    assert_eq!(outcomes[0].delivered, Some(false));
    let stored = db::load_state(&pool, "Sea View").await.unwrap().unwrap();
    assert!(stored.last_full_message_sent_at.is_none());
    assert_eq!(stored.events.len(), 2);

    // next tick still inside the window retries and succeeds
    notifier.set_failing(false);
    let retry = London.with_ymd_and_hms(2025, 1, 12, 14, 8, 0).unwrap();
    let outcomes = runner.run_once(&props, &retry).await;
    assert_eq!(outcomes[0].action, Action::SendWeekly);
    assert_eq!(outcomes[0].delivered, Some(true));
    let sent = notifier.sent().await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].subject, "Weekly Cleaning Schedule – Sea View");
    assert!(sent[1].body.contains("13 Jan → 19 Jan"));
    assert!(sent[1].body.contains("No cleanings scheduled next week."));
    let stored = db::load_state(&pool, "Sea View").await.unwrap().unwrap();
    assert_eq!(
        stored.last_full_message_sent_at,
        Some(retry.with_timezone(&chrono::Utc))
    );

    // already sent this week
    let again = London.with_ymd_and_hms(2025, 1, 12, 14, 9, 0).unwrap();
    let outcomes = runner.run_once(&props, &again).await;
    assert_eq!(outcomes[0].action, Action::None);
    assert_eq!(notifier.sent().await.len(), 2);
}

#[tokio::test]
async fn unreadable_state_starts_fresh() {
    let td = tempfile::tempdir().unwrap();
    let cal = td.path().join("loft.ics");
    std::fs::write(&cal, STAYS).unwrap();

    let pool = setup_pool().await;
    sqlx::query("INSERT INTO property_state (property, document) VALUES (?, ?)")
        .bind("Loft")
        .bind("not json at all")
        .execute(&pool)
        .await
        .unwrap();

    let notifier = RecordingNotifier::default();
    let runner = runner(pool.clone(), &notifier, &td.path().join("out"));
    let monday = London.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
    let outcomes = runner.run_once(&[property("Loft", &cal)], &monday).await;
    assert_eq!(outcomes[0].action, Action::SendChange);

    let stored = db::load_state(&pool, "Loft").await.unwrap().unwrap();
    assert_eq!(stored.events.len(), 2);
}

#[tokio::test]
async fn failing_calendar_skips_only_that_property() {
    let td = tempfile::tempdir().unwrap();
    let cal = td.path().join("good.ics");
    std::fs::write(&cal, STAYS).unwrap();

    let pool = setup_pool().await;
    let notifier = RecordingNotifier::default();
    let runner = runner(pool.clone(), &notifier, &td.path().join("out"));
    let props = vec![
        property("Broken", &td.path().join("missing.ics")),
        property("Good", &cal),
    ];

    let monday = London.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
    let outcomes = runner.run_once(&props, &monday).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].property, "Good");
    assert!(db::load_state(&pool, "Broken").await.unwrap().is_none());
}

#[tokio::test]
async fn empty_calendar_yields_no_tasks() {
    let td = tempfile::tempdir().unwrap();
    let cal = td.path().join("empty.ics");
    std::fs::write(&cal, "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nEND:VCALENDAR\r\n").unwrap();

    let pool = setup_pool().await;
    let notifier = RecordingNotifier::default();
    let runner = runner(pool.clone(), &notifier, &td.path().join("out"));
    let monday = London.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
    let outcomes = runner.run_once(&[property("Empty", &cal)], &monday).await;
    assert_eq!(outcomes[0].tasks, 0);
    assert_eq!(outcomes[0].action, Action::None);
    let stored = db::load_state(&pool, "Empty").await.unwrap().unwrap();
    assert!(stored.events.is_empty());
}
