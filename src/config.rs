//! Configuration loader and validator for the changeover watchbot.
use crate::window::{NotificationWindow, WeeklyBoundary};
use chrono::{Duration, NaiveTime, Weekday};
use chrono_tz::Tz;
use lettre::message::Mailbox;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub notify: Notify,
    pub properties: Vec<Property>,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub output_dir: String,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

/// Observer timezone and weekly boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    pub timezone: String,
    pub boundary_weekday: String,
    pub boundary_time: String,
    pub trigger_window_minutes: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            timezone: "Europe/London".into(),
            boundary_weekday: "Sun".into(),
            boundary_time: "14:00".into(),
            trigger_window_minutes: 10,
        }
    }
}

/// Delivery targets; any combination may be configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notify {
    pub telegram: Option<Telegram>,
    pub whatsapp: Option<WhatsApp>,
    pub email: Option<Email>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WhatsApp {
    pub token: String,
    pub phone_number_id: String,
    pub to: String,
}

/// SMTP over implicit TLS, authenticated with an app password.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Email {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub sender: String,
    pub app_password: String,
    pub to: String,
}

/// One rental property and its booking calendars.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub calendars: Vec<String>,
    #[serde(default)]
    pub cleaners: Vec<String>,
}

fn default_interval_minutes() -> u64 {
    10
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".into()
}

fn default_smtp_port() -> u16 {
    465
}

impl App {
    /// Expand a leading `~/` in `data_dir`.
    pub fn resolved_data_dir(&self) -> String {
        expand_home(&self.data_dir)
    }

    pub fn resolved_output_dir(&self) -> String {
        expand_home(&self.output_dir)
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path.to_string(),
    }
}

impl Schedule {
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Invalid(format!("schedule.timezone '{}' is unknown", self.timezone)))
    }

    pub fn weekday(&self) -> Result<Weekday, ConfigError> {
        self.boundary_weekday.parse::<Weekday>().map_err(|_| {
            ConfigError::Invalid(format!(
                "schedule.boundary_weekday '{}' is not a weekday",
                self.boundary_weekday
            ))
        })
    }

    pub fn time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.boundary_time, "%H:%M").map_err(|_| {
            ConfigError::Invalid(format!(
                "schedule.boundary_time '{}' must be HH:MM",
                self.boundary_time
            ))
        })
    }

    pub fn window(&self) -> Result<NotificationWindow, ConfigError> {
        let boundary = WeeklyBoundary {
            weekday: self.weekday()?,
            time: self.time()?,
            trigger_window: Duration::minutes(i64::from(self.trigger_window_minutes)),
        };
        Ok(NotificationWindow::new(self.timezone()?, boundary))
    }
}

impl Config {
    /// Ensure required directories exist.
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(self.app.resolved_data_dir())?;
        fs::create_dir_all(self.app.resolved_output_dir())
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/changeover.db", self.app.resolved_data_dir()))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.output_dir.trim().is_empty() {
        return Err(invalid("app.output_dir must be non-empty"));
    }
    if cfg.app.interval_minutes == 0 {
        return Err(invalid("app.interval_minutes must be > 0"));
    }

    cfg.schedule.window()?;
    if cfg.schedule.trigger_window_minutes == 0 {
        return Err(invalid("schedule.trigger_window_minutes must be > 0"));
    }
    // every trigger window must contain at least one tick
    if cfg.app.interval_minutes > u64::from(cfg.schedule.trigger_window_minutes) {
        return Err(ConfigError::Invalid(format!(
            "app.interval_minutes ({}) must not exceed schedule.trigger_window_minutes ({})",
            cfg.app.interval_minutes, cfg.schedule.trigger_window_minutes
        )));
    }

    if let Some(tg) = &cfg.notify.telegram {
        if tg.bot_token.trim().is_empty() {
            return Err(invalid("notify.telegram.bot_token must be non-empty"));
        }
    }
    if let Some(wa) = &cfg.notify.whatsapp {
        if wa.token.trim().is_empty() {
            return Err(invalid("notify.whatsapp.token must be non-empty"));
        }
        if wa.phone_number_id.trim().is_empty() {
            return Err(invalid("notify.whatsapp.phone_number_id must be non-empty"));
        }
        if wa.to.trim().is_empty() {
            return Err(invalid("notify.whatsapp.to must be non-empty"));
        }
    }

    if let Some(email) = &cfg.notify.email {
        if email.smtp_host.trim().is_empty() {
            return Err(invalid("notify.email.smtp_host must be non-empty"));
        }
        if email.app_password.trim().is_empty() {
            return Err(invalid("notify.email.app_password must be non-empty"));
        }
        for (field, value) in [("sender", &email.sender), ("to", &email.to)] {
            if value.parse::<Mailbox>().is_err() {
                return Err(ConfigError::Invalid(format!(
                    "notify.email.{field} '{value}' is not a valid address"
                )));
            }
        }
    }

    if cfg.properties.is_empty() {
        return Err(invalid("properties must list at least one property"));
    }
    let mut seen = HashSet::new();
    for p in &cfg.properties {
        if p.name.trim().is_empty() {
            return Err(invalid("properties[].name must be non-empty"));
        }
        if !seen.insert(p.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "properties[].name '{}' is duplicated",
                p.name
            )));
        }
        if p.calendars.iter().all(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "properties[{}].calendars must list at least one source",
                p.name
            )));
        }
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  output_dir: "./data/schedules"
  interval_minutes: 10

schedule:
  timezone: "Europe/London"
  boundary_weekday: "Sun"
  boundary_time: "14:00"
  trigger_window_minutes: 10

notify:
  telegram:
    bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
    chat_id: 123456789
  whatsapp:
    token: "YOUR_WHATSAPP_ACCESS_TOKEN"
    phone_number_id: "YOUR_PHONE_NUMBER_ID"
    to: "+447123456789"
  email:
    sender: "cleaning.bot@example.com"
    app_password: "YOUR_SMTP_APP_PASSWORD"
    to: "host@example.com"

properties:
  - name: "Sea View"
    calendars:
      - "https://www.airbnb.co.uk/calendar/ical/123.ics?s=abc"
      - "./calendars/seaview-booking.ics"
    cleaners:
      - "Ana"
  - name: "Harbour Loft"
    calendars:
      - "./calendars/loft.ics"
"#
}
