use crate::config;
use crate::message::Message;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as MailMessage, Tokio1Executor};
use reqwest::{Client, StatusCode, Url};
use serde_json::json;
use std::fmt;
use teloxide::requests::Requester;
use teloxide::types::ChatId;
use teloxide::Bot;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

const WHATSAPP_API_BASE: &str = "https://graph.facebook.com/";
const WHATSAPP_API_VERSION: &str = "v20.0";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
    #[error("whatsapp request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("whatsapp returned {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("email could not be built: {0}")]
    Email(#[from] lettre::error::Error),
    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
    #[error("{failed} of {total} notifiers failed")]
    Partial { failed: usize, total: usize },
}

/// A delivery target for rendered messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &Message) -> Result<(), DeliveryError>;
}

pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramNotifier {
    pub fn new(cfg: &config::Telegram) -> Self {
        Self {
            bot: Bot::new(cfg.bot_token.clone()),
            chat_id: ChatId(cfg.chat_id),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    #[instrument(skip_all, fields(chat_id = self.chat_id.0))]
    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        self.bot
            .send_message(self.chat_id, message.body.clone())
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct WhatsAppNotifier {
    http: Client,
    base_url: Url,
    token: String,
    phone_number_id: String,
    to: String,
}

impl fmt::Debug for WhatsAppNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhatsAppNotifier")
            .field("base_url", &self.base_url)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

impl WhatsAppNotifier {
    pub fn new(cfg: &config::WhatsApp) -> Result<Self> {
        let base_url = Url::parse(WHATSAPP_API_BASE).context("invalid WhatsApp base URL")?;
        Self::with_base_url(cfg, base_url)
    }

    pub fn with_base_url(cfg: &config::WhatsApp, base_url: Url) -> Result<Self> {
        let http = Client::builder()
            .user_agent("changeover-watchbot/0.1")
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            http,
            base_url,
            token: cfg.token.clone(),
            phone_number_id: cfg.phone_number_id.clone(),
            to: cfg.to.clone(),
        })
    }

    pub fn build_request(&self, message: &Message) -> Result<reqwest::Request, DeliveryError> {
        let endpoint = self
            .base_url
            .join(&format!(
                "{WHATSAPP_API_VERSION}/{}/messages",
                self.phone_number_id
            ))
            .map_err(|e| DeliveryError::Endpoint(e.to_string()))?;
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": self.to,
            "type": "text",
            "text": { "body": message.body },
        });
        Ok(self
            .http
            .post(endpoint)
            .bearer_auth(&self.token)
            .json(&payload)
            .build()?)
    }
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    fn name(&self) -> &str {
        "whatsapp"
    }

    #[instrument(skip_all, fields(to = %self.to))]
    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        let request = self.build_request(message)?;
        debug!(url = %request.url(), "sending whatsapp message");
        let res = self.http.execute(request).await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status, body });
        }
        Ok(())
    }
}

/// Plain-text email through an SMTP relay over implicit TLS. The only
/// target that carries the message subject.
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl fmt::Debug for EmailNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailNotifier")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

impl EmailNotifier {
    pub fn new(cfg: &config::Email) -> Result<Self> {
        let from: Mailbox = cfg
            .sender
            .parse()
            .with_context(|| format!("invalid sender address {}", cfg.sender))?;
        let to: Mailbox = cfg
            .to
            .parse()
            .with_context(|| format!("invalid recipient address {}", cfg.to))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
            .with_context(|| format!("invalid SMTP host {}", cfg.smtp_host))?
            .port(cfg.smtp_port)
            .credentials(Credentials::new(
                cfg.sender.clone(),
                cfg.app_password.clone(),
            ))
            .build();
        Ok(Self { transport, from, to })
    }

    pub fn build_email(&self, message: &Message) -> Result<MailMessage, DeliveryError> {
        Ok(MailMessage::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())?)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    #[instrument(skip_all, fields(to = %self.to))]
    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        let email = self.build_email(message)?;
        let response = self.transport.send(email).await?;
        debug!(code = %response.code(), "smtp accepted message");
        Ok(())
    }
}

/// Dry-run target: logs the drafted message instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        info!(subject = %message.subject, body = %message.body.replace('\n', "\\n"), "drafted message");
        Ok(())
    }
}

/// Sends to every target; delivery counts as successful only if all succeed.
#[derive(Default)]
pub struct MultiNotifier {
    targets: Vec<Box<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(targets: Vec<Box<dyn Notifier>>) -> Self {
        Self { targets }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[async_trait]
impl Notifier for MultiNotifier {
    fn name(&self) -> &str {
        "multi"
    }

    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        let mut failed = 0;
        for target in &self.targets {
            if let Err(err) = target.send(message).await {
                warn!(?err, target = target.name(), "delivery failed");
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(DeliveryError::Partial {
                failed,
                total: self.targets.len(),
            });
        }
        Ok(())
    }
}

/// Build the delivery target for a run. With `dry_run`, or when nothing is
/// configured, messages are only logged.
pub fn from_config(notify: &config::Notify, dry_run: bool) -> Result<Box<dyn Notifier>> {
    if dry_run {
        return Ok(Box::new(LogNotifier));
    }
    let mut targets: Vec<Box<dyn Notifier>> = Vec::new();
    if let Some(tg) = &notify.telegram {
        targets.push(Box::new(TelegramNotifier::new(tg)));
    }
    if let Some(wa) = &notify.whatsapp {
        targets.push(Box::new(WhatsAppNotifier::new(wa)?));
    }
    if let Some(email) = &notify.email {
        targets.push(Box::new(EmailNotifier::new(email)?));
    }
    if targets.is_empty() {
        warn!("no notifiers configured; messages will only be logged");
        return Ok(Box::new(LogNotifier));
    }
    Ok(Box::new(MultiNotifier::new(targets)))
}
