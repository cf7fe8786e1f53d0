//! Outbound notification transports

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use pricewatch_core::{AlertEvent, Channel, ChannelsConfig, NotifyError, NotifyResult, SinkConfig};

use crate::render::{telegram_text, webhook_content};

/// Delivers a rendered message somewhere
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, event: &AlertEvent, text: &str) -> NotifyResult<()>;
}

fn http_error(e: reqwest::Error) -> NotifyError {
    match e.status() {
        Some(status) => NotifyError::Status {
            code: status.as_u16(),
        },
        None => NotifyError::Http(e.to_string()),
    }
}

/// Chat webhook taking a form-encoded `content` field
pub struct WebhookSink {
    url: String,
    http: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            http,
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, event: &AlertEvent, text: &str) -> NotifyResult<()> {
        let content = webhook_content(event, text);
        self.http
            .post(&self.url)
            .form(&[("content", content.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_error)?;
        Ok(())
    }
}

/// Telegram bot `sendMessage`
pub struct TelegramSink {
    endpoint: String,
    chat_id: String,
    http: reqwest::Client,
}

impl TelegramSink {
    pub fn new(token: &str, chat_id: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            endpoint: format!("https://api.telegram.org/bot{token}/sendMessage"),
            chat_id: chat_id.into(),
            http,
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, _event: &AlertEvent, text: &str) -> NotifyResult<()> {
        let body = telegram_text(text);
        self.http
            .get(&self.endpoint)
            .query(&[("chat_id", self.chat_id.as_str()), ("text", body.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_error)?;
        Ok(())
    }
}

/// Writes alerts to the service log
pub struct LogSink {
    channel: Channel,
}

impl LogSink {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, event: &AlertEvent, text: &str) -> NotifyResult<()> {
        info!(channel = %self.channel, symbol = %event.symbol, "ALERT\n{}", text);
        Ok(())
    }
}

pub type SinkMap = HashMap<Channel, Arc<dyn NotificationSink>>;

/// One sink per configured channel; unconfigured channels are absent
pub fn build_sinks(config: &ChannelsConfig, http: &reqwest::Client) -> SinkMap {
    let mut sinks = SinkMap::new();
    for channel in Channel::ALL {
        let Some(sink) = config.get(channel) else {
            continue;
        };
        let sink: Arc<dyn NotificationSink> = match sink {
            SinkConfig::Webhook { url } => Arc::new(WebhookSink::new(url.as_str(), http.clone())),
            SinkConfig::Telegram { token, chat_id } => {
                Arc::new(TelegramSink::new(token, chat_id.as_str(), http.clone()))
            }
            SinkConfig::Log => Arc::new(LogSink::new(channel)),
        };
        info!("Channel {} -> {}", channel, sink.name());
        sinks.insert(channel, sink);
    }
    sinks
}
