//! Alert rendering, routing and delivery
//!
//! Features:
//! - Severity tier routing
//! - Webhook, Telegram and log sinks
//! - Bounded, non-blocking dispatch queue with per-delivery timeouts

pub mod render;
pub mod channels;
pub mod dispatcher;

pub use render::{render, telegram_text, webhook_content};
pub use channels::{build_sinks, LogSink, NotificationSink, SinkMap, TelegramSink, WebhookSink};
pub use dispatcher::{route, AlertDispatcher, DispatchStats, DispatcherHandle};
