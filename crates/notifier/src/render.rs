//! Human-readable alert text

use pricewatch_core::{format_timestamp, AlertEvent, AlertKind, Direction};

/// Separator line placed above chat messages
pub const SEPARATOR: &str = "======================";

/// Plain message body for an event
pub fn render(event: &AlertEvent) -> String {
    match event.kind {
        AlertKind::Ath | AlertKind::Atl => {
            let (label, marker) = match event.kind {
                AlertKind::Ath => ("ATH", "📗"),
                _ => ("ATL", "📉"),
            };
            let reference_ts = event
                .reference_timestamp
                .map(|ts| format_timestamp(&ts))
                .unwrap_or_default();
            format!(
                "{}\n{} => {}$\n{} in {}\n{}{}%\n{} | {}",
                event.symbol,
                event.reference_price,
                event.current_price,
                label,
                event.window.as_deref().unwrap_or("?"),
                marker,
                event.percent_change,
                reference_ts,
                format_timestamp(&event.current_timestamp),
            )
        }
        AlertKind::LevelProximity => format!(
            "{}\nis near price level {}$\nCurrent price: {}$\n{}",
            event.symbol,
            event.reference_price,
            event.current_price,
            format_timestamp(&event.current_timestamp),
        ),
    }
}

/// Code block for webhook chats, highlighted for upward moves and level hits
pub fn webhook_content(event: &AlertEvent, text: &str) -> String {
    let highlight = event.kind == AlertKind::LevelProximity || event.direction() == Direction::Up;
    if highlight {
        format!("```fix\n{text}```")
    } else {
        format!("```\n{text}```")
    }
}

pub fn telegram_text(text: &str) -> String {
    format!("{SEPARATOR}\n{text}")
}
