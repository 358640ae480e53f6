//! Telegram notification module
//!
//! Sends accepted trading signals, sweep failures and lifecycle events to a
//! Telegram chat. Delivery is best effort: failures are logged, never
//! propagated into the pipeline.

#[cfg(test)]
mod tests;

use crate::classifier::schema::truncate;
use crate::classifier::{Direction, TradingSignal};
use crate::config::TelegramConfig;
use crate::error::{IndicatorError, Result};
use crate::types::Post;
use reqwest::Client;
use serde::Serialize;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Telegram notifier
#[derive(Clone)]
pub struct Notifier {
    http: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    enabled: bool,
}

#[derive(Debug, Serialize)]
struct TelegramMessage {
    chat_id: String,
    text: String,
    parse_mode: String,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: Client::new(),
            api_base: TELEGRAM_API.to_string(),
            bot_token,
            chat_id,
            enabled: true,
        }
    }

    /// Create a disabled notifier (for when Telegram is not configured)
    pub fn disabled() -> Self {
        Self {
            http: Client::new(),
            api_base: TELEGRAM_API.to_string(),
            bot_token: String::new(),
            chat_id: String::new(),
            enabled: false,
        }
    }

    pub fn from_config(config: Option<&TelegramConfig>) -> Self {
        match config {
            Some(tg) if !tg.bot_token.is_empty() && !tg.chat_id.is_empty() => {
                Self::new(tg.bot_token.clone(), tg.chat_id.clone())
            }
            _ => Self::disabled(),
        }
    }

    /// Point the notifier at a different Bot API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Send a raw message (HTML format)
    pub async fn send(&self, text: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let msg = TelegramMessage {
            chat_id: self.chat_id.clone(),
            text: text.to_string(),
            parse_mode: "HTML".to_string(),
        };

        let response = self.http.post(&url).json(&msg).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Telegram send failed: {} {}", status, error_text);
            return Err(IndicatorError::Notify(format!("{}: {}", status, error_text)));
        }

        Ok(())
    }

    /// Notify about an accepted trading signal
    pub async fn signal_accepted(&self, post: &Post, signal: &TradingSignal) -> Result<()> {
        self.send(&format_signal(post, signal)).await
    }

    /// Notify about an error
    pub async fn error(&self, context: &str, error: &str) -> Result<()> {
        let text = format!(
            "⚠️ <b>Error</b>\n\n\
            Context: {}\n\
            Error: <code>{}</code>",
            escape_html(context),
            escape_html(&truncate(error, 200)),
        );

        self.send(&text).await
    }

    pub async fn startup(&self, interval_secs: u64) -> Result<()> {
        let text = format!(
            "🤖 <b>KOL Indicator Started</b>\n\n\
            Sweep every: {}s\n\
            Time: {}",
            interval_secs,
            chrono::Utc::now().format("%Y-%m-%d %H:%M UTC"),
        );

        self.send(&text).await
    }

    pub async fn shutdown(&self, reason: &str) -> Result<()> {
        let text = format!(
            "🛑 <b>KOL Indicator Stopped</b>\n\n\
            Reason: {}\n\
            Time: {}",
            escape_html(reason),
            chrono::Utc::now().format("%Y-%m-%d %H:%M UTC"),
        );

        self.send(&text).await
    }
}

pub(crate) fn format_signal(post: &Post, signal: &TradingSignal) -> String {
    let (emoji, side) = match signal.direction {
        Direction::Long => ("🟢", "LONG"),
        Direction::Short => ("🔴", "SHORT"),
    };

    let horizon = signal
        .timeframe
        .as_ref()
        .and_then(|t| t.horizon.clone())
        .unwrap_or_else(|| "n/a".to_string());

    let author = if post.author_screen_name.is_empty() {
        post.author_id.clone()
    } else {
        format!("@{}", post.author_screen_name)
    };

    format!(
        "{} <b>BTC Signal: {}</b>\n\n\
        Author: {}\n\
        Entry: <code>{}</code>\n\
        Take profit: <code>{}</code>\n\
        Stop loss: <code>{}</code>\n\
        Confidence: <code>{:.0}%</code>\n\
        Timeframe: {}\n\n\
        {}",
        emoji,
        side,
        escape_html(&author),
        signal.entry,
        signal.take_profit,
        signal.stop_loss,
        signal.confidence * rust_decimal::Decimal::ONE_HUNDRED,
        escape_html(&horizon),
        escape_html(&truncate(&signal.reasoning, 300)),
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
