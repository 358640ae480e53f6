//! Classification adapter
//!
//! Wraps one call to an external reasoning engine that turns a post into
//! either per-day trend calls or a gated trading signal. Engine output is
//! validated against the schemas in [`schema`] and converted to the typed
//! results below before it leaves this module.

pub mod llm;
pub mod retry;
pub mod schema;

#[cfg(test)]
mod tests;

pub use llm::{LlmClassifier, LlmProvider};
pub use retry::{retry_fixed, RetryPolicy};

use crate::error::Result;
use crate::types::{Post, Trend};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Everything the engine is told about one post
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRequest {
    pub post_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// 1st, 2nd and 3rd UTC day after the creation day, in order
    pub target_dates: Vec<NaiveDate>,
    /// Sent as separate visual inputs
    pub media_urls: Vec<String>,
    /// Reference price refreshed once per sweep
    pub reference_price: Option<Decimal>,
}

impl ClassificationRequest {
    pub fn for_post(post: &Post, reference_price: Option<Decimal>) -> Self {
        Self {
            post_id: post.id.clone(),
            text: post.text.clone(),
            created_at: post.created_at,
            target_dates: post.target_dates(),
            media_urls: post.media_urls(),
            reference_price,
        }
    }
}

/// Accepted engine answer for one post
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Trend(TrendClassification),
    Signal(SignalVerdict),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendClassification {
    pub relevant: bool,
    /// One entry per requested target date, in request order
    pub days: Vec<DayTrend>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayTrend {
    pub date: NaiveDate,
    pub call: DayCall,
}

/// Engine's judgment for one target day
#[derive(Debug, Clone, PartialEq)]
pub enum DayCall {
    Call(Trend),
    /// Explicit null: no prediction for this day
    NoCall,
    /// A trend value outside {up, down, null}
    Unrecognized(String),
}

impl DayCall {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_ascii_lowercase()) {
            None => DayCall::NoCall,
            Some(l) if l.is_empty() || l == "null" || l == "none" => DayCall::NoCall,
            Some(l) => match l.parse::<Trend>() {
                Ok(trend) => DayCall::Call(trend),
                Err(_) => DayCall::Unrecognized(l),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalVerdict {
    Accepted(TradingSignal),
    /// Valid answer that is not a usable signal; the post is still done
    NotASignal { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn trend(&self) -> Trend {
        match self {
            Direction::Long => Trend::Up,
            Direction::Short => Trend::Down,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    #[serde(alias = "hours")]
    Hour,
    #[serde(alias = "days")]
    Day,
    #[serde(alias = "weeks")]
    Week,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDuration {
    pub value: Decimal,
    pub unit: DurationUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeframe {
    /// short / medium / long as reported by the engine
    #[serde(rename = "type", default)]
    pub horizon: Option<String>,
    #[serde(default)]
    pub duration: Option<SignalDuration>,
}

/// Trading signal that passed the confidence and completeness gate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradingSignal {
    pub post_id: String,
    pub direction: Direction,
    pub entry: Decimal,
    pub take_profit: Decimal,
    pub stop_loss: Decimal,
    pub confidence: Decimal,
    pub timeframe: Option<Timeframe>,
    pub reasoning: String,
    pub indicated_at: DateTime<Utc>,
}

impl TradingSignal {
    /// Number of target days the signal's timeframe reaches into
    pub fn covered_days(&self, horizon: usize) -> usize {
        let Some(duration) = self.timeframe.as_ref().and_then(|t| t.duration.as_ref()) else {
            return horizon;
        };

        let in_days = match duration.unit {
            DurationUnit::Hour => duration.value / Decimal::from(24),
            DurationUnit::Day => duration.value,
            DurationUnit::Week => duration.value * Decimal::from(7),
        };

        // Non-positive durations still reach today
        let days = in_days
            .max(Decimal::ZERO)
            .ceil()
            .to_usize()
            .unwrap_or(horizon);

        days.clamp(1, horizon.max(1))
    }

    /// Target dates this signal predicts, in order
    pub fn target_dates(&self, target_dates: &[NaiveDate]) -> Vec<NaiveDate> {
        target_dates
            .iter()
            .take(self.covered_days(target_dates.len()))
            .copied()
            .collect()
    }
}

/// External reasoning engine seam
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify one post, retrying transient failures internally
    async fn classify(&self, request: &ClassificationRequest) -> Result<Classification>;
}
