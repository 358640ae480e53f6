//! Core data types shared across the pipeline

use crate::error::{IndicatorError, Result};
use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of calendar days after a post's creation day that it may predict
pub const PREDICTION_HORIZON_DAYS: u64 = 3;

/// Media attachment on a post (chart screenshots, images)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
}

/// A single ingested post from a tracked author
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    #[serde(default)]
    pub author_screen_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub media: Vec<MediaRef>,
    #[serde(default)]
    pub processed: bool,
}

impl Post {
    pub fn media_urls(&self) -> Vec<String> {
        self.media
            .iter()
            .filter(|m| !m.url.is_empty())
            .map(|m| m.url.clone())
            .collect()
    }

    /// The 1st, 2nd and 3rd UTC calendar day strictly after the creation day
    pub fn target_dates(&self) -> Vec<NaiveDate> {
        target_dates_after(self.created_at.date_naive())
    }
}

pub fn target_dates_after(day: NaiveDate) -> Vec<NaiveDate> {
    (1..=PREDICTION_HORIZON_DAYS)
        .filter_map(|offset| day.checked_add_days(Days::new(offset)))
        .collect()
}

/// Today, tomorrow and the day after, starting at `day0`
pub fn window_days(day0: NaiveDate) -> [NaiveDate; 3] {
    let shift = |n: u64| day0.checked_add_days(Days::new(n)).unwrap_or(day0);
    [day0, shift(1), shift(2)]
}

/// Predicted market direction for a target day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Trend::Up),
            "down" => Ok(Trend::Down),
            other => Err(format!("unknown trend value '{}'", other)),
        }
    }
}

/// Per-target-day trend judgment derived from one post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub trend: Trend,
    pub target_date: NaiveDate,
    /// When the classification happened, not the target day
    pub created_at: DateTime<Utc>,
}

impl Prediction {
    /// Build a prediction for `post`, rejecting target days outside the
    /// post's three-day horizon.
    pub fn for_post(
        post: &Post,
        target_date: NaiveDate,
        trend: Trend,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if !post.target_dates().contains(&target_date) {
            return Err(IndicatorError::InvalidPrediction {
                post_id: post.id.clone(),
                target_date,
                reason: format!(
                    "target date must be 1-{} days after {}",
                    PREDICTION_HORIZON_DAYS,
                    post.created_at.date_naive()
                ),
            });
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            post_id: post.id.clone(),
            author_id: post.author_id.clone(),
            trend,
            target_date,
            created_at,
        })
    }
}

/// Normalized up/down split for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayScore {
    pub date: NaiveDate,
    #[serde(with = "rust_decimal::serde::float")]
    pub up_percentage: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub down_percentage: Decimal,
}

impl DayScore {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            up_percentage: Decimal::ZERO,
            down_percentage: Decimal::ZERO,
        }
    }

    pub fn has_signal(&self) -> bool {
        !(self.up_percentage + self.down_percentage).is_zero()
    }
}

/// Rolling three-day indicator, recomputed on every read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    pub today: DayScore,
    pub tomorrow: DayScore,
    pub day_after_tomorrow: DayScore,
}

impl Indicator {
    pub fn empty(day0: NaiveDate) -> Self {
        let [today, tomorrow, day_after_tomorrow] = window_days(day0);
        Self {
            today: DayScore::empty(today),
            tomorrow: DayScore::empty(tomorrow),
            day_after_tomorrow: DayScore::empty(day_after_tomorrow),
        }
    }

    pub fn days(&self) -> [&DayScore; 3] {
        [&self.today, &self.tomorrow, &self.day_after_tomorrow]
    }
}

/// A prediction targeting today joined with its source post
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentPrediction {
    pub prediction: Prediction,
    pub post: Post,
}
