//! Rolling three-day indicator
//!
//! Predictions targeting today, tomorrow and the day after are weighted by
//! author credibility and a step recency decay, then normalized into
//! up/down percentages that sum to exactly 100 whenever any weight exists.
//!
//! Recency weights are whole thirds (3/3, 2/3, 1/3), so sums are kept as
//! integer thirds and only the final division touches decimals. That keeps
//! the result independent of prediction order.

use crate::credibility::CredibilityTable;
use crate::storage::PredictionStore;
use crate::types::{window_days, DayScore, Indicator, Prediction, Trend};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

/// Recency weight in thirds for a prediction `age_days` old
pub fn recency_thirds(age_days: i64) -> u64 {
    match age_days {
        i64::MIN..=1 => 3,
        2 => 2,
        _ => 1,
    }
}

/// Recency weight: 1 up to a day old, 2/3 at two days, 1/3 from three days
pub fn recency_weight(age_days: i64) -> Decimal {
    Decimal::from(recency_thirds(age_days)) / Decimal::from(3)
}

/// Whole days between the prediction's creation day and `day0`
pub fn age_days(prediction: &Prediction, day0: NaiveDate) -> i64 {
    (day0 - prediction.created_at.date_naive()).num_days()
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Turn raw up/down sums into percentages summing to 100.
/// Both zero when there is no weight at all.
pub fn normalize(up: Decimal, down: Decimal) -> (Decimal, Decimal) {
    let total = up + down;
    if total.is_zero() {
        return (Decimal::ZERO, Decimal::ZERO);
    }

    let mut up_pct = round2(up / total * Decimal::ONE_HUNDRED);
    let mut down_pct = round2(down / total * Decimal::ONE_HUNDRED);

    let residual = Decimal::ONE_HUNDRED - (up_pct + down_pct);
    if !residual.is_zero() {
        if up >= down {
            up_pct += residual;
        } else {
            down_pct += residual;
        }
    }

    (up_pct, down_pct)
}

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    up: u64,
    down: u64,
}

impl Bucket {
    fn score(&self, date: NaiveDate) -> DayScore {
        let (up_percentage, down_percentage) =
            normalize(Decimal::from(self.up), Decimal::from(self.down));
        DayScore {
            date,
            up_percentage,
            down_percentage,
        }
    }
}

/// Pure indicator computation over an already-loaded prediction set.
/// Predictions outside the window are ignored.
pub fn compute_indicator(
    predictions: &[Prediction],
    credibility: &CredibilityTable,
    now: DateTime<Utc>,
) -> Indicator {
    let day0 = now.date_naive();
    let days = window_days(day0);
    let mut buckets = [Bucket::default(); 3];

    for prediction in predictions {
        let Some(slot) = days.iter().position(|d| *d == prediction.target_date) else {
            continue;
        };

        let weight = u64::from(credibility.weight(&prediction.author_id))
            * recency_thirds(age_days(prediction, day0));

        match prediction.trend {
            Trend::Up => buckets[slot].up += weight,
            Trend::Down => buckets[slot].down += weight,
        }
    }

    Indicator {
        today: buckets[0].score(days[0]),
        tomorrow: buckets[1].score(days[1]),
        day_after_tomorrow: buckets[2].score(days[2]),
    }
}

/// Read-side facade over the prediction store
pub struct ScoreAggregator {
    store: Arc<dyn PredictionStore>,
    credibility: CredibilityTable,
}

impl ScoreAggregator {
    pub fn new(store: Arc<dyn PredictionStore>, credibility: CredibilityTable) -> Self {
        Self { store, credibility }
    }

    /// Indicator as of `now`. A store failure yields the all-zero indicator.
    pub async fn indicator(&self, now: DateTime<Utc>) -> Indicator {
        let day0 = now.date_naive();
        let [from, _, to] = window_days(day0);

        match self.store.predictions_between(from, to).await {
            Ok(predictions) => {
                tracing::debug!(count = predictions.len(), "Aggregating predictions");
                compute_indicator(&predictions, &self.credibility, now)
            }
            Err(e) => {
                tracing::error!("Failed to load predictions for {}..{}: {}", from, to, e);
                Indicator::empty(day0)
            }
        }
    }
}
