//! Engine response schemas and validation
//!
//! The engine answers with loosely-typed JSON. These serde shapes are the
//! only place that JSON is trusted; everything past [`parse_trend`] and
//! [`parse_signal`] works on the typed results in the parent module.

use super::{
    ClassificationRequest, DayCall, DayTrend, Direction, SignalVerdict, Timeframe, TradingSignal,
    TrendClassification,
};
use crate::error::{IndicatorError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrendResponse {
    relevant: bool,
    #[serde(default)]
    predictions: Vec<DayTrendResponse>,
}

#[derive(Debug, Deserialize)]
struct DayTrendResponse {
    date: NaiveDate,
    #[serde(default)]
    trend: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignalResponse {
    is_trade_related: bool,
    #[serde(rename = "type", default)]
    direction: Option<Direction>,
    #[serde(default)]
    entry: Option<Decimal>,
    #[serde(default)]
    take_profit: Option<Decimal>,
    #[serde(default)]
    stop_loss: Option<Decimal>,
    #[serde(default)]
    timeframe: Option<Timeframe>,
    #[serde(default)]
    confidence: Option<Decimal>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Slice out the outermost JSON object from a chat answer that may carry
/// code fences or prose around it.
pub fn extract_json(response: &str) -> Result<&str> {
    let start = response.find('{');
    let end = response.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => Ok(&response[start..=end]),
        _ => Err(IndicatorError::ClassificationParse(format!(
            "no JSON object in response: {}",
            truncate(response, 200)
        ))),
    }
}

fn decode<'a, T: Deserialize<'a>>(json: &'a str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| {
        IndicatorError::ClassificationParse(format!("{} - response: {}", e, truncate(json, 200)))
    })
}

/// Parse a trend answer and check the echoed dates against the request
pub fn parse_trend(response: &str, request: &ClassificationRequest) -> Result<TrendClassification> {
    let parsed: TrendResponse = decode(extract_json(response)?)?;

    // An irrelevant answer may omit the per-day list entirely
    if !parsed.relevant && parsed.predictions.is_empty() {
        return Ok(TrendClassification {
            relevant: false,
            days: Vec::new(),
        });
    }

    let mut by_date: HashMap<NaiveDate, Option<String>> = HashMap::new();
    for day in parsed.predictions {
        if by_date.insert(day.date, day.trend).is_some() {
            return Err(IndicatorError::ClassificationParse(format!(
                "date {} answered more than once",
                day.date
            )));
        }
    }

    let mut days = Vec::with_capacity(request.target_dates.len());
    for date in &request.target_dates {
        let Some(label) = by_date.remove(date) else {
            return Err(IndicatorError::ClassificationParse(format!(
                "requested date {} missing from response",
                date
            )));
        };
        days.push(DayTrend {
            date: *date,
            call: DayCall::from_label(label.as_deref()),
        });
    }

    if let Some(extra) = by_date.keys().min() {
        return Err(IndicatorError::ClassificationParse(format!(
            "response contains unrequested date {}",
            extra
        )));
    }

    Ok(TrendClassification {
        relevant: parsed.relevant,
        days,
    })
}

/// Parse a trading-signal answer and apply the acceptance gate: trade
/// related, confidence at or above `min_confidence`, and a direction plus
/// positive entry, take-profit and stop-loss.
pub fn parse_signal(
    response: &str,
    request: &ClassificationRequest,
    min_confidence: Decimal,
    indicated_at: DateTime<Utc>,
) -> Result<SignalVerdict> {
    let parsed: SignalResponse = decode(extract_json(response)?)?;

    if let Some(confidence) = parsed.confidence {
        if confidence < Decimal::ZERO || confidence > Decimal::ONE {
            return Err(IndicatorError::ClassificationParse(format!(
                "confidence {} outside [0, 1]",
                confidence
            )));
        }
    }

    if !parsed.is_trade_related {
        return Ok(SignalVerdict::NotASignal {
            reason: "not trade related".to_string(),
        });
    }

    let confidence = parsed.confidence.unwrap_or(Decimal::ZERO);
    if confidence < min_confidence {
        return Ok(SignalVerdict::NotASignal {
            reason: format!("confidence {} below {}", confidence, min_confidence),
        });
    }

    let positive = |v: Option<Decimal>| v.filter(|d| d.is_sign_positive() && !d.is_zero());
    let (Some(direction), Some(entry), Some(take_profit), Some(stop_loss)) = (
        parsed.direction,
        positive(parsed.entry),
        positive(parsed.take_profit),
        positive(parsed.stop_loss),
    ) else {
        return Ok(SignalVerdict::NotASignal {
            reason: "incomplete signal fields".to_string(),
        });
    };

    Ok(SignalVerdict::Accepted(TradingSignal {
        post_id: request.post_id.clone(),
        direction,
        entry,
        take_profit,
        stop_loss,
        confidence,
        timeframe: parsed.timeframe,
        reasoning: parsed.reasoning.unwrap_or_default(),
        indicated_at,
    }))
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}
