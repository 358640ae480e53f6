//! Error types for the indicator pipeline

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndicatorError {
    #[error("Classification unavailable after {attempts} attempts: {reason}")]
    ClassificationUnavailable { attempts: u32, reason: String },

    #[error("Classification parse error: {0}")]
    ClassificationParse(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid prediction for post {post_id} on {target_date}: {reason}")]
    InvalidPrediction {
        post_id: String,
        target_date: NaiveDate,
        reason: String,
    },

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for IndicatorError {
    fn from(err: sqlx::Error) -> Self {
        IndicatorError::StoreUnavailable(err.to_string())
    }
}

impl IndicatorError {
    /// Errors a classification attempt may be retried on
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IndicatorError::Network(_)
                | IndicatorError::Api(_)
                | IndicatorError::Json(_)
                | IndicatorError::ClassificationParse(_)
        )
    }

    /// Errors that end the current sweep instead of skipping one post
    pub fn aborts_sweep(&self) -> bool {
        matches!(self, IndicatorError::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, IndicatorError>;
