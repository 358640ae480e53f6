//! KOL Trend Indicator
//!
//! Classifies posts from tracked crypto authors into short-horizon BTC trend
//! calls and aggregates them into a rolling three-day up/down indicator.

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod credibility;
pub mod error;
pub mod notify;
pub mod price;
pub mod processor;
pub mod relevance;
pub mod storage;
pub mod types;
