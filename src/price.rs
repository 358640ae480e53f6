//! BTC reference price feed
//!
//! The price is prompt context only; nothing in the indicator depends on it
//! being fresh.

use crate::config::PriceConfig;
use crate::error::{IndicatorError, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn current_price(&self) -> Result<Decimal>;
}

/// Binance-style `ticker/price` endpoint
pub struct BinancePriceFeed {
    http: Client,
    url: String,
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

impl BinancePriceFeed {
    pub fn new(url: &str, symbol: &str) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            http,
            url: url.to_string(),
            symbol: symbol.to_string(),
        })
    }

    pub fn from_config(config: &PriceConfig) -> Result<Self> {
        Self::new(&config.url, &config.symbol)
    }
}

#[async_trait]
impl PriceFeed for BinancePriceFeed {
    async fn current_price(&self) -> Result<Decimal> {
        let response = self
            .http
            .get(&self.url)
            .query(&[("symbol", self.symbol.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IndicatorError::Api(format!(
                "price feed returned {}",
                response.status()
            )));
        }

        let ticker: TickerPrice = response.json().await?;
        if ticker.symbol != self.symbol {
            return Err(IndicatorError::Api(format!(
                "price feed answered for {} instead of {}",
                ticker.symbol, self.symbol
            )));
        }

        ticker
            .price
            .parse::<Decimal>()
            .map_err(|e| IndicatorError::Api(format!("bad price '{}': {}", ticker.price, e)))
    }
}
