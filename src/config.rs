//! Configuration management

use crate::credibility::KolProfile;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub price: PriceConfig,
    pub telegram: Option<TelegramConfig>,
    /// Overrides the built-in credibility table when non-empty
    #[serde(default)]
    pub kols: Vec<KolProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// LLM provider (openai, deepseek, openrouter, ollama, compatible)
    pub provider: String,
    /// API key
    #[serde(default)]
    pub api_key: String,
    /// Model name
    pub model: Option<String>,
    /// Base URL override
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// HTTP timeout for one classification request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Which response contract the classifier asks the engine for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMode {
    /// Per-target-day up/down/null trend calls
    #[default]
    Trend,
    /// Confidence-gated trading signal (entry/target/stop-loss)
    Signal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub mode: ClassificationMode,
    /// Maximum posts selected per sweep
    pub batch_size: usize,
    /// Wait between sweeps in seconds
    pub interval_secs: u64,
    /// Topic keywords for the relevance filter
    pub keywords: Vec<String>,
    /// Total classification attempts per post and sweep
    pub max_attempts: u32,
    /// Fixed delay between classification attempts
    pub retry_delay_ms: u64,
    /// Minimum confidence for an accepted trading signal
    pub min_confidence: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    /// Ticker endpoint (Binance REST compatible)
    pub url: String,
    pub symbol: String,
    /// Reference price used until the first successful fetch
    pub fallback: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_timeout_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_string_lossy();
        let expanded = shellexpand::tilde(&path);

        let settings = config::Config::builder()
            .add_source(config::File::with_name(expanded.as_ref()))
            .add_source(config::Environment::with_prefix("KOL_INDICATOR").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations
    pub fn load_default() -> anyhow::Result<Self> {
        let paths = ["config.toml", "config.yaml", "~/.config/kol-indicator/config.toml"];

        for path in paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::load(expanded.as_ref());
            }
        }

        anyhow::bail!("No configuration file found")
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.processor.batch_size == 0 {
            anyhow::bail!("processor.batch_size must be at least 1");
        }
        if self.processor.max_attempts == 0 {
            anyhow::bail!("processor.max_attempts must be at least 1");
        }
        if self.processor.interval_secs == 0 {
            anyhow::bail!("processor.interval_secs must be at least 1");
        }
        if self.processor.keywords.iter().all(|k| k.trim().is_empty()) {
            anyhow::bail!("processor.keywords must contain at least one keyword");
        }
        if self.processor.min_confidence < Decimal::ZERO
            || self.processor.min_confidence > Decimal::ONE
        {
            anyhow::bail!("processor.min_confidence must be within [0, 1]");
        }
        if self.llm.timeout_secs == 0 {
            anyhow::bail!("llm.timeout_secs must be at least 1");
        }
        Ok(())
    }
}

impl ProcessorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            mode: ClassificationMode::Trend,
            batch_size: 20,
            interval_secs: 300,
            keywords: vec!["btc".to_string(), "bitcoin".to_string()],
            max_attempts: 3,
            retry_delay_ms: 1000,
            min_confidence: dec!(0.70),
        }
    }
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            url: "https://api.binance.com/api/v3/ticker/price".to_string(),
            symbol: "BTCUSDT".to_string(),
            fallback: dec!(94000),
        }
    }
}
