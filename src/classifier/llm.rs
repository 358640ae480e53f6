//! LLM-backed classifier
//!
//! Talks to any OpenAI-compatible chat completions endpoint (OpenAI,
//! DeepSeek, OpenRouter, Ollama, vLLM). Chart images are attached as
//! separate `image_url` inputs.

use super::schema::{parse_signal, parse_trend, truncate};
use super::{retry_fixed, Classification, ClassificationRequest, Classifier, RetryPolicy};
use crate::config::{ClassificationMode, LlmConfig, ProcessorConfig};
use crate::error::{IndicatorError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// LLM classifier for KOL posts
pub struct LlmClassifier {
    http: Client,
    provider: LlmProvider,
    mode: ClassificationMode,
    min_confidence: Decimal,
    retry: RetryPolicy,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone)]
pub enum LlmProvider {
    DeepSeek {
        api_key: String,
        model: String,
    },
    OpenAI {
        api_key: String,
        model: String,
        base_url: String,
    },
    OpenRouter {
        api_key: String,
        model: String,
    },
    /// OpenAI-compatible API (Ollama, vLLM, etc.)
    Compatible {
        api_key: Option<String>,
        model: String,
        base_url: String,
    },
}

impl LlmProvider {
    fn base_url(&self) -> &str {
        match self {
            LlmProvider::DeepSeek { .. } => "https://api.deepseek.com",
            LlmProvider::OpenRouter { .. } => "https://openrouter.ai/api",
            LlmProvider::OpenAI { base_url, .. } | LlmProvider::Compatible { base_url, .. } => {
                base_url.trim_end_matches('/')
            }
        }
    }

    fn api_key(&self) -> Option<&str> {
        match self {
            LlmProvider::DeepSeek { api_key, .. }
            | LlmProvider::OpenAI { api_key, .. }
            | LlmProvider::OpenRouter { api_key, .. } => Some(api_key),
            LlmProvider::Compatible { api_key, .. } => api_key.as_deref(),
        }
    }

    pub fn model(&self) -> &str {
        match self {
            LlmProvider::DeepSeek { model, .. }
            | LlmProvider::OpenAI { model, .. }
            | LlmProvider::OpenRouter { model, .. }
            | LlmProvider::Compatible { model, .. } => model,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let provider = match config.provider.to_lowercase().as_str() {
            "deepseek" => LlmProvider::DeepSeek {
                api_key: config.api_key.clone(),
                model: config.model.clone().unwrap_or_else(|| "deepseek-chat".to_string()),
            },
            "openai" | "gpt" => LlmProvider::OpenAI {
                api_key: config.api_key.clone(),
                model: config
                    .model
                    .clone()
                    .unwrap_or_else(|| "gpt-4o-mini-2024-07-18".to_string()),
                base_url: config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "https://api.openai.com".to_string()),
            },
            "openrouter" => LlmProvider::OpenRouter {
                api_key: config.api_key.clone(),
                model: config.model.clone().unwrap_or_else(|| "openai/gpt-4o-mini".to_string()),
            },
            "ollama" => LlmProvider::Compatible {
                api_key: None,
                model: config.model.clone().unwrap_or_else(|| "llava:13b".to_string()),
                base_url: config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string()),
            },
            "compatible" | "custom" => LlmProvider::Compatible {
                api_key: if config.api_key.is_empty() {
                    None
                } else {
                    Some(config.api_key.clone())
                },
                model: config.model.clone().ok_or_else(|| {
                    IndicatorError::Config("model required for compatible provider".into())
                })?,
                base_url: config.base_url.clone().ok_or_else(|| {
                    IndicatorError::Config("base_url required for compatible provider".into())
                })?,
            },
            _ => {
                return Err(IndicatorError::Config(format!(
                    "Unknown LLM provider: {}",
                    config.provider
                )))
            }
        };

        Ok(provider)
    }
}

// ============ Request/Response types ============

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl LlmClassifier {
    pub fn new(provider: LlmProvider, mode: ClassificationMode) -> Self {
        Self {
            http: Client::new(),
            provider,
            mode,
            min_confidence: Decimal::new(70, 2),
            retry: RetryPolicy::default(),
            temperature: 0.0,
            max_tokens: 1000,
        }
    }

    /// Create from config
    pub fn from_config(llm: &LlmConfig, processor: &ProcessorConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(llm.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            provider: LlmProvider::from_config(llm)?,
            mode: processor.mode,
            min_confidence: processor.min_confidence,
            retry: RetryPolicy::new(processor.max_attempts, processor.retry_delay()),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: Decimal) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    fn reference_price_text(request: &ClassificationRequest) -> String {
        request
            .reference_price
            .map(|p| format!("{} USDT", p.round()))
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn system_prompt(&self, request: &ClassificationRequest) -> String {
        format!(
            "You are a cryptocurrency market analyst specializing in Bitcoin price analysis. \
             You read posts and chart images from crypto traders and extract their view on \
             where the Bitcoin price is heading. Current Bitcoin price is {}.",
            Self::reference_price_text(request)
        )
    }

    fn build_prompt(&self, request: &ClassificationRequest) -> String {
        match self.mode {
            ClassificationMode::Trend => self.build_trend_prompt(request),
            ClassificationMode::Signal => self.build_signal_prompt(request),
        }
    }

    fn build_trend_prompt(&self, request: &ClassificationRequest) -> String {
        let dates = request
            .target_dates
            .iter()
            .map(|d| format!("\"{}\"", d.format("%Y-%m-%d")))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            r#"Analyze this post for its Bitcoin price outlook. The current Bitcoin price is {price}.

Post created at: {created_at}
Post: "{text}"

Rules:
1. Set "relevant" to true only if the post (text or attached charts) expresses a view on the Bitcoin PRICE
2. Ignore other assets and non-price metrics (hash rate, difficulty, adoption news)
3. For each of the target dates [{dates}] answer "up", "down", or null when the post says nothing about that day
4. Echo every target date exactly once and no other dates

Respond with ONLY a JSON object in this exact format:
{{"relevant": <boolean>, "predictions": [{{"date": "YYYY-MM-DD", "trend": "up" | "down" | null}}]}}
"#,
            price = Self::reference_price_text(request),
            created_at = request.created_at.to_rfc3339(),
            text = request.text,
            dates = dates,
        )
    }

    fn build_signal_prompt(&self, request: &ClassificationRequest) -> String {
        let price = Self::reference_price_text(request);

        format!(
            r#"Analyze this post for Bitcoin price trading signals. The current Bitcoin price is {price}.

Post created at: {created_at}
Post: "{text}"

Important validation rules:
1. Only return isTradeRelated=true if the post contains specific Bitcoin PRICE analysis or trading signals
2. Use the current Bitcoin price ({price}) to check that a chart is about Bitcoin
3. Ignore signals about other cryptocurrencies or non-price Bitcoin metrics
4. For images, only consider price charts that clearly show Bitcoin price movements
5. The confidence should reflect how clear the signal is, how close the chart's price range is to the current price, and how specific the entry/target/stop levels are

Return ONLY a JSON object with the following structure:
{{
  "isTradeRelated": boolean,
  "type": "long" | "short" | null,
  "entry": number | null,
  "takeProfit": number | null,
  "stopLoss": number | null,
  "timeframe": {{"type": "short" | "medium" | "long", "duration": {{"value": number, "unit": "hour" | "day" | "week"}}}} | null,
  "confidence": number (0-1),
  "reasoning": string
}}
"#,
            price = price,
            created_at = request.created_at.to_rfc3339(),
            text = request.text,
        )
    }

    fn build_request(&self, request: &ClassificationRequest) -> ChatRequest {
        let mut messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: MessageContent::Text(self.system_prompt(request)),
            },
            ChatMessage {
                role: "user".to_string(),
                content: MessageContent::Text(self.build_prompt(request)),
            },
        ];

        for url in &request.media_urls {
            messages.push(ChatMessage {
                role: "user".to_string(),
                content: MessageContent::Parts(vec![ContentPart::ImageUrl {
                    image_url: ImageUrl { url: url.clone() },
                }]),
            });
        }

        ChatRequest {
            model: self.provider.model().to_string(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
        }
    }

    async fn call_llm(&self, body: &ChatRequest) -> Result<String> {
        let mut req = self
            .http
            .post(format!("{}/v1/chat/completions", self.provider.base_url()))
            .header("content-type", "application/json");

        if let Some(key) = self.provider.api_key() {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(IndicatorError::Api(format!(
                "LLM returned {}: {}",
                status,
                truncate(&text, 200)
            )));
        }

        tracing::debug!("LLM raw response: {}", truncate(&text, 500));

        let response: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            IndicatorError::ClassificationParse(format!(
                "JSON parse error: {} - response: {}",
                e,
                truncate(&text, 200)
            ))
        })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| IndicatorError::ClassificationParse("Empty response from LLM".into()))
    }

    fn parse_response(
        &self,
        response: &str,
        request: &ClassificationRequest,
    ) -> Result<Classification> {
        match self.mode {
            ClassificationMode::Trend => parse_trend(response, request).map(Classification::Trend),
            ClassificationMode::Signal => {
                parse_signal(response, request, self.min_confidence, Utc::now())
                    .map(Classification::Signal)
            }
        }
    }

    async fn attempt(&self, body: &ChatRequest, request: &ClassificationRequest) -> Result<Classification> {
        let response = self.call_llm(body).await?;
        self.parse_response(&response, request)
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, request: &ClassificationRequest) -> Result<Classification> {
        let body = self.build_request(request);
        let label = format!("classify post {}", request.post_id);
        retry_fixed(self.retry, &label, || self.attempt(&body, request)).await
    }
}
