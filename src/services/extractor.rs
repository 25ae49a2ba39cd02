//! Description extractor: turns noisy feed text into a product description and price

use crate::config::ExtractorConfig;
use crate::error::ExtractionError;
use crate::services::retry::{with_retry, RetryConfig};
use crate::types::Extraction;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You read product deal listings and extract the product being sold. \
Reply with a JSON object with exactly two keys: \"description\", a concise summary of the product \
itself (brand, model, key specs, no mention of the discount or retailer), and \"price\", the price \
the deal is offered at as a plain number in dollars. If the listing does not state a clear price, \
reply with {\"description\": \"\", \"price\": null}.";

#[async_trait]
pub trait DescriptionExtractor: Send + Sync {
    async fn extract(&self, raw_text: &str) -> Result<Extraction, ExtractionError>;
}

/// Extractor backed by an OpenAI-compatible chat completions endpoint
pub struct LlmExtractor {
    client: Client,
    config: ExtractorConfig,
    retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LlmExtractor {
    pub fn new(client: Client, config: ExtractorConfig) -> Self {
        let retry = RetryConfig {
            max_retries: config.max_retries,
            ..Default::default()
        };
        Self {
            client,
            config,
            retry,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'))
    }

    async fn call_once(&self, raw_text: &str) -> Result<Extraction, ExtractionError> {
        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": raw_text },
            ],
        });

        let mut request = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ExtractionError::Malformed("reply has no content".to_string()))?;

        debug!("Extractor reply: {}", content);
        parse_extraction(&content)
    }
}

#[async_trait]
impl DescriptionExtractor for LlmExtractor {
    async fn extract(&self, raw_text: &str) -> Result<Extraction, ExtractionError> {
        with_retry(&self.retry, "extract", || self.call_once(raw_text)).await
    }
}

/// Parse the model's JSON reply into an [`Extraction`].
///
/// Accepts replies wrapped in a markdown code fence and prices given either
/// as numbers or as strings such as `"$1,299.99"`.
pub fn parse_extraction(content: &str) -> Result<Extraction, ExtractionError> {
    let value: Value = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| ExtractionError::Malformed(format!("not JSON: {}", e)))?;

    let description = value
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ExtractionError::Malformed("missing description".to_string()))?
        .to_string();

    let price = match value.get("price") {
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Some(Value::String(s)) => {
            Decimal::from_str(s.trim().trim_start_matches('$').replace(',', "").trim()).ok()
        }
        _ => None,
    }
    .ok_or_else(|| ExtractionError::Malformed("missing price".to_string()))?;

    if price <= Decimal::ZERO {
        return Err(ExtractionError::Malformed(format!("non-positive price {}", price)));
    }

    Ok(Extraction { description, price })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the optional language tag on the opening fence
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}
