//! Sub-estimators: independent services that price a product description

use crate::config::EstimatorConfig;
use crate::error::EstimationError;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::debug;

/// Largest estimate accepted from a sub-estimator, in either direction
pub const MAX_PLAUSIBLE_ESTIMATE: Decimal = dec!(10000000);

/// A single pricing model
#[async_trait]
pub trait PriceEstimator: Send + Sync {
    async fn estimate(&self, description: &str) -> Result<Decimal, EstimationError>;

    fn name(&self) -> &str;
}

/// Estimator reached over HTTP.
///
/// Sends `{"description": ...}` and reads the value from `price`,
/// `estimate` or `value` in the JSON reply.
pub struct HttpEstimator {
    client: Client,
    name: String,
    url: String,
}

impl HttpEstimator {
    pub fn new(client: Client, config: &EstimatorConfig) -> Self {
        Self {
            client,
            name: config.name.clone(),
            url: config.url.clone(),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> EstimationError {
        EstimationError::InvalidResponse {
            estimator: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn value_from(&self, reply: &Value) -> Result<Decimal, EstimationError> {
        let field = ["price", "estimate", "value"]
            .iter()
            .find_map(|key| reply.get(*key))
            .ok_or_else(|| self.invalid("reply has no price field"))?;

        let value = match field {
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .ok(),
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
        .ok_or_else(|| self.invalid(format!("not a number: {}", field)))?;

        if value.abs() > MAX_PLAUSIBLE_ESTIMATE {
            return Err(self.invalid(format!("implausible estimate: {}", value)));
        }

        Ok(value)
    }
}

#[async_trait]
impl PriceEstimator for HttpEstimator {
    async fn estimate(&self, description: &str) -> Result<Decimal, EstimationError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "description": description }))
            .send()
            .await
            .map_err(|source| EstimationError::Request {
                estimator: self.name.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(EstimationError::Status {
                estimator: self.name.clone(),
                status: response.status().as_u16(),
            });
        }

        let reply: Value = response.json().await.map_err(|source| EstimationError::Request {
            estimator: self.name.clone(),
            source,
        })?;

        let value = self.value_from(&reply)?;
        debug!("{} estimate: {}", self.name, value);
        Ok(value)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
