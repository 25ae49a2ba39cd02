//! Weighted ensemble over independent price estimators

use crate::config::EnsembleConfig;
use crate::error::EstimationError;
use crate::services::estimators::{HttpEstimator, PriceEstimator};
use anyhow::Result;
use futures::future::join_all;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// What to do when some sub-estimators fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnsemblePolicy {
    /// Any failure fails the whole estimate
    #[default]
    Strict,
    /// Average over the estimators that answered, rescaling their weights
    Renormalize,
}

impl FromStr for EnsemblePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(EnsemblePolicy::Strict),
            "renormalize" => Ok(EnsemblePolicy::Renormalize),
            other => anyhow::bail!("unknown ensemble policy: {}", other),
        }
    }
}

impl fmt::Display for EnsemblePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnsemblePolicy::Strict => write!(f, "strict"),
            EnsemblePolicy::Renormalize => write!(f, "renormalize"),
        }
    }
}

/// An estimator and its share of the final value
#[derive(Clone)]
pub struct Member {
    pub estimator: Arc<dyn PriceEstimator>,
    pub weight: Decimal,
}

impl Member {
    pub fn new(estimator: Arc<dyn PriceEstimator>, weight: Decimal) -> Self {
        Self { estimator, weight }
    }
}

pub struct Ensemble {
    members: Vec<Member>,
    policy: EnsemblePolicy,
}

impl Ensemble {
    /// Build an ensemble; weights must be non-negative and sum to one
    pub fn new(members: Vec<Member>, policy: EnsemblePolicy) -> Result<Self> {
        if members.is_empty() {
            anyhow::bail!("ensemble needs at least one estimator");
        }
        if let Some(m) = members.iter().find(|m| m.weight.is_sign_negative()) {
            anyhow::bail!("weight for {} is negative", m.estimator.name());
        }
        let total: Decimal = members.iter().map(|m| m.weight).sum();
        if (total - Decimal::ONE).abs() > dec!(0.000001) {
            anyhow::bail!("ensemble weights must sum to 1, got {}", total);
        }
        Ok(Self { members, policy })
    }

    /// HTTP-backed ensemble from configuration
    pub fn from_config(client: &Client, config: &EnsembleConfig) -> Result<Self> {
        let members = config
            .members
            .iter()
            .map(|m| {
                let estimator: Arc<dyn PriceEstimator> = Arc::new(HttpEstimator::new(client.clone(), m));
                Member::new(estimator, m.weight)
            })
            .collect();
        Self::new(members, config.policy)
    }

    pub fn policy(&self) -> EnsemblePolicy {
        self.policy
    }

    /// Estimate the market value of `description`.
    ///
    /// Every member is queried concurrently and none sees another's answer.
    /// Negative results are clamped to zero.
    pub async fn estimate(&self, description: &str) -> Result<Decimal, EstimationError> {
        let results = join_all(
            self.members
                .iter()
                .map(|m| m.estimator.estimate(description)),
        )
        .await;

        let mut weighted = Decimal::ZERO;
        let mut answered_weight = Decimal::ZERO;
        let mut answered = 0usize;

        for (member, result) in self.members.iter().zip(results) {
            match result {
                Ok(value) => {
                    debug!("{} -> {}", member.estimator.name(), value);
                    weighted += member.weight * value;
                    answered_weight += member.weight;
                    answered += 1;
                }
                Err(e) => match self.policy {
                    EnsemblePolicy::Strict => {
                        return Err(EstimationError::Member {
                            estimator: member.estimator.name().to_string(),
                            reason: e.to_string(),
                        });
                    }
                    EnsemblePolicy::Renormalize => {
                        warn!("Estimator {} failed, excluding it: {}", member.estimator.name(), e);
                    }
                },
            }
        }

        // Zero answered weight means only zero-weight members answered
        if answered == 0 || answered_weight.is_zero() {
            return Err(EstimationError::AllFailed);
        }

        let value = weighted / answered_weight;
        Ok(value.max(Decimal::ZERO).round_dp(2).normalize())
    }
}
