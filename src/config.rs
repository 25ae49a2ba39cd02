//! Configuration management for the deal hunter

use crate::services::ensemble::EnsemblePolicy;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Feeds scanned when `FEED_URLS` is not set
pub const DEFAULT_FEEDS: &[&str] = &[
    "https://www.dealnews.com/c142/Electronics/?rss=1",
    "https://www.dealnews.com/c39/Computers/?rss=1",
    "https://www.dealnews.com/c238/Automotive/?rss=1",
    "https://www.dealnews.com/f1912/Smart-Home/?rss=1",
    "https://www.dealnews.com/c196/Home-Garden/?rss=1",
];

/// Application configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the JSON memory file
    pub memory_path: String,

    /// Minimum discount (estimate - price) for a deal to count
    pub deal_threshold: Decimal,

    /// Cap on new opportunities recorded per cycle (None = unlimited)
    pub max_opportunities_per_run: Option<usize>,

    /// Timeout applied to every outbound HTTP call
    pub http_timeout_seconds: u64,

    /// Interval between cycles for `run` and the server's background loop
    pub scan_interval_seconds: u64,

    pub scanner: ScannerConfig,
    pub extractor: ExtractorConfig,
    pub ensemble: EnsembleConfig,
    pub notifications: NotificationConfig,

    /// HTTP API port
    pub server_port: u16,

    /// Whether the server runs scan cycles on its own
    pub background_scan: bool,
}

/// Hosted endpoint that refuses unauthenticated calls
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub feed_urls: Vec<String>,
    /// Entries taken from the top of each feed
    pub max_entries_per_feed: usize,
    /// Fetch each new deal's landing page for its details and features
    pub fetch_details: bool,
    /// Pause after every landing page fetch
    pub detail_delay_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            feed_urls: DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect(),
            max_entries_per_feed: 10,
            fetch_details: true,
            detail_delay_ms: 500,
        }
    }
}

/// OpenAI-compatible chat completions endpoint used for extraction
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_retries: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            api_url: OPENAI_API_URL.to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_retries: 2,
        }
    }
}

impl ExtractorConfig {
    /// The hosted endpoint needs a key; self-hosted compatible servers may not
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_none() && self.api_url.trim_end_matches('/') == OPENAI_API_URL {
            anyhow::bail!("OPENAI_API_KEY is required when extracting through {}", OPENAI_API_URL);
        }
        Ok(())
    }
}

/// One weighted sub-estimator endpoint
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    pub name: String,
    pub url: String,
    pub weight: Decimal,
}

#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    pub members: Vec<EstimatorConfig>,
    pub policy: EnsemblePolicy,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            members: vec![
                EstimatorConfig {
                    name: "specialist".to_string(),
                    url: "http://localhost:8001/estimate".to_string(),
                    weight: dec!(0.5),
                },
                EstimatorConfig {
                    name: "frontier".to_string(),
                    url: "http://localhost:8002/estimate".to_string(),
                    weight: dec!(0.3),
                },
                EstimatorConfig {
                    name: "random_forest".to_string(),
                    url: "http://localhost:8003/estimate".to_string(),
                    weight: dec!(0.2),
                },
            ],
            policy: EnsemblePolicy::Strict,
        }
    }
}

/// Notification channels; each is enabled only when all of its fields are set
#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub pushover_user: Option<String>,
    pub pushover_token: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from: Option<String>,
    pub twilio_to: Option<String>,
    pub discord_webhook_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_path: "memory.json".to_string(),
            deal_threshold: dec!(50),
            max_opportunities_per_run: None,
            http_timeout_seconds: 30,
            scan_interval_seconds: 300,
            scanner: ScannerConfig::default(),
            extractor: ExtractorConfig::default(),
            ensemble: EnsembleConfig::default(),
            notifications: NotificationConfig::default(),
            server_port: 3000,
            background_scan: false,
        }
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|s| !s.is_empty())
}

/// `true`/`1`/`yes` (any case) enable a flag; anything else disables it
fn flag(name: &str) -> Option<bool> {
    var(name).map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

fn parsed<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {}={}: {}", name, raw, e)),
        None => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let feed_urls = var("FEED_URLS")
            .map(|v| split_list(&v))
            .unwrap_or(defaults.scanner.feed_urls);

        let scanner = ScannerConfig {
            feed_urls,
            max_entries_per_feed: parsed("MAX_ENTRIES_PER_FEED")?
                .unwrap_or(defaults.scanner.max_entries_per_feed),
            fetch_details: flag("FETCH_DEAL_PAGES").unwrap_or(defaults.scanner.fetch_details),
            detail_delay_ms: parsed("DEAL_PAGE_DELAY_MS")?.unwrap_or(defaults.scanner.detail_delay_ms),
        };

        let extractor = ExtractorConfig {
            api_url: var("EXTRACTOR_API_URL").unwrap_or(defaults.extractor.api_url),
            api_key: var("OPENAI_API_KEY"),
            model: var("EXTRACTOR_MODEL").unwrap_or(defaults.extractor.model),
            max_retries: parsed("EXTRACTOR_MAX_RETRIES")?.unwrap_or(defaults.extractor.max_retries),
        };

        let mut members = defaults.ensemble.members;
        for member in members.iter_mut() {
            let prefix = member.name.to_uppercase();
            if let Some(url) = var(&format!("{}_URL", prefix)) {
                member.url = url;
            }
            if let Some(weight) = parsed::<Decimal>(&format!("{}_WEIGHT", prefix))? {
                member.weight = weight;
            }
        }

        let policy = match var("ENSEMBLE_POLICY") {
            Some(raw) => raw.parse::<EnsemblePolicy>()?,
            None => defaults.ensemble.policy,
        };

        let ensemble = EnsembleConfig { members, policy };
        ensemble.validate()?;

        let notifications = NotificationConfig {
            pushover_user: var("PUSHOVER_USER"),
            pushover_token: var("PUSHOVER_TOKEN"),
            twilio_account_sid: var("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: var("TWILIO_AUTH_TOKEN"),
            twilio_from: var("TWILIO_FROM"),
            twilio_to: var("TWILIO_TO"),
            discord_webhook_url: var("DISCORD_WEBHOOK_URL"),
        };

        let background_scan = flag("BACKGROUND_SCAN").unwrap_or(defaults.background_scan);

        Ok(Self {
            memory_path: var("MEMORY_PATH").unwrap_or(defaults.memory_path),
            deal_threshold: parsed("DEAL_THRESHOLD")?.unwrap_or(defaults.deal_threshold),
            max_opportunities_per_run: parsed("MAX_OPPORTUNITIES_PER_RUN")?,
            http_timeout_seconds: parsed("HTTP_TIMEOUT_SECONDS")?
                .unwrap_or(defaults.http_timeout_seconds),
            scan_interval_seconds: parsed("SCAN_INTERVAL_SECONDS")?
                .unwrap_or(defaults.scan_interval_seconds),
            scanner,
            extractor,
            ensemble,
            notifications,
            server_port: parsed("SERVER_PORT")?.unwrap_or(defaults.server_port),
            background_scan,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    /// Shared client for every outbound call, with the configured timeout
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.http_timeout())
            .user_agent(concat!("deal-hunter/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")
    }
}

impl EnsembleConfig {
    /// Weights must be non-negative and sum to one
    pub fn validate(&self) -> Result<()> {
        if self.members.is_empty() {
            anyhow::bail!("ensemble needs at least one estimator");
        }
        if let Some(m) = self.members.iter().find(|m| m.weight.is_sign_negative()) {
            anyhow::bail!("weight for {} is negative: {}", m.name, m.weight);
        }
        let total: Decimal = self.members.iter().map(|m| m.weight).sum();
        if (total - Decimal::ONE).abs() > dec!(0.000001) {
            anyhow::bail!("ensemble weights must sum to 1, got {}", total);
        }
        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
