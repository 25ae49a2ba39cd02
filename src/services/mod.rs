//! External-service adapters used by the pipeline

pub mod ensemble;
pub mod estimators;
pub mod extractor;
pub mod notifier;
pub mod retry;

pub use ensemble::{Ensemble, EnsemblePolicy, Member};
pub use estimators::{HttpEstimator, PriceEstimator};
pub use extractor::{DescriptionExtractor, LlmExtractor};
pub use notifier::{
    Alert, DeliveryReport, DiscordChannel, NotificationChannel, Notifier, PushoverChannel,
    TwilioChannel,
};
pub use retry::{with_retry, RetryConfig};
