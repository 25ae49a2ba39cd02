//! Deal Hunter Library
//!
//! Scans RSS deal feeds, asks a language model for a clean description and
//! price, prices each product with a weighted ensemble of three estimators,
//! and records listings whose estimated value beats the asking price by at
//! least a configured threshold.
//!
//! A cycle is: scan feeds -> skip URLs already in memory -> extract ->
//! estimate -> evaluate -> append to memory and notify -> persist memory.

pub mod api;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod html;
pub mod memory;
pub mod pipeline;
pub mod scanner;
pub mod services;
pub mod types;

pub use config::Config;
pub use error::{
    EstimationError, ExtractionError, NotificationError, PersistenceError, PipelineError, ScanError,
};
pub use memory::MemoryStore;
pub use pipeline::{CycleSummary, DealPipeline};
pub use scanner::{FeedSource, HttpFeedSource, Scanner};
pub use services::{DescriptionExtractor, Ensemble, EnsemblePolicy, Notifier, PriceEstimator};
pub use types::{Deal, DealCandidate, Extraction, MemoryStats, Opportunity};
