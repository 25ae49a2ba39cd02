//! One scan cycle: feeds in, new opportunities out

use crate::config::Config;
use crate::error::PipelineError;
use crate::evaluator;
use crate::memory::MemoryStore;
use crate::scanner::{HttpFeedSource, Scanner};
use crate::services::{DescriptionExtractor, Ensemble, LlmExtractor, Notifier};
use crate::types::Opportunity;
use anyhow::Result;
use chrono::Utc;
use futures::StreamExt;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters for one cycle, logged when it finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub candidates: usize,
    pub extraction_failures: usize,
    pub estimation_failures: usize,
    pub below_threshold: usize,
    pub opportunities: usize,
}

/// Scanner -> extractor -> ensemble -> evaluator -> memory + notifier
pub struct DealPipeline {
    scanner: Scanner,
    extractor: Arc<dyn DescriptionExtractor>,
    ensemble: Ensemble,
    notifier: Notifier,
    threshold: Decimal,
    max_opportunities: Option<usize>,
}

impl DealPipeline {
    pub fn new(
        scanner: Scanner,
        extractor: Arc<dyn DescriptionExtractor>,
        ensemble: Ensemble,
        notifier: Notifier,
        threshold: Decimal,
    ) -> Self {
        Self {
            scanner,
            extractor,
            ensemble,
            notifier,
            threshold,
            max_opportunities: None,
        }
    }

    /// Stop recording after `limit` new opportunities in one cycle
    pub fn with_max_opportunities(mut self, limit: Option<usize>) -> Self {
        self.max_opportunities = limit;
        self
    }

    /// Wire every component to its HTTP-backed implementation
    pub fn from_config(config: &Config) -> Result<Self> {
        config.extractor.validate()?;
        if config.extractor.api_key.is_none() {
            warn!(
                "OPENAI_API_KEY is not set; calling {} without authentication",
                config.extractor.api_url
            );
        }

        let client = config.http_client()?;
        let scanner = Scanner::new(
            config.scanner.clone(),
            Arc::new(HttpFeedSource::new(client.clone())),
        );
        let extractor = Arc::new(LlmExtractor::new(client.clone(), config.extractor.clone()));
        let ensemble = Ensemble::from_config(&client, &config.ensemble)?;
        info!("Ensemble policy: {}", ensemble.policy());
        let notifier = Notifier::from_config(&client, &config.notifications);
        if notifier.channel_names().is_empty() {
            info!("No notification channels configured");
        } else {
            info!("Notification channels: {}", notifier.channel_names().join(", "));
        }

        Ok(Self::new(scanner, extractor, ensemble, notifier, config.deal_threshold)
            .with_max_opportunities(config.max_opportunities_per_run))
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    /// Run one cycle against `memory` and persist it.
    ///
    /// Per-feed and per-item failures are logged and skipped. Only a failure
    /// to persist memory is returned. Callers must not run two cycles over
    /// the same memory file at once; the `&mut` borrow enforces that within
    /// a process.
    pub async fn run_cycle(&self, memory: &mut MemoryStore) -> Result<Vec<Opportunity>, PipelineError> {
        info!(
            "Starting scan cycle over {} feeds ({} opportunities in memory)",
            self.scanner.feed_urls().len(),
            memory.len()
        );

        let seen = memory.seen_urls();
        let mut candidates = self.scanner.scan(&seen);
        let mut summary = CycleSummary::default();
        let mut found = Vec::new();

        while let Some(candidate) = candidates.next().await {
            if self.max_opportunities.is_some_and(|max| found.len() >= max) {
                info!("Reached {} opportunities for this cycle, stopping", found.len());
                break;
            }

            summary.candidates += 1;
            let url = candidate.source_url.clone();

            let extraction = match self.extractor.extract(&candidate.raw_text).await {
                Ok(extraction) => extraction,
                Err(e) => {
                    warn!("Dropping {}: {}", url, e);
                    summary.extraction_failures += 1;
                    continue;
                }
            };
            let deal = candidate.into_deal(extraction);

            let estimate = match self.ensemble.estimate(&deal.extracted_description).await {
                Ok(estimate) => estimate,
                Err(e) => {
                    warn!("No estimate for {}: {}", url, e);
                    summary.estimation_failures += 1;
                    continue;
                }
            };

            debug!(
                "{}: price ${} estimate ${} discount ${}",
                url,
                deal.price,
                estimate,
                evaluator::discount(deal.price, estimate)
            );

            let Some(opportunity) = evaluator::evaluate(deal, estimate, self.threshold, Utc::now()) else {
                summary.below_threshold += 1;
                continue;
            };

            if !memory.append(opportunity.clone()) {
                continue;
            }

            info!("Opportunity: {}", opportunity.headline());
            let report = self.notifier.notify(&opportunity).await;
            if report.failed > 0 {
                warn!(
                    "Alert for {} reached {} channels, {} failed",
                    url, report.delivered, report.failed
                );
            }

            summary.opportunities += 1;
            found.push(opportunity);
        }
        drop(candidates);

        memory.persist().await?;

        info!(
            "Scan cycle done: {} candidates, {} extraction failures, {} estimation failures, {} below threshold, {} new opportunities",
            summary.candidates,
            summary.extraction_failures,
            summary.estimation_failures,
            summary.below_threshold,
            summary.opportunities
        );

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScannerConfig;
    use crate::error::{ExtractionError, PersistenceError};
    use crate::scanner::tests::{rss, StaticFeeds};
    use crate::services::ensemble::tests::ensemble_of;
    use crate::services::ensemble::EnsemblePolicy;
    use crate::services::notifier::tests::CountingChannel;
    use crate::types::Extraction;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Takes the description from the title line and the last `$` amount as price
    struct TitleExtractor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DescriptionExtractor for TitleExtractor {
        async fn extract(&self, raw_text: &str) -> Result<Extraction, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let description = raw_text
                .lines()
                .next()
                .and_then(|l| l.strip_prefix("Title: "))
                .unwrap_or_default()
                .to_string();
            let price = crate::scanner::price_tokens(raw_text)
                .last()
                .copied()
                .ok_or_else(|| ExtractionError::Malformed("no price".to_string()))?;
            if description.contains("Broken") {
                return Err(ExtractionError::Malformed("unreadable".to_string()));
            }
            Ok(Extraction { description, price })
        }
    }

    fn feeds(docs: Vec<(&str, String)>) -> Scanner {
        let feed_urls = docs.iter().map(|(u, _)| u.to_string()).collect();
        let docs: HashMap<String, String> = docs.into_iter().map(|(u, d)| (u.to_string(), d)).collect();
        Scanner::new(
            ScannerConfig {
                feed_urls,
                max_entries_per_feed: 10,
                fetch_details: false,
                detail_delay_ms: 0,
            },
            Arc::new(StaticFeeds { docs }),
        )
    }

    fn widget_feed() -> String {
        rss(&[("Widget", "https://deals.example/widget", "Widget, was $100, now $40")])
    }

    /// Ensemble that always lands on 95
    fn pipeline(scanner: Scanner, channels: Vec<Box<dyn crate::services::NotificationChannel>>) -> DealPipeline {
        DealPipeline::new(
            scanner,
            Arc::new(TitleExtractor {
                calls: AtomicUsize::new(0),
            }),
            ensemble_of([Some(dec!(95)), Some(dec!(95)), Some(dec!(95))], EnsemblePolicy::Strict),
            Notifier::new(channels),
            dec!(50),
        )
    }

    #[tokio::test]
    async fn test_widget_example_notifies_each_channel_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = MemoryStore::new(dir.path().join("memory.json"));

        let (sms, sms_sent) = CountingChannel::boxed("sms", false);
        let (push, push_sent) = CountingChannel::boxed("push", false);
        let pipeline = pipeline(feeds(vec![("https://feed/a", widget_feed())]), vec![sms, push]);

        let found = pipeline.run_cycle(&mut memory).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].deal.extracted_description, "Widget");
        assert_eq!(found[0].deal.price, dec!(40));
        assert_eq!(found[0].estimated_value, dec!(95));
        assert_eq!(found[0].discount(), dec!(55));
        assert_eq!(sms_sent.load(Ordering::SeqCst), 1);
        assert_eq!(push_sent.load(Ordering::SeqCst), 1);
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_second_run_appends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let pipeline = pipeline(feeds(vec![("https://feed/a", widget_feed())]), vec![]);

        let mut memory = MemoryStore::load(&path).await.unwrap();
        assert_eq!(pipeline.run_cycle(&mut memory).await.unwrap().len(), 1);

        // Fresh process: reload from disk
        let mut memory = MemoryStore::load(&path).await.unwrap();
        assert!(pipeline.run_cycle(&mut memory).await.unwrap().is_empty());
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_runs_after_clear_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        let doc = rss(&[
            ("Widget", "https://deals.example/widget", "was $100, now $40"),
            ("Gadget", "https://deals.example/gadget", "now $80"),
            ("Lamp", "https://deals.example/lamp", "now $10"),
        ]);
        let pipeline = pipeline(feeds(vec![("https://feed/a", doc)]), vec![]);
        let mut memory = MemoryStore::new(dir.path().join("memory.json"));

        let first = pipeline.run_cycle(&mut memory).await.unwrap();
        memory.clear();
        let second = pipeline.run_cycle(&mut memory).await.unwrap();

        let urls = |opps: &[Opportunity]| -> Vec<(String, Decimal)> {
            opps.iter().map(|o| (o.url().to_string(), o.discount())).collect()
        };
        assert_eq!(urls(&first), urls(&second));
        // Gadget: 95 - 80 = 15 stays below the threshold
        assert_eq!(
            urls(&first),
            vec![
                ("https://deals.example/widget".to_string(), dec!(55)),
                ("https://deals.example/lamp".to_string(), dec!(85)),
            ]
        );
    }

    #[tokio::test]
    async fn test_broken_feed_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = MemoryStore::new(dir.path().join("memory.json"));
        let scanner = feeds(vec![
            ("https://feed/a", rss(&[("Widget", "https://deals.example/widget", "now $40")])),
            ("https://feed/b", "<html><body>503 Service Unavailable</body></html>".to_string()),
            ("https://feed/c", rss(&[("Lamp", "https://deals.example/lamp", "now $10")])),
        ]);

        let found = pipeline(scanner, vec![]).run_cycle(&mut memory).await.unwrap();
        let urls: Vec<&str> = found.iter().map(|o| o.url()).collect();
        assert_eq!(urls, vec!["https://deals.example/widget", "https://deals.example/lamp"]);
    }

    #[tokio::test]
    async fn test_truncated_feed_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = MemoryStore::new(dir.path().join("memory.json"));
        let lamp_feed = rss(&[("Lamp", "https://deals.example/lamp", "now $10")]);
        let truncated = lamp_feed[..lamp_feed.len() / 2].to_string();
        let scanner = feeds(vec![
            ("https://feed/a", rss(&[("Widget", "https://deals.example/widget", "now $40")])),
            ("https://feed/b", truncated),
            ("https://feed/c", rss(&[("Chair", "https://deals.example/chair", "now $20")])),
        ]);

        let found = pipeline(scanner, vec![]).run_cycle(&mut memory).await.unwrap();
        let urls: Vec<&str> = found.iter().map(|o| o.url()).collect();
        assert_eq!(urls, vec!["https://deals.example/widget", "https://deals.example/chair"]);
    }

    #[test]
    fn test_from_config_requires_key_for_hosted_extractor() {
        assert!(DealPipeline::from_config(&Config::default()).is_err());
    }

    #[test]
    fn test_from_config_allows_keyless_self_hosted_extractor() {
        let mut config = Config::default();
        config.extractor.api_url = "http://localhost:11434/v1".to_string();
        let pipeline = DealPipeline::from_config(&config).unwrap();
        assert_eq!(pipeline.threshold(), dec!(50));
    }

    #[tokio::test]
    async fn test_item_failures_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = MemoryStore::new(dir.path().join("memory.json"));
        let doc = rss(&[
            ("Broken thing", "https://deals.example/broken", "now $5"),
            ("Widget", "https://deals.example/widget", "now $40"),
        ]);

        let found = pipeline(feeds(vec![("https://feed/a", doc)]), vec![])
            .run_cycle(&mut memory)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url(), "https://deals.example/widget");
    }

    #[tokio::test]
    async fn test_estimation_failure_drops_only_that_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = MemoryStore::new(dir.path().join("memory.json"));
        let pipeline = DealPipeline::new(
            feeds(vec![("https://feed/a", widget_feed())]),
            Arc::new(TitleExtractor {
                calls: AtomicUsize::new(0),
            }),
            ensemble_of([Some(dec!(95)), None, Some(dec!(95))], EnsemblePolicy::Strict),
            Notifier::new(vec![]),
            dec!(50),
        );

        assert!(pipeline.run_cycle(&mut memory).await.unwrap().is_empty());
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_max_opportunities_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = MemoryStore::new(dir.path().join("memory.json"));
        let doc = rss(&[
            ("Widget", "https://deals.example/widget", "now $40"),
            ("Lamp", "https://deals.example/lamp", "now $10"),
        ]);
        let pipeline = pipeline(feeds(vec![("https://feed/a", doc)]), vec![])
            .with_max_opportunities(Some(1));

        assert_eq!(pipeline.run_cycle(&mut memory).await.unwrap().len(), 1);
        // The rest is picked up next cycle
        assert_eq!(pipeline.run_cycle(&mut memory).await.unwrap().len(), 1);
        assert_eq!(memory.len(), 2);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the memory file should be makes the rename fail
        let path = dir.path().join("memory.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();
        let mut memory = MemoryStore::new(&path);

        let result = pipeline(feeds(vec![("https://feed/a", widget_feed())]), vec![])
            .run_cycle(&mut memory)
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::Persistence(PersistenceError::Io { .. }))
        ));
    }
}
