//! Feed scanner: pulls RSS/Atom feeds and yields unseen deal candidates

use crate::config::ScannerConfig;
use crate::error::ScanError;
use crate::html;
use crate::types::DealCandidate;
use async_trait::async_trait;
use feed_rs::model::Entry;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use regex::Regex;
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where feed documents and deal pages come from
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the raw document at `url`
    async fn fetch(&self, url: &str) -> Result<String, ScanError>;
}

/// Fetches documents over HTTP GET
pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<String, ScanError> {
        debug!("Fetching {}", url);

        let response = self.client.get(url).send().await.map_err(|source| ScanError::Request {
            url: url.to_string(),
            source,
        })?;

        if !response.status().is_success() {
            return Err(ScanError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(|source| ScanError::Request {
            url: url.to_string(),
            source,
        })
    }
}

/// Scanner for turning configured feeds into deal candidates
pub struct Scanner {
    source: Arc<dyn FeedSource>,
    config: ScannerConfig,
}

impl Scanner {
    pub fn new(config: ScannerConfig, source: Arc<dyn FeedSource>) -> Self {
        Self { source, config }
    }

    pub fn feed_urls(&self) -> &[String] {
        &self.config.feed_urls
    }

    /// Lazily yield candidates whose URL is not in `seen`.
    ///
    /// Feeds are fetched one at a time in configured order and entries keep
    /// the order the feed returned them. A URL that shows up twice in one
    /// scan is yielded once, for its first occurrence. Feeds that fail to
    /// fetch or parse are logged and skipped. With `fetch_details` on, each
    /// yielded candidate's landing page is fetched just before it is handed
    /// out, so nothing is fetched for deals already in memory.
    pub fn scan<'a>(&'a self, seen: &'a HashSet<String>) -> BoxStream<'a, DealCandidate> {
        let mut yielded: HashSet<String> = HashSet::new();

        stream::iter(self.config.feed_urls.iter())
            .then(move |url| self.candidates_from(url))
            .flat_map(stream::iter)
            .filter(move |candidate| {
                let fresh = !seen.contains(&candidate.source_url)
                    && yielded.insert(candidate.source_url.clone());
                if !fresh {
                    debug!("Skipping already seen deal: {}", candidate.source_url);
                }
                future::ready(fresh)
            })
            .then(move |candidate| self.with_details(candidate))
            .boxed()
    }

    /// Swap the feed summary for the deal page's details, keeping the
    /// summary when the page can't be fetched or has no content section
    async fn with_details(&self, candidate: DealCandidate) -> DealCandidate {
        if !self.config.fetch_details {
            return candidate;
        }

        let page = self.source.fetch(&candidate.source_url).await;

        let delay = Duration::from_millis(self.config.detail_delay_ms);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match page {
            Ok(body) => match parse_detail_page(&body) {
                Some((details, features)) => candidate.with_details(&details, &features),
                None => {
                    debug!("No content section on {}, keeping feed summary", candidate.source_url);
                    candidate
                }
            },
            Err(e) => {
                warn!("Keeping feed summary: {}", e);
                candidate
            }
        }
    }

    /// Fetch and parse one feed; failures become an empty batch
    async fn candidates_from(&self, url: &str) -> Vec<DealCandidate> {
        let result = match self.source.fetch(url).await {
            Ok(body) => parse_feed(url, &body, self.config.max_entries_per_feed),
            Err(e) => Err(e),
        };

        match result {
            Ok(candidates) => {
                info!("Feed {} yielded {} candidates", url, candidates.len());
                candidates
            }
            Err(e) => {
                warn!("Skipping feed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Parse a feed document, keeping at most `limit` entries from the top
pub fn parse_feed(url: &str, body: &str, limit: usize) -> Result<Vec<DealCandidate>, ScanError> {
    let feed = feed_rs::parser::parse(body.as_bytes()).map_err(|e| ScanError::Parse {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    Ok(feed
        .entries
        .into_iter()
        .take(limit)
        .filter_map(candidate_from_entry)
        .collect())
}

fn candidate_from_entry(entry: Entry) -> Option<DealCandidate> {
    let link = entry
        .links
        .first()
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())?;

    let title = entry
        .title
        .map(|t| clean_html(&t.content))
        .unwrap_or_default();

    let summary = entry
        .summary
        .map(|t| t.content)
        .or_else(|| entry.content.and_then(|c| c.body))
        .map(|s| clean_html(&s))
        .unwrap_or_default();

    if title.is_empty() && summary.is_empty() {
        debug!("Dropping entry without text: {}", link);
        return None;
    }

    if price_tokens(&title).is_empty() && price_tokens(&summary).is_empty() {
        debug!("Dropping entry without a price: {}", link);
        return None;
    }

    Some(DealCandidate::new(link, title, &summary))
}

fn price_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\s?(\d[\d,]*(?:\.\d{1,2})?)").expect("valid regex"))
}

/// Reduce an HTML snippet to plain single-line text.
///
/// Feeds that wrap the useful text in a `snippet summary` div only keep
/// that div's contents, nested markup included.
pub fn clean_html(snippet: &str) -> String {
    let inner = html::element_by_class(snippet, "div", "snippet summary").unwrap_or(snippet);
    html::text(inner)
}

/// Details and features from a deal page's `content-section` div, split at
/// the first "Features" heading. `None` when the section is missing or empty.
pub fn parse_detail_page(page: &str) -> Option<(String, String)> {
    let section = html::element_by_class(page, "div", "content-section")?;
    let text = html::decode_entities(&html::strip_tags(section));

    // "more" links sit on a line of their own
    let content = text
        .lines()
        .filter(|line| line.trim() != "more")
        .collect::<Vec<_>>()
        .join(" ");

    let (details, features) = content.split_once("Features").unwrap_or((content.as_str(), ""));
    let details = html::normalize_ws(details);
    if details.is_empty() {
        return None;
    }
    Some((details, html::normalize_ws(features)))
}

/// Every dollar amount mentioned in `text`, in order
pub fn price_tokens(text: &str) -> Vec<Decimal> {
    price_regex()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .filter_map(|m| Decimal::from_str(&m.as_str().replace(',', "")).ok())
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    /// Serves canned documents; unknown URLs fail like a dead host
    pub(crate) struct StaticFeeds {
        pub docs: HashMap<String, String>,
    }

    #[async_trait]
    impl FeedSource for StaticFeeds {
        async fn fetch(&self, url: &str) -> Result<String, ScanError> {
            self.docs.get(url).cloned().ok_or(ScanError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    pub(crate) fn rss(items: &[(&str, &str, &str)]) -> String {
        let body: String = items
            .iter()
            .map(|(title, link, description)| {
                format!(
                    "<item><title>{}</title><link>{}</link><description><![CDATA[{}]]></description></item>",
                    title, link, description
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Deals</title><link>https://deals.example</link><description>Deals</description>{}</channel></rss>"#,
            body
        )
    }

    /// Scanner over the first `feeds` documents; the rest are served as pages only
    fn scanner_with_pages(docs: Vec<(&str, String)>, feeds: usize, fetch_details: bool) -> Scanner {
        let feed_urls = docs.iter().take(feeds).map(|(u, _)| u.to_string()).collect();
        let docs = docs.into_iter().map(|(u, d)| (u.to_string(), d)).collect();
        Scanner::new(
            ScannerConfig {
                feed_urls,
                max_entries_per_feed: 10,
                fetch_details,
                detail_delay_ms: 0,
            },
            Arc::new(StaticFeeds { docs }),
        )
    }

    fn scanner(docs: Vec<(&str, String)>) -> Scanner {
        let feeds = docs.len();
        scanner_with_pages(docs, feeds, false)
    }

    #[test]
    fn test_clean_html_prefers_snippet_div() {
        let html = r#"<p>ignored</p><div class="snippet summary" title="x">Widget <b>now</b> &#36;40 &amp; free shipping</div>"#;
        assert_eq!(clean_html(html), "Widget now $40 & free shipping");
    }

    #[test]
    fn test_clean_html_keeps_text_after_nested_div() {
        let html = r#"<div class="snippet summary"><div class="hdr">Acme Widget</div> now $40, was $100</div>"#;
        let text = clean_html(html);
        assert_eq!(text, "Acme Widget now $40, was $100");
        assert_eq!(price_tokens(&text), vec![dec!(40), dec!(100)]);
    }

    #[test]
    fn test_clean_html_decodes_character_references() {
        assert_eq!(price_tokens(&clean_html("Widget now &#x24;40")), vec![dec!(40)]);
        assert_eq!(price_tokens(&clean_html("Widget now &#036;40")), vec![dec!(40)]);
        assert_eq!(
            clean_html("Widget &rsquo;s now $40 &mdash; cheap"),
            "Widget \u{2019}s now $40 \u{2014} cheap"
        );
    }

    #[test]
    fn test_parse_feed_keeps_entity_encoded_price() {
        let doc = rss(&[("Widget", "https://deals.example/widget", "Widget now &#x24;40")]);
        assert_eq!(parse_feed("https://feed/a", &doc, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_detail_page_splits_features() {
        let page = "<html><body><div class=\"content-section\">\n<p>Acme Widget in blue, $40 at Example.</p>\n<a href=\"#\">more</a>\n<h3>Features</h3>\n<ul><li>USB-C</li><li>2-year warranty</li></ul></div><div>footer</div></body></html>";
        let (details, features) = parse_detail_page(page).unwrap();
        assert_eq!(details, "Acme Widget in blue, $40 at Example.");
        assert_eq!(features, "USB-C 2-year warranty");
    }

    #[test]
    fn test_parse_detail_page_without_section() {
        assert!(parse_detail_page("<html><div class=\"other\">x</div></html>").is_none());
        assert!(parse_detail_page("<div class=\"content-section\"> </div>").is_none());
    }

    #[tokio::test]
    async fn test_scan_uses_deal_page_details() {
        let feed = rss(&[
            ("Widget", "https://deals.example/widget", "now $40"),
            ("Lamp", "https://deals.example/lamp", "now $12"),
        ]);
        let page = r#"<div class="content-section">Widget in blue, $40. Features Two speeds</div>"#.to_string();
        let scanner = scanner_with_pages(
            vec![("https://feed/a", feed), ("https://deals.example/widget", page)],
            1,
            true,
        );

        let seen = HashSet::new();
        let candidates: Vec<DealCandidate> = scanner.scan(&seen).collect().await;
        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates[0].raw_text,
            "Title: Widget\nDetails: Widget in blue, $40.\nFeatures: Two speeds\nURL: https://deals.example/widget"
        );
        // The lamp page 404s, so the feed summary stands in
        assert_eq!(
            candidates[1].raw_text,
            "Title: Lamp\nDetails: now $12\nFeatures: \nURL: https://deals.example/lamp"
        );
    }

    /// Remembers every URL it was asked for
    struct RecordingFeeds {
        inner: StaticFeeds,
        fetched: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FeedSource for RecordingFeeds {
        async fn fetch(&self, url: &str) -> Result<String, ScanError> {
            self.fetched.lock().unwrap().push(url.to_string());
            self.inner.fetch(url).await
        }
    }

    #[tokio::test]
    async fn test_scan_skips_pages_for_seen_deals() {
        let feed = rss(&[
            ("Widget", "https://deals.example/widget", "now $40"),
            ("Lamp", "https://deals.example/lamp", "now $12"),
        ]);
        let source = Arc::new(RecordingFeeds {
            inner: StaticFeeds {
                docs: [("https://feed/a".to_string(), feed)].into(),
            },
            fetched: std::sync::Mutex::new(Vec::new()),
        });
        let scanner = Scanner::new(
            ScannerConfig {
                feed_urls: vec!["https://feed/a".to_string()],
                max_entries_per_feed: 10,
                fetch_details: true,
                detail_delay_ms: 0,
            },
            source.clone(),
        );

        let seen: HashSet<String> = ["https://deals.example/widget".to_string()].into();
        let candidates: Vec<DealCandidate> = scanner.scan(&seen).collect().await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(
            *source.fetched.lock().unwrap(),
            vec!["https://feed/a".to_string(), "https://deals.example/lamp".to_string()]
        );
    }

    #[test]
    fn test_clean_html_strips_tags_and_newlines() {
        assert_eq!(clean_html("<p>Line one\n<br/>line two</p>"), "Line one line two");
    }

    #[test]
    fn test_price_tokens() {
        assert_eq!(
            price_tokens("Widget, was $100, now $40"),
            vec![dec!(100), dec!(40)]
        );
        assert_eq!(price_tokens("Laptop for $1,299.99"), vec![dec!(1299.99)]);
        assert!(price_tokens("Free after rebate").is_empty());
    }

    #[test]
    fn test_parse_feed_filters_entries() {
        let doc = rss(&[
            ("Widget", "https://deals.example/widget", "Widget, was $100, now $40"),
            ("Mystery box", "https://deals.example/box", "Price drops soon"),
        ]);
        let candidates = parse_feed("https://feed/a", &doc, 10).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source_url, "https://deals.example/widget");
        assert!(candidates[0].raw_text.contains("Widget, was $100, now $40"));
    }

    #[test]
    fn test_parse_feed_applies_limit_before_filtering() {
        let doc = rss(&[
            ("No price", "https://deals.example/1", "nothing here"),
            ("Lamp $12", "https://deals.example/2", "Lamp"),
        ]);
        assert!(parse_feed("https://feed/a", &doc, 1).unwrap().is_empty());
        assert_eq!(parse_feed("https://feed/a", &doc, 2).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_feed_rejects_non_feed() {
        let result = parse_feed("https://feed/a", "<html><body>oops</body></html>", 10);
        assert!(matches!(result, Err(ScanError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_scan_skips_seen_and_duplicate_urls() {
        let a = rss(&[
            ("Widget", "https://deals.example/widget", "now $40"),
            ("Lamp", "https://deals.example/lamp", "now $12"),
        ]);
        let b = rss(&[
            ("Widget again", "https://deals.example/widget", "now $39"),
            ("Chair", "https://deals.example/chair", "now $80"),
        ]);
        let scanner = scanner(vec![("https://feed/a", a), ("https://feed/b", b)]);

        let seen: HashSet<String> = ["https://deals.example/lamp".to_string()].into();
        let urls: Vec<String> = scanner
            .scan(&seen)
            .map(|c| c.source_url)
            .collect()
            .await;

        assert_eq!(
            urls,
            vec![
                "https://deals.example/widget".to_string(),
                "https://deals.example/chair".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_scan_survives_broken_feeds() {
        let good = rss(&[("Widget", "https://deals.example/widget", "now $40")]);
        let scanner = scanner(vec![
            ("https://feed/broken", "<html>not a feed</html>".to_string()),
            ("https://feed/good", good),
        ]);

        let seen = HashSet::new();
        let candidates: Vec<DealCandidate> = scanner.scan(&seen).collect().await;
        assert_eq!(candidates.len(), 1);
    }
}
