//! Core types for the deal hunter

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// A feed item that passed the scanner's filters but has not been priced yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealCandidate {
    pub source_url: String,
    pub title_text: String,
    /// Cleaned feed summary, the fallback when the deal page is unavailable
    pub summary: String,
    /// Text handed to the extractor
    pub raw_text: String,
}

impl DealCandidate {
    pub fn new(source_url: String, title_text: String, summary: &str) -> Self {
        let raw_text = describe(&title_text, summary, "", &source_url);
        Self {
            source_url,
            title_text,
            summary: summary.trim().to_string(),
            raw_text,
        }
    }

    /// Replace the feed summary with details and features from the deal page
    pub fn with_details(mut self, details: &str, features: &str) -> Self {
        self.raw_text = describe(&self.title_text, details, features, &self.source_url);
        self
    }

    /// Attach the extractor's output, producing an immutable deal
    pub fn into_deal(self, extraction: Extraction) -> Deal {
        Deal {
            source_url: self.source_url,
            title_text: self.title_text,
            raw_text: self.raw_text,
            extracted_description: extraction.description,
            price: extraction.price,
        }
    }
}

fn describe(title: &str, details: &str, features: &str, url: &str) -> String {
    format!(
        "Title: {}\nDetails: {}\nFeatures: {}\nURL: {}",
        title.trim(),
        details.trim(),
        features.trim(),
        url
    )
}

/// Normalized description and confirmed price returned by the extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub description: String,
    pub price: Decimal,
}

/// A listing with its model-extracted description and price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub source_url: String,
    pub title_text: String,
    pub raw_text: String,
    pub extracted_description: String,
    pub price: Decimal,
}

impl Deal {
    /// Truncated description for console and alert output
    pub fn short_description(&self, max_len: usize) -> String {
        let text = self.extracted_description.trim();
        if text.chars().count() <= max_len {
            return text.to_string();
        }
        let cut: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut.trim_end())
    }
}

/// A deal whose estimated value beats its listed price by at least the threshold
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Opportunity {
    pub deal: Deal,
    pub estimated_value: Decimal,
    pub discovered_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn new(deal: Deal, estimated_value: Decimal, discovered_at: DateTime<Utc>) -> Self {
        Self {
            deal,
            estimated_value,
            discovered_at,
        }
    }

    /// Estimated value minus listed price. Never stored on its own.
    pub fn discount(&self) -> Decimal {
        self.estimated_value.saturating_sub(self.deal.price)
    }

    pub fn url(&self) -> &str {
        &self.deal.source_url
    }

    /// One-line summary used by the CLI and the run loop
    pub fn headline(&self) -> String {
        format!(
            "{} | ${:.2} vs est. ${:.2} | save ${:.2}",
            self.deal.short_description(50),
            self.deal.price,
            self.estimated_value,
            self.discount()
        )
    }
}

// `discount` is written for readers of the memory file; on load it is
// ignored and recomputed from the other two fields.
impl Serialize for Opportunity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Opportunity", 4)?;
        state.serialize_field("deal", &self.deal)?;
        state.serialize_field("estimated_value", &self.estimated_value)?;
        state.serialize_field("discount", &self.discount())?;
        state.serialize_field("discovered_at", &self.discovered_at)?;
        state.end()
    }
}

/// Aggregate figures over everything in memory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub total: usize,
    pub average_discount: Decimal,
    pub best_discount: Decimal,
    pub total_savings: Decimal,
    pub latest_discount: Option<Decimal>,
    /// Opportunities whose discount still clears the current threshold
    pub above_threshold: usize,
}
