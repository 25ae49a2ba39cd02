//! Memory store: the persisted, deduplicated log of opportunities
//!
//! The whole store is one JSON document. `persist` writes a sibling temp
//! file and renames it over the original, so a crash mid-write leaves the
//! previous document intact.

use crate::error::PersistenceError;
use crate::types::{MemoryStats, Opportunity};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub struct MemoryStore {
    path: PathBuf,
    opportunities: Vec<Opportunity>,
    urls: HashSet<String>,
}

impl MemoryStore {
    /// Empty store that will persist to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            opportunities: Vec::new(),
            urls: HashSet::new(),
        }
    }

    /// Load the store from `path`. A missing file is an empty store.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let mut store = Self::new(path);

        let contents = match fs::read_to_string(&store.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No memory file at {}, starting empty", store.path.display());
                return Ok(store);
            }
            Err(source) => return Err(store.io_error(source)),
        };

        if contents.trim().is_empty() {
            return Ok(store);
        }

        let records: Vec<Opportunity> =
            serde_json::from_str(&contents).map_err(|source| PersistenceError::Format {
                path: store.path.display().to_string(),
                source,
            })?;

        let total = records.len();
        for record in records {
            store.append(record);
        }
        if store.len() < total {
            warn!(
                "Memory file {} had {} duplicate records, kept the first of each",
                store.path.display(),
                total - store.len()
            );
        }

        info!("Loaded {} opportunities from {}", store.len(), store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append unless the deal's URL is already present. Returns whether it was added.
    pub fn append(&mut self, opportunity: Opportunity) -> bool {
        if !self.urls.insert(opportunity.deal.source_url.clone()) {
            debug!("Already in memory: {}", opportunity.deal.source_url);
            return false;
        }
        self.opportunities.push(opportunity);
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    /// Snapshot of every URL in memory
    pub fn seen_urls(&self) -> HashSet<String> {
        self.urls.clone()
    }

    pub fn opportunities(&self) -> &[Opportunity] {
        &self.opportunities
    }

    pub fn len(&self) -> usize {
        self.opportunities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opportunities.is_empty()
    }

    /// Drop everything held in memory. Call `persist` to make it stick.
    pub fn clear(&mut self) {
        self.opportunities.clear();
        self.urls.clear();
    }

    /// Write the whole store to disk atomically
    pub async fn persist(&self) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(&self.opportunities).map_err(|source| {
            PersistenceError::Format {
                path: self.path.display().to_string(),
                source,
            }
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| self.io_error(source))?;
        }

        let tmp = self.temp_path();
        let result = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(source) = result {
            let _ = fs::remove_file(&tmp).await;
            return Err(self.io_error(source));
        }

        debug!("Persisted {} opportunities to {}", self.len(), self.path.display());
        Ok(())
    }

    /// Dashboard figures; `threshold` decides `above_threshold`
    pub fn stats(&self, threshold: Decimal) -> MemoryStats {
        summarize(&self.opportunities, threshold)
    }

    /// Write every opportunity as CSV
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<(), PersistenceError> {
        write_csv(&self.opportunities, writer)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "memory.json".into());
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// Aggregate figures over `opportunities`
pub fn summarize(opportunities: &[Opportunity], threshold: Decimal) -> MemoryStats {
    if opportunities.is_empty() {
        return MemoryStats::default();
    }

    let discounts: Vec<Decimal> = opportunities.iter().map(|o| o.discount()).collect();
    // Saturates rather than overflowing on hand-edited or extreme records
    let total_savings = discounts
        .iter()
        .fold(Decimal::ZERO, |total, d| total.saturating_add(*d));
    let best_discount = discounts.iter().copied().max().unwrap_or_default();

    MemoryStats {
        total: discounts.len(),
        average_discount: (total_savings / Decimal::from(discounts.len())).round_dp(2),
        best_discount,
        total_savings,
        latest_discount: discounts.last().copied(),
        above_threshold: discounts.iter().filter(|d| **d >= threshold).count(),
    }
}

/// Write `opportunities` as CSV with a header row
pub fn write_csv<W: Write>(opportunities: &[Opportunity], writer: W) -> Result<(), PersistenceError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([
        "Product Description",
        "Deal Price",
        "Estimated Value",
        "Discount",
        "URL",
        "Discovered At",
    ])?;

    for opp in opportunities {
        csv.write_record([
            opp.deal.extracted_description.clone(),
            opp.deal.price.to_string(),
            opp.estimated_value.to_string(),
            opp.discount().to_string(),
            opp.deal.source_url.clone(),
            opp.discovered_at.to_rfc3339(),
        ])?;
    }

    csv.flush().map_err(csv::Error::from)?;
    Ok(())
}
