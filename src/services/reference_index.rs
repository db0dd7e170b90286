//! Reference index: tracking code -> destination CEP
//!
//! Loaded in bulk from imports and the durable store. Later loads overwrite
//! earlier ones for the same code.

use crate::domain::route_match::route_matches;
use crate::domain::types::PackageEntry;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct ReferenceIndex {
    entries: FxHashMap<String, String>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a batch; returns how many codes were not present before
    pub fn bulk_load(&mut self, batch: &[PackageEntry]) -> usize {
        let before = self.entries.len();
        self.entries.reserve(batch.len());
        for entry in batch {
            self.entries.insert(entry.tracking_code.clone(), entry.postal_code.clone());
        }
        let added = self.entries.len() - before;
        debug!(batch = %batch.len(), added = %added, total = %self.entries.len(), "reference_index_loaded");
        added
    }

    /// Postal code for a tracking code
    #[inline]
    pub fn lookup(&self, tracking_code: &str) -> Option<&str> {
        self.entries.get(tracking_code).map(|s| s.as_str())
    }

    pub fn reset(&mut self) {
        info!(cleared = %self.entries.len(), "reference_index_reset");
        self.entries.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of packages a route with these prefixes is expected to receive
    ///
    /// A wildcard route expects every package in the index.
    pub fn count_matching(&self, prefixes: &[String]) -> usize {
        if prefixes.is_empty() {
            return self.entries.len();
        }
        self.entries.values().filter(|cep| route_matches(cep, prefixes)).count()
    }
}
