//! Current-holdings snapshot, a manually curated JSON file.
//!
//! The snapshot is an injected input record set: it is read fresh on
//! every command that needs it and never cached across calls.
//!
//! Layout: ticker → { fund_name, holdings: [ { platform, tax_wrapper,
//! units } ] }. Platform and wrapper are free-form strings in the file;
//! accessors parse them leniently into the domain enums.

use super::error::FolioError;
use super::transaction::{Platform, TaxWrapper};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPosition {
    pub platform: String,
    pub tax_wrapper: String,
    pub units: f64,
}

impl SnapshotPosition {
    pub fn platform_enum(&self) -> Option<Platform> {
        Platform::parse(&self.platform)
    }

    pub fn tax_wrapper_enum(&self) -> Option<TaxWrapper> {
        TaxWrapper::parse(&self.tax_wrapper)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub fund_name: String,
    #[serde(default)]
    pub holdings: Vec<SnapshotPosition>,
}

impl SnapshotEntry {
    pub fn total_units(&self) -> f64 {
        self.holdings.iter().map(|h| h.units).sum()
    }
}

/// The full snapshot, keyed by ticker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoldingsSnapshot(pub BTreeMap<String, SnapshotEntry>);

impl HoldingsSnapshot {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FolioError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| FolioError::Snapshot {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|e| FolioError::Snapshot {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}
