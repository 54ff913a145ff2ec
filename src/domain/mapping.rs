//! Fund-to-ticker reference data.

use chrono::NaiveDate;

/// Links a fund name to the ticker used for price lookups. Manually
/// curated, rarely mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerMapping {
    pub fund_name: String,
    pub ticker: String,
    pub sedol: Option<String>,
    pub isin: Option<String>,
    /// Priority holdings surfaced preferentially in reporting.
    pub vip: bool,
}

/// Recorded per-ticker transaction aggregate, refreshed on demand.
/// The reconciliation drift check compares these against freshly
/// computed values.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingStatus {
    pub ticker: String,
    pub fund_name: Option<String>,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
    pub transaction_count: usize,
}

/// All fund names a ticker is known under.
pub fn fund_names_for_ticker<'a>(mappings: &'a [TickerMapping], ticker: &str) -> Vec<&'a str> {
    mappings
        .iter()
        .filter(|m| m.ticker == ticker)
        .map(|m| m.fund_name.as_str())
        .collect()
}
