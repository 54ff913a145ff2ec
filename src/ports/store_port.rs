//! Persistence port trait.

use crate::domain::error::FolioError;
use crate::domain::mapping::{MappingStatus, TickerMapping};
use crate::domain::price::PricePoint;
use crate::domain::transaction::{Platform, TaxWrapper, Transaction};
use chrono::NaiveDate;

/// Optional scoping for transaction fetches. `fund` matches either the
/// raw or the mapped fund name.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub fund: Option<String>,
    pub platform: Option<Platform>,
    pub tax_wrapper: Option<TaxWrapper>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub include_excluded: bool,
}

impl TransactionFilter {
    pub fn for_fund(fund: impl Into<String>) -> Self {
        Self {
            fund: Some(fund.into()),
            ..Default::default()
        }
    }
}

pub trait StorePort {
    /// Transactions matching the filter, ordered by date then insertion.
    fn fetch_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, FolioError>;

    /// Insert transactions, skipping rows that collide with the
    /// duplicate-import uniqueness key. Returns (inserted, duplicates).
    fn insert_transactions(&self, transactions: &[Transaction])
        -> Result<(usize, usize), FolioError>;

    fn fetch_mappings(&self) -> Result<Vec<TickerMapping>, FolioError>;

    /// Insert a mapping; false when (fund_name, ticker) already exists.
    fn insert_mapping(&self, mapping: &TickerMapping) -> Result<bool, FolioError>;

    /// All price points, or one ticker's when given.
    fn fetch_prices(&self, ticker: Option<&str>) -> Result<Vec<PricePoint>, FolioError>;

    /// Insert price points, skipping (date, ticker) duplicates.
    /// Returns (inserted, duplicates).
    fn insert_prices(&self, prices: &[PricePoint]) -> Result<(usize, usize), FolioError>;

    fn latest_price(&self, ticker: &str) -> Result<Option<PricePoint>, FolioError>;

    /// (first date, last date, row count) of a ticker's price history.
    fn price_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FolioError>;

    fn fetch_mapping_statuses(&self) -> Result<Vec<MappingStatus>, FolioError>;

    /// Recompute every ticker's recorded transaction aggregate from the
    /// transactions table. Returns the number of tickers refreshed.
    fn refresh_mapping_status(&self) -> Result<usize, FolioError>;

    /// Apply a standardised fund name to all rows carrying the raw name.
    /// Returns the number of rows updated.
    fn set_mapped_fund_name(&self, fund_name: &str, mapped: &str) -> Result<usize, FolioError>;

    /// Flag or unflag a fund as excluded from portfolio aggregation.
    /// Returns the number of rows updated.
    fn set_excluded(&self, fund_name: &str, excluded: bool) -> Result<usize, FolioError>;
}
