//! InvestEngine transaction-history loader.
//!
//! Exports use timestamped trade dates, fold the ISIN into the security
//! column (`Fund Name / ISIN XX0000000000`), and signal the wrapper only
//! through the export's filename.

use super::{find_csv_files, parse_date, parse_money, parse_price, parse_quantity};
use super::{CsvTable, Loader, LoaderConfig};
use crate::domain::error::FolioError;
use crate::domain::transaction::{Platform, TaxWrapper, Transaction, TransactionType};
use std::path::Path;

const ISIN_SEPARATOR: &str = " / ISIN ";

pub struct InvestEngineLoader {
    config: LoaderConfig,
}

impl InvestEngineLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    fn parse_row(
        &self,
        table: &CsvTable,
        record: &csv::StringRecord,
        wrapper: TaxWrapper,
    ) -> Option<Transaction> {
        let units = parse_quantity(table.get(record, "Quantity"));
        if units == 0.0 {
            return None;
        }

        let date = parse_date(table.get(record, "Trade Date/Time"))?;
        let value = parse_money(table.get(record, "Total Trade Value")).abs();
        if value == 0.0 {
            return None;
        }

        let security = table.get(record, "Security / ISIN");
        let (fund_name, isin) = split_security(security);

        Some(Transaction {
            platform: Platform::InvestEngine,
            tax_wrapper: wrapper,
            date,
            fund_name,
            mapped_fund_name: None,
            transaction_type: transaction_type(table.get(record, "Transaction Type")),
            units,
            price_per_unit: parse_price(table.get(record, "Share Price")),
            value,
            currency: "GBP".into(),
            sedol: None,
            isin,
            reference: None,
            raw_description: (!security.is_empty()).then(|| security.to_string()),
            excluded: false,
        })
    }
}

fn split_security(security: &str) -> (String, Option<String>) {
    match security.split_once(ISIN_SEPARATOR) {
        Some((name, isin)) => (name.trim().to_string(), Some(isin.trim().to_string())),
        None => (security.trim().to_string(), None),
    }
}

fn transaction_type(raw: &str) -> TransactionType {
    let raw = raw.to_lowercase();
    if raw.contains("buy") {
        TransactionType::Buy
    } else if raw.contains("sell") {
        TransactionType::Sell
    } else {
        TransactionType::Other
    }
}

/// The wrapper is encoded in the export filename, e.g.
/// `invest_engine_isa_2024.csv`.
fn wrapper_from_filename(path: &Path) -> TaxWrapper {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.contains("isa") {
        TaxWrapper::Isa
    } else if name.contains("gia") {
        TaxWrapper::Gia
    } else if name.contains("sipp") {
        TaxWrapper::Sipp
    } else {
        TaxWrapper::Other
    }
}

impl Loader for InvestEngineLoader {
    fn platform(&self) -> Platform {
        Platform::InvestEngine
    }

    fn load(&self) -> Result<Vec<Transaction>, FolioError> {
        let files = find_csv_files(&self.config.directory, &self.config.file_pattern)?;
        if files.is_empty() {
            log::warn!(
                "no InvestEngine CSV files found in {}",
                self.config.directory.display()
            );
            return Ok(Vec::new());
        }

        let mut transactions = Vec::new();

        for path in files {
            log::info!("loading InvestEngine file: {}", path.display());
            let wrapper = wrapper_from_filename(&path);
            let table = match CsvTable::load(&path, self.config.skip_rows) {
                Ok(table) => table,
                Err(e) => {
                    log::error!("error loading {}: {e}", path.display());
                    continue;
                }
            };

            for record in table.records() {
                if let Some(tx) = self.parse_row(&table, record, wrapper) {
                    transactions.push(tx);
                }
            }
        }

        transactions.sort_by_key(|tx| tx.date);
        log::info!("loaded {} InvestEngine transactions", transactions.len());
        Ok(transactions)
    }
}
