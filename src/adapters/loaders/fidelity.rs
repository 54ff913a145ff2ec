//! Fidelity transaction-history loader.
//!
//! Exports carry six preamble rows before the header, a `Status` column
//! filtered to completed orders, and the tax wrapper in `Product
//! Wrapper`.

use super::{find_csv_files, parse_date, parse_money, parse_price, parse_quantity};
use super::{CsvTable, Loader, LoaderConfig};
use crate::domain::error::FolioError;
use crate::domain::transaction::{Platform, TaxWrapper, Transaction, TransactionType};

const BUY_TYPES: &[&str] = &["Buy", "Buy For Switch", "Transfer In"];
const SELL_TYPES: &[&str] = &["Sell", "Sell For Switch"];

pub struct FidelityLoader {
    config: LoaderConfig,
}

impl FidelityLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    fn parse_row(&self, table: &CsvTable, record: &csv::StringRecord) -> Option<Transaction> {
        let tx_type = transaction_type(table.get(record, "Transaction type"));
        if !matches!(tx_type, TransactionType::Buy | TransactionType::Sell) {
            return None;
        }

        let date = parse_date(table.get(record, "Order date"))?;
        let units = parse_quantity(table.get(record, "Quantity"));
        let price = parse_price(table.get(record, "Price per unit"));
        let value = parse_money(table.get(record, "Amount")).abs();
        if units == 0.0 || value == 0.0 {
            return None;
        }

        let sedol = table.get(record, "Sedol");
        let reference = table.get(record, "Reference number");
        let raw_type = table.get(record, "Transaction type");

        Some(Transaction {
            platform: Platform::Fidelity,
            tax_wrapper: tax_wrapper(table.get(record, "Product Wrapper")),
            date,
            fund_name: table.get(record, "Investments").to_string(),
            mapped_fund_name: None,
            transaction_type: tx_type,
            units,
            price_per_unit: price,
            value,
            currency: "GBP".into(),
            sedol: (!sedol.is_empty()).then(|| sedol.to_string()),
            isin: None,
            reference: (!reference.is_empty()).then(|| reference.to_string()),
            raw_description: (!raw_type.is_empty()).then(|| raw_type.to_string()),
            excluded: false,
        })
    }
}

fn transaction_type(raw: &str) -> TransactionType {
    if BUY_TYPES.contains(&raw) {
        TransactionType::Buy
    } else if SELL_TYPES.contains(&raw) {
        TransactionType::Sell
    } else {
        TransactionType::Other
    }
}

fn tax_wrapper(raw: &str) -> TaxWrapper {
    let wrapper = raw.to_uppercase();
    if wrapper.contains("SIPP") {
        TaxWrapper::Sipp
    } else if wrapper.contains("ISA") {
        TaxWrapper::Isa
    } else {
        TaxWrapper::Other
    }
}

impl Loader for FidelityLoader {
    fn platform(&self) -> Platform {
        Platform::Fidelity
    }

    fn load(&self) -> Result<Vec<Transaction>, FolioError> {
        let files = find_csv_files(&self.config.directory, &self.config.file_pattern)?;
        if files.is_empty() {
            log::warn!(
                "no Fidelity CSV files found in {}",
                self.config.directory.display()
            );
            return Ok(Vec::new());
        }

        let mut transactions = Vec::new();

        for path in files {
            log::info!("loading Fidelity file: {}", path.display());
            let table = match CsvTable::load(&path, self.config.skip_rows) {
                Ok(table) => table,
                Err(e) => {
                    log::error!("error loading {}: {e}", path.display());
                    continue;
                }
            };

            let has_status = table.has_column("Status");
            for record in table.records() {
                if has_status && table.get(record, "Status") != "Completed" {
                    continue;
                }
                if let Some(tx) = self.parse_row(&table, record) {
                    transactions.push(tx);
                }
            }
        }

        transactions.sort_by_key(|tx| tx.date);
        log::info!("loaded {} Fidelity transactions", transactions.len());
        Ok(transactions)
    }
}
