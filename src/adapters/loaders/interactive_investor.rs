//! Interactive Investor transaction-history loader.
//!
//! II exports have no preamble, carry the trade direction in paired
//! Debit/Credit columns, and abbreviate fund names inside the free-text
//! description. Rows without a SEDOL and quantity are cash movements,
//! not trades, and are skipped.

use super::{find_csv_files, normalise_fund_name, parse_date, parse_money, parse_price,
    parse_quantity};
use super::{CsvTable, Loader, LoaderConfig};
use crate::domain::error::FolioError;
use crate::domain::transaction::{Platform, TaxWrapper, Transaction, TransactionType};

pub struct InteractiveInvestorLoader {
    config: LoaderConfig,
    /// II exports are per-account files; the wrapper comes from config.
    tax_wrapper: TaxWrapper,
}

impl InteractiveInvestorLoader {
    pub fn new(config: LoaderConfig, tax_wrapper: TaxWrapper) -> Self {
        Self {
            config,
            tax_wrapper,
        }
    }

    fn parse_row(&self, table: &CsvTable, record: &csv::StringRecord) -> Option<Transaction> {
        let units = parse_quantity(table.get(record, "Quantity"));
        if units == 0.0 {
            return None;
        }

        let sedol = table.get(record, "Sedol");
        if sedol.is_empty() || sedol.eq_ignore_ascii_case("n/a") {
            return None;
        }

        let date = parse_date(table.get(record, "Date"))?;

        let debit = parse_money(table.get(record, "Debit"));
        let credit = parse_money(table.get(record, "Credit"));
        let description = table.get(record, "Description");

        let (tx_type, value) = if debit > 0.0 {
            (TransactionType::Buy, debit)
        } else if credit > 0.0 {
            let tx_type = if description.to_uppercase().contains("DIV") {
                TransactionType::Dividend
            } else {
                TransactionType::Sell
            };
            (tx_type, credit)
        } else {
            return None;
        };

        Some(Transaction {
            platform: Platform::InteractiveInvestor,
            tax_wrapper: self.tax_wrapper,
            date,
            fund_name: normalise_fund_name(description),
            mapped_fund_name: None,
            transaction_type: tx_type,
            units,
            price_per_unit: parse_price(table.get(record, "Price")),
            value,
            currency: "GBP".into(),
            sedol: Some(sedol.to_string()),
            isin: None,
            reference: None,
            raw_description: (!description.is_empty()).then(|| description.to_string()),
            excluded: false,
        })
    }
}

impl Loader for InteractiveInvestorLoader {
    fn platform(&self) -> Platform {
        Platform::InteractiveInvestor
    }

    fn load(&self) -> Result<Vec<Transaction>, FolioError> {
        let files = find_csv_files(&self.config.directory, &self.config.file_pattern)?;
        if files.is_empty() {
            log::warn!(
                "no Interactive Investor CSV files found in {}",
                self.config.directory.display()
            );
            return Ok(Vec::new());
        }

        let mut transactions = Vec::new();

        for path in files {
            log::info!("loading Interactive Investor file: {}", path.display());
            let table = match CsvTable::load(&path, self.config.skip_rows) {
                Ok(table) => table,
                Err(e) => {
                    log::error!("error loading {}: {e}", path.display());
                    continue;
                }
            };

            for record in table.records() {
                if let Some(tx) = self.parse_row(&table, record) {
                    transactions.push(tx);
                }
            }
        }

        transactions.sort_by_key(|tx| tx.date);
        log::info!(
            "loaded {} Interactive Investor transactions",
            transactions.len()
        );
        Ok(transactions)
    }
}
