#![allow(dead_code)]

use chrono::NaiveDate;
use folio::adapters::sqlite_store::SqliteStore;
use folio::domain::mapping::TickerMapping;
use folio::domain::price::PricePoint;
use folio::domain::snapshot::HoldingsSnapshot;
use folio::domain::transaction::{Platform, TaxWrapper, Transaction, TransactionType};
use folio::ports::store_port::StorePort;
use std::io::Write;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_tx(
    fund: &str,
    d: NaiveDate,
    tx_type: TransactionType,
    units: f64,
    value: f64,
) -> Transaction {
    Transaction {
        platform: Platform::Fidelity,
        tax_wrapper: TaxWrapper::Isa,
        date: d,
        fund_name: fund.into(),
        mapped_fund_name: None,
        transaction_type: tx_type,
        units,
        price_per_unit: if units > 0.0 { value / units } else { 0.0 },
        value,
        currency: "GBP".into(),
        sedol: None,
        isin: None,
        reference: None,
        raw_description: None,
        excluded: false,
    }
}

pub fn make_mapping(fund: &str, ticker: &str) -> TickerMapping {
    TickerMapping {
        fund_name: fund.into(),
        ticker: ticker.into(),
        sedol: None,
        isin: None,
        vip: false,
    }
}

pub fn make_price(ticker: &str, d: NaiveDate, close: f64) -> PricePoint {
    PricePoint {
        date: d,
        ticker: ticker.into(),
        fund_name: String::new(),
        close,
    }
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn snapshot_for(ticker: &str, fund: &str, units: f64) -> HoldingsSnapshot {
    let json = format!(
        r#"{{
            "{ticker}": {{
                "fund_name": "{fund}",
                "holdings": [
                    {{ "platform": "Fidelity", "tax_wrapper": "ISA", "units": {units} }}
                ]
            }}
        }}"#
    );
    HoldingsSnapshot::from_json(&json).unwrap()
}

/// A store seeded with one fund's history: two buys and a sell for
/// Fundsmith Equity mapped to FUND.L, with covering prices.
pub fn seeded_store() -> SqliteStore {
    let store = SqliteStore::in_memory().unwrap();

    store
        .insert_transactions(&[
            make_tx(
                "Fundsmith Equity",
                date(2023, 1, 10),
                TransactionType::Buy,
                200.0,
                1000.0,
            ),
            make_tx(
                "Fundsmith Equity",
                date(2023, 4, 10),
                TransactionType::Buy,
                100.0,
                600.0,
            ),
            make_tx(
                "Fundsmith Equity",
                date(2023, 8, 10),
                TransactionType::Sell,
                50.0,
                350.0,
            ),
        ])
        .unwrap();

    store
        .insert_mapping(&make_mapping("Fundsmith Equity", "FUND.L"))
        .unwrap();

    store
        .insert_prices(&[
            make_price("FUND.L", date(2023, 1, 2), 5.0),
            make_price("FUND.L", date(2023, 6, 1), 6.0),
            make_price("FUND.L", date(2024, 1, 2), 7.0),
        ])
        .unwrap();

    store
}
