//! Daily closing prices.

use chrono::NaiveDate;
use std::collections::BTreeMap;

/// LSE prices above this are assumed to be quoted in pence.
const PENCE_THRESHOLD: f64 = 500.0;

/// One daily closing price for a ticker. Unique on (date, ticker),
/// append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub ticker: String,
    pub fund_name: String,
    pub close: f64,
}

/// Convert a pence-quoted LSE price to pounds.
///
/// Some LSE listings are quoted in pence and some in pounds, and price
/// feeds return a mix. Heuristic: a `.L` ticker priced above 500 is
/// treated as pence.
pub fn normalise_lse_price(ticker: &str, price: f64) -> f64 {
    if ticker.ends_with(".L") && price > PENCE_THRESHOLD {
        price / 100.0
    } else {
        price
    }
}

/// Build a date-ordered price series for one ticker, pence-normalised.
pub fn price_series(prices: &[PricePoint], ticker: &str) -> BTreeMap<NaiveDate, f64> {
    prices
        .iter()
        .filter(|p| p.ticker == ticker)
        .map(|p| (p.date, normalise_lse_price(&p.ticker, p.close)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(date: &str, ticker: &str, close: f64) -> PricePoint {
        PricePoint {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            ticker: ticker.into(),
            fund_name: String::new(),
            close,
        }
    }

    #[test]
    fn lse_pence_prices_are_converted() {
        assert!((normalise_lse_price("SMT.L", 1025.0) - 10.25).abs() < 1e-9);
        assert!((normalise_lse_price("SMT.L", 4.10) - 4.10).abs() < 1e-9);
    }

    #[test]
    fn non_lse_prices_pass_through() {
        assert!((normalise_lse_price("LU1033663649", 1025.0) - 1025.0).abs() < 1e-9);
    }

    #[test]
    fn price_series_filters_and_normalises() {
        let prices = vec![
            point("2024-01-02", "SMT.L", 780.0),
            point("2024-01-03", "SMT.L", 800.0),
            point("2024-01-02", "FUND.X", 3.5),
        ];
        let series = price_series(&prices, "SMT.L");
        assert_eq!(series.len(), 2);
        let first = series.values().next().unwrap();
        assert!((first - 7.80).abs() < 1e-9);
    }
}
