//! Cross-checks between transactions, ticker mappings and price history.
//!
//! The pass is read-only and always runs to completion: every finding is
//! collected into the report, never raised, so one bad record cannot hide
//! the rest.

use super::holdings::EffectMap;
use super::mapping::{MappingStatus, TickerMapping};
use super::price::PricePoint;
use super::transaction::{Transaction, TransactionType};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A fund name with transactions but no ticker mapping, hence no price
/// data reachable.
#[derive(Debug, Clone, PartialEq)]
pub struct OrphanedFund {
    pub fund_name: String,
    pub transaction_count: usize,
}

/// A ticker whose price history does not span its transaction history.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageGap {
    pub ticker: String,
    pub fund_name: String,
    pub first_transaction: NaiveDate,
    pub last_transaction: NaiveDate,
    pub price_start: Option<NaiveDate>,
    pub price_end: Option<NaiveDate>,
}

/// More than one price row for the same (date, ticker).
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicatePrice {
    pub date: NaiveDate,
    pub ticker: String,
    pub count: usize,
}

/// A recorded mapping-status aggregate that disagrees with the
/// transactions table.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusDrift {
    pub ticker: String,
    pub recorded_earliest: Option<NaiveDate>,
    pub recorded_latest: Option<NaiveDate>,
    pub recorded_count: usize,
    pub actual_earliest: Option<NaiveDate>,
    pub actual_latest: Option<NaiveDate>,
    pub actual_count: usize,
}

/// A transaction type with no entry in the unit-effect table.
#[derive(Debug, Clone, PartialEq)]
pub struct UnclassifiedType {
    pub transaction_type: TransactionType,
    pub transaction_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    pub orphaned_funds: Vec<OrphanedFund>,
    pub coverage_gaps: Vec<CoverageGap>,
    pub duplicate_prices: Vec<DuplicatePrice>,
    pub status_drift: Vec<StatusDrift>,
    pub unclassified_types: Vec<UnclassifiedType>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.finding_count() == 0
    }

    /// Hard issues, as opposed to warnings: duplicate price keys and
    /// price coverage gaps block valuations outright.
    pub fn has_issues(&self) -> bool {
        !self.duplicate_prices.is_empty() || !self.coverage_gaps.is_empty()
    }

    pub fn finding_count(&self) -> usize {
        self.orphaned_funds.len()
            + self.coverage_gaps.len()
            + self.duplicate_prices.len()
            + self.status_drift.len()
            + self.unclassified_types.len()
    }
}

/// Per-ticker transaction aggregate computed on the fly.
struct TickerAggregate {
    fund_name: String,
    earliest: NaiveDate,
    latest: NaiveDate,
    count: usize,
}

/// Run every reconciliation check over a snapshot of the data.
///
/// Excluded transactions are ignored throughout, matching the portfolio
/// aggregation rules. No input is mutated.
pub fn reconcile(
    transactions: &[Transaction],
    mappings: &[TickerMapping],
    prices: &[PricePoint],
    statuses: &[MappingStatus],
    effects: &EffectMap,
) -> ReconciliationReport {
    let live: Vec<&Transaction> = transactions.iter().filter(|t| !t.excluded).collect();

    let mapped_names: HashSet<&str> = mappings.iter().map(|m| m.fund_name.as_str()).collect();

    let mut report = ReconciliationReport::default();

    // Orphaned funds: no mapping under either the raw or the mapped name.
    let mut orphan_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for tx in &live {
        let raw_mapped = mapped_names.contains(tx.fund_name.as_str());
        let std_mapped = tx
            .mapped_fund_name
            .as_deref()
            .is_some_and(|name| mapped_names.contains(name));
        if !raw_mapped && !std_mapped {
            *orphan_counts.entry(tx.fund_name.as_str()).or_default() += 1;
        }
    }
    report.orphaned_funds = orphan_counts
        .into_iter()
        .map(|(fund_name, transaction_count)| OrphanedFund {
            fund_name: fund_name.to_string(),
            transaction_count,
        })
        .collect();
    report
        .orphaned_funds
        .sort_by(|a, b| b.transaction_count.cmp(&a.transaction_count));

    // Per-ticker transaction aggregates, via the mapping table.
    let mut aggregates: BTreeMap<&str, TickerAggregate> = BTreeMap::new();
    for mapping in mappings {
        for tx in &live {
            if !tx.matches_fund(&mapping.fund_name) {
                continue;
            }
            aggregates
                .entry(mapping.ticker.as_str())
                .and_modify(|agg| {
                    agg.earliest = agg.earliest.min(tx.date);
                    agg.latest = agg.latest.max(tx.date);
                    agg.count += 1;
                })
                .or_insert(TickerAggregate {
                    fund_name: mapping.fund_name.clone(),
                    earliest: tx.date,
                    latest: tx.date,
                    count: 1,
                });
        }
    }

    // Price coverage per ticker.
    let mut price_ranges: HashMap<&str, (NaiveDate, NaiveDate)> = HashMap::new();
    for price in prices {
        price_ranges
            .entry(price.ticker.as_str())
            .and_modify(|(min, max)| {
                *min = (*min).min(price.date);
                *max = (*max).max(price.date);
            })
            .or_insert((price.date, price.date));
    }

    for (ticker, agg) in &aggregates {
        let range = price_ranges.get(ticker).copied();
        let covered = matches!(
            range,
            Some((start, end)) if start <= agg.earliest && end >= agg.latest
        );
        if !covered {
            report.coverage_gaps.push(CoverageGap {
                ticker: ticker.to_string(),
                fund_name: agg.fund_name.clone(),
                first_transaction: agg.earliest,
                last_transaction: agg.latest,
                price_start: range.map(|(start, _)| start),
                price_end: range.map(|(_, end)| end),
            });
        }
    }

    // Duplicate price keys.
    let mut price_counts: BTreeMap<(NaiveDate, &str), usize> = BTreeMap::new();
    for price in prices {
        *price_counts
            .entry((price.date, price.ticker.as_str()))
            .or_default() += 1;
    }
    report.duplicate_prices = price_counts
        .into_iter()
        .filter(|&(_, count)| count > 1)
        .map(|((date, ticker), count)| DuplicatePrice {
            date,
            ticker: ticker.to_string(),
            count,
        })
        .collect();

    // Mapping-status drift against the fresh aggregates.
    for status in statuses {
        let actual = aggregates.get(status.ticker.as_str());
        let (actual_earliest, actual_latest, actual_count) = match actual {
            Some(agg) => (Some(agg.earliest), Some(agg.latest), agg.count),
            None => (None, None, 0),
        };
        if status.earliest_date != actual_earliest
            || status.latest_date != actual_latest
            || status.transaction_count != actual_count
        {
            report.status_drift.push(StatusDrift {
                ticker: status.ticker.clone(),
                recorded_earliest: status.earliest_date,
                recorded_latest: status.latest_date,
                recorded_count: status.transaction_count,
                actual_earliest,
                actual_latest,
                actual_count,
            });
        }
    }
    report.status_drift.sort_by(|a, b| a.ticker.cmp(&b.ticker));

    // Transaction types the unit-effect table does not know.
    let mut type_counts: BTreeMap<&'static str, (TransactionType, usize)> = BTreeMap::new();
    for tx in &live {
        if effects.effect(tx.transaction_type).is_none() {
            type_counts
                .entry(tx.transaction_type.as_db_str())
                .and_modify(|(_, count)| *count += 1)
                .or_insert((tx.transaction_type, 1));
        }
    }
    report.unclassified_types = type_counts
        .into_values()
        .map(|(transaction_type, transaction_count)| UnclassifiedType {
            transaction_type,
            transaction_count,
        })
        .collect();

    report
}

impl std::fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Reconciliation Report")?;
        writeln!(f, "=====================")?;

        if self.is_clean() {
            return write!(f, "No findings: database is clean");
        }

        if !self.orphaned_funds.is_empty() {
            writeln!(f, "Orphaned funds ({}):", self.orphaned_funds.len())?;
            for orphan in &self.orphaned_funds {
                writeln!(
                    f,
                    "  {} ({} transactions)",
                    orphan.fund_name, orphan.transaction_count
                )?;
            }
        }

        if !self.coverage_gaps.is_empty() {
            writeln!(f, "Price coverage gaps ({}):", self.coverage_gaps.len())?;
            for gap in &self.coverage_gaps {
                match (gap.price_start, gap.price_end) {
                    (Some(start), Some(end)) => writeln!(
                        f,
                        "  {}: transactions {} to {}, prices {} to {}",
                        gap.ticker, gap.first_transaction, gap.last_transaction, start, end
                    )?,
                    _ => writeln!(
                        f,
                        "  {}: transactions {} to {}, no price history",
                        gap.ticker, gap.first_transaction, gap.last_transaction
                    )?,
                }
            }
        }

        if !self.duplicate_prices.is_empty() {
            writeln!(f, "Duplicate price rows ({}):", self.duplicate_prices.len())?;
            for dup in &self.duplicate_prices {
                writeln!(f, "  {} {}: {} rows", dup.date, dup.ticker, dup.count)?;
            }
        }

        if !self.status_drift.is_empty() {
            let fmt_date =
                |d: Option<NaiveDate>| d.map_or_else(|| "none".to_string(), |d| d.to_string());
            writeln!(f, "Mapping status drift ({}):", self.status_drift.len())?;
            for drift in &self.status_drift {
                writeln!(
                    f,
                    "  {}: recorded {} to {} ({} txs), actual {} to {} ({} txs)",
                    drift.ticker,
                    fmt_date(drift.recorded_earliest),
                    fmt_date(drift.recorded_latest),
                    drift.recorded_count,
                    fmt_date(drift.actual_earliest),
                    fmt_date(drift.actual_latest),
                    drift.actual_count
                )?;
            }
        }

        if !self.unclassified_types.is_empty() {
            writeln!(
                f,
                "Unclassified transaction types ({}):",
                self.unclassified_types.len()
            )?;
            for unclassified in &self.unclassified_types {
                writeln!(
                    f,
                    "  {}: {} transactions excluded from unit arithmetic",
                    unclassified.transaction_type, unclassified.transaction_count
                )?;
            }
        }

        write!(f, "Total findings: {}", self.finding_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::{Platform, TaxWrapper};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn make_tx(fund: &str, d: NaiveDate, tx_type: TransactionType) -> Transaction {
        Transaction {
            platform: Platform::Fidelity,
            tax_wrapper: TaxWrapper::Isa,
            date: d,
            fund_name: fund.into(),
            mapped_fund_name: None,
            transaction_type: tx_type,
            units: 10.0,
            price_per_unit: 1.0,
            value: 10.0,
            currency: "GBP".into(),
            sedol: None,
            isin: None,
            reference: None,
            raw_description: None,
            excluded: false,
        }
    }

    fn make_mapping(fund: &str, ticker: &str) -> TickerMapping {
        TickerMapping {
            fund_name: fund.into(),
            ticker: ticker.into(),
            sedol: None,
            isin: None,
            vip: false,
        }
    }

    fn make_price(ticker: &str, d: NaiveDate) -> PricePoint {
        PricePoint {
            date: d,
            ticker: ticker.into(),
            fund_name: String::new(),
            close: 1.0,
        }
    }

    #[test]
    fn clean_data_produces_clean_report() {
        let txs = vec![make_tx("Fundsmith Equity", date(2023, 1, 10), TransactionType::Buy)];
        let mappings = vec![make_mapping("Fundsmith Equity", "FUND.L")];
        let prices = vec![
            make_price("FUND.L", date(2023, 1, 1)),
            make_price("FUND.L", date(2023, 2, 1)),
        ];
        let statuses = vec![MappingStatus {
            ticker: "FUND.L".into(),
            fund_name: Some("Fundsmith Equity".into()),
            earliest_date: Some(date(2023, 1, 10)),
            latest_date: Some(date(2023, 1, 10)),
            transaction_count: 1,
        }];

        let report = reconcile(&txs, &mappings, &prices, &statuses, &EffectMap::default());
        assert!(report.is_clean(), "unexpected findings: {report}");
        assert!(!report.has_issues());
    }

    #[test]
    fn unmapped_fund_is_orphaned() {
        let txs = vec![
            make_tx("Mystery Fund", date(2023, 1, 10), TransactionType::Buy),
            make_tx("Mystery Fund", date(2023, 2, 10), TransactionType::Buy),
        ];
        let report = reconcile(&txs, &[], &[], &[], &EffectMap::default());
        assert_eq!(report.orphaned_funds.len(), 1);
        assert_eq!(report.orphaned_funds[0].fund_name, "Mystery Fund");
        assert_eq!(report.orphaned_funds[0].transaction_count, 2);
    }

    #[test]
    fn mapped_name_resolves_orphan() {
        let mut tx = make_tx("FDSMITH EQ I AC", date(2023, 1, 10), TransactionType::Buy);
        tx.mapped_fund_name = Some("Fundsmith Equity".into());
        let mappings = vec![make_mapping("Fundsmith Equity", "FUND.L")];
        let report = reconcile(&[tx], &mappings, &[], &[], &EffectMap::default());
        assert!(report.orphaned_funds.is_empty());
    }

    #[test]
    fn excluded_transactions_never_orphan() {
        let mut tx = make_tx("Mystery Fund", date(2023, 1, 10), TransactionType::Buy);
        tx.excluded = true;
        let report = reconcile(&[tx], &[], &[], &[], &EffectMap::default());
        assert!(report.orphaned_funds.is_empty());
    }

    #[test]
    fn missing_price_history_is_a_coverage_gap() {
        let txs = vec![make_tx("Fundsmith Equity", date(2023, 1, 10), TransactionType::Buy)];
        let mappings = vec![make_mapping("Fundsmith Equity", "FUND.L")];
        let report = reconcile(&txs, &mappings, &[], &[], &EffectMap::default());
        assert_eq!(report.coverage_gaps.len(), 1);
        assert_eq!(report.coverage_gaps[0].ticker, "FUND.L");
        assert!(report.coverage_gaps[0].price_start.is_none());
        assert!(report.has_issues());
    }

    #[test]
    fn short_price_history_is_a_coverage_gap() {
        let txs = vec![
            make_tx("Fundsmith Equity", date(2023, 1, 10), TransactionType::Buy),
            make_tx("Fundsmith Equity", date(2023, 6, 10), TransactionType::Sell),
        ];
        let mappings = vec![make_mapping("Fundsmith Equity", "FUND.L")];
        // Prices start after the first transaction.
        let prices = vec![
            make_price("FUND.L", date(2023, 3, 1)),
            make_price("FUND.L", date(2023, 7, 1)),
        ];
        let report = reconcile(&txs, &mappings, &prices, &[], &EffectMap::default());
        assert_eq!(report.coverage_gaps.len(), 1);
        assert_eq!(report.coverage_gaps[0].price_start, Some(date(2023, 3, 1)));
    }

    #[test]
    fn duplicate_price_rows_are_reported() {
        let prices = vec![
            make_price("FUND.L", date(2023, 1, 1)),
            make_price("FUND.L", date(2023, 1, 1)),
            make_price("FUND.L", date(2023, 1, 2)),
        ];
        let report = reconcile(&[], &[], &prices, &[], &EffectMap::default());
        assert_eq!(report.duplicate_prices.len(), 1);
        assert_eq!(report.duplicate_prices[0].count, 2);
        assert!(report.has_issues());
    }

    #[test]
    fn stale_status_shows_as_drift() {
        let txs = vec![
            make_tx("Fundsmith Equity", date(2023, 1, 10), TransactionType::Buy),
            make_tx("Fundsmith Equity", date(2023, 5, 10), TransactionType::Buy),
        ];
        let mappings = vec![make_mapping("Fundsmith Equity", "FUND.L")];
        let prices = vec![
            make_price("FUND.L", date(2023, 1, 1)),
            make_price("FUND.L", date(2023, 6, 1)),
        ];
        let statuses = vec![MappingStatus {
            ticker: "FUND.L".into(),
            fund_name: Some("Fundsmith Equity".into()),
            earliest_date: Some(date(2023, 1, 10)),
            latest_date: Some(date(2023, 1, 10)),
            transaction_count: 1,
        }];
        let report = reconcile(&txs, &mappings, &prices, &statuses, &EffectMap::default());
        assert_eq!(report.status_drift.len(), 1);
        let drift = &report.status_drift[0];
        assert_eq!(drift.recorded_count, 1);
        assert_eq!(drift.actual_count, 2);
        assert_eq!(drift.actual_latest, Some(date(2023, 5, 10)));
    }

    #[test]
    fn status_for_ticker_without_transactions_drifts_to_zero() {
        let statuses = vec![MappingStatus {
            ticker: "GONE.L".into(),
            fund_name: None,
            earliest_date: Some(date(2022, 1, 1)),
            latest_date: Some(date(2022, 6, 1)),
            transaction_count: 4,
        }];
        let report = reconcile(&[], &[], &[], &statuses, &EffectMap::default());
        assert_eq!(report.status_drift.len(), 1);
        assert_eq!(report.status_drift[0].actual_count, 0);
        assert!(report.status_drift[0].actual_earliest.is_none());
    }

    #[test]
    fn unknown_types_are_surfaced_not_dropped() {
        let txs = vec![
            make_tx("Fundsmith Equity", date(2023, 1, 10), TransactionType::Other),
            make_tx("Fundsmith Equity", date(2023, 2, 10), TransactionType::Other),
        ];
        let mappings = vec![make_mapping("Fundsmith Equity", "FUND.L")];
        let prices = vec![
            make_price("FUND.L", date(2023, 1, 1)),
            make_price("FUND.L", date(2023, 3, 1)),
        ];
        let report = reconcile(&txs, &mappings, &prices, &[], &EffectMap::default());
        assert_eq!(report.unclassified_types.len(), 1);
        assert_eq!(
            report.unclassified_types[0].transaction_type,
            TransactionType::Other
        );
        assert_eq!(report.unclassified_types[0].transaction_count, 2);
    }

    // Two runs over the same snapshot must agree entry for entry.
    #[test]
    fn reconcile_is_idempotent() {
        let txs = vec![
            make_tx("Mystery Fund", date(2023, 1, 10), TransactionType::Buy),
            make_tx("Fundsmith Equity", date(2023, 2, 10), TransactionType::Other),
        ];
        let mappings = vec![make_mapping("Fundsmith Equity", "FUND.L")];
        let prices = vec![
            make_price("FUND.L", date(2023, 1, 1)),
            make_price("FUND.L", date(2023, 1, 1)),
        ];
        let effects = EffectMap::default();

        let first = reconcile(&txs, &mappings, &prices, &[], &effects);
        let second = reconcile(&txs, &mappings, &prices, &[], &effects);

        assert_eq!(first.orphaned_funds, second.orphaned_funds);
        assert_eq!(first.coverage_gaps, second.coverage_gaps);
        assert_eq!(first.duplicate_prices, second.duplicate_prices);
        assert_eq!(first.status_drift, second.status_drift);
        assert_eq!(first.unclassified_types, second.unclassified_types);
    }
}
