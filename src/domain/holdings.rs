//! Holdings aggregation: running unit balances and FIFO cost basis.
//!
//! Which transaction types move units is data, not code: the
//! [`EffectMap`] is a closed table from [`TransactionType`] to
//! [`UnitEffect`], overridable per deployment via the `[unit_effects]`
//! config section. A type with no entry is a data-quality fault: it is
//! kept out of unit arithmetic and surfaced through the ledger and the
//! reconciliation report, never silently dropped.

use super::transaction::{Transaction, TransactionType};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Residual lot size below which a FIFO lot counts as fully consumed.
const LOT_EPSILON: f64 = 1e-3;

/// What a transaction type does to the unit balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitEffect {
    Increase,
    Decrease,
    /// Money moves, units do not (cash dividends, fees, interest).
    CashOnly,
}

impl UnitEffect {
    pub fn parse(s: &str) -> Option<UnitEffect> {
        match s.trim().to_lowercase().as_str() {
            "increase" => Some(UnitEffect::Increase),
            "decrease" => Some(UnitEffect::Decrease),
            "cash_only" | "cash-only" | "none" => Some(UnitEffect::CashOnly),
            _ => None,
        }
    }
}

/// Explicit type-to-effect table.
#[derive(Debug, Clone)]
pub struct EffectMap {
    map: HashMap<TransactionType, UnitEffect>,
}

impl Default for EffectMap {
    /// Canonical vocabulary: purchases increase, sales decrease, cash
    /// events leave units alone. `Other` is deliberately unmapped.
    fn default() -> Self {
        let mut map = HashMap::new();
        map.insert(TransactionType::Buy, UnitEffect::Increase);
        map.insert(TransactionType::TransferIn, UnitEffect::Increase);
        map.insert(TransactionType::Sell, UnitEffect::Decrease);
        map.insert(TransactionType::TransferOut, UnitEffect::Decrease);
        map.insert(TransactionType::Dividend, UnitEffect::CashOnly);
        map.insert(TransactionType::Fee, UnitEffect::CashOnly);
        map.insert(TransactionType::Interest, UnitEffect::CashOnly);
        map.insert(TransactionType::Subscription, UnitEffect::CashOnly);
        Self { map }
    }
}

impl EffectMap {
    pub fn effect(&self, tx_type: TransactionType) -> Option<UnitEffect> {
        self.map.get(&tx_type).copied()
    }

    /// Override or add an entry. Platforms that report reinvested
    /// dividends as unit-settled can map `Dividend` to `Increase`.
    pub fn set(&mut self, tx_type: TransactionType, effect: UnitEffect) {
        self.map.insert(tx_type, effect);
    }

    /// Signed unit contribution of one transaction, `None` for unmapped
    /// types.
    fn signed_units(&self, tx: &Transaction) -> Option<f64> {
        match self.effect(tx.transaction_type)? {
            UnitEffect::Increase => Some(tx.units),
            UnitEffect::Decrease => Some(-tx.units),
            UnitEffect::CashOnly => Some(0.0),
        }
    }
}

/// Cumulative unit balance immediately after one transaction.
#[derive(Debug, Clone)]
pub struct RunningBalance {
    /// Index into the input slice.
    pub index: usize,
    pub date: NaiveDate,
    pub units_after: f64,
}

/// Result of aggregating one fund identity's transaction history.
#[derive(Debug, Clone, Default)]
pub struct HoldingsLedger {
    pub balances: Vec<RunningBalance>,
    pub final_units: f64,
    /// Indices of transactions whose type has no entry in the effect map.
    pub unclassified: Vec<usize>,
}

/// Reduce a transaction history to running unit balances.
///
/// Transactions are processed in ascending date order; same-date ties keep
/// input order (the secondary key is the input position). Excluded rows
/// are skipped entirely.
pub fn aggregate(transactions: &[Transaction], effects: &EffectMap) -> HoldingsLedger {
    let order = date_order(transactions);

    let mut ledger = HoldingsLedger::default();
    let mut running = 0.0;

    for index in order {
        let tx = &transactions[index];
        match effects.signed_units(tx) {
            Some(delta) => {
                running += delta;
                ledger.balances.push(RunningBalance {
                    index,
                    date: tx.date,
                    units_after: running,
                });
            }
            None => {
                log::warn!(
                    "transaction type {} for {} has no unit effect, excluded from unit arithmetic",
                    tx.transaction_type,
                    tx.effective_fund_name()
                );
                ledger.unclassified.push(index);
            }
        }
    }

    ledger.final_units = running;
    ledger
}

/// Remaining position and cost after FIFO lot consumption.
#[derive(Debug, Clone, Default)]
pub struct CostBasis {
    pub units: f64,
    pub cost: f64,
    pub buy_count: usize,
    pub first_buy: Option<NaiveDate>,
}

impl CostBasis {
    pub fn cost_per_unit(&self) -> Option<f64> {
        if self.units > LOT_EPSILON {
            Some(self.cost / self.units)
        } else {
            None
        }
    }
}

/// Compute the FIFO cost basis of the still-held units.
///
/// Unit-increasing transactions open lots at their transaction price;
/// unit-decreasing transactions consume the oldest open lots first.
pub fn fifo_cost_basis(transactions: &[Transaction], effects: &EffectMap) -> CostBasis {
    struct Lot {
        remaining: f64,
        price: f64,
    }

    let order = date_order(transactions);

    let mut lots: Vec<Lot> = Vec::new();
    let mut buy_count = 0usize;
    let mut first_buy: Option<NaiveDate> = None;

    for index in order {
        let tx = &transactions[index];
        match effects.effect(tx.transaction_type) {
            Some(UnitEffect::Increase) => {
                lots.push(Lot {
                    remaining: tx.units,
                    price: tx.price_per_unit,
                });
                buy_count += 1;
                if first_buy.is_none() {
                    first_buy = Some(tx.date);
                }
            }
            Some(UnitEffect::Decrease) => {
                let mut to_sell = tx.units;
                while to_sell > LOT_EPSILON && !lots.is_empty() {
                    let lot = &mut lots[0];
                    let consumed = to_sell.min(lot.remaining);
                    lot.remaining -= consumed;
                    to_sell -= consumed;
                    if lot.remaining < LOT_EPSILON {
                        lots.remove(0);
                    }
                }
            }
            Some(UnitEffect::CashOnly) | None => {}
        }
    }

    let mut basis = CostBasis {
        units: 0.0,
        cost: 0.0,
        buy_count,
        first_buy,
    };
    for lot in &lots {
        if lot.remaining > LOT_EPSILON {
            basis.units += lot.remaining;
            basis.cost += lot.remaining * lot.price;
        }
    }
    basis
}

/// Indices of the non-excluded transactions in ascending date order,
/// input order preserved on ties.
fn date_order(transactions: &[Transaction]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..transactions.len())
        .filter(|&i| !transactions[i].excluded)
        .collect();
    order.sort_by_key(|&i| transactions[i].date);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::{Platform, TaxWrapper};
    use proptest::prelude::*;

    fn make_tx(date: &str, tx_type: TransactionType, units: f64, price: f64) -> Transaction {
        Transaction {
            platform: Platform::InteractiveInvestor,
            tax_wrapper: TaxWrapper::Isa,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            fund_name: "Scottish Mortgage".into(),
            mapped_fund_name: None,
            transaction_type: tx_type,
            units,
            price_per_unit: price,
            value: units * price,
            currency: "GBP".into(),
            sedol: None,
            isin: None,
            reference: None,
            raw_description: None,
            excluded: false,
        }
    }

    #[test]
    fn aggregate_buys_and_sells() {
        let txs = vec![
            make_tx("2023-01-01", TransactionType::Buy, 100.0, 5.0),
            make_tx("2023-02-01", TransactionType::Buy, 50.0, 6.0),
            make_tx("2023-03-01", TransactionType::Sell, 30.0, 7.0),
        ];
        let ledger = aggregate(&txs, &EffectMap::default());
        assert_eq!(ledger.balances.len(), 3);
        assert!((ledger.balances[0].units_after - 100.0).abs() < 1e-9);
        assert!((ledger.balances[1].units_after - 150.0).abs() < 1e-9);
        assert!((ledger.balances[2].units_after - 120.0).abs() < 1e-9);
        assert!((ledger.final_units - 120.0).abs() < 1e-9);
        assert!(ledger.unclassified.is_empty());
    }

    #[test]
    fn cash_only_rows_leave_units_unchanged() {
        let txs = vec![
            make_tx("2023-01-01", TransactionType::Buy, 100.0, 5.0),
            make_tx("2023-01-15", TransactionType::Dividend, 0.0, 0.0),
            make_tx("2023-02-01", TransactionType::Fee, 0.0, 0.0),
        ];
        let ledger = aggregate(&txs, &EffectMap::default());
        assert!((ledger.final_units - 100.0).abs() < 1e-9);
        assert!((ledger.balances[1].units_after - 100.0).abs() < 1e-9);
        assert!((ledger.balances[2].units_after - 100.0).abs() < 1e-9);
    }

    #[test]
    fn unmapped_type_surfaces_as_unclassified() {
        let txs = vec![
            make_tx("2023-01-01", TransactionType::Buy, 100.0, 5.0),
            make_tx("2023-01-02", TransactionType::Other, 10.0, 1.0),
        ];
        let ledger = aggregate(&txs, &EffectMap::default());
        assert!((ledger.final_units - 100.0).abs() < 1e-9);
        assert_eq!(ledger.unclassified, vec![1]);
        assert_eq!(ledger.balances.len(), 1);
    }

    #[test]
    fn effect_override_makes_dividends_move_units() {
        let txs = vec![
            make_tx("2023-01-01", TransactionType::Buy, 100.0, 5.0),
            make_tx("2023-02-01", TransactionType::Dividend, 2.5, 5.0),
        ];
        let mut effects = EffectMap::default();
        effects.set(TransactionType::Dividend, UnitEffect::Increase);
        let ledger = aggregate(&txs, &effects);
        assert!((ledger.final_units - 102.5).abs() < 1e-9);
    }

    #[test]
    fn same_date_ties_keep_input_order() {
        let txs = vec![
            make_tx("2023-01-01", TransactionType::Buy, 100.0, 5.0),
            make_tx("2023-01-01", TransactionType::Sell, 40.0, 5.0),
            make_tx("2023-01-01", TransactionType::Buy, 10.0, 5.0),
        ];
        let ledger = aggregate(&txs, &EffectMap::default());
        let after: Vec<f64> = ledger.balances.iter().map(|b| b.units_after).collect();
        assert!((after[0] - 100.0).abs() < 1e-9);
        assert!((after[1] - 60.0).abs() < 1e-9);
        assert!((after[2] - 70.0).abs() < 1e-9);
    }

    #[test]
    fn excluded_rows_are_ignored() {
        let mut sell = make_tx("2023-02-01", TransactionType::Sell, 100.0, 5.0);
        sell.excluded = true;
        let txs = vec![make_tx("2023-01-01", TransactionType::Buy, 100.0, 5.0), sell];
        let ledger = aggregate(&txs, &EffectMap::default());
        assert!((ledger.final_units - 100.0).abs() < 1e-9);
        assert_eq!(ledger.balances.len(), 1);
    }

    #[test]
    fn fifo_cost_basis_consumes_oldest_lots_first() {
        let txs = vec![
            make_tx("2023-01-01", TransactionType::Buy, 100.0, 1.0),
            make_tx("2023-02-01", TransactionType::Buy, 100.0, 2.0),
            make_tx("2023-03-01", TransactionType::Sell, 150.0, 3.0),
        ];
        let basis = fifo_cost_basis(&txs, &EffectMap::default());
        // The entire first lot and half the second are consumed.
        assert!((basis.units - 50.0).abs() < 1e-9);
        assert!((basis.cost - 100.0).abs() < 1e-9);
        assert_eq!(basis.buy_count, 2);
        assert_eq!(basis.first_buy, NaiveDate::from_ymd_opt(2023, 1, 1));
    }

    #[test]
    fn fifo_cost_basis_no_sales() {
        let txs = vec![
            make_tx("2023-01-01", TransactionType::Buy, 100.0, 1.5),
            make_tx("2023-02-01", TransactionType::Buy, 200.0, 2.0),
        ];
        let basis = fifo_cost_basis(&txs, &EffectMap::default());
        assert!((basis.units - 300.0).abs() < 1e-9);
        assert!((basis.cost - (150.0 + 400.0)).abs() < 1e-9);
        assert!((basis.cost_per_unit().unwrap() - 550.0 / 300.0).abs() < 1e-9);
    }

    #[test]
    fn fifo_cost_basis_fully_sold() {
        let txs = vec![
            make_tx("2023-01-01", TransactionType::Buy, 100.0, 1.0),
            make_tx("2023-03-01", TransactionType::Sell, 100.0, 2.0),
        ];
        let basis = fifo_cost_basis(&txs, &EffectMap::default());
        assert!(basis.units.abs() < LOT_EPSILON);
        assert!(basis.cost.abs() < 1e-9);
        assert!(basis.cost_per_unit().is_none());
    }

    #[test]
    fn unit_effect_parse() {
        assert_eq!(UnitEffect::parse("increase"), Some(UnitEffect::Increase));
        assert_eq!(UnitEffect::parse("Decrease"), Some(UnitEffect::Decrease));
        assert_eq!(UnitEffect::parse("cash_only"), Some(UnitEffect::CashOnly));
        assert_eq!(UnitEffect::parse("none"), Some(UnitEffect::CashOnly));
        assert_eq!(UnitEffect::parse("sideways"), None);
    }

    proptest! {
        // Final units always equal the arithmetic sum of signed per-type
        // contributions, regardless of interleaved cash-only rows.
        #[test]
        fn final_units_equal_signed_sum(ops in prop::collection::vec((0u8..4, 1.0f64..1000.0), 0..40)) {
            let base = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
            let txs: Vec<Transaction> = ops
                .iter()
                .enumerate()
                .map(|(i, &(kind, units))| {
                    let tx_type = match kind {
                        0 => TransactionType::Buy,
                        1 => TransactionType::Sell,
                        2 => TransactionType::Dividend,
                        _ => TransactionType::Fee,
                    };
                    make_tx(
                        &(base + chrono::Duration::days(i as i64)).format("%Y-%m-%d").to_string(),
                        tx_type,
                        units,
                        1.0,
                    )
                })
                .collect();

            let expected: f64 = ops
                .iter()
                .map(|&(kind, units)| match kind {
                    0 => units,
                    1 => -units,
                    _ => 0.0,
                })
                .sum();

            let ledger = aggregate(&txs, &EffectMap::default());
            prop_assert!((ledger.final_units - expected).abs() < 1e-6);
        }
    }
}
