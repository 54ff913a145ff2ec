//! Return metrics from irregular cash flows.
//!
//! All returns are fractions (0.05 = 5%). Metrics that are mathematically
//! undefined for the inputs are `None`, never zero, so callers can render
//! "N/A" instead of a misleading 0%.

use super::cash_flow::CashFlow;
use super::error::FolioError;
use super::holdings::{EffectMap, UnitEffect};
use super::solver;
use super::transaction::Transaction;
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const DAYS_PER_YEAR: f64 = 365.25;

/// Computed return metrics for one holding or an aggregate.
#[derive(Debug, Clone)]
pub struct ReturnMetrics {
    pub total_contributions: f64,
    pub total_withdrawals: f64,
    pub current_value: f64,
    pub total_gain: f64,
    /// `None` when total contributions are zero.
    pub simple_return: Option<f64>,
    /// `None` when the holding period is zero or the total loss exceeds
    /// 100% (fractional exponentiation of a negative base is ill-defined).
    pub annualised_return: Option<f64>,
    /// Money-weighted rate of return. `None` when no rate in the search
    /// bracket zeroes the net present value.
    pub mwrr: Option<f64>,
    pub years_invested: f64,
    pub start_date: NaiveDate,
    pub as_of: NaiveDate,
}

pub fn years_between(start: NaiveDate, end: NaiveDate) -> f64 {
    (end - start).num_days() as f64 / DAYS_PER_YEAR
}

/// Compute all return metrics for a cash-flow schedule and a terminal
/// valuation.
///
/// Preconditions, checked before any computation: the schedule is
/// non-empty, every flow is dated on or before `as_of`, and
/// `current_value` is non-negative. Violations fail with
/// [`FolioError::InvalidInput`] naming the broken precondition.
pub fn compute(
    cash_flows: &[CashFlow],
    current_value: f64,
    as_of: NaiveDate,
) -> Result<ReturnMetrics, FolioError> {
    if cash_flows.is_empty() {
        return Err(FolioError::InvalidInput {
            reason: "cash flow list is empty".into(),
        });
    }
    if let Some(late) = cash_flows.iter().find(|cf| cf.date > as_of) {
        return Err(FolioError::InvalidInput {
            reason: format!(
                "cash flow dated {} is after the as-of date {}",
                late.date, as_of
            ),
        });
    }
    if current_value < 0.0 {
        return Err(FolioError::InvalidInput {
            reason: format!("current value is negative ({current_value})"),
        });
    }

    let total_contributions: f64 = cash_flows
        .iter()
        .filter(|cf| cf.is_inflow())
        .map(|cf| -cf.amount)
        .sum();
    let total_withdrawals: f64 = cash_flows
        .iter()
        .filter(|cf| cf.is_outflow())
        .map(|cf| cf.amount)
        .sum();
    let total_gain = current_value + total_withdrawals - total_contributions;

    let simple_return = if total_contributions > 0.0 {
        Some(total_gain / total_contributions)
    } else {
        None
    };

    let start_date = cash_flows.iter().map(|cf| cf.date).min().unwrap_or(as_of);
    let years_invested = years_between(start_date, as_of);

    let annualised_return = match simple_return {
        Some(simple) if years_invested > 0.0 && 1.0 + simple >= 0.0 => {
            Some((1.0 + simple).powf(1.0 / years_invested) - 1.0)
        }
        _ => None,
    };

    let mut schedule: Vec<(f64, f64)> = cash_flows
        .iter()
        .map(|cf| (years_between(start_date, cf.date), cf.amount))
        .collect();
    schedule.push((years_invested, current_value));
    let mwrr = solver::solve_irr(&schedule);

    Ok(ReturnMetrics {
        total_contributions,
        total_withdrawals,
        current_value,
        total_gain,
        simple_return,
        annualised_return,
        mwrr,
        years_invested,
        start_date,
        as_of,
    })
}

/// Annualised time-weighted return of a single holding.
///
/// Compounds sub-period growth between unit-moving transactions, valuing
/// the position at the closest price on or before each transaction date,
/// then annualises over first transaction to last price date. `None` when
/// no sub-period is computable.
pub fn time_weighted_return(
    transactions: &[Transaction],
    prices: &BTreeMap<NaiveDate, f64>,
    current_value: f64,
    effects: &EffectMap,
) -> Option<f64> {
    let last_price_date = *prices.keys().next_back()?;

    let mut order: Vec<usize> = (0..transactions.len())
        .filter(|&i| {
            let tx = &transactions[i];
            !tx.excluded
                && matches!(
                    effects.effect(tx.transaction_type),
                    Some(UnitEffect::Increase) | Some(UnitEffect::Decrease)
                )
        })
        .collect();
    order.sort_by_key(|&i| transactions[i].date);

    let first_date = transactions[*order.first()?].date;

    let mut growth_factors: Vec<f64> = Vec::new();
    let mut units_held = 0.0;
    let mut prev_value = 0.0;

    for index in order {
        let tx = &transactions[index];
        let Some((_, &price)) = prices.range(..=tx.date).next_back() else {
            continue;
        };

        let value_before = units_held * price;
        if prev_value > 0.0 && value_before > 0.0 {
            growth_factors.push(value_before / prev_value);
        }

        match effects.effect(tx.transaction_type) {
            Some(UnitEffect::Increase) => units_held += tx.units,
            Some(UnitEffect::Decrease) => units_held -= tx.units,
            _ => {}
        }

        prev_value = units_held * price;
    }

    if prev_value > 0.0 && current_value > 0.0 {
        growth_factors.push(current_value / prev_value);
    }

    if growth_factors.is_empty() {
        return None;
    }

    let twr = growth_factors.iter().product::<f64>() - 1.0;

    let days = (last_price_date - first_date).num_days();
    if days > 0 {
        let years = days as f64 / DAYS_PER_YEAR;
        Some((1.0 + twr).powf(1.0 / years) - 1.0)
    } else {
        Some(twr)
    }
}

/// Format a GBP amount with thousands separators, e.g. `£15,000.00`.
pub fn format_gbp(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-£{grouped}.{frac:02}")
    } else {
        format!("£{grouped}.{frac:02}")
    }
}

fn format_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:+.2}%", v * 100.0),
        None => "N/A".to_string(),
    }
}

impl std::fmt::Display for ReturnMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Return Metrics ({} to {})",
            self.start_date, self.as_of
        )?;
        writeln!(
            f,
            "  Total Contributions: {}",
            format_gbp(self.total_contributions)
        )?;
        writeln!(
            f,
            "  Total Withdrawals:   {}",
            format_gbp(self.total_withdrawals)
        )?;
        writeln!(f, "  Current Value:       {}", format_gbp(self.current_value))?;
        writeln!(f, "  Total Gain:          {}", format_gbp(self.total_gain))?;
        writeln!(f, "  Simple Return:       {}", format_pct(self.simple_return))?;
        writeln!(
            f,
            "  Annualised Return:   {}",
            format_pct(self.annualised_return)
        )?;
        writeln!(f, "  MWRR (IRR):          {}", format_pct(self.mwrr))?;
        write!(f, "  Years Invested:      {:.2}", self.years_invested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn flow(y: i32, m: u32, d: u32, amount: f64) -> CashFlow {
        CashFlow::new(date(y, m, d), amount, "")
    }

    #[test]
    fn empty_cash_flows_rejected() {
        let err = compute(&[], 1000.0, date(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, FolioError::InvalidInput { reason } if reason.contains("empty")));
    }

    #[test]
    fn flow_after_as_of_rejected() {
        let flows = vec![flow(2024, 6, 1, -1000.0)];
        let err = compute(&flows, 1000.0, date(2024, 1, 1)).unwrap_err();
        assert!(
            matches!(err, FolioError::InvalidInput { reason } if reason.contains("after the as-of date"))
        );
    }

    #[test]
    fn negative_current_value_rejected() {
        let flows = vec![flow(2023, 1, 1, -1000.0)];
        let err = compute(&flows, -5.0, date(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, FolioError::InvalidInput { reason } if reason.contains("negative")));
    }

    #[test]
    fn flat_position_over_one_year() {
        let flows = vec![flow(2023, 1, 1, -1000.0)];
        let metrics = compute(&flows, 1000.0, date(2024, 1, 1)).unwrap();

        assert_abs_diff_eq!(metrics.total_contributions, 1000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(metrics.total_withdrawals, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(metrics.total_gain, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(metrics.simple_return.unwrap(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(metrics.annualised_return.unwrap(), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(metrics.mwrr.unwrap(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn worked_example() {
        let flows = vec![
            flow(2021, 9, 1, -10000.0),
            flow(2022, 4, 1, -5000.0),
            flow(2023, 6, 1, 2000.0),
        ];
        let metrics = compute(&flows, 15500.0, date(2025, 12, 9)).unwrap();

        assert_abs_diff_eq!(metrics.total_contributions, 15000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(metrics.total_withdrawals, 2000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(metrics.total_gain, 2500.0, epsilon = 1e-9);
        assert_abs_diff_eq!(metrics.simple_return.unwrap(), 0.1667, epsilon = 1e-4);
        assert_abs_diff_eq!(metrics.years_invested, 4.27, epsilon = 0.01);
        assert_abs_diff_eq!(metrics.annualised_return.unwrap(), 0.0371, epsilon = 1e-3);
        assert_abs_diff_eq!(metrics.mwrr.unwrap(), 0.0412, epsilon = 1e-3);
    }

    #[test]
    fn zero_contributions_leave_simple_return_undefined() {
        let flows = vec![flow(2023, 1, 1, 500.0)];
        let metrics = compute(&flows, 0.0, date(2024, 1, 1)).unwrap();
        assert!(metrics.simple_return.is_none());
        assert!(metrics.annualised_return.is_none());
    }

    #[test]
    fn all_positive_flows_have_no_mwrr() {
        let flows = vec![flow(2023, 1, 1, 500.0), flow(2023, 6, 1, 300.0)];
        let metrics = compute(&flows, 100.0, date(2024, 1, 1)).unwrap();
        assert!(metrics.mwrr.is_none());
    }

    #[test]
    fn full_loss_with_zero_current_value() {
        let flows = vec![flow(2023, 1, 1, -1000.0)];
        let metrics = compute(&flows, 0.0, date(2024, 1, 1)).unwrap();
        assert_abs_diff_eq!(metrics.simple_return.unwrap(), -1.0, epsilon = 1e-9);
        // (1 + simple) == 0, so annualising is still defined and gives -1.
        assert_abs_diff_eq!(metrics.annualised_return.unwrap(), -1.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_years_invested_leaves_annualised_undefined() {
        let flows = vec![flow(2024, 1, 1, -1000.0)];
        let metrics = compute(&flows, 900.0, date(2024, 1, 1)).unwrap();
        assert!(metrics.annualised_return.is_none());
    }

    #[test]
    fn metrics_display_renders_na_for_undefined() {
        let flows = vec![flow(2023, 1, 1, 500.0)];
        let metrics = compute(&flows, 0.0, date(2024, 1, 1)).unwrap();
        let text = metrics.to_string();
        assert!(text.contains("Simple Return:       N/A"));
        assert!(text.contains("MWRR (IRR):          N/A"));
    }

    #[test]
    fn format_gbp_groups_thousands() {
        assert_eq!(format_gbp(15000.0), "£15,000.00");
        assert_eq!(format_gbp(1234567.89), "£1,234,567.89");
        assert_eq!(format_gbp(-500.5), "-£500.50");
        assert_eq!(format_gbp(0.0), "£0.00");
    }

    mod twr {
        use super::*;
        use crate::domain::transaction::{Platform, TaxWrapper, Transaction, TransactionType};

        fn make_tx(d: NaiveDate, tx_type: TransactionType, units: f64) -> Transaction {
            Transaction {
                platform: Platform::Fidelity,
                tax_wrapper: TaxWrapper::Isa,
                date: d,
                fund_name: "Fundsmith Equity".into(),
                mapped_fund_name: None,
                transaction_type: tx_type,
                units,
                price_per_unit: 1.0,
                value: units,
                currency: "GBP".into(),
                sedol: None,
                isin: None,
                reference: None,
                raw_description: None,
                excluded: false,
            }
        }

        #[test]
        fn single_buy_price_doubles_over_year() {
            let start = date(2023, 1, 1);
            let end = date(2024, 1, 1);
            let txs = vec![make_tx(start, TransactionType::Buy, 100.0)];
            let mut prices = BTreeMap::new();
            prices.insert(start, 1.0);
            prices.insert(end, 2.0);

            // 100 units now worth 200.
            let twr =
                time_weighted_return(&txs, &prices, 200.0, &EffectMap::default()).unwrap();
            assert_abs_diff_eq!(twr, 1.0, epsilon = 0.02);
        }

        #[test]
        fn no_prices_yields_none() {
            let txs = vec![make_tx(date(2023, 1, 1), TransactionType::Buy, 100.0)];
            let prices = BTreeMap::new();
            assert!(time_weighted_return(&txs, &prices, 100.0, &EffectMap::default()).is_none());
        }

        #[test]
        fn no_transactions_yields_none() {
            let mut prices = BTreeMap::new();
            prices.insert(date(2023, 1, 1), 1.0);
            assert!(time_weighted_return(&[], &prices, 100.0, &EffectMap::default()).is_none());
        }
    }
}
