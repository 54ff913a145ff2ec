//! Cash flow events derived from transactions for return calculations.
//!
//! Sign convention: negative = capital contributed by the investor,
//! positive = capital returned to the investor. The terminal "current
//! value" of a holding is never represented as a dated flow here; the
//! return calculator appends it itself.

use super::transaction::Transaction;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct CashFlow {
    pub date: NaiveDate,
    pub amount: f64,
    pub description: String,
}

impl CashFlow {
    pub fn new(date: NaiveDate, amount: f64, description: impl Into<String>) -> Self {
        Self {
            date,
            amount,
            description: description.into(),
        }
    }

    /// Money coming into the account (a contribution).
    pub fn is_inflow(&self) -> bool {
        self.amount < 0.0
    }

    /// Money leaving the account (a withdrawal).
    pub fn is_outflow(&self) -> bool {
        self.amount > 0.0
    }
}

/// Derive the cash-flow schedule for a set of transactions.
///
/// Purchase-class types contribute `-value`, sale-class types `+value`;
/// cash-only types (dividends, fees, interest) produce no flow. Excluded
/// transactions are skipped. The result is ordered by date, ties keeping
/// input order.
pub fn cash_flows_from_transactions(transactions: &[Transaction]) -> Vec<CashFlow> {
    let mut flows: Vec<CashFlow> = Vec::new();

    for tx in transactions {
        if tx.excluded {
            continue;
        }
        let amount = if tx.is_buy() {
            -tx.value
        } else if tx.is_sell() {
            tx.value
        } else {
            continue;
        };
        flows.push(CashFlow::new(
            tx.date,
            amount,
            format!("{} {}", tx.transaction_type, tx.effective_fund_name()),
        ));
    }

    flows.sort_by_key(|cf| cf.date);
    flows
}
