//! Canonical transaction record and the categorical vocabularies it uses.
//!
//! Every platform export is normalised into [`Transaction`]. `units` and
//! `value` are stored unsigned on every row, including sales; the
//! transaction type alone carries direction, and the type-to-effect
//! mapping in [`crate::domain::holdings`] applies the sign exactly once.

use chrono::NaiveDate;

/// Source platforms transactions can originate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Fidelity,
    InteractiveInvestor,
    InvestEngine,
}

impl Platform {
    /// Stable identifier used in the database and config files.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Platform::Fidelity => "FIDELITY",
            Platform::InteractiveInvestor => "INTERACTIVE_INVESTOR",
            Platform::InvestEngine => "INVEST_ENGINE",
        }
    }

    pub fn parse(s: &str) -> Option<Platform> {
        match s.trim().to_uppercase().replace(' ', "_").as_str() {
            "FIDELITY" => Some(Platform::Fidelity),
            "INTERACTIVE_INVESTOR" | "II" => Some(Platform::InteractiveInvestor),
            "INVEST_ENGINE" | "INVESTENGINE" => Some(Platform::InvestEngine),
            _ => None,
        }
    }

    pub fn all() -> [Platform; 3] {
        [
            Platform::Fidelity,
            Platform::InteractiveInvestor,
            Platform::InvestEngine,
        ]
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Platform::Fidelity => "Fidelity",
            Platform::InteractiveInvestor => "Interactive Investor",
            Platform::InvestEngine => "InvestEngine",
        };
        write!(f, "{name}")
    }
}

/// UK account-type classification. Affects tax treatment only, never
/// transaction mechanics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaxWrapper {
    Isa,
    Sipp,
    Gia,
    Other,
}

impl TaxWrapper {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaxWrapper::Isa => "ISA",
            TaxWrapper::Sipp => "SIPP",
            TaxWrapper::Gia => "GIA",
            TaxWrapper::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<TaxWrapper> {
        match s.trim().to_uppercase().as_str() {
            "ISA" => Some(TaxWrapper::Isa),
            "SIPP" => Some(TaxWrapper::Sipp),
            "GIA" => Some(TaxWrapper::Gia),
            "OTHER" => Some(TaxWrapper::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaxWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Canonical transaction types all platform vocabularies map into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Buy,
    Sell,
    Dividend,
    TransferIn,
    TransferOut,
    Fee,
    Interest,
    Subscription,
    Other,
}

impl TransactionType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TransactionType::Buy => "BUY",
            TransactionType::Sell => "SELL",
            TransactionType::Dividend => "DIVIDEND",
            TransactionType::TransferIn => "TRANSFER_IN",
            TransactionType::TransferOut => "TRANSFER_OUT",
            TransactionType::Fee => "FEE",
            TransactionType::Interest => "INTEREST",
            TransactionType::Subscription => "SUBSCRIPTION",
            TransactionType::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<TransactionType> {
        match s.trim().to_uppercase().replace(' ', "_").as_str() {
            "BUY" => Some(TransactionType::Buy),
            "SELL" => Some(TransactionType::Sell),
            "DIVIDEND" => Some(TransactionType::Dividend),
            "TRANSFER_IN" => Some(TransactionType::TransferIn),
            "TRANSFER_OUT" => Some(TransactionType::TransferOut),
            "FEE" => Some(TransactionType::Fee),
            "INTEREST" => Some(TransactionType::Interest),
            "SUBSCRIPTION" => Some(TransactionType::Subscription),
            "OTHER" => Some(TransactionType::Other),
            _ => None,
        }
    }

    /// Purchase-class types: capital leaves the investor's pocket.
    pub fn is_purchase(&self) -> bool {
        matches!(self, TransactionType::Buy | TransactionType::TransferIn)
    }

    /// Sale-class types: capital returns to the investor.
    pub fn is_sale(&self) -> bool {
        matches!(self, TransactionType::Sell | TransactionType::TransferOut)
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransactionType::Buy => "Buy",
            TransactionType::Sell => "Sell",
            TransactionType::Dividend => "Dividend",
            TransactionType::TransferIn => "Transfer In",
            TransactionType::TransferOut => "Transfer Out",
            TransactionType::Fee => "Fee",
            TransactionType::Interest => "Interest",
            TransactionType::Subscription => "Subscription",
            TransactionType::Other => "Other",
        };
        write!(f, "{name}")
    }
}

/// One normalised buy/sell/dividend/transfer/fee event.
///
/// Created once at import time. `mapped_fund_name` and `excluded` may be
/// updated by maintenance commands; nothing else is ever mutated.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub platform: Platform,
    pub tax_wrapper: TaxWrapper,
    pub date: NaiveDate,
    pub fund_name: String,
    pub mapped_fund_name: Option<String>,
    pub transaction_type: TransactionType,
    /// Unsigned unit count; direction comes from `transaction_type`.
    pub units: f64,
    pub price_per_unit: f64,
    /// Unsigned monetary value in `currency`.
    pub value: f64,
    pub currency: String,
    pub sedol: Option<String>,
    pub isin: Option<String>,
    pub reference: Option<String>,
    pub raw_description: Option<String>,
    /// Excluded funds are omitted from portfolio aggregation.
    pub excluded: bool,
}

impl Transaction {
    pub fn is_buy(&self) -> bool {
        self.transaction_type.is_purchase()
    }

    pub fn is_sell(&self) -> bool {
        self.transaction_type.is_sale()
    }

    /// The standardised fund name when one has been applied, the raw name
    /// otherwise.
    pub fn effective_fund_name(&self) -> &str {
        self.mapped_fund_name.as_deref().unwrap_or(&self.fund_name)
    }

    /// True when this transaction belongs to the given fund under either
    /// its raw or mapped name.
    pub fn matches_fund(&self, fund_name: &str) -> bool {
        self.fund_name == fund_name || self.mapped_fund_name.as_deref() == Some(fund_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transaction() -> Transaction {
        Transaction {
            platform: Platform::Fidelity,
            tax_wrapper: TaxWrapper::Isa,
            date: NaiveDate::from_ymd_opt(2023, 1, 16).unwrap(),
            fund_name: "WS Blue Whale Growth Fund".into(),
            mapped_fund_name: None,
            transaction_type: TransactionType::Buy,
            units: 1231.99,
            price_per_unit: 1.62,
            value: 2000.0,
            currency: "GBP".into(),
            sedol: Some("BD6PG78".into()),
            isin: None,
            reference: Some("F123456".into()),
            raw_description: Some("Buy".into()),
            excluded: false,
        }
    }

    #[test]
    fn purchase_and_sale_classification() {
        assert!(TransactionType::Buy.is_purchase());
        assert!(TransactionType::TransferIn.is_purchase());
        assert!(TransactionType::Sell.is_sale());
        assert!(TransactionType::TransferOut.is_sale());
        assert!(!TransactionType::Dividend.is_purchase());
        assert!(!TransactionType::Dividend.is_sale());
        assert!(!TransactionType::Fee.is_sale());
    }

    #[test]
    fn transaction_is_buy() {
        let tx = sample_transaction();
        assert!(tx.is_buy());
        assert!(!tx.is_sell());
    }

    #[test]
    fn effective_fund_name_prefers_mapped() {
        let mut tx = sample_transaction();
        assert_eq!(tx.effective_fund_name(), "WS Blue Whale Growth Fund");
        tx.mapped_fund_name = Some("Blue Whale Growth".into());
        assert_eq!(tx.effective_fund_name(), "Blue Whale Growth");
    }

    #[test]
    fn matches_fund_under_either_name() {
        let mut tx = sample_transaction();
        tx.mapped_fund_name = Some("Blue Whale Growth".into());
        assert!(tx.matches_fund("WS Blue Whale Growth Fund"));
        assert!(tx.matches_fund("Blue Whale Growth"));
        assert!(!tx.matches_fund("Fundsmith Equity"));
    }

    #[test]
    fn platform_db_round_trip() {
        for platform in Platform::all() {
            assert_eq!(Platform::parse(platform.as_db_str()), Some(platform));
        }
        assert_eq!(Platform::parse("fidelity"), Some(Platform::Fidelity));
        assert_eq!(
            Platform::parse("Interactive Investor"),
            Some(Platform::InteractiveInvestor)
        );
        assert_eq!(Platform::parse("VANGUARD"), None);
    }

    #[test]
    fn tax_wrapper_db_round_trip() {
        for wrapper in [
            TaxWrapper::Isa,
            TaxWrapper::Sipp,
            TaxWrapper::Gia,
            TaxWrapper::Other,
        ] {
            assert_eq!(TaxWrapper::parse(wrapper.as_db_str()), Some(wrapper));
        }
        assert_eq!(TaxWrapper::parse("isa"), Some(TaxWrapper::Isa));
        assert_eq!(TaxWrapper::parse("LISA"), None);
    }

    #[test]
    fn transaction_type_db_round_trip() {
        for tx_type in [
            TransactionType::Buy,
            TransactionType::Sell,
            TransactionType::Dividend,
            TransactionType::TransferIn,
            TransactionType::TransferOut,
            TransactionType::Fee,
            TransactionType::Interest,
            TransactionType::Subscription,
            TransactionType::Other,
        ] {
            assert_eq!(TransactionType::parse(tx_type.as_db_str()), Some(tx_type));
        }
        assert_eq!(
            TransactionType::parse("transfer in"),
            Some(TransactionType::TransferIn)
        );
    }
}
