use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionCategory {
    Asset,
    Liability,
    Equity,
}

impl PositionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionCategory::Asset => "asset",
            PositionCategory::Liability => "liability",
            PositionCategory::Equity => "equity",
        }
    }
}

impl fmt::Display for PositionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "asset" => Ok(PositionCategory::Asset),
            "liability" => Ok(PositionCategory::Liability),
            "equity" => Ok(PositionCategory::Equity),
            other => Err(format!("unknown position category '{}'", other)),
        }
    }
}

/// One entry of the externally governed taxonomy of standardized positions.
///
/// Codes are stable identifiers; the pipeline only ever references them and
/// never creates or edits entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionType {
    pub code: String,
    pub description: String,
    pub category: PositionCategory,
}

impl PositionType {
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        category: PositionCategory,
    ) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            category,
        }
    }
}

/// An immutable snapshot of the taxonomy, keyed by code.
///
/// Every pipeline run takes exactly one snapshot and passes it to each stage
/// that needs it, so a run stays internally consistent even if the stored
/// taxonomy is updated concurrently. Iteration order is code order, which
/// keeps prompts deterministic for identical taxonomy state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    entries: BTreeMap<String, PositionType>,
}

impl Taxonomy {
    /// Build a snapshot from a list of entries. Codes are unique across the
    /// taxonomy; if a duplicate slips in, the first entry wins.
    pub fn from_entries(entries: impl IntoIterator<Item = PositionType>) -> Self {
        let mut map = BTreeMap::new();
        for entry in entries {
            map.entry(entry.code.clone()).or_insert(entry);
        }
        Self { entries: map }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    pub fn get(&self, code: &str) -> Option<&PositionType> {
        self.entries.get(code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in stable code order.
    pub fn iter(&self) -> impl Iterator<Item = &PositionType> {
        self.entries.values()
    }

    /// The standard catalog of balance sheet position codes. This is the
    /// administrative seed; at runtime the governing taxonomy is whatever the
    /// store holds.
    pub fn standard() -> Self {
        let assets: &[(&str, &str)] = &[
            ("cash_and_equivalents", "Cash, Cash and Cash Equivalents, etc."),
            ("short_term_investments", "Marketable Securities, Short-term Investments, etc."),
            ("accounts_receivable", "Accounts Receivable, Trade Receivables, etc."),
            ("inventory", "Inventory, Merchandise, etc."),
            ("prepaid_expenses", "Prepaid Expenses, Prepayments, etc."),
            ("other_current_assets", "Other Current Assets, etc."),
            ("ppe_gross", "Property Plant and Equipment, Fixed Assets, etc. (gross)"),
            ("accumulated_depreciation", "Accumulated Depreciation, etc."),
            ("ppe_net", "Property Plant and Equipment, Fixed Assets, etc. (net)"),
            ("intangible_assets", "Intangible Assets, Patents, Trademarks, etc."),
            ("goodwill", "Goodwill"),
            ("long_term_investments", "Long-term Investments, etc."),
            ("deferred_tax_assets", "Deferred Tax Assets, etc."),
            ("other_non_current_assets", "Other Non-current Assets, etc."),
            ("other_assets", "Other Assets, etc."),
        ];
        let liabilities: &[(&str, &str)] = &[
            ("accounts_payable", "Accounts Payable, Trade Payables, etc."),
            ("short_term_debt", "Short-term Debt, Short-term Loans, etc."),
            ("current_portion_lt_debt", "Current Portion of Long-term Debt, etc."),
            ("accrued_expenses", "Accrued Expenses, Accrued Liabilities, etc."),
            ("deferred_revenue", "Deferred Revenue, Unearned Revenue, etc."),
            ("income_tax_payable", "Income Tax Payable, Tax Liabilities, etc."),
            ("other_current_liabilities", "Other Current Liabilities, etc."),
            ("long_term_debt", "Long-term Debt, Long-term Loans, etc."),
            ("deferred_tax_liability", "Deferred Tax Liability, etc."),
            ("pension_obligations", "Pension Obligations, Retirement Benefits, etc."),
            ("other_non_current_liabilities", "Other Non-current Liabilities, etc."),
            ("other_liabilities", "Other Liabilities, etc."),
        ];
        let equity: &[(&str, &str)] = &[
            ("common_stock", "Common Stock, Share Capital, etc."),
            ("preferred_stock", "Preferred Stock, Preference Shares, etc."),
            ("additional_paid_capital", "Additional Paid-in Capital, Share Premium, etc."),
            ("treasury_stock", "Treasury Stock, Treasury Shares, etc."),
            ("retained_earnings", "Retained Earnings, Accumulated Profits, etc."),
            ("accumulated_oci", "Accumulated Other Comprehensive Income, etc."),
            ("non_controlling_interest", "Non-controlling Interest, Minority Interest, etc."),
            ("other_equity", "Other Equity, etc."),
        ];

        let mut entries = Vec::new();
        for &(code, description) in assets {
            entries.push(PositionType::new(code, description, PositionCategory::Asset));
        }
        for &(code, description) in liabilities {
            entries.push(PositionType::new(code, description, PositionCategory::Liability));
        }
        for &(code, description) in equity {
            entries.push(PositionType::new(code, description, PositionCategory::Equity));
        }

        Self::from_entries(entries)
    }
}

/// Read access to the governing taxonomy. Implemented by the storage layer;
/// a failure here is fatal to a pipeline run, since there is no meaningful
/// extraction without a governing taxonomy.
pub trait TaxonomyProvider: Send + Sync {
    fn load_taxonomy(&self) -> Result<Taxonomy>;
}

impl<T: TaxonomyProvider + ?Sized> TaxonomyProvider for std::sync::Arc<T> {
    fn load_taxonomy(&self) -> Result<Taxonomy> {
        (**self).load_taxonomy()
    }
}
