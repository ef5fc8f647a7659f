use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{PurchaseSummary, PURCHASE_INVALID_SORT};
use crate::AppError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SortError {
    #[error("unknown sort property: {0}")]
    UnknownProperty(String),
    #[error("unknown sort direction: {0}")]
    UnknownDirection(String),
}

impl From<SortError> for AppError {
    fn from(err: SortError) -> Self {
        let (field, value) = match &err {
            SortError::UnknownProperty(value) => ("order_property", value.clone()),
            SortError::UnknownDirection(value) => ("order_direction", value.clone()),
        };
        AppError::new(PURCHASE_INVALID_SORT, err.to_string()).with_context(field, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PurchaseSortKey {
    Date,
    PayDueDate,
    PaidAmount,
    CreatedAt,
    ProviderName,
    PurchasedBy,
    ItemsCount,
    TotalCost,
    RemainingCost,
    Status,
}

impl PurchaseSortKey {
    /// Keys whose value only exists after aggregation in memory. Sorting by
    /// them means fetching every matching purchase and paginating here.
    pub fn is_computed(self) -> bool {
        matches!(
            self,
            PurchaseSortKey::TotalCost | PurchaseSortKey::RemainingCost | PurchaseSortKey::Status
        )
    }

    /// Columns the storage engine orders by when the sort is pushed down.
    fn sql_columns(self) -> Option<&'static [&'static str]> {
        let columns: &'static [&'static str] = match self {
            PurchaseSortKey::Date => &["p.date"],
            PurchaseSortKey::PayDueDate => &["p.pay_due_date"],
            PurchaseSortKey::PaidAmount => &["p.paid_amount"],
            PurchaseSortKey::CreatedAt => &["p.created_at"],
            PurchaseSortKey::ProviderName => &["pr.name"],
            PurchaseSortKey::PurchasedBy => &["u.firstname", "u.lastname"],
            PurchaseSortKey::ItemsCount => {
                &["(SELECT COUNT(*) FROM purchase_items pi WHERE pi.purchase_id = p.id)"]
            }
            PurchaseSortKey::TotalCost | PurchaseSortKey::RemainingCost | PurchaseSortKey::Status => {
                return None
            }
        };
        Some(columns)
    }
}

impl FromStr for PurchaseSortKey {
    type Err = SortError;

    /// Accepts the camelCase names used by list callers and their snake_case
    /// spellings.
    fn from_str(raw: &str) -> Result<Self, SortError> {
        let key = match raw.trim() {
            "date" => PurchaseSortKey::Date,
            "payDueDate" | "pay_due_date" => PurchaseSortKey::PayDueDate,
            "paidAmount" | "paid_amount" => PurchaseSortKey::PaidAmount,
            "createdAt" | "created_at" => PurchaseSortKey::CreatedAt,
            "providerName" | "provider_name" => PurchaseSortKey::ProviderName,
            "purchasedBy" | "purchased_by" => PurchaseSortKey::PurchasedBy,
            "itemsCount" | "items_count" => PurchaseSortKey::ItemsCount,
            "totalCost" | "total_cost" => PurchaseSortKey::TotalCost,
            "remainingCost" | "remaining_cost" => PurchaseSortKey::RemainingCost,
            "status" => PurchaseSortKey::Status,
            _ => return Err(SortError::UnknownProperty(raw.to_string())),
        };
        Ok(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = SortError;

    fn from_str(raw: &str) -> Result<Self, SortError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(SortError::UnknownDirection(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseSort {
    pub key: PurchaseSortKey,
    pub direction: SortDirection,
}

/// Insertion order; also the tie-break appended to every explicit ordering.
pub(crate) const DEFAULT_ORDER: &str = "p.created_at ASC, p.id ASC";

impl PurchaseSort {
    pub fn new(key: PurchaseSortKey, direction: SortDirection) -> Self {
        PurchaseSort { key, direction }
    }

    /// Build a sort from loosely typed caller input. Both parts must be
    /// present for an explicit sort; either part alone means the default
    /// order. Anything present must still be valid.
    pub fn parse(
        order_property: Option<&str>,
        order_direction: Option<&str>,
    ) -> Result<Option<Self>, SortError> {
        let key = order_property.map(str::parse::<PurchaseSortKey>).transpose()?;
        let direction = order_direction.map(str::parse::<SortDirection>).transpose()?;
        Ok(match (key, direction) {
            (Some(key), Some(direction)) => Some(PurchaseSort { key, direction }),
            _ => None,
        })
    }

    pub fn is_computed(&self) -> bool {
        self.key.is_computed()
    }

    /// `ORDER BY` body for a pushed-down sort, or `None` for computed keys.
    pub(crate) fn order_by_sql(&self) -> Option<String> {
        let columns = self.key.sql_columns()?;
        let dir = self.direction.sql();
        let mut parts: Vec<String> = columns.iter().map(|col| format!("{col} {dir}")).collect();
        parts.push(DEFAULT_ORDER.to_string());
        Some(parts.join(", "))
    }

    fn compare(&self, a: &PurchaseSummary, b: &PurchaseSummary) -> Ordering {
        let ordering = match self.key {
            PurchaseSortKey::TotalCost => a.total_cost.cmp(&b.total_cost),
            PurchaseSortKey::RemainingCost => a.remaining_cost.cmp(&b.remaining_cost),
            PurchaseSortKey::Status => a.status.cmp(&b.status),
            PurchaseSortKey::Date => a.purchase.date.cmp(&b.purchase.date),
            PurchaseSortKey::PayDueDate => a.purchase.pay_due_date.cmp(&b.purchase.pay_due_date),
            PurchaseSortKey::PaidAmount => a.purchase.paid_amount.cmp(&b.purchase.paid_amount),
            PurchaseSortKey::CreatedAt => a.purchase.created_at.cmp(&b.purchase.created_at),
            PurchaseSortKey::ProviderName => a.provider_name.cmp(&b.provider_name),
            PurchaseSortKey::PurchasedBy => a.purchased_by.cmp(&b.purchased_by),
            PurchaseSortKey::ItemsCount => a.items_count.cmp(&b.items_count),
        };
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }

    /// Stable in-memory sort: rows with equal keys keep their incoming order
    /// in both directions, so page boundaries are deterministic.
    pub fn sort_in_memory(&self, rows: &mut [PurchaseSummary]) {
        rows.sort_by(|a, b| self.compare(a, b));
    }
}
