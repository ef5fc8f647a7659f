use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

pub const PURCHASE_INVALID_SORT: &str = "PURCHASE/INVALID_SORT";
pub const PURCHASE_INVALID_PAGE: &str = "PURCHASE/INVALID_PAGE";
pub const PURCHASE_INVALID_FILTER: &str = "PURCHASE/INVALID_FILTER";
pub const PURCHASE_INVALID_INPUT: &str = "PURCHASE/INVALID_INPUT";
pub const PURCHASE_NOT_FOUND: &str = "PURCHASE/NOT_FOUND";
/// An explicit id supplied by the caller does not exist.
pub const REFERENCE_NOT_FOUND: &str = "REFERENCE/NOT_FOUND";

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const UNNAMED_PRODUCT: &str = "Unnamed Product";

/// A stored purchase row. Money is in integer minor units, dates in epoch ms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: String,
    pub provider_id: String,
    pub user_id: String,
    pub date: i64,
    pub pay_due_date: i64,
    pub paid_amount: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PurchaseStatus {
    Paid,
    Partial,
}

impl PurchaseStatus {
    /// Anything still owed is `Partial`; zero or an overpayment is `Paid`.
    pub fn from_remaining(remaining_cost: i64) -> Self {
        if remaining_cost > 0 {
            PurchaseStatus::Partial
        } else {
            PurchaseStatus::Paid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Paid => "Paid",
            PurchaseStatus::Partial => "Partial",
        }
    }
}

impl std::str::FromStr for PurchaseStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> AppResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "paid" => Ok(PurchaseStatus::Paid),
            "partial" => Ok(PurchaseStatus::Partial),
            _ => Err(
                AppError::new(PURCHASE_INVALID_FILTER, "Status must be Paid or Partial")
                    .with_context("status", raw.to_string()),
            ),
        }
    }
}

/// One row of the purchase list: the stored purchase plus joined names and
/// the values derived from its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseSummary {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub purchased_by: String,
    pub provider_name: String,
    pub items_count: i64,
    pub total_cost: i64,
    pub remaining_cost: i64,
    pub status: PurchaseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasePage {
    pub data: Vec<PurchaseSummary>,
    pub total: i64,
}

impl PurchasePage {
    pub fn empty() -> Self {
        PurchasePage {
            data: Vec::new(),
            total: 0,
        }
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        PageRequest { page, page_size }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.page == 0 {
            return Err(AppError::new(PURCHASE_INVALID_PAGE, "Pages are numbered from 1")
                .with_context("page", self.page.to_string()));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(
                AppError::new(PURCHASE_INVALID_PAGE, "Page size is out of range")
                    .with_context("page_size", self.page_size.to_string())
                    .with_context("max", MAX_PAGE_SIZE.to_string()),
            );
        }
        Ok(())
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.page_size as usize
    }

    pub fn limit(&self) -> usize {
        self.page_size as usize
    }
}

/// A line item joined with its product and batch, for invoice display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LineItemDetail {
    pub id: String,
    pub purchase_id: String,
    pub product_id: String,
    pub product_name: String,
    pub batch_id: String,
    pub production_date: i64,
    pub expiration_date: i64,
    pub batch_quantity: i64,
    pub quantity: i64,
    pub unit_cost: i64,
    pub line_total: i64,
    pub created_at: i64,
}

/// Minimal projection used to populate purchase pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOption {
    pub id: String,
    pub provider_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProviderRef {
    Existing {
        id: String,
    },
    New {
        name: String,
        #[serde(default)]
        phone: Option<String>,
        #[serde(default)]
        address: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProductRef {
    Existing {
        id: String,
    },
    /// Reuses a product with exactly this name when one exists.
    New {
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLineItem {
    pub product: ProductRef,
    pub quantity: i64,
    pub unit_cost: i64,
    pub production_date: i64,
    pub expiration_date: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPurchase {
    pub provider: ProviderRef,
    pub date: i64,
    pub pay_due_date: i64,
    pub paid_amount: i64,
    pub items: Vec<NewLineItem>,
}

impl NewPurchase {
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |message: &str| AppError::new(PURCHASE_INVALID_INPUT, message.to_string());

        if self.items.is_empty() {
            return Err(invalid("A purchase needs at least one line item"));
        }
        if self.paid_amount < 0 {
            return Err(invalid("Paid amount cannot be negative")
                .with_context("paid_amount", self.paid_amount.to_string()));
        }
        match &self.provider {
            ProviderRef::Existing { id } if id.trim().is_empty() => {
                return Err(invalid("Provider id cannot be blank"));
            }
            ProviderRef::New { name, .. } if name.trim().is_empty() => {
                return Err(invalid("A new provider needs a name"));
            }
            _ => {}
        }
        let mut total_cost: i64 = 0;
        for (index, item) in self.items.iter().enumerate() {
            if item.quantity <= 0 {
                return Err(invalid("Quantity must be positive")
                    .with_context("line", index.to_string())
                    .with_context("quantity", item.quantity.to_string()));
            }
            if item.unit_cost < 0 {
                return Err(invalid("Unit cost cannot be negative")
                    .with_context("line", index.to_string())
                    .with_context("unit_cost", item.unit_cost.to_string()));
            }
            if let ProductRef::Existing { id } = &item.product {
                if id.trim().is_empty() {
                    return Err(invalid("Product id cannot be blank")
                        .with_context("line", index.to_string()));
                }
            }
            // Totals must stay integers when SQLite sums them.
            total_cost = item
                .quantity
                .checked_mul(item.unit_cost)
                .and_then(|line_total| total_cost.checked_add(line_total))
                .ok_or_else(|| {
                    invalid("Purchase total is too large")
                        .with_context("line", index.to_string())
                        .with_context("quantity", item.quantity.to_string())
                        .with_context("unit_cost", item.unit_cost.to_string())
                })?;
        }
        Ok(())
    }
}

/// Fields of a stored purchase that may be edited after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseUpdate {
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub date: Option<i64>,
    #[serde(default)]
    pub pay_due_date: Option<i64>,
    #[serde(default)]
    pub paid_amount: Option<i64>,
}

impl PurchaseUpdate {
    pub fn is_empty(&self) -> bool {
        self.provider_id.is_none()
            && self.date.is_none()
            && self.pay_due_date.is_none()
            && self.paid_amount.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn line(quantity: i64, unit_cost: i64) -> NewLineItem {
        NewLineItem {
            product: ProductRef::New {
                name: Some("Flour".into()),
            },
            quantity,
            unit_cost,
            production_date: 0,
            expiration_date: 1,
        }
    }

    fn purchase(items: Vec<NewLineItem>) -> NewPurchase {
        NewPurchase {
            provider: ProviderRef::Existing { id: "prov".into() },
            date: 0,
            pay_due_date: 0,
            paid_amount: 0,
            items,
        }
    }

    #[test]
    fn status_follows_remaining_sign() {
        assert_eq!(PurchaseStatus::from_remaining(1), PurchaseStatus::Partial);
        assert_eq!(PurchaseStatus::from_remaining(0), PurchaseStatus::Paid);
        assert_eq!(PurchaseStatus::from_remaining(-250), PurchaseStatus::Paid);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("partial".parse::<PurchaseStatus>().unwrap(), PurchaseStatus::Partial);
        assert_eq!(" PAID ".parse::<PurchaseStatus>().unwrap(), PurchaseStatus::Paid);
        let err = "overdue".parse::<PurchaseStatus>().unwrap_err();
        assert_eq!(err.code(), PURCHASE_INVALID_FILTER);
    }

    #[test]
    fn page_request_bounds() {
        assert!(PageRequest::new(1, 10).validate().is_ok());
        assert_eq!(
            PageRequest::new(0, 10).validate().unwrap_err().code(),
            PURCHASE_INVALID_PAGE
        );
        assert_eq!(
            PageRequest::new(1, MAX_PAGE_SIZE + 1).validate().unwrap_err().code(),
            PURCHASE_INVALID_PAGE
        );
        assert_eq!(PageRequest::new(3, 10).offset(), 20);
    }

    #[test]
    fn new_purchase_validation() {
        assert!(purchase(vec![line(1, 100)]).validate().is_ok());
        assert_eq!(
            purchase(vec![]).validate().unwrap_err().code(),
            PURCHASE_INVALID_INPUT
        );
        let err = purchase(vec![line(1, 100), line(0, 100)]).validate().unwrap_err();
        assert_eq!(err.context().get("line"), Some(&"1".to_string()));
        assert!(purchase(vec![line(2, -1)]).validate().is_err());

        let err = purchase(vec![line(4_000_000_000, 4_000_000_000)]).validate().unwrap_err();
        assert_eq!(err.code(), PURCHASE_INVALID_INPUT);
        let half = i64::MAX / 2 + 1;
        let err = purchase(vec![line(1, half), line(1, half)]).validate().unwrap_err();
        assert_eq!(err.context().get("line"), Some(&"1".to_string()));
        assert!(purchase(vec![line(1, i64::MAX)]).validate().is_ok());

        let mut blank_provider = purchase(vec![line(1, 1)]);
        blank_provider.provider = ProviderRef::New {
            name: "  ".into(),
            phone: None,
            address: None,
        };
        assert!(blank_provider.validate().is_err());
    }

    #[test]
    fn summary_serializes_flat_camel_case() {
        let summary = PurchaseSummary {
            purchase: Purchase {
                id: "p1".into(),
                provider_id: "prov".into(),
                user_id: "u1".into(),
                date: 1,
                pay_due_date: 2,
                paid_amount: 300,
                created_at: 3,
                updated_at: 4,
            },
            purchased_by: "Ada Lovelace".into(),
            provider_name: "Acme".into(),
            items_count: 2,
            total_cost: 500,
            remaining_cost: 200,
            status: PurchaseStatus::Partial,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["id"], json!("p1"));
        assert_eq!(value["paidAmount"], json!(300));
        assert_eq!(value["itemsCount"], json!(2));
        assert_eq!(value["remainingCost"], json!(200));
        assert_eq!(value["status"], json!("Partial"));
    }

    #[test]
    fn new_purchase_deserializes_tagged_refs() {
        let input: NewPurchase = serde_json::from_value(json!({
            "provider": { "kind": "new", "name": "Acme", "phone": "555" },
            "date": 10,
            "payDueDate": 20,
            "paidAmount": 0,
            "items": [
                { "product": { "kind": "existing", "id": "prod-1" },
                  "quantity": 2, "unitCost": 150, "productionDate": 1, "expirationDate": 2 },
                { "product": { "kind": "new" },
                  "quantity": 1, "unitCost": 99, "productionDate": 1, "expirationDate": 2 }
            ]
        }))
        .unwrap();
        assert!(matches!(input.provider, ProviderRef::New { ref name, .. } if name == "Acme"));
        assert_eq!(input.items[1].product, ProductRef::New { name: None });
    }
}
