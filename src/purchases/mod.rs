//! Purchases: listing with derived totals, creation, and the smaller
//! read/update/delete operations around them.

pub mod aggregate;
pub mod create;
pub mod filter;
pub mod list;
pub mod model;
pub mod repo;
pub mod sort;

pub use create::create_purchase;
pub use filter::{Comparison, DateRange, PurchaseFilter};
pub use list::{list_purchases, PurchaseListRequest};
pub use model::{
    LineItemDetail, NewLineItem, NewPurchase, PageRequest, ProductRef, ProviderRef, Purchase,
    PurchaseOption, PurchasePage, PurchaseStatus, PurchaseSummary, PurchaseUpdate,
};
pub use repo::{
    delete_purchase, get_purchase, get_purchase_line_items, purchase_options, update_purchase,
};
pub use sort::{PurchaseSort, PurchaseSortKey, SortDirection};
