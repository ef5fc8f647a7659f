//! Purchase list predicates.
//!
//! Native predicates become part of the list query's WHERE clause. Derived
//! predicates (item count, total cost, remaining cost, status) need the
//! line items aggregated first, so each one is resolved to the set of
//! purchase ids satisfying it and the sets are intersected.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::aggregate::push_id_list;
use super::model::{PurchaseStatus, PURCHASE_INVALID_FILTER};
use crate::time::utc_day_bounds;
use crate::{AppError, AppResult};

const OPERATION: &str = "purchase_filter";

/// Integer comparison against a money amount or a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "camelCase")]
pub enum Comparison {
    Eq(i64),
    Gt(i64),
    Gte(i64),
    Lt(i64),
    Lte(i64),
}

impl Comparison {
    pub fn sql_op(&self) -> &'static str {
        match self {
            Comparison::Eq(_) => "=",
            Comparison::Gt(_) => ">",
            Comparison::Gte(_) => ">=",
            Comparison::Lt(_) => "<",
            Comparison::Lte(_) => "<=",
        }
    }

    pub fn value(&self) -> i64 {
        match *self {
            Comparison::Eq(v)
            | Comparison::Gt(v)
            | Comparison::Gte(v)
            | Comparison::Lt(v)
            | Comparison::Lte(v) => v,
        }
    }

    pub fn matches(&self, actual: i64) -> bool {
        match *self {
            Comparison::Eq(v) => actual == v,
            Comparison::Gt(v) => actual > v,
            Comparison::Gte(v) => actual >= v,
            Comparison::Lt(v) => actual < v,
            Comparison::Lte(v) => actual <= v,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.sql_op(), self.value())
    }
}

/// Parses `5`, `=5`, `>5`, `>=5`, `<5` and `<=5`.
impl FromStr for Comparison {
    type Err = AppError;

    fn from_str(raw: &str) -> AppResult<Self> {
        let s = raw.trim();
        let (ctor, rest): (fn(i64) -> Comparison, &str) = if let Some(rest) = s.strip_prefix(">=") {
            (Comparison::Gte, rest)
        } else if let Some(rest) = s.strip_prefix("<=") {
            (Comparison::Lte, rest)
        } else if let Some(rest) = s.strip_prefix('>') {
            (Comparison::Gt, rest)
        } else if let Some(rest) = s.strip_prefix('<') {
            (Comparison::Lt, rest)
        } else if let Some(rest) = s.strip_prefix('=') {
            (Comparison::Eq, rest)
        } else {
            (Comparison::Eq, s)
        };
        rest.trim().parse::<i64>().map(ctor).map_err(|err| {
            AppError::new(PURCHASE_INVALID_FILTER, "Comparison must look like >=100")
                .with_context("value", raw.to_string())
                .with_context("error", err.to_string())
        })
    }
}

/// Inclusive range of epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: i64,
    pub to: i64,
}

impl DateRange {
    /// The UTC calendar day containing `ms`.
    pub fn day(ms: i64) -> Self {
        let (from, to) = utc_day_bounds(ms);
        DateRange { from, to }
    }
}

/// A predicate over a value derived from line items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedPredicate {
    ItemsCount(Comparison),
    TotalCost(Comparison),
    RemainingCost(Comparison),
}

impl DerivedPredicate {
    fn name(&self) -> &'static str {
        match self {
            DerivedPredicate::ItemsCount(_) => "items_count",
            DerivedPredicate::TotalCost(_) => "total_cost",
            DerivedPredicate::RemainingCost(_) => "remaining_cost",
        }
    }

    fn comparison(&self) -> Comparison {
        match *self {
            DerivedPredicate::ItemsCount(c)
            | DerivedPredicate::TotalCost(c)
            | DerivedPredicate::RemainingCost(c) => c,
        }
    }

    /// Aggregate expression over `purchases p LEFT JOIN purchase_items pi`.
    fn having_expr(&self) -> &'static str {
        match self {
            DerivedPredicate::ItemsCount(_) => "COUNT(pi.id)",
            DerivedPredicate::TotalCost(_) => "COALESCE(SUM(pi.quantity * pi.unit_cost), 0)",
            DerivedPredicate::RemainingCost(_) => {
                "COALESCE(SUM(pi.quantity * pi.unit_cost), 0) - p.paid_amount"
            }
        }
    }
}

/// Every supported purchase list predicate. Absent fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PurchaseFilter {
    pub ids: Option<Vec<String>>,
    pub date: Option<DateRange>,
    /// Case-insensitive substring of the provider's name.
    pub provider_name: Option<String>,
    pub paid_amount: Option<Comparison>,
    pub items_count: Option<Comparison>,
    pub total_cost: Option<Comparison>,
    pub remaining_cost: Option<Comparison>,
    /// Lowered to a remaining-cost comparison.
    pub status: Option<PurchaseStatus>,
}

impl PurchaseFilter {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(range) = self.date {
            if range.from > range.to {
                return Err(
                    AppError::new(PURCHASE_INVALID_FILTER, "Date range starts after it ends")
                        .with_context("from", range.from.to_string())
                        .with_context("to", range.to.to_string()),
                );
            }
        }
        Ok(())
    }

    pub fn derived_predicates(&self) -> Vec<DerivedPredicate> {
        let status = self.status.map(|status| match status {
            PurchaseStatus::Partial => DerivedPredicate::RemainingCost(Comparison::Gt(0)),
            PurchaseStatus::Paid => DerivedPredicate::RemainingCost(Comparison::Lte(0)),
        });
        [
            self.items_count.map(DerivedPredicate::ItemsCount),
            self.total_cost.map(DerivedPredicate::TotalCost),
            self.remaining_cost.map(DerivedPredicate::RemainingCost),
            status,
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn provider_pattern(&self) -> Option<String> {
        let needle = self.provider_name.as_deref()?.trim();
        if needle.is_empty() {
            return None;
        }
        Some(format!("%{}%", escape_like(needle)))
    }

    /// Append this filter's native conditions as `AND ...` clauses. The
    /// query must alias purchases as `p` and providers as `pr`.
    pub(crate) fn push_native_conditions(&self, builder: &mut QueryBuilder<'_, Sqlite>) -> AppResult<()> {
        if let Some(ids) = &self.ids {
            push_id_restriction(builder, ids)?;
        }
        if let Some(range) = self.date {
            builder.push(" AND p.date BETWEEN ");
            builder.push_bind(range.from);
            builder.push(" AND ");
            builder.push_bind(range.to);
        }
        if let Some(pattern) = self.provider_pattern() {
            builder.push(" AND pr.name LIKE ");
            builder.push_bind(pattern);
            builder.push(" ESCAPE '\\'");
        }
        if let Some(cmp) = self.paid_amount {
            builder.push(" AND p.paid_amount ");
            builder.push(cmp.sql_op());
            builder.push(" ");
            builder.push_bind(cmp.value());
        }
        Ok(())
    }
}

pub(crate) fn push_id_restriction(
    builder: &mut QueryBuilder<'_, Sqlite>,
    ids: &[String],
) -> AppResult<()> {
    if ids.is_empty() {
        builder.push(" AND 0");
        return Ok(());
    }
    builder.push(" AND p.id IN ");
    push_id_list(builder, ids)
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Ids of the purchases satisfying one derived predicate. Purchases with no
/// line items take part with a count and total of zero.
pub async fn ids_matching(pool: &SqlitePool, predicate: DerivedPredicate) -> AppResult<Vec<String>> {
    let cmp = predicate.comparison();
    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT p.id FROM purchases p \
         LEFT JOIN purchase_items pi ON pi.purchase_id = p.id \
         GROUP BY p.id HAVING ",
    );
    builder.push(predicate.having_expr());
    builder.push(" ");
    builder.push(cmp.sql_op());
    builder.push(" ");
    builder.push_bind(cmp.value());

    let ids: Vec<String> = builder
        .build_query_scalar()
        .fetch_all(pool)
        .await
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", OPERATION)
                .with_context("predicate", predicate.name())
                .with_context("comparison", cmp.to_string())
        })?;

    tracing::debug!(
        target: "stocktake",
        event = "purchase_filter_ids",
        predicate = predicate.name(),
        comparison = %cmp,
        matched = ids.len()
    );
    Ok(ids)
}

/// Intersect id lists. `None` means no list was supplied, so there is no
/// constraint; `Some` of an empty set means nothing matches.
pub fn intersect_ids<I>(lists: I) -> Option<HashSet<String>>
where
    I: IntoIterator<Item = Vec<String>>,
{
    lists.into_iter().fold(None, |acc, ids| match acc {
        None => Some(ids.into_iter().collect()),
        Some(mut current) => {
            let next: HashSet<String> = ids.into_iter().collect();
            current.retain(|id| next.contains(id));
            Some(current)
        }
    })
}

/// Resolve every derived predicate of `filter` concurrently and intersect
/// the results. Any failing lookup fails the whole resolution.
pub async fn resolve_derived_ids(
    pool: &SqlitePool,
    filter: &PurchaseFilter,
) -> AppResult<Option<HashSet<String>>> {
    let predicates = filter.derived_predicates();
    if predicates.is_empty() {
        return Ok(None);
    }
    let lists = try_join_all(predicates.into_iter().map(|pred| ids_matching(pool, pred))).await?;
    Ok(intersect_ids(lists))
}
