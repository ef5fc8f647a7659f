//! Per-purchase values derived from line items in one grouped query.

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{AppError, AppResult};

const OPERATION: &str = "purchase_aggregates";

/// Line-item totals for one purchase. A purchase without items has the
/// default (zero) aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineAggregate {
    pub items_count: i64,
    pub total_cost: i64,
}

impl LineAggregate {
    pub fn remaining_cost(&self, paid_amount: i64) -> i64 {
        self.total_cost - paid_amount
    }
}

#[derive(sqlx::FromRow)]
struct AggregateRow {
    purchase_id: String,
    items_count: i64,
    total_cost: i64,
}

/// Bind a list of ids as a single JSON array expanded by `json_each`, which
/// keeps the statement independent of SQLite's bound-parameter limit.
pub(crate) fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[String]) -> AppResult<()> {
    let encoded = serde_json::to_string(ids)?;
    builder.push("(SELECT value FROM json_each(");
    builder.push_bind(encoded);
    builder.push("))");
    Ok(())
}

/// Count and cost for each of `ids`. Purchases with no line items are
/// absent from the map; use [`aggregate_for`] to read with the zero default.
pub async fn line_aggregates(
    pool: &SqlitePool,
    ids: &[String],
) -> AppResult<HashMap<String, LineAggregate>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT purchase_id, \
                COUNT(*) AS items_count, \
                COALESCE(SUM(quantity * unit_cost), 0) AS total_cost \
         FROM purchase_items",
    );
    builder.push(" WHERE purchase_id IN ");
    push_id_list(&mut builder, ids)?;
    builder.push(" GROUP BY purchase_id");

    let rows: Vec<AggregateRow> = builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", OPERATION))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            (
                row.purchase_id,
                LineAggregate {
                    items_count: row.items_count,
                    total_cost: row.total_cost,
                },
            )
        })
        .collect())
}

pub fn aggregate_for(aggregates: &HashMap<String, LineAggregate>, purchase_id: &str) -> LineAggregate {
    aggregates.get(purchase_id).copied().unwrap_or_default()
}
