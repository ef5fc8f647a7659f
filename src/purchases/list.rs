use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::aggregate::{aggregate_for, line_aggregates, LineAggregate};
use super::filter::{push_id_restriction, resolve_derived_ids, PurchaseFilter};
use super::model::{PageRequest, Purchase, PurchasePage, PurchaseStatus, PurchaseSummary};
use super::sort::{PurchaseSort, DEFAULT_ORDER};
use crate::{AppError, AppResult};

const OPERATION: &str = "purchase_list";

const SELECT_COLUMNS: &str = "SELECT p.id, p.provider_id, p.user_id, p.date, p.pay_due_date, \
     p.paid_amount, p.created_at, p.updated_at, \
     pr.name AS provider_name, \
     u.firstname || ' ' || u.lastname AS purchased_by";

const FROM_JOINS: &str = " FROM purchases p \
     JOIN providers pr ON pr.id = p.provider_id \
     JOIN users u ON u.id = p.user_id";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PurchaseListRequest {
    pub page: PageRequest,
    pub sort: Option<PurchaseSort>,
    pub filter: PurchaseFilter,
}

#[derive(Debug, sqlx::FromRow)]
struct PurchaseListRow {
    #[sqlx(flatten)]
    purchase: Purchase,
    provider_name: String,
    purchased_by: String,
}

fn summarize(row: PurchaseListRow, aggregates: &HashMap<String, LineAggregate>) -> PurchaseSummary {
    let aggregate = aggregate_for(aggregates, &row.purchase.id);
    let remaining_cost = aggregate.remaining_cost(row.purchase.paid_amount);
    PurchaseSummary {
        purchased_by: row.purchased_by,
        provider_name: row.provider_name,
        items_count: aggregate.items_count,
        total_cost: aggregate.total_cost,
        remaining_cost,
        status: PurchaseStatus::from_remaining(remaining_cost),
        purchase: row.purchase,
    }
}

fn push_where(
    builder: &mut QueryBuilder<'_, Sqlite>,
    filter: &PurchaseFilter,
    restricted: Option<&[String]>,
) -> AppResult<()> {
    builder.push(" WHERE 1 = 1");
    filter.push_native_conditions(builder)?;
    if let Some(ids) = restricted {
        push_id_restriction(builder, ids)?;
    }
    Ok(())
}

async fn count_matching(
    pool: &SqlitePool,
    filter: &PurchaseFilter,
    restricted: Option<&[String]>,
) -> AppResult<i64> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
    builder.push(FROM_JOINS);
    push_where(&mut builder, filter, restricted)?;
    builder
        .build_query_scalar()
        .fetch_one(pool)
        .await
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", OPERATION)
                .with_context("step", "count")
        })
}

/// One page of purchase summaries plus the number of purchases matching the
/// filter.
///
/// Sorts on stored or joined columns (and on item count) are executed by
/// SQLite together with `LIMIT`/`OFFSET`. Sorts on total cost, remaining
/// cost or status load every matching purchase, aggregate them all, sort
/// in memory and slice the requested page.
pub async fn list_purchases(pool: &SqlitePool, request: &PurchaseListRequest) -> AppResult<PurchasePage> {
    request.page.validate()?;
    request.filter.validate()?;

    let restricted = resolve_derived_ids(pool, &request.filter)
        .await
        .map_err(|err| err.with_context("operation", OPERATION))?;
    let restricted: Option<Vec<String>> = restricted.map(|ids| {
        let mut ids: Vec<String> = ids.into_iter().collect();
        ids.sort();
        ids
    });
    if restricted.as_ref().is_some_and(|ids| ids.is_empty()) {
        tracing::debug!(target: "stocktake", event = "purchase_list_empty_intersection");
        return Ok(PurchasePage::empty());
    }

    let sort = request.sort;
    let computed = sort.is_some_and(|s| s.is_computed());
    let offset = request.page.offset();
    let limit = request.page.limit();

    let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
    builder.push(FROM_JOINS);
    push_where(&mut builder, &request.filter, restricted.as_deref())?;
    builder.push(" ORDER BY ");
    match sort.and_then(|s| s.order_by_sql()) {
        Some(order) => {
            builder.push(order);
        }
        None => {
            builder.push(DEFAULT_ORDER);
        }
    }
    if !computed {
        builder.push(" LIMIT ");
        builder.push_bind(limit as i64);
        builder.push(" OFFSET ");
        builder.push_bind(offset as i64);
    }

    let rows: Vec<PurchaseListRow> = builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", OPERATION)
                .with_context("step", "select")
        })?;

    let ids: Vec<String> = rows.iter().map(|row| row.purchase.id.clone()).collect();
    let aggregates = line_aggregates(pool, &ids)
        .await
        .map_err(|err| err.with_context("step", "aggregate"))?;
    let mut data: Vec<PurchaseSummary> = rows
        .into_iter()
        .map(|row| summarize(row, &aggregates))
        .collect();

    let total = match sort {
        Some(sort) if computed => {
            let total = data.len() as i64;
            sort.sort_in_memory(&mut data);
            data = data.into_iter().skip(offset).take(limit).collect();
            total
        }
        _ => count_matching(pool, &request.filter, restricted.as_deref()).await?,
    };

    tracing::info!(
        target: "stocktake",
        event = "purchase_list",
        page = request.page.page,
        page_size = request.page.page_size,
        sort = ?sort.map(|s| s.key),
        in_memory = computed,
        returned = data.len(),
        total
    );

    Ok(PurchasePage { data, total })
}
