use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::model::{
    LineItemDetail, Purchase, PurchaseOption, PurchaseUpdate, PURCHASE_INVALID_INPUT,
    PURCHASE_NOT_FOUND, REFERENCE_NOT_FOUND,
};
use crate::time::now_ms;
use crate::{AppError, AppResult};

const PURCHASE_COLUMNS: &str =
    "id, provider_id, user_id, date, pay_due_date, paid_amount, created_at, updated_at";

fn not_found(id: &str) -> AppError {
    AppError::new(PURCHASE_NOT_FOUND, "Purchase not found").with_context("id", id.to_string())
}

pub async fn get_purchase(pool: &SqlitePool, id: &str) -> AppResult<Option<Purchase>> {
    let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = ?");
    sqlx::query_as::<_, Purchase>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "purchase_get")
                .with_context("id", id.to_string())
        })
}

/// Apply the present fields of `update`. An empty update writes nothing and
/// returns the stored purchase.
pub async fn update_purchase(pool: &SqlitePool, id: &str, update: &PurchaseUpdate) -> AppResult<Purchase> {
    let ctx = |err: AppError| {
        err.with_context("operation", "purchase_update")
            .with_context("id", id.to_string())
    };

    if update.is_empty() {
        return get_purchase(pool, id).await?.ok_or_else(|| ctx(not_found(id)));
    }
    if let Some(paid) = update.paid_amount {
        if paid < 0 {
            return Err(ctx(AppError::new(
                PURCHASE_INVALID_INPUT,
                "Paid amount cannot be negative",
            )
            .with_context("paid_amount", paid.to_string())));
        }
    }
    if let Some(provider_id) = &update.provider_id {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM providers WHERE id = ?")
            .bind(provider_id)
            .fetch_optional(pool)
            .await
            .map_err(|err| ctx(AppError::from(err)))?;
        if found.is_none() {
            return Err(ctx(AppError::new(
                REFERENCE_NOT_FOUND,
                "Referenced provider does not exist",
            )
            .with_context("entity", "provider")
            .with_context("provider_id", provider_id.clone())));
        }
    }

    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE purchases SET ");
    let mut set = builder.separated(", ");
    set.push("updated_at = ").push_bind_unseparated(now_ms());
    if let Some(provider_id) = &update.provider_id {
        set.push("provider_id = ").push_bind_unseparated(provider_id.clone());
    }
    if let Some(date) = update.date {
        set.push("date = ").push_bind_unseparated(date);
    }
    if let Some(due) = update.pay_due_date {
        set.push("pay_due_date = ").push_bind_unseparated(due);
    }
    if let Some(paid) = update.paid_amount {
        set.push("paid_amount = ").push_bind_unseparated(paid);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id.to_string());

    let res = builder
        .build()
        .execute(pool)
        .await
        .map_err(|err| ctx(AppError::from(err)))?;
    if res.rows_affected() == 0 {
        return Err(ctx(not_found(id)));
    }

    get_purchase(pool, id).await?.ok_or_else(|| ctx(not_found(id)))
}

/// Delete a purchase; its line items go with it. Batch quantities already
/// received are left as they are.
pub async fn delete_purchase(pool: &SqlitePool, id: &str) -> AppResult<()> {
    let res = sqlx::query("DELETE FROM purchases WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "purchase_delete")
                .with_context("id", id.to_string())
        })?;
    if res.rows_affected() == 0 {
        return Err(not_found(id).with_context("operation", "purchase_delete"));
    }
    tracing::info!(target: "stocktake", event = "purchase_deleted", purchase_id = %id);
    Ok(())
}

pub async fn get_purchase_line_items(pool: &SqlitePool, purchase_id: &str) -> AppResult<Vec<LineItemDetail>> {
    sqlx::query_as::<_, LineItemDetail>(
        "SELECT pi.id, pi.purchase_id, pi.product_id, pr.name AS product_name, \
                pi.batch_id, b.production_date, b.expiration_date, b.quantity AS batch_quantity, \
                pi.quantity, pi.unit_cost, pi.quantity * pi.unit_cost AS line_total, pi.created_at \
         FROM purchase_items pi \
         JOIN products pr ON pr.id = pi.product_id \
         JOIN product_batches b ON b.id = pi.batch_id \
         WHERE pi.purchase_id = ? \
         ORDER BY pi.created_at, pi.rowid",
    )
    .bind(purchase_id)
    .fetch_all(pool)
    .await
    .map_err(|err| {
        AppError::from(err)
            .with_context("operation", "purchase_line_items")
            .with_context("purchase_id", purchase_id.to_string())
    })
}

/// Id and provider name of every purchase, oldest first.
pub async fn purchase_options(pool: &SqlitePool) -> AppResult<Vec<PurchaseOption>> {
    sqlx::query_as::<_, PurchaseOption>(
        "SELECT p.id, pr.name AS provider_name \
         FROM purchases p JOIN providers pr ON pr.id = p.provider_id \
         ORDER BY p.created_at, p.id",
    )
    .fetch_all(pool)
    .await
    .map_err(|err| AppError::from(err).with_context("operation", "purchase_options"))
}
