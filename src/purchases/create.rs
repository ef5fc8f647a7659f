use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use super::model::{
    NewLineItem, NewPurchase, ProductRef, ProviderRef, Purchase, PURCHASE_INVALID_INPUT,
    REFERENCE_NOT_FOUND, UNNAMED_PRODUCT,
};
use crate::db::run_in_tx;
use crate::id::new_uuid_v7;
use crate::session::Session;
use crate::time::now_ms;
use crate::{AppError, AppResult};

const OPERATION: &str = "purchase_create";

fn missing(entity: &'static str, id: &str) -> AppError {
    AppError::new(REFERENCE_NOT_FOUND, format!("Referenced {entity} does not exist"))
        .with_context("entity", entity)
        .with_context("id", id.to_string())
}

async fn exists(conn: &mut SqliteConnection, table: &'static str, id: &str) -> AppResult<bool> {
    let sql = format!("SELECT 1 FROM {table} WHERE id = ?");
    let found: Option<i64> = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|err| AppError::from(err).with_context("table", table))?;
    Ok(found.is_some())
}

async fn resolve_provider(conn: &mut SqliteConnection, provider: &ProviderRef, now: i64) -> AppResult<String> {
    match provider {
        ProviderRef::Existing { id } => {
            if !exists(conn, "providers", id).await? {
                return Err(missing("provider", id));
            }
            Ok(id.clone())
        }
        ProviderRef::New {
            name,
            phone,
            address,
        } => {
            let id = new_uuid_v7();
            sqlx::query(
                "INSERT INTO providers (id, name, phone, address, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(name.trim())
            .bind(phone.as_deref())
            .bind(address.as_deref())
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|err| AppError::from(err).with_context("step", "insert_provider"))?;
            tracing::debug!(target: "stocktake", event = "provider_created", provider_id = %id);
            Ok(id)
        }
    }
}

/// Existing id, else the oldest product with the same name, else a new row.
async fn resolve_product(conn: &mut SqliteConnection, product: &ProductRef, now: i64) -> AppResult<String> {
    match product {
        ProductRef::Existing { id } => {
            if !exists(conn, "products", id).await? {
                return Err(missing("product", id));
            }
            Ok(id.clone())
        }
        ProductRef::New { name } => {
            let name = name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(UNNAMED_PRODUCT);
            let existing: Option<String> = sqlx::query_scalar(
                "SELECT id FROM products WHERE name = ? ORDER BY created_at, id LIMIT 1",
            )
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|err| AppError::from(err).with_context("step", "find_product"))?;
            if let Some(id) = existing {
                return Ok(id);
            }

            let id = new_uuid_v7();
            sqlx::query("INSERT INTO products (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
                .bind(&id)
                .bind(name)
                .bind(now)
                .bind(now)
                .execute(&mut *conn)
                .await
                .map_err(|err| AppError::from(err).with_context("step", "insert_product"))?;
            tracing::debug!(target: "stocktake", event = "product_created", product_id = %id);
            Ok(id)
        }
    }
}

/// Find-or-create the batch keyed by (product, production, expiration) and
/// add the received quantity to it. Returns the batch id.
///
/// The update is skipped when the new stock level would leave the i64 range,
/// in which case no row comes back and the line is rejected.
async fn receive_into_batch(
    conn: &mut SqliteConnection,
    product_id: &str,
    item: &NewLineItem,
    now: i64,
) -> AppResult<String> {
    let batch_id: Option<String> = sqlx::query_scalar(
        "INSERT INTO product_batches \
           (id, product_id, production_date, expiration_date, quantity, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (product_id, production_date, expiration_date) \
         DO UPDATE SET quantity = quantity + excluded.quantity, updated_at = excluded.updated_at \
         WHERE product_batches.quantity <= 9223372036854775807 - excluded.quantity \
         RETURNING id",
    )
    .bind(new_uuid_v7())
    .bind(product_id)
    .bind(item.production_date)
    .bind(item.expiration_date)
    .bind(item.quantity)
    .bind(now)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|err| AppError::from(err).with_context("step", "upsert_batch"))?;

    batch_id.ok_or_else(|| {
        AppError::new(PURCHASE_INVALID_INPUT, "Batch quantity would overflow")
            .with_context("step", "upsert_batch")
            .with_context("product_id", product_id.to_string())
            .with_context("quantity", item.quantity.to_string())
    })
}

async fn insert_purchase(
    tx: &mut Transaction<'static, Sqlite>,
    user_id: String,
    input: NewPurchase,
) -> AppResult<Purchase> {
    let conn: &mut SqliteConnection = &mut **tx;
    let now = now_ms();

    if !exists(conn, "users", &user_id).await? {
        return Err(missing("user", &user_id));
    }
    let provider_id = resolve_provider(conn, &input.provider, now).await?;

    let purchase = Purchase {
        id: new_uuid_v7(),
        provider_id,
        user_id,
        date: input.date,
        pay_due_date: input.pay_due_date,
        paid_amount: input.paid_amount,
        created_at: now,
        updated_at: now,
    };
    sqlx::query(
        "INSERT INTO purchases \
           (id, provider_id, user_id, date, pay_due_date, paid_amount, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&purchase.id)
    .bind(&purchase.provider_id)
    .bind(&purchase.user_id)
    .bind(purchase.date)
    .bind(purchase.pay_due_date)
    .bind(purchase.paid_amount)
    .bind(purchase.created_at)
    .bind(purchase.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|err| AppError::from(err).with_context("step", "insert_purchase"))?;

    for (index, item) in input.items.iter().enumerate() {
        let line = |err: AppError| err.with_context("line", index.to_string());
        let product_id = resolve_product(conn, &item.product, now).await.map_err(line)?;
        let batch_id = receive_into_batch(conn, &product_id, item, now)
            .await
            .map_err(line)?;
        sqlx::query(
            "INSERT INTO purchase_items \
               (id, purchase_id, product_id, batch_id, quantity, unit_cost, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new_uuid_v7())
        .bind(&purchase.id)
        .bind(&product_id)
        .bind(&batch_id)
        .bind(item.quantity)
        .bind(item.unit_cost)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|err| line(AppError::from(err).with_context("step", "insert_item")))?;
    }

    Ok(purchase)
}

/// Record a purchase and its line items atomically.
///
/// Providers and products named rather than referenced are created on the
/// fly, and each line's quantity is added to its batch. Any failure,
/// including an explicit id that does not exist, rolls back everything this
/// call wrote.
pub async fn create_purchase(pool: &SqlitePool, session: &Session, input: NewPurchase) -> AppResult<Purchase> {
    input
        .validate()
        .map_err(|err| err.with_context("operation", OPERATION))?;

    let line_count = input.items.len();
    let user_id = session.user_id().to_string();
    let purchase = run_in_tx(pool, move |tx| Box::pin(insert_purchase(tx, user_id, input)))
        .await
        .map_err(|err: AppError| err.with_context("operation", OPERATION))?;

    tracing::info!(
        target: "stocktake",
        event = "purchase_created",
        purchase_id = %purchase.id,
        provider_id = %purchase.provider_id,
        lines = line_count
    );
    Ok(purchase)
}
