#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use stocktake_lib::migrate::apply_migrations;

/// Single-connection in-memory database with the schema applied. The
/// connection is never recycled, so the data lives as long as the pool.
pub async fn temp_pool() -> SqlitePool {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("parse sqlite::memory:")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(opts)
        .await
        .expect("connect sqlite::memory:");
    apply_migrations(&pool).await.expect("apply migrations");
    pool
}

pub async fn seed_user(pool: &SqlitePool, id: &str, username: &str, first: &str, last: &str) {
    sqlx::query(
        "INSERT INTO users (id, username, firstname, lastname, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 0, 0)",
    )
    .bind(id)
    .bind(username)
    .bind(first)
    .bind(last)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_provider(pool: &SqlitePool, id: &str, name: &str) {
    sqlx::query(
        "INSERT INTO providers (id, name, phone, address, created_at, updated_at) \
         VALUES (?, ?, NULL, NULL, 0, 0)",
    )
    .bind(id)
    .bind(name)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_product(pool: &SqlitePool, id: &str, name: &str) {
    sqlx::query("INSERT INTO products (id, name, created_at, updated_at) VALUES (?, ?, 0, 0)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn seed_batch(pool: &SqlitePool, id: &str, product_id: &str) {
    sqlx::query(
        "INSERT INTO product_batches \
           (id, product_id, production_date, expiration_date, quantity, created_at, updated_at) \
         VALUES (?, ?, 0, 0, 0, 0, 0)",
    )
    .bind(id)
    .bind(product_id)
    .execute(pool)
    .await
    .unwrap();
}

/// Base fixture: user `u1` (Ada Lovelace), providers `acme` and `globex`,
/// product `flour` with batch `b1`.
pub async fn seed_base(pool: &SqlitePool) {
    seed_user(pool, "u1", "ada", "Ada", "Lovelace").await;
    seed_provider(pool, "acme", "Acme Supplies").await;
    seed_provider(pool, "globex", "Globex Corp").await;
    seed_product(pool, "flour", "Flour").await;
    seed_batch(pool, "b1", "flour").await;
}

pub struct Fixture<'a> {
    pub id: &'a str,
    pub provider_id: &'a str,
    pub date: i64,
    pub paid_amount: i64,
    pub created_at: i64,
    /// (quantity, unit_cost) per line, all against product `flour` batch `b1`.
    pub items: &'a [(i64, i64)],
}

impl<'a> Fixture<'a> {
    pub fn new(id: &'a str, created_at: i64) -> Self {
        Fixture {
            id,
            provider_id: "acme",
            date: created_at,
            paid_amount: 0,
            created_at,
            items: &[],
        }
    }

    pub fn provider(mut self, provider_id: &'a str) -> Self {
        self.provider_id = provider_id;
        self
    }

    pub fn date(mut self, date: i64) -> Self {
        self.date = date;
        self
    }

    pub fn paid(mut self, paid_amount: i64) -> Self {
        self.paid_amount = paid_amount;
        self
    }

    pub fn items(mut self, items: &'a [(i64, i64)]) -> Self {
        self.items = items;
        self
    }

    pub async fn insert(self, pool: &SqlitePool) {
        sqlx::query(
            "INSERT INTO purchases \
               (id, provider_id, user_id, date, pay_due_date, paid_amount, created_at, updated_at) \
             VALUES (?, ?, 'u1', ?, ?, ?, ?, ?)",
        )
        .bind(self.id)
        .bind(self.provider_id)
        .bind(self.date)
        .bind(self.date)
        .bind(self.paid_amount)
        .bind(self.created_at)
        .bind(self.created_at)
        .execute(pool)
        .await
        .unwrap();
        for (index, (quantity, unit_cost)) in self.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO purchase_items \
                   (id, purchase_id, product_id, batch_id, quantity, unit_cost, created_at) \
                 VALUES (?, ?, 'flour', 'b1', ?, ?, ?)",
            )
            .bind(format!("{}-item-{index}", self.id))
            .bind(self.id)
            .bind(*quantity)
            .bind(*unit_cost)
            .bind(self.created_at + index as i64)
            .execute(pool)
            .await
            .unwrap();
        }
    }
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}
