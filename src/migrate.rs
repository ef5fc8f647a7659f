use sha2::{Digest, Sha256};
use sqlx::{Executor, Row, SqlitePool};
use std::collections::HashMap;

use crate::time::now_ms;
use tracing::{error, info};

fn preview(sql: &str) -> String {
    let one_line = sql.replace(['\n', '\t'], " ");
    let trimmed = one_line.trim();
    match trimmed.char_indices().nth(160) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

static MIGRATIONS: &[(&str, &str)] = &[(
    "0001_initial.sql",
    include_str!("../migrations/0001_initial.sql"),
)];

fn clean(raw_sql: &str) -> String {
    raw_sql
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            !(t.is_empty() || t.starts_with("--"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn checksum(cleaned: &str) -> String {
    format!("{:x}", Sha256::digest(cleaned.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MigrationStatus {
    pub version: String,
    pub applied: bool,
}

async fn ensure_ledger(pool: &SqlitePool) -> anyhow::Result<()> {
    pool.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
           version   TEXT PRIMARY KEY,\
           applied_at INTEGER NOT NULL,\
           checksum TEXT NOT NULL\
         )",
    )
    .await?;
    Ok(())
}

async fn applied(pool: &SqlitePool) -> anyhow::Result<HashMap<String, String>> {
    let rows = sqlx::query("SELECT version, checksum FROM schema_migrations")
        .fetch_all(pool)
        .await?;
    let mut applied = HashMap::new();
    for r in rows {
        applied.insert(r.try_get::<String, _>("version")?, r.try_get::<String, _>("checksum")?);
    }
    Ok(applied)
}

/// Apply every embedded migration that has not been recorded yet. Each file
/// runs in its own transaction; an edited, already-applied file is an error.
pub async fn apply_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    ensure_ledger(pool).await?;
    let applied = applied(pool).await?;

    for (filename, raw_sql) in MIGRATIONS {
        let cleaned = clean(raw_sql);
        let checksum = checksum(&cleaned);

        if let Some(stored) = applied.get(*filename) {
            if stored != &checksum {
                anyhow::bail!("migration {} edited after application", filename);
            }
            info!(target: "stocktake", event = "migration_skip_file", file = %filename);
            continue;
        }

        let mut tx = pool.begin().await?;
        for stmt in cleaned.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            info!(target: "stocktake", event = "migration_stmt", file = %filename, sql = %preview(s));
            if let Err(e) = sqlx::query(s).execute(&mut *tx).await {
                error!(target: "stocktake", event = "migration_stmt_error", file = %filename, sql = %preview(s), error = %e);
                return Err(e.into());
            }
        }

        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at, checksum) VALUES (?, ?, ?)",
        )
        .bind(*filename)
        .bind(now_ms())
        .bind(&checksum)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(target: "stocktake", event = "migration_file_applied", file = %filename);
    }

    Ok(())
}

/// Report which embedded migrations are recorded in the ledger.
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<Vec<MigrationStatus>> {
    ensure_ledger(pool).await?;
    let applied = applied(pool).await?;
    Ok(MIGRATIONS
        .iter()
        .map(|(version, _)| MigrationStatus {
            version: version.to_string(),
            applied: applied.contains_key(*version),
        })
        .collect())
}
