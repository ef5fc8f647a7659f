use anyhow::Result;
use stocktake_lib::db::run_in_tx;

#[path = "util.rs"]
mod util;

#[tokio::test]
async fn commit_happy_path() -> Result<()> {
    let pool = util::temp_pool().await;
    sqlx::query("CREATE TABLE t (val TEXT UNIQUE);")
        .execute(&pool)
        .await?;
    run_in_tx(&pool, |tx| {
        Box::pin(async move {
            sqlx::query("INSERT INTO t (val) VALUES ('ok');")
                .execute(&mut **tx)
                .await?;
            Ok::<_, anyhow::Error>(())
        })
    })
    .await?;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t;")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 1);
    Ok(())
}

#[tokio::test]
async fn rollback_on_unique_violation() -> Result<()> {
    let pool = util::temp_pool().await;
    sqlx::query("CREATE TABLE t (val TEXT UNIQUE);")
        .execute(&pool)
        .await?;
    let res = run_in_tx(&pool, |tx| {
        Box::pin(async move {
            sqlx::query("INSERT INTO t (val) VALUES ('dup');")
                .execute(&mut **tx)
                .await?;
            sqlx::query("INSERT INTO t (val) VALUES ('dup');")
                .execute(&mut **tx)
                .await?;
            Ok::<_, anyhow::Error>(())
        })
    })
    .await;
    assert!(res.is_err());
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t;")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 0);
    Ok(())
}

#[tokio::test]
async fn rollback_on_caller_error() -> Result<()> {
    let pool = util::temp_pool().await;
    sqlx::query("CREATE TABLE t (val TEXT UNIQUE);")
        .execute(&pool)
        .await?;
    let res: Result<(), stocktake_lib::AppError> = run_in_tx(&pool, |tx| {
        Box::pin(async move {
            sqlx::query("INSERT INTO t (val) VALUES ('kept?');")
                .execute(&mut **tx)
                .await?;
            Err::<(), _>(stocktake_lib::AppError::new("TEST/ABORT", "abort"))
        })
    })
    .await;
    assert_eq!(res.unwrap_err().code(), "TEST/ABORT");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t;")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 0);
    Ok(())
}
