#![allow(clippy::unwrap_used)]

use anyhow::Result;
use stocktake_lib::purchases::model::{PURCHASE_INVALID_INPUT, PURCHASE_NOT_FOUND, REFERENCE_NOT_FOUND};
use stocktake_lib::purchases::{
    delete_purchase, get_purchase, get_purchase_line_items, purchase_options, update_purchase,
    PurchaseUpdate,
};

#[path = "util.rs"]
mod util;

use util::Fixture;

#[tokio::test]
async fn get_returns_stored_row_or_none() -> Result<()> {
    let pool = util::temp_pool().await;
    util::seed_base(&pool).await;
    Fixture::new("p1", 10).paid(40).insert(&pool).await;

    let found = get_purchase(&pool, "p1").await?.unwrap();
    assert_eq!(found.provider_id, "acme");
    assert_eq!(found.paid_amount, 40);
    assert_eq!(found.created_at, 10);
    assert!(get_purchase(&pool, "missing").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn line_items_carry_product_and_batch() -> Result<()> {
    let pool = util::temp_pool().await;
    util::seed_base(&pool).await;
    Fixture::new("p1", 10).items(&[(3, 120), (1, 80)]).insert(&pool).await;
    Fixture::new("p2", 20).items(&[(9, 1)]).insert(&pool).await;

    let items = get_purchase_line_items(&pool, "p1").await?;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].product_name, "Flour");
    assert_eq!(items[0].batch_id, "b1");
    assert_eq!(items[0].line_total, 360);
    assert_eq!(items[1].line_total, 80);
    assert!(items.iter().all(|item| item.purchase_id == "p1"));

    assert!(get_purchase_line_items(&pool, "missing").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn update_edits_present_fields_only() -> Result<()> {
    let pool = util::temp_pool().await;
    util::seed_base(&pool).await;
    Fixture::new("p1", 10).paid(40).insert(&pool).await;

    let updated = update_purchase(
        &pool,
        "p1",
        &PurchaseUpdate {
            provider_id: Some("globex".into()),
            paid_amount: Some(90),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(updated.provider_id, "globex");
    assert_eq!(updated.paid_amount, 90);
    assert_eq!(updated.date, 10);
    assert!(updated.updated_at > 10);

    let unchanged = update_purchase(&pool, "p1", &PurchaseUpdate::default()).await?;
    assert_eq!(unchanged, updated);
    Ok(())
}

#[tokio::test]
async fn update_rejects_bad_references() -> Result<()> {
    let pool = util::temp_pool().await;
    util::seed_base(&pool).await;
    Fixture::new("p1", 10).insert(&pool).await;

    let paid = PurchaseUpdate {
        paid_amount: Some(1),
        ..Default::default()
    };
    let err = update_purchase(&pool, "missing", &paid).await.unwrap_err();
    assert_eq!(err.code(), PURCHASE_NOT_FOUND);

    let err = update_purchase(
        &pool,
        "p1",
        &PurchaseUpdate {
            provider_id: Some("nobody".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), REFERENCE_NOT_FOUND);

    let err = update_purchase(
        &pool,
        "p1",
        &PurchaseUpdate {
            paid_amount: Some(-1),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), PURCHASE_INVALID_INPUT);
    assert_eq!(get_purchase(&pool, "p1").await?.unwrap().provider_id, "acme");
    Ok(())
}

#[tokio::test]
async fn delete_cascades_to_line_items() -> Result<()> {
    let pool = util::temp_pool().await;
    util::seed_base(&pool).await;
    Fixture::new("p1", 10).items(&[(1, 5), (2, 5)]).insert(&pool).await;
    Fixture::new("p2", 20).items(&[(1, 5)]).insert(&pool).await;

    delete_purchase(&pool, "p1").await?;
    assert!(get_purchase(&pool, "p1").await?.is_none());
    assert_eq!(util::count(&pool, "purchase_items").await, 1);
    assert_eq!(util::count(&pool, "product_batches").await, 1);

    let err = delete_purchase(&pool, "p1").await.unwrap_err();
    assert_eq!(err.code(), PURCHASE_NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn options_follow_creation_order() -> Result<()> {
    let pool = util::temp_pool().await;
    util::seed_base(&pool).await;
    Fixture::new("late", 30).provider("globex").insert(&pool).await;
    Fixture::new("early", 10).insert(&pool).await;

    let options = purchase_options(&pool).await?;
    let pairs: Vec<(&str, &str)> = options
        .iter()
        .map(|opt| (opt.id.as_str(), opt.provider_name.as_str()))
        .collect();
    assert_eq!(pairs, vec![("early", "Acme Supplies"), ("late", "Globex Corp")]);
    Ok(())
}
