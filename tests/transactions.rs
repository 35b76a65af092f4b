mod common;

use common::{blog_db, record};
use griddle::driver::MemoryDriver;
use griddle::stmt::{Filter, Value};
use griddle::{Database, Error};

#[tokio::test]
async fn failed_transaction_is_invisible() {
    let db = blog_db().await;

    let result: Result<(), Error> = db
        .transaction(|db| {
            Box::pin(async move {
                db.create(
                    "user",
                    record(&[("id", Value::U64(1)), ("value", Value::I64(1))]),
                )
                .await?;
                db.create(
                    "user",
                    record(&[("id", Value::U64(2)), ("value", Value::I64(2))]),
                )
                .await?;
                Err(Error::msg("abort"))
            })
        })
        .await;
    assert!(result.is_err());

    // No mutation inside the failed transaction is observable.
    let rows = db.get(&db.select("user"), None).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn committed_transaction_is_visible() {
    let db = blog_db().await;

    db.transaction(|db| {
        Box::pin(async move {
            db.create("user", record(&[("id", Value::U64(1))])).await?;
            db.set(
                "user",
                Filter::eq("id", Value::U64(1)),
                record(&[("value", Value::I64(9))]),
            )
            .await?;
            Ok(())
        })
    })
    .await
    .unwrap();

    let rows = db.get(&db.select("user"), None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].expect_record().get("value"), Some(&Value::I64(9)));
}

#[tokio::test]
async fn nested_transactions_reuse_the_outer_scope() {
    let db = blog_db().await;

    let result: Result<(), Error> = db
        .transaction(|db| {
            Box::pin(async move {
                // `create` opens its own scope, which nests.
                db.create("user", record(&[("id", Value::U64(1))])).await?;
                Err(Error::msg("outer failure"))
            })
        })
        .await;
    assert!(result.is_err());

    let rows = db.get(&db.select("user"), None).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn duplicate_entry_surfaces_and_rolls_back() {
    let db = blog_db().await;

    db.create(
        "tag",
        record(&[("id", Value::U64(1)), ("name", Value::from("x"))]),
    )
    .await
    .unwrap();

    let err = db
        .create(
            "tag",
            record(&[("id", Value::U64(2)), ("name", Value::from("x"))]),
        )
        .await
        .unwrap_err();
    assert!(err.is_duplicate_entry());

    let rows = db.get(&db.select("tag"), None).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn autoincrement_create_returns_the_key() {
    let db = blog_db().await;

    let created = db.create("user", record(&[("value", Value::I64(5))]))
        .await
        .unwrap();
    assert_eq!(created.expect_record().get("id"), Some(&Value::U64(1)));

    let created = db.create("user", record(&[("value", Value::I64(6))]))
        .await
        .unwrap();
    assert_eq!(created.expect_record().get("id"), Some(&Value::U64(2)));
}

#[tokio::test]
async fn upsert_inserts_then_updates() {
    let db = blog_db().await;

    db.upsert(
        "tag",
        vec![record(&[("id", Value::U64(1)), ("name", Value::from("a"))])],
        vec![],
    )
    .await
    .unwrap();
    db.upsert(
        "tag",
        vec![record(&[("id", Value::U64(1)), ("name", Value::from("b"))])],
        vec![],
    )
    .await
    .unwrap();

    let rows = db.get(&db.select("tag"), None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].expect_record().get("name"),
        Some(&Value::from("b"))
    );
}

#[tokio::test]
async fn cancellation_aborts_operations() {
    let driver = MemoryDriver::new();
    let cancel = driver.cancel_handle();
    let mut db = Database::new(driver);
    db.extend(
        "user",
        [("id".to_string(), griddle::schema::FieldDef::from("unsigned"))],
        None,
    )
    .unwrap();
    db.prepare_all().await.unwrap();

    cancel.cancel();

    let err = db.get(&db.select("user"), None).await.unwrap_err();
    assert!(err.is_cancelled());

    let err = db.create("user", record(&[("id", Value::U64(1))])).await.unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn stats_report_table_counts() {
    let db = blog_db().await;
    db.create("user", record(&[("id", Value::U64(1))])).await.unwrap();
    db.create("user", record(&[("id", Value::U64(2))])).await.unwrap();

    let stats = db.driver().stats().await.unwrap();
    assert_eq!(stats.tables["user"].count, 2);
    assert_eq!(stats.tables["post"].count, 0);
}

#[tokio::test]
async fn time_round_trips_normalized_to_epoch_date() {
    use chrono::{NaiveTime, TimeZone, Utc};

    let driver = MemoryDriver::new();
    let mut db = Database::new(driver);
    db.extend(
        "event",
        [
            ("id".to_string(), griddle::schema::FieldDef::from("unsigned")),
            ("at".to_string(), griddle::schema::FieldDef::from("time")),
        ],
        None,
    )
    .unwrap();
    db.prepare_all().await.unwrap();

    let stamp = Utc.with_ymd_and_hms(2024, 6, 1, 13, 30, 0).unwrap();
    db.create(
        "event",
        record(&[("id", Value::U64(1)), ("at", Value::Timestamp(stamp))]),
    )
    .await
    .unwrap();

    let rows = db.get(&db.select("event"), None).await.unwrap();
    assert_eq!(
        rows[0].expect_record().get("at"),
        Some(&Value::Time(NaiveTime::from_hms_opt(13, 30, 0).unwrap()))
    );
}
