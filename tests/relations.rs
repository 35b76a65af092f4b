mod common;

use common::{blog_db, record};
use griddle::lower::Include;
use griddle::stmt::{Filter, MutationPayload, RelationMutation, Value};

async fn seed_scenario_users(db: &griddle::Database) {
    // Users 1 and 3 stand alone; user 2 points at user 1.
    db.create(
        "user",
        record(&[("id", Value::U64(1)), ("value", Value::I64(0))]),
    )
    .await
    .unwrap();
    db.create(
        "user",
        MutationPayload::new(record(&[("id", Value::U64(2)), ("value", Value::I64(1))]))
            .relation(
                "successor",
                RelationMutation::Connect(Filter::eq("id", Value::U64(1))),
            ),
    )
    .await
    .unwrap();
    db.create(
        "user",
        record(&[("id", Value::U64(3)), ("value", Value::I64(2))]),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn nested_include_attaches_to_one_rows() {
    let db = blog_db().await;
    seed_scenario_users(&db).await;

    let rows = db
        .get(&db.select("user"), Some(&Include::new().with("successor")))
        .await
        .unwrap();

    for row in &rows {
        let row = row.expect_record();
        let id = row.get("id").unwrap();
        let successor = row.get("successor").unwrap();

        if id.compares_eq(&Value::U64(2)) {
            let successor = successor.expect_record();
            assert!(successor.get("id").unwrap().compares_eq(&Value::U64(1)));
            assert_eq!(successor.get("value"), Some(&Value::I64(0)));
        } else {
            assert_eq!(successor, &Value::Null);
        }
    }
}

#[tokio::test]
async fn one_to_one_connect_is_reciprocal_and_exclusive() {
    let db = blog_db().await;
    seed_scenario_users(&db).await;

    // Rebind: user 2's successor becomes user 3.
    db.set(
        "user",
        Filter::eq("id", Value::U64(2)),
        MutationPayload::new(record(&[])).relation(
            "successor",
            RelationMutation::Connect(Filter::eq("id", Value::U64(3))),
        ),
    )
    .await
    .unwrap();

    let rows = db.get(&db.select("user"), None).await.unwrap();
    let by_id = |id: u64| {
        rows.iter()
            .map(|row| row.expect_record())
            .find(|row| row.get("id").unwrap().compares_eq(&Value::U64(id)))
            .unwrap()
    };

    // Both endpoints updated together.
    assert!(by_id(2).get("successor").unwrap().compares_eq(&Value::U64(3)));
    assert!(by_id(3)
        .get("predecessor")
        .unwrap()
        .compares_eq(&Value::U64(2)));

    // The previous link is cleared on both sides.
    assert_eq!(by_id(1).get("predecessor"), Some(&Value::Null));
}

#[tokio::test]
async fn many_to_many_create_then_connect() {
    let db = blog_db().await;

    db.create(
        "post",
        MutationPayload::new(record(&[("id2", Value::U64(1))])).relation(
            "tags",
            RelationMutation::Create(vec![
                MutationPayload::new(record(&[("name", Value::from("t1"))])),
                MutationPayload::new(record(&[("name", Value::from("t2"))])),
            ]),
        ),
    )
    .await
    .unwrap();

    db.create(
        "post",
        MutationPayload::new(record(&[("id2", Value::U64(2))])).relation(
            "tags",
            RelationMutation::Connect(Filter::eq("name", Value::from("t1"))),
        ),
    )
    .await
    .unwrap();

    let tags = db
        .get(&db.select("tag"), Some(&Include::new().with("posts")))
        .await
        .unwrap();

    let posts_of = |name: &str| -> Vec<u64> {
        let tag = tags
            .iter()
            .map(|row| row.expect_record())
            .find(|row| row.get("name").unwrap().compares_eq(&Value::from(name)))
            .unwrap();
        let Some(Value::List(posts)) = tag.get("posts") else {
            panic!("posts not materialized");
        };
        let mut ids: Vec<u64> = posts
            .iter()
            .map(|post| match post.expect_record().get("id2").unwrap() {
                Value::U64(id) => *id,
                other => panic!("unexpected id {other:?}"),
            })
            .collect();
        ids.sort();
        ids
    };

    assert_eq!(posts_of("t1"), vec![1, 2]);
    assert_eq!(posts_of("t2"), vec![1]);
}

#[tokio::test]
async fn duplicate_connect_is_idempotent() {
    let db = blog_db().await;

    db.create("post", record(&[("id2", Value::U64(1))]))
        .await
        .unwrap();
    db.create(
        "tag",
        record(&[("id", Value::U64(1)), ("name", Value::from("t1"))]),
    )
    .await
    .unwrap();

    for _ in 0..3 {
        db.set(
            "post",
            Filter::eq("id2", Value::U64(1)),
            MutationPayload::new(record(&[])).relation(
                "tags",
                RelationMutation::Connect(Filter::eq("name", Value::from("t1"))),
            ),
        )
        .await
        .unwrap();
    }

    let links = db.get(&db.select("post_tag"), None).await.unwrap();
    assert_eq!(links.len(), 1);

    // Disconnect is idempotent too.
    for _ in 0..2 {
        db.set(
            "post",
            Filter::eq("id2", Value::U64(1)),
            MutationPayload::new(record(&[])).relation(
                "tags",
                RelationMutation::Disconnect(Filter::eq("name", Value::from("t1"))),
            ),
        )
        .await
        .unwrap();
    }

    let links = db.get(&db.select("post_tag"), None).await.unwrap();
    assert!(links.is_empty());
}

#[tokio::test]
async fn every_includes_childless_parents() {
    let db = blog_db().await;
    seed_scenario_users(&db).await;

    // User 1 has a post with an author set; user 2 has an orphaned post;
    // user 3 has none.
    db.create(
        "post",
        record(&[("id2", Value::U64(1)), ("author", Value::U64(1))]),
    )
    .await
    .unwrap();
    db.create(
        "post",
        record(&[("id2", Value::U64(2)), ("author", Value::U64(2))]),
    )
    .await
    .unwrap();

    let rows = db
        .get(
            &db.select("user").where_(Filter::every(
                "posts",
                Filter::eq("score", Value::I64(99)),
            )),
            None,
        )
        .await
        .unwrap();

    // Only the childless user satisfies the vacuous predicate.
    assert_eq!(rows.len(), 1);
    assert!(rows[0]
        .expect_record()
        .get("id")
        .unwrap()
        .compares_eq(&Value::U64(3)));
}

#[tokio::test]
async fn none_is_the_negation_of_some() {
    let db = blog_db().await;
    seed_scenario_users(&db).await;
    db.create(
        "post",
        record(&[
            ("id2", Value::U64(1)),
            ("score", Value::I64(5)),
            ("author", Value::U64(1)),
        ]),
    )
    .await
    .unwrap();

    let query = Filter::gt("score", Value::I64(1));

    let some = db
        .get(
            &db.select("user")
                .where_(Filter::some("posts", query.clone())),
            None,
        )
        .await
        .unwrap();
    let none = db
        .get(
            &db.select("user").where_(Filter::none("posts", query)),
            None,
        )
        .await
        .unwrap();

    let all = db.get(&db.select("user"), None).await.unwrap();
    assert_eq!(some.len() + none.len(), all.len());
    assert_eq!(some.len(), 1);
}

#[tokio::test]
async fn relation_null_matches_rows_without_children() {
    let db = blog_db().await;
    seed_scenario_users(&db).await;
    db.create(
        "post",
        record(&[("id2", Value::U64(1)), ("author", Value::U64(1))]),
    )
    .await
    .unwrap();

    let rows = db
        .get(
            &db.select("user").where_(Filter::eq("posts", Value::Null)),
            None,
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn one_to_many_cascade_set_and_remove() {
    let db = blog_db().await;
    seed_scenario_users(&db).await;
    for (id, score, author) in [(1u64, 1i64, 1u64), (2, 2, 1), (3, 3, 2)] {
        db.create(
            "post",
            record(&[
                ("id2", Value::U64(id)),
                ("score", Value::I64(score)),
                ("author", Value::U64(author)),
            ]),
        )
        .await
        .unwrap();
    }

    // $set with no query targets every linked child.
    db.set(
        "user",
        Filter::eq("id", Value::U64(1)),
        MutationPayload::new(record(&[])).relation(
            "posts",
            RelationMutation::Set {
                filter: None,
                update: Box::new(MutationPayload::new(record(&[(
                    "score",
                    Value::I64(10),
                )]))),
            },
        ),
    )
    .await
    .unwrap();

    let user1_posts = db
        .get(
            &db.select("post").where_(Filter::eq("author", Value::U64(1))),
            None,
        )
        .await
        .unwrap();
    assert!(user1_posts
        .iter()
        .all(|row| row.expect_record().get("score") == Some(&Value::I64(10))));

    // The other user's posts are untouched.
    let user2_posts = db
        .get(
            &db.select("post").where_(Filter::eq("author", Value::U64(2))),
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        user2_posts[0].expect_record().get("score"),
        Some(&Value::I64(3))
    );

    // $remove deletes matching children outright.
    db.set(
        "user",
        Filter::eq("id", Value::U64(1)),
        MutationPayload::new(record(&[])).relation(
            "posts",
            RelationMutation::Remove(Filter::eq("id2", Value::U64(1))),
        ),
    )
    .await
    .unwrap();

    let remaining = db.get(&db.select("post"), None).await.unwrap();
    assert_eq!(remaining.len(), 2);
}

#[tokio::test]
async fn removing_parents_propagates_foreign_keys() {
    let db = blog_db().await;
    seed_scenario_users(&db).await;
    db.create(
        "post",
        record(&[("id2", Value::U64(1)), ("author", Value::U64(1))]),
    )
    .await
    .unwrap();

    db.remove("user", Filter::eq("id", Value::U64(1)))
        .await
        .unwrap();

    let orphaned = db.get(&db.select("post"), None).await.unwrap();
    assert_eq!(orphaned[0].expect_record().get("author"), Some(&Value::Null));
}

#[tokio::test]
async fn nested_include_descends_through_relations() {
    let db = blog_db().await;
    seed_scenario_users(&db).await;
    db.create(
        "post",
        MutationPayload::new(record(&[
            ("id2", Value::U64(1)),
            ("author", Value::U64(1)),
        ]))
        .relation(
            "tags",
            RelationMutation::Create(vec![MutationPayload::new(record(&[(
                "name",
                Value::from("nested"),
            )]))]),
        ),
    )
    .await
    .unwrap();

    let rows = db
        .get(
            &db.select("user").where_(Filter::eq("id", Value::U64(1))),
            Some(&Include::new().nest("posts", Include::new().with("tags"))),
        )
        .await
        .unwrap();

    let user = rows[0].expect_record();
    let Some(Value::List(posts)) = user.get("posts") else {
        panic!("posts not materialized");
    };
    let Some(Value::List(tags)) = posts[0].expect_record().get("tags") else {
        panic!("tags not materialized");
    };
    assert!(tags[0]
        .expect_record()
        .get("name")
        .unwrap()
        .compares_eq(&Value::from("nested")));
}
