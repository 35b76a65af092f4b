#![allow(dead_code)]

use griddle::driver::MemoryDriver;
use griddle::schema::{Field, FieldDef, FieldTy, ModelConfig, Relation};
use griddle::stmt::{Value, ValueRecord};
use griddle::Database;

pub fn field(name: &str, def: impl Into<FieldDef>) -> (String, FieldDef) {
    (name.to_string(), def.into())
}

pub fn record(entries: &[(&str, Value)]) -> ValueRecord {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

/// The blog fixture: users with reciprocal one-to-one successor and
/// predecessor pointers, posts owned by users, tags associated to posts
/// through the implicit `post_tag` table.
pub async fn blog_db() -> Database {
    let mut db = Database::new(MemoryDriver::new());

    db.extend(
        "user",
        [
            field("id", "unsigned"),
            field("value", "integer"),
            field(
                "successor",
                Field::new(FieldTy::Unsigned(None))
                    .nullable()
                    .relation(Relation::one_to_one("user", "predecessor")),
            ),
            field(
                "predecessor",
                Field::new(FieldTy::Unsigned(None))
                    .nullable()
                    .relation(Relation::one_to_one("user", "successor")),
            ),
            field(
                "posts",
                Field::new(FieldTy::List).relation(Relation::one_to_many("post", "author")),
            ),
        ],
        Some(ModelConfig::default().auto_increment()),
    )
    .unwrap();

    db.extend(
        "post",
        [
            field("id2", "unsigned"),
            field("score", "integer"),
            field(
                "author",
                Field::new(FieldTy::Unsigned(None))
                    .nullable()
                    .relation(Relation::many_to_one("user", "posts")),
            ),
            field(
                "tags",
                Field::new(FieldTy::List).relation(Relation::many_to_many("tag", "posts")),
            ),
        ],
        Some(
            ModelConfig::default()
                .primary(vec!["id2".to_string()])
                .auto_increment(),
        ),
    )
    .unwrap();

    db.extend(
        "tag",
        [
            field("id", "unsigned"),
            field("name", "string"),
            field(
                "posts",
                Field::new(FieldTy::List).relation(Relation::many_to_many("post", "tags")),
            ),
        ],
        Some(
            ModelConfig::default()
                .auto_increment()
                .unique(vec!["name".to_string()]),
        ),
    )
    .unwrap();

    db.start().await.unwrap();
    db.prepare_all().await.unwrap();
    db
}
