use crate::schema::{Model, ResolvedRelation, Schema};
use crate::stmt::{
    Assignments, Expr, Filter, MutationPayload, Path, RelationMutation, Value, ValueRecord,
};
use crate::Result;

/// The cascade directives of one relation slot, resolved and ordered.
///
/// Directive order within a mutation is mandatory: disconnects, removes,
/// sets, creates/upserts, connects.
#[derive(Debug)]
pub struct RelationCascade<'a> {
    pub resolved: ResolvedRelation<'a>,
    pub ops: Vec<RelationMutation>,
}

/// Splits a mutation payload into its scalar row data and its ordered
/// relation cascades. Every directive must name a resolvable relation.
pub fn split_payload<'a>(
    schema: &'a Schema,
    model: &Model,
    payload: &MutationPayload,
) -> Result<(ValueRecord, Vec<RelationCascade<'a>>)> {
    let mut cascades = vec![];

    for (field, mutations) in &payload.relations {
        let resolved = schema.resolve_relation(&model.name, field)?;

        let mut ops = mutations.clone();
        ops.sort_by_key(RelationMutation::cascade_rank);

        tracing::debug!(
            model = %model.name,
            relation = %field,
            ops = ops.len(),
            "planned relation cascade"
        );

        cascades.push(RelationCascade { resolved, ops });
    }

    Ok((payload.data.clone(), cascades))
}

impl RelationCascade<'_> {
    /// Assignments rebinding a child row to the given parent: one entry
    /// per foreign-key column.
    pub fn fk_assignments(&self, parent: &ValueRecord) -> Assignments {
        self.fk_entries(parent)
            .into_iter()
            .map(|(field, value)| (field, Expr::Value(value)))
            .collect()
    }

    /// Assignments clearing the child-side foreign key.
    pub fn fk_clear(&self) -> Assignments {
        self.resolved
            .remote
            .iter()
            .map(|remote| (remote.clone(), Expr::Value(Value::Null)))
            .collect()
    }

    /// The child-side foreign-key entries linking to `parent`.
    pub fn fk_entries(&self, parent: &ValueRecord) -> Vec<(String, Value)> {
        self.resolved
            .local
            .iter()
            .zip(&self.resolved.remote)
            .map(|(local, remote)| {
                let value = parent
                    .get_path(&Path::from_dotted(local))
                    .cloned()
                    .unwrap_or(Value::Null);
                (remote.clone(), value)
            })
            .collect()
    }

    /// The filter selecting children currently linked to `parent`.
    pub fn linked_filter(&self, parent: &ValueRecord) -> Filter {
        Filter::all(
            self.fk_entries(parent)
                .into_iter()
                .map(|(field, value)| Filter::eq(field.as_str(), value)),
        )
    }

    /// The association-table row linking `parent` and `child`, with
    /// columns in declared primary-key order on both sides.
    pub fn link_row(&self, parent: &ValueRecord, child: &ValueRecord) -> ValueRecord {
        let link = self
            .resolved
            .link
            .as_ref()
            .expect("many-to-many without link");
        let mut row = ValueRecord::new();

        for (column, value) in link
            .owner_columns
            .iter()
            .zip(self.resolved.owner.pk_values(parent))
        {
            row.insert(column.clone(), value);
        }
        for (column, value) in link
            .target_columns
            .iter()
            .zip(self.resolved.target.pk_values(child))
        {
            row.insert(column.clone(), value);
        }

        row
    }

    /// The filter selecting this parent's association rows.
    pub fn link_filter(&self, parent: &ValueRecord) -> Filter {
        let link = self
            .resolved
            .link
            .as_ref()
            .expect("many-to-many without link");
        Filter::all(
            link.owner_columns
                .iter()
                .zip(self.resolved.owner.pk_values(parent))
                .map(|(column, value)| Filter::eq(column.as_str(), value)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, FieldDef, FieldTy, ModelConfig, Relation};

    fn schema() -> Schema {
        let mut schema = Schema::new();
        schema
            .extend(
                "user",
                [
                    ("id".to_string(), FieldDef::from("unsigned")),
                    (
                        "posts".to_string(),
                        FieldDef::Field(
                            Field::new(FieldTy::List)
                                .relation(Relation::one_to_many("post", "author")),
                        ),
                    ),
                ],
                None,
            )
            .unwrap();
        schema
            .extend(
                "post",
                [
                    ("id".to_string(), FieldDef::from("unsigned")),
                    (
                        "author".to_string(),
                        FieldDef::Field(
                            Field::new(FieldTy::Unsigned(None))
                                .nullable()
                                .relation(Relation::many_to_one("user", "posts")),
                        ),
                    ),
                ],
                None,
            )
            .unwrap();
        schema
    }

    #[test]
    fn cascade_order_is_mandatory() {
        let schema = schema();
        let model = schema.model("user").unwrap();

        let payload = MutationPayload::new(ValueRecord::new())
            .relation("posts", RelationMutation::Connect(Filter::eq("id", 1i64)))
            .relation("posts", RelationMutation::Remove(Filter::eq("id", 2i64)))
            .relation(
                "posts",
                RelationMutation::Disconnect(Filter::eq("id", 3i64)),
            );

        let (_, cascades) = split_payload(&schema, model, &payload).unwrap();
        let ranks: Vec<usize> = cascades[0]
            .ops
            .iter()
            .map(RelationMutation::cascade_rank)
            .collect();
        assert_eq!(ranks, vec![0, 1, 4]);
    }

    #[test]
    fn unresolvable_cascade_errors() {
        let schema = schema();
        let model = schema.model("user").unwrap();

        let payload = MutationPayload::new(ValueRecord::new())
            .relation("nope", RelationMutation::Connect(Filter::all_rows()));

        assert!(split_payload(&schema, model, &payload)
            .unwrap_err()
            .is_relation_unresolved());
    }

    #[test]
    fn fk_assignments_carry_parent_key() {
        let schema = schema();
        let model = schema.model("user").unwrap();

        let payload = MutationPayload::new(ValueRecord::new()).relation(
            "posts",
            RelationMutation::Connect(Filter::all_rows()),
        );
        let (_, cascades) = split_payload(&schema, model, &payload).unwrap();

        let mut parent = ValueRecord::new();
        parent.insert("id", Value::U64(7));

        let entries = cascades[0].fk_entries(&parent);
        assert_eq!(entries, vec![("author".to_string(), Value::U64(7))]);
    }
}
