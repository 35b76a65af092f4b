mod field;
pub use field::{Field, FieldDef, FieldTy};

mod migrate;
pub use migrate::{Migration, MigrationHook, MigrationHost};

mod model;
pub use model::{ForeignKey, Model, ModelConfig};

mod relation;
pub use relation::{Relation, RelationKind};

use crate::{Error, Result};
use indexmap::IndexMap;

/// The scoped model registry.
///
/// A schema is owned by one database instance; there is no process-global
/// registry. Models are registered at startup and the set is append-only
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: IndexMap<String, Model>,
}

/// A relation resolved against the registry: both endpoint models, the
/// concrete key columns, and the association table for many-to-many.
#[derive(Debug)]
pub struct ResolvedRelation<'a> {
    pub owner: &'a Model,
    pub field: &'a str,
    pub relation: &'a Relation,
    pub target: &'a Model,

    /// Key fields on the owner side.
    pub local: Vec<String>,

    /// Key fields on the target side.
    pub remote: Vec<String>,

    /// Present for many-to-many.
    pub link: Option<LinkInfo>,
}

/// The association table of a many-to-many relation and its columns,
/// each vector in the respective model's primary-key order.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkInfo {
    pub table: String,
    pub owner_columns: Vec<String>,
    pub target_columns: Vec<String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new model or merges fields into an existing one, then
    /// synthesizes any association tables that became derivable.
    pub fn extend(
        &mut self,
        name: impl Into<String>,
        defs: impl IntoIterator<Item = (String, FieldDef)>,
        config: Option<ModelConfig>,
    ) -> Result<()> {
        let name = name.into();

        match self.models.get_mut(&name) {
            Some(model) => model.merge(defs, config)?,
            None => {
                let model = Model::build(&name, defs, config.unwrap_or_default())?;
                self.models.insert(name, model);
            }
        }

        self.synthesize_link_tables()
    }

    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }

    pub fn get_model(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    pub fn model(&self, name: &str) -> Result<&Model> {
        self.models
            .get(name)
            .ok_or_else(|| Error::msg(format!("unknown table `{name}`")))
    }

    pub fn model_mut(&mut self, name: &str) -> Result<&mut Model> {
        self.models
            .get_mut(name)
            .ok_or_else(|| Error::msg(format!("unknown table `{name}`")))
    }

    /// Resolves the relation declared at `model.field` against the
    /// registry. Relations are descriptors, not pointers; cyclic and
    /// self-referential declarations resolve here, lazily.
    pub fn resolve_relation(&self, model: &str, field: &str) -> Result<ResolvedRelation<'_>> {
        let owner = self.model(model)?;

        let (field_name, declared) = owner
            .fields
            .get_key_value(field)
            .ok_or_else(|| Error::relation_unresolved(model, field))?;
        let relation = declared
            .relation
            .as_ref()
            .ok_or_else(|| Error::relation_unresolved(model, field))?;

        let target = self
            .get_model(&relation.target)
            .ok_or_else(|| Error::relation_unresolved(model, field))?;

        let (local, remote) = match relation.kind {
            RelationKind::OneToOne | RelationKind::ManyToOne => (
                non_empty_or(&relation.local, || vec![field_name.clone()]),
                non_empty_or(&relation.remote, || target.primary.clone()),
            ),
            RelationKind::OneToMany => (
                non_empty_or(&relation.local, || owner.primary.clone()),
                non_empty_or(&relation.remote, || vec![relation.inverse.clone()]),
            ),
            RelationKind::ManyToMany => (
                non_empty_or(&relation.local, || owner.primary.clone()),
                non_empty_or(&relation.remote, || target.primary.clone()),
            ),
        };

        let link = if relation.kind == RelationKind::ManyToMany {
            let table = relation
                .link_table
                .clone()
                .unwrap_or_else(|| relation.derived_link_table(&owner.name, field_name));

            let inverse = target
                .fields
                .get(&relation.inverse)
                .and_then(|f| f.relation.as_ref());

            let owner_columns = owner
                .primary
                .iter()
                .map(|pk| relation.link_column(&owner.name, pk))
                .collect();
            let target_columns = target
                .primary
                .iter()
                .map(|pk| match inverse {
                    Some(inverse) => inverse.link_column(&target.name, pk),
                    None => format!("{}_{pk}", target.name),
                })
                .collect();

            Some(LinkInfo {
                table,
                owner_columns,
                target_columns,
            })
        } else {
            None
        };

        Ok(ResolvedRelation {
            owner,
            field: field_name,
            relation,
            target,
            local,
            remote,
            link,
        })
    }

    /// The inverse endpoint of a resolved relation.
    pub fn resolve_inverse(&self, resolved: &ResolvedRelation<'_>) -> Result<ResolvedRelation<'_>> {
        self.resolve_relation(&resolved.target.name, &resolved.relation.inverse)
    }

    /// Registers the implicit association table for every many-to-many
    /// relation whose endpoints are both known. Columns are exactly the
    /// composite primaries of both sides; the primary key is their
    /// concatenation.
    fn synthesize_link_tables(&mut self) -> Result<()> {
        let mut pending: Vec<Model> = vec![];

        for model in self.models.values() {
            for (field_name, relation) in model.relations() {
                if relation.kind != RelationKind::ManyToMany {
                    continue;
                }

                let Ok(resolved) = self.resolve_relation(&model.name, field_name) else {
                    // Target not registered yet; derivable on a later extend.
                    continue;
                };
                let link = resolved
                    .link
                    .as_ref()
                    .expect("many-to-many without link");

                if self.models.contains_key(&link.table)
                    || pending.iter().any(|m| m.name == link.table)
                {
                    continue;
                }

                tracing::debug!(
                    table = %link.table,
                    left = %model.name,
                    right = %resolved.target.name,
                    "synthesizing association table"
                );

                pending.push(build_link_model(&resolved, link)?);
            }
        }

        for model in pending {
            self.models.insert(model.name.clone(), model);
        }

        Ok(())
    }
}

fn non_empty_or(declared: &[String], default: impl FnOnce() -> Vec<String>) -> Vec<String> {
    if declared.is_empty() {
        default()
    } else {
        declared.to_vec()
    }
}

fn build_link_model(resolved: &ResolvedRelation<'_>, link: &LinkInfo) -> Result<Model> {
    let mut defs: Vec<(String, FieldDef)> = vec![];
    let mut primary = vec![];
    let mut foreign = IndexMap::new();

    let mut push_side = |model: &Model, columns: &[String], defs: &mut Vec<(String, FieldDef)>| {
        for (pk, column) in model.primary.iter().zip(columns) {
            if primary.contains(column) {
                // A shared column carries both sides' key component.
                continue;
            }
            let pk_field = &model.fields[pk];
            let ty = match &pk_field.ty {
                // Link columns reference keys; they are never
                // database-assigned themselves.
                FieldTy::Primary => FieldTy::Unsigned(None),
                ty => ty.clone(),
            };
            defs.push((column.clone(), FieldDef::Field(Field::new(ty))));
            primary.push(column.clone());
            foreign.insert(
                column.clone(),
                ForeignKey {
                    table: model.name.clone(),
                    field: pk.clone(),
                },
            );
        }
    };

    push_side(resolved.owner, &link.owner_columns, &mut defs);
    push_side(resolved.target, &link.target_columns, &mut defs);

    let mut model = Model::build(
        &link.table,
        defs,
        ModelConfig {
            primary,
            auto_increment: false,
            unique: vec![],
            foreign,
        },
    )?;
    model.internal = true;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_with_m2m() -> Schema {
        let mut schema = Schema::new();
        schema
            .extend(
                "post",
                [
                    ("id2".to_string(), FieldDef::from("unsigned")),
                    ("score".to_string(), FieldDef::from("integer")),
                    (
                        "tags".to_string(),
                        FieldDef::Field(
                            Field::new(FieldTy::List)
                                .relation(Relation::many_to_many("tag", "posts")),
                        ),
                    ),
                ],
                Some(ModelConfig::default().primary(vec!["id2".to_string()])),
            )
            .unwrap();
        schema
            .extend(
                "tag",
                [
                    ("id".to_string(), FieldDef::from("unsigned")),
                    ("name".to_string(), FieldDef::from("string")),
                    (
                        "posts".to_string(),
                        FieldDef::Field(
                            Field::new(FieldTy::List)
                                .relation(Relation::many_to_many("post", "tags")),
                        ),
                    ),
                ],
                None,
            )
            .unwrap();
        schema
    }

    #[test]
    fn link_table_synthesized_with_composite_pk() {
        let schema = schema_with_m2m();

        let link = schema.model("post_tag").unwrap();
        assert!(link.internal);
        assert_eq!(
            link.primary,
            vec!["post_id2".to_string(), "tag_id".to_string()]
        );
        assert_eq!(link.foreign["post_id2"].table, "post");
        assert_eq!(link.foreign["tag_id"].table, "tag");
    }

    #[test]
    fn resolve_relation_defaults_keys() {
        let schema = schema_with_m2m();

        let resolved = schema.resolve_relation("post", "tags").unwrap();
        assert_eq!(resolved.local, vec!["id2".to_string()]);
        assert_eq!(resolved.remote, vec!["id".to_string()]);
        let link = resolved.link.unwrap();
        assert_eq!(link.table, "post_tag");
        assert_eq!(link.owner_columns, vec!["post_id2".to_string()]);
        assert_eq!(link.target_columns, vec!["tag_id".to_string()]);
    }

    #[test]
    fn resolve_relation_honors_declared_keys() {
        let mut schema = Schema::new();
        schema
            .extend(
                "login",
                [
                    ("id".to_string(), FieldDef::from("unsigned")),
                    ("uid".to_string(), FieldDef::from("unsigned")),
                ],
                Some(ModelConfig::default().unique(vec!["uid".to_string()])),
            )
            .unwrap();
        schema
            .extend(
                "session",
                [
                    ("id".to_string(), FieldDef::from("unsigned")),
                    ("owner_uid".to_string(), FieldDef::from("unsigned")),
                    (
                        "owner".to_string(),
                        FieldDef::Field(
                            Field::new(FieldTy::Unsigned(None)).nullable().relation(
                                Relation::many_to_one("login", "sessions")
                                    .local_fields(vec!["owner_uid".to_string()])
                                    .remote_fields(vec!["uid".to_string()]),
                            ),
                        ),
                    ),
                ],
                None,
            )
            .unwrap();

        // Declared keys win over the defaults (the relation field itself
        // and the target's primary key).
        let resolved = schema.resolve_relation("session", "owner").unwrap();
        assert_eq!(resolved.local, vec!["owner_uid".to_string()]);
        assert_eq!(resolved.remote, vec!["uid".to_string()]);
    }

    #[test]
    fn unresolved_relation_errors() {
        let schema = schema_with_m2m();
        assert!(schema
            .resolve_relation("post", "score")
            .unwrap_err()
            .is_relation_unresolved());
        assert!(schema
            .resolve_relation("post", "nope")
            .unwrap_err()
            .is_relation_unresolved());
    }
}
