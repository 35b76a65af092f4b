use indexmap::IndexMap;

/// A declared association between two models.
///
/// Relations are lookup descriptors keyed by (table, field-name), not
/// owning pointers; cyclic and self-referential declarations resolve
/// lazily when first used.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub kind: RelationKind,

    /// The target table.
    pub target: String,

    /// The inverse field name on the target.
    pub inverse: String,

    /// Local key fields. Empty means the default for the kind: the
    /// relation field itself for to-one, the owner's primary key
    /// otherwise.
    pub local: Vec<String>,

    /// Remote key fields. Empty means the default for the kind: the
    /// target's primary key for to-one and many-to-many, the inverse
    /// field for one-to-many.
    pub remote: Vec<String>,

    /// Link-column aliases shared across endpoints, keyed by local
    /// field. A shared alias appearing on both sides collapses into one
    /// association-table column.
    pub shared: IndexMap<String, String>,

    /// The association table for many-to-many; derived when absent.
    pub link_table: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Relation {
    pub fn new(kind: RelationKind, target: impl Into<String>, inverse: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            inverse: inverse.into(),
            local: vec![],
            remote: vec![],
            shared: IndexMap::new(),
            link_table: None,
        }
    }

    pub fn one_to_one(target: impl Into<String>, inverse: impl Into<String>) -> Self {
        Self::new(RelationKind::OneToOne, target, inverse)
    }

    pub fn one_to_many(target: impl Into<String>, inverse: impl Into<String>) -> Self {
        Self::new(RelationKind::OneToMany, target, inverse)
    }

    pub fn many_to_one(target: impl Into<String>, inverse: impl Into<String>) -> Self {
        Self::new(RelationKind::ManyToOne, target, inverse)
    }

    pub fn many_to_many(target: impl Into<String>, inverse: impl Into<String>) -> Self {
        Self::new(RelationKind::ManyToMany, target, inverse)
    }

    pub fn local_fields(mut self, fields: Vec<String>) -> Self {
        self.local = fields;
        self
    }

    pub fn remote_fields(mut self, fields: Vec<String>) -> Self {
        self.remote = fields;
        self
    }

    pub fn shared_field(mut self, local: impl Into<String>, alias: impl Into<String>) -> Self {
        self.shared.insert(local.into(), alias.into());
        self
    }

    pub fn via(mut self, link_table: impl Into<String>) -> Self {
        self.link_table = Some(link_table.into());
        self
    }

    /// True when the relation produces at most one related row.
    pub fn is_to_one(&self) -> bool {
        matches!(self.kind, RelationKind::OneToOne | RelationKind::ManyToOne)
    }

    /// The deterministic association-table name derived from the two
    /// endpoints, used when no table is named explicitly.
    pub fn derived_link_table(&self, owner_table: &str, owner_field: &str) -> String {
        let mut endpoints = [
            (owner_table, owner_field),
            (self.target.as_str(), self.inverse.as_str()),
        ];
        endpoints.sort();
        format!("{}_{}", endpoints[0].0, endpoints[1].0)
    }

    /// The link column carrying one primary-key component of `table`.
    /// Shared aliases override the default `{table}_{pk}` naming.
    pub fn link_column(&self, table: &str, pk_field: &str) -> String {
        if let Some(alias) = self.shared.get(pk_field) {
            return alias.clone();
        }
        format!("{table}_{pk_field}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_link_table_is_order_independent() {
        let on_post = Relation::many_to_many("tag", "posts");
        let on_tag = Relation::many_to_many("post", "tags");

        assert_eq!(on_post.derived_link_table("post", "tags"), "post_tag");
        assert_eq!(on_tag.derived_link_table("tag", "posts"), "post_tag");
    }

    #[test]
    fn shared_alias_overrides_link_column() {
        let relation = Relation::many_to_many("login", "guilds")
            .shared_field("platform2", "platform");

        assert_eq!(relation.link_column("guild", "platform2"), "platform");
        assert_eq!(relation.link_column("guild", "id2"), "guild_id2");
    }
}
