use super::{Filter, Value, ValueRecord};
use indexmap::IndexMap;

/// A nested mutation payload: scalar row data plus cascade directives for
/// each relation slot.
///
/// The relation resolver walks the payload as a tree and emits a flat
/// operation plan; directives may recurse (a created child can itself
/// carry directives for its own relations).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationPayload {
    /// Scalar column data for the row itself.
    pub data: ValueRecord,

    /// Cascade directives, keyed by relation field name. Multiple
    /// directives on the same slot apply in cascade order, not in
    /// declaration order.
    pub relations: IndexMap<String, Vec<RelationMutation>>,
}

/// A single cascade directive on a relation slot.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationMutation {
    /// Insert new child rows linked to the parent (`$create`).
    Create(Vec<MutationPayload>),

    /// Upsert child rows keyed on the child's natural or primary key,
    /// linking on success (`$upsert`).
    Upsert {
        rows: Vec<MutationPayload>,
        keys: Vec<String>,
    },

    /// Rebind existing child rows matching the query to this parent
    /// (`$connect`). For to-one relations the previous holder is cleared.
    Connect(Filter),

    /// Clear the foreign key on matching child rows, or remove
    /// association rows for many-to-many (`$disconnect`).
    Disconnect(Filter),

    /// Apply a nested update over matching linked children (`$set`).
    /// With no query, every linked child is targeted. The update may
    /// itself contain relation cascades.
    Set {
        filter: Option<Filter>,
        update: Box<MutationPayload>,
    },

    /// Delete matching child rows outright (`$remove`).
    Remove(Filter),
}

impl MutationPayload {
    pub fn new(data: ValueRecord) -> Self {
        Self {
            data,
            relations: IndexMap::new(),
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::new(ValueRecord::from_entries(entries))
    }

    /// Adds a cascade directive on a relation slot.
    pub fn relation(mut self, name: impl Into<String>, mutation: RelationMutation) -> Self {
        self.relations.entry(name.into()).or_default().push(mutation);
        self
    }

    pub fn is_scalar_only(&self) -> bool {
        self.relations.is_empty()
    }
}

impl From<ValueRecord> for MutationPayload {
    fn from(data: ValueRecord) -> Self {
        Self::new(data)
    }
}

impl RelationMutation {
    /// The position of the directive in the mandatory cascade order:
    /// disconnects, removes, sets, creates/upserts, connects.
    pub fn cascade_rank(&self) -> usize {
        match self {
            Self::Disconnect(_) => 0,
            Self::Remove(_) => 1,
            Self::Set { .. } => 2,
            Self::Create(_) | Self::Upsert { .. } => 3,
            Self::Connect(_) => 4,
        }
    }
}
