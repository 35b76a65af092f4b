use crate::stmt::{Filter, Value};
use indexmap::IndexMap;

/// A tree of relations to materialize alongside a selection.
///
/// Each entry names a relation field; nested entries descend into the
/// related model's own relations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Include {
    entries: IndexMap<String, Include>,
}

impl Include {
    pub fn new() -> Self {
        Self::default()
    }

    /// Includes a relation with no nested includes.
    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.entries.insert(name.into(), Include::new());
        self
    }

    /// Includes a relation, descending into its own relations.
    pub fn nest(mut self, name: impl Into<String>, inner: Include) -> Self {
        self.entries.insert(name.into(), inner);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Include)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A filter selecting the rows whose key tuple appears in `keys`.
///
/// Single-column keys lower to `$in`; composite keys lower to a
/// disjunction of per-tuple conjunctions, preserving the declared column
/// order.
pub fn key_filter(fields: &[String], keys: &[Vec<Value>]) -> Filter {
    match fields {
        [field] => Filter::is_in(
            field.as_str(),
            keys.iter().filter_map(|key| key.first().cloned()).collect(),
        ),
        fields => Filter::any(keys.iter().map(|key| {
            Filter::all(
                fields
                    .iter()
                    .zip(key)
                    .map(|(field, value)| Filter::eq(field.as_str(), value.clone())),
            )
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_column_key_uses_in() {
        let filter = key_filter(
            &["id".to_string()],
            &[vec![Value::I64(1)], vec![Value::I64(2)]],
        );
        assert_eq!(
            filter,
            Filter::is_in("id", vec![Value::I64(1), Value::I64(2)])
        );
    }

    #[test]
    fn composite_key_uses_disjunction() {
        let filter = key_filter(
            &["platform".to_string(), "id".to_string()],
            &[vec![Value::String("a".into()), Value::I64(1)]],
        );
        let Filter::Or(tuples) = filter else { panic!() };
        assert_eq!(tuples.len(), 1);
    }
}
