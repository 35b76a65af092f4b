use super::{Expr, Value, ValueRecord};
use indexmap::IndexMap;

/// The scalar assignments of an update, keyed by dotted field path.
///
/// Values are eval expressions; plain values are wrapped literals.
/// Expression terms pass through formatting verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignments {
    entries: IndexMap<String, Expr>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds assignments from a plain record; every leaf becomes a
    /// literal expression.
    pub fn from_record(record: ValueRecord) -> Self {
        let mut assignments = Self::new();
        for (key, value) in record {
            assignments.set(key, Expr::Value(value));
        }
        assignments
    }

    pub fn set(&mut self, key: impl Into<String>, expr: impl Into<Expr>) {
        self.entries.insert(key.into(), expr.into());
    }

    pub fn get(&self, key: &str) -> Option<&Expr> {
        self.entries.get(key)
    }

    pub fn take(&mut self, key: &str) -> Option<Expr> {
        self.entries.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Expr)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl IntoIterator for Assignments {
    type Item = (String, Expr);
    type IntoIter = indexmap::map::IntoIter<String, Expr>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, Expr)> for Assignments {
    fn from_iter<T: IntoIterator<Item = (String, Expr)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl From<ValueRecord> for Assignments {
    fn from(record: ValueRecord) -> Self {
        Self::from_record(record)
    }
}

impl From<Vec<(String, Value)>> for Assignments {
    fn from(entries: Vec<(String, Value)>) -> Self {
        entries
            .into_iter()
            .map(|(k, v)| (k, Expr::Value(v)))
            .collect()
    }
}
