use super::{Expr, Path, Select, Value, ValueRecord};
use crate::Result;
use regex::Regex;
use std::fmt;

/// A declarative filter over the rows of a selection.
///
/// An empty `$and` matches every row; an empty `$or` matches none. Both
/// short-circuit in the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// All branches must match
    And(Vec<Filter>),

    /// At least one branch must match
    Or(Vec<Filter>),

    /// The branch must not match
    Not(Box<Filter>),

    /// An arbitrary boolean-typed eval expression (`$expr`)
    Expr(Expr),

    /// An operator applied at a field path
    Field(Path, FieldOp),

    /// A correlated existence subquery. Produced by the relation resolver
    /// when lowering `$some`/`$none`/`$every`; drivers emit `EXISTS`.
    Exists(Box<Select>),
}

/// An operator applied to the value at a field path.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),

    /// Membership; an empty list matches nothing
    In(Vec<Value>),

    /// Non-membership; an empty list matches everything
    Nin(Vec<Value>),

    /// The value matches the pattern
    Regex(Pattern),

    /// Inverted operands: the *data* is the pattern, the operand the text
    RegexFor(String),

    /// `Exists(true)` matches non-null; `Exists(false)` matches null or
    /// missing
    Exists(bool),

    /// Existential push into list elements
    El(Box<FieldOp>),

    /// Exact list length
    Size(u64),

    BitsAllSet(i64),
    BitsAllClear(i64),
    BitsAnySet(i64),
    BitsAnyClear(i64),

    /// Some related row satisfies the query
    Some(Box<Filter>),

    /// No related row satisfies the query
    None(Box<Filter>),

    /// Every related row satisfies the query; vacuously true when the
    /// child set is empty
    Every(Box<Filter>),
}

/// A regular expression literal: either a bare source string or
/// `{source, flags}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub source: String,
    pub flags: String,
}

impl Filter {
    /// The filter that matches every row.
    pub fn all_rows() -> Self {
        Self::And(vec![])
    }

    /// The filter that matches no rows.
    pub fn no_rows() -> Self {
        Self::Or(vec![])
    }

    pub fn field(path: impl Into<Path>, op: impl Into<FieldOp>) -> Self {
        Self::Field(path.into(), op.into())
    }

    pub fn eq(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::Field(path.into(), FieldOp::Eq(value.into()))
    }

    pub fn ne(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::Field(path.into(), FieldOp::Ne(value.into()))
    }

    pub fn gt(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::Field(path.into(), FieldOp::Gt(value.into()))
    }

    pub fn gte(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::Field(path.into(), FieldOp::Gte(value.into()))
    }

    pub fn lt(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::Field(path.into(), FieldOp::Lt(value.into()))
    }

    pub fn lte(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::Field(path.into(), FieldOp::Lte(value.into()))
    }

    pub fn is_in(path: impl Into<Path>, values: Vec<Value>) -> Self {
        Self::Field(path.into(), FieldOp::In(values))
    }

    pub fn not_in(path: impl Into<Path>, values: Vec<Value>) -> Self {
        Self::Field(path.into(), FieldOp::Nin(values))
    }

    pub fn regex(path: impl Into<Path>, pattern: impl Into<Pattern>) -> Self {
        Self::Field(path.into(), FieldOp::Regex(pattern.into()))
    }

    pub fn exists(path: impl Into<Path>, exists: bool) -> Self {
        Self::Field(path.into(), FieldOp::Exists(exists))
    }

    pub fn some(path: impl Into<Path>, query: Filter) -> Self {
        Self::Field(path.into(), FieldOp::Some(Box::new(query)))
    }

    pub fn none(path: impl Into<Path>, query: Filter) -> Self {
        Self::Field(path.into(), FieldOp::None(Box::new(query)))
    }

    pub fn every(path: impl Into<Path>, query: Filter) -> Self {
        Self::Field(path.into(), FieldOp::Every(Box::new(query)))
    }

    pub fn expr(expr: impl Into<Expr>) -> Self {
        Self::Expr(expr.into())
    }

    pub fn all(branches: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(branches.into_iter().collect())
    }

    pub fn any(branches: impl IntoIterator<Item = Filter>) -> Self {
        Self::Or(branches.into_iter().collect())
    }

    pub fn negate(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }

    /// Conjoins another filter onto this one.
    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut branches) => {
                branches.push(other);
                Self::And(branches)
            }
            lhs => Self::And(vec![lhs, other]),
        }
    }

    /// Disjoins another filter onto this one.
    pub fn or(self, other: Filter) -> Self {
        match self {
            Self::Or(mut branches) => {
                branches.push(other);
                Self::Or(branches)
            }
            lhs => Self::Or(vec![lhs, other]),
        }
    }

    /// Builds a conjunction from record shorthand: leaves coerce through
    /// [`FieldOp::from`], nested records auto-flatten into dotted paths.
    pub fn from_record(record: &ValueRecord) -> Self {
        let mut branches = vec![];
        Self::flatten_into(&mut branches, Path::new(), record);
        Self::And(branches)
    }

    fn flatten_into(branches: &mut Vec<Filter>, prefix: Path, record: &ValueRecord) {
        for (key, value) in record.iter() {
            let mut path = prefix.clone();
            for segment in Path::from_dotted(key).iter() {
                path.push(segment);
            }

            match value {
                Value::Record(nested) if !nested.is_empty() => {
                    Self::flatten_into(branches, path, nested);
                }
                value => branches.push(Filter::Field(path, value.clone().into())),
            }
        }
    }

    /// Returns `true` if the filter is the trivial match-all conjunction.
    pub fn matches_all(&self) -> bool {
        matches!(self, Self::And(branches) if branches.is_empty())
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::all_rows()
    }
}

impl From<Expr> for Filter {
    fn from(value: Expr) -> Self {
        Self::Expr(value)
    }
}

impl FieldOp {
    /// Rewrites the scalar shorthand of a relation predicate against the
    /// child's primary key: `$some: 3` means `$some: {pk: 3}`.
    pub(crate) fn shorthand_relation_query(value: Value, pk: &str) -> Filter {
        match value {
            Value::List(items) => Filter::is_in(pk, items),
            value => Filter::eq(pk, value),
        }
    }
}

impl From<Value> for FieldOp {
    fn from(value: Value) -> Self {
        match value {
            Value::List(items) => Self::In(items),
            value => Self::Eq(value),
        }
    }
}

impl From<&str> for FieldOp {
    fn from(value: &str) -> Self {
        Self::Eq(value.into())
    }
}

impl From<i64> for FieldOp {
    fn from(value: i64) -> Self {
        Self::Eq(value.into())
    }
}

impl From<Pattern> for FieldOp {
    fn from(value: Pattern) -> Self {
        Self::Regex(value)
    }
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            flags: String::new(),
        }
    }

    pub fn with_flags(source: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            flags: flags.into(),
        }
    }

    /// Compiles the pattern, translating flags into inline modifiers.
    pub fn compile(&self) -> Result<Regex> {
        let mut source = String::new();

        let mut modifiers = String::new();
        for flag in self.flags.chars() {
            match flag {
                'i' | 'm' | 's' | 'x' => modifiers.push(flag),
                // Unknown flags are ignored; backends differ in what they
                // accept and the portable behavior is the permissive one.
                _ => {}
            }
        }

        if !modifiers.is_empty() {
            source.push_str(&format!("(?{modifiers})"));
        }
        source.push_str(&self.source);

        Regex::new(&source).map_err(|err| {
            crate::Error::expression_unlowerable(format!(
                "invalid pattern `{}`: {err}",
                self.source
            ))
        })
    }
}

impl From<&str> for Pattern {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_shorthand() {
        assert_eq!(FieldOp::from(Value::I64(3)), FieldOp::Eq(Value::I64(3)));
        assert_eq!(
            FieldOp::from(Value::List(vec![Value::I64(1)])),
            FieldOp::In(vec![Value::I64(1)])
        );
    }

    #[test]
    fn record_shorthand_flattens() {
        let mut nested = ValueRecord::new();
        nested.insert("age", Value::I64(3));
        let mut record = ValueRecord::new();
        record.insert("profile", Value::Record(nested));

        let filter = Filter::from_record(&record);
        assert_eq!(
            filter,
            Filter::And(vec![Filter::eq("profile.age", Value::I64(3))])
        );
    }

    #[test]
    fn pattern_flags_compile() {
        let pattern = Pattern::with_flags("^abc$", "i");
        let regex = pattern.compile().unwrap();
        assert!(regex.is_match("ABC"));
    }

    #[test]
    fn and_merges() {
        let filter = Filter::all_rows()
            .and(Filter::eq("a", 1i64))
            .and(Filter::eq("b", 2i64));
        let Filter::And(branches) = filter else {
            panic!()
        };
        assert_eq!(branches.len(), 2);
    }
}
