use super::{Path, Value};
use crate::schema::{Field, FieldTy};
use indexmap::IndexMap;

/// Expression-level type system.
///
/// Griddle has two type systems: [`FieldTy`](crate::schema::FieldTy)
/// describes how a field is *declared* on a model, while `Type` describes
/// what an expression *evaluates to*. Declared types map into expression
/// types through [`Type::from_field`]; drivers map expression types onto
/// their physical storage through their converter registry.
///
/// Every expression that participates in grouping, sorting, or casting
/// must carry a resolvable `Type`; anything untypeable degrades to
/// [`Type::Expr`], which is opaque to dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// Boolean
    Bool,

    /// Signed 64-bit integer
    Integer,

    /// Unsigned 64-bit integer
    Unsigned,

    /// Single-precision floating point
    Float,

    /// Double-precision floating point
    Double,

    /// Fixed-precision decimal
    Decimal,

    /// String
    String,

    /// Raw bytes
    Bytes,

    /// Instant in time
    Timestamp,

    /// Civil calendar date
    Date,

    /// Civil wall-clock time
    Time,

    /// A homogeneous list
    List(Box<Type>),

    /// A json value. The inner shape is present when the declaration
    /// carries typed substructure.
    Json(Option<Box<JsonInner>>),

    /// An opaque expression type with no further structure
    Expr,

    /// The null type; can be cast to any type
    Null,

    /// A type that could not be inferred (e.g., empty list)
    Unknown,
}

/// Substructure of a typed json declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonInner {
    /// A record of typed subfields. Keys may themselves be dotted.
    Object(IndexMap<String, Type>),

    /// A homogeneous json array; carries the element type.
    Array(Type),
}

impl Type {
    pub fn list(elem: impl Into<Type>) -> Self {
        Self::List(Box::new(elem.into()))
    }

    pub fn json_object(fields: impl IntoIterator<Item = (String, Type)>) -> Self {
        Self::Json(Some(Box::new(JsonInner::Object(
            fields.into_iter().collect(),
        ))))
    }

    pub fn json_array(elem: Type) -> Self {
        Self::Json(Some(Box::new(JsonInner::Array(elem))))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Unsigned | Self::Float | Self::Double | Self::Decimal
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Self::Integer | Self::Unsigned)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Timestamp | Self::Date | Self::Time)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    /// The expression type a declared field evaluates to.
    pub fn from_field(field: &Field) -> Type {
        match &field.ty {
            FieldTy::Integer(_) => Type::Integer,
            FieldTy::Unsigned(_) => Type::Unsigned,
            FieldTy::Float => Type::Float,
            FieldTy::Double => Type::Double,
            FieldTy::Decimal { .. } => Type::Decimal,
            FieldTy::Char(_) | FieldTy::String(_) | FieldTy::Text => Type::String,
            FieldTy::Boolean => Type::Bool,
            FieldTy::Timestamp => Type::Timestamp,
            FieldTy::Date => Type::Date,
            FieldTy::Time => Type::Time,
            FieldTy::List => Type::List(Box::new(Type::Unknown)),
            FieldTy::Json { inner } => Type::Json(inner.clone().map(Box::new)),
            FieldTy::Primary => Type::Unsigned,
            FieldTy::Binary(_) => Type::Bytes,
            FieldTy::Expr => field
                .expr
                .as_ref()
                .map(|expr| expr.ty())
                .unwrap_or(Type::Expr),
        }
    }

    /// Infers a concrete type from a runtime value. Arrays infer a
    /// homogeneous element type from their first element; an empty array
    /// has an unknown element type.
    pub fn from_value(value: &Value) -> Type {
        match value {
            Value::Null => Type::Null,
            Value::Bool(_) => Type::Bool,
            Value::I64(_) => Type::Integer,
            Value::U64(_) => Type::Unsigned,
            Value::F64(_) => Type::Double,
            Value::String(_) => Type::String,
            Value::Bytes(_) => Type::Bytes,
            Value::Timestamp(_) => Type::Timestamp,
            Value::Date(_) => Type::Date,
            Value::Time(_) => Type::Time,
            Value::List(items) => Type::List(Box::new(
                items.first().map(Type::from_value).unwrap_or(Type::Unknown),
            )),
            Value::Record(record) => Type::json_object(
                record
                    .iter()
                    .map(|(k, v)| (k.to_string(), Type::from_value(v))),
            ),
        }
    }

    /// The type at a dotted path within this type.
    ///
    /// Traverses object-shaped json by segment; an undefined key on an
    /// array type yields the element type. Dotted object keys match by
    /// stripping the longest matched prefix.
    pub fn get_inner(&self, path: &Path) -> Option<Type> {
        if path.is_empty() {
            return Some(self.clone());
        }

        match self {
            Type::Json(Some(inner)) => match &**inner {
                JsonInner::Object(fields) => {
                    for n in (1..=path.len()).rev() {
                        let prefix = path
                            .iter()
                            .take(n)
                            .collect::<Vec<_>>()
                            .join(".");
                        if let Some(ty) = fields.get(&prefix) {
                            return ty.get_inner(&path.skip(n));
                        }
                    }
                    None
                }
                JsonInner::Array(elem) => elem.get_inner(path),
            },
            Type::List(elem) => elem.get_inner(path),
            _ => None,
        }
    }

    /// Recursively re-coerces a value through the type tree. Containers
    /// recurse; leaves (and opaque json) go through `visit`. Drivers use
    /// this to apply their load/dump converters to nested structure.
    pub fn transform(
        &self,
        value: Value,
        visit: &mut dyn FnMut(Value, &Type) -> Value,
    ) -> Value {
        match (self, value) {
            (Type::List(elem), Value::List(items)) => Value::List(
                items
                    .into_iter()
                    .map(|item| elem.transform(item, visit))
                    .collect(),
            ),
            (Type::Json(Some(inner)), value) => match (&**inner, value) {
                (JsonInner::Object(fields), Value::Record(record)) => {
                    Value::Record(ValueRecordTransform::apply(fields, record, visit))
                }
                (JsonInner::Array(elem), Value::List(items)) => Value::List(
                    items
                        .into_iter()
                        .map(|item| elem.transform(item, visit))
                        .collect(),
                ),
                (_, value) => visit(value, self),
            },
            (ty, value) => visit(value, ty),
        }
    }
}

struct ValueRecordTransform;

impl ValueRecordTransform {
    fn apply(
        fields: &IndexMap<String, Type>,
        record: super::ValueRecord,
        visit: &mut dyn FnMut(Value, &Type) -> Value,
    ) -> super::ValueRecord {
        record
            .into_iter()
            .map(|(key, value)| {
                let value = match fields.get(&key) {
                    Some(ty) => ty.transform(value, visit),
                    None => value,
                };
                (key, value)
            })
            .collect()
    }
}

impl From<&Self> for Type {
    fn from(value: &Self) -> Self {
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_value_infers_list_elem() {
        let ty = Type::from_value(&Value::List(vec![Value::I64(1), Value::I64(2)]));
        assert_eq!(ty, Type::list(Type::Integer));

        let ty = Type::from_value(&Value::List(vec![]));
        assert_eq!(ty, Type::list(Type::Unknown));
    }

    #[test]
    fn get_inner_traverses_objects() {
        let ty = Type::json_object([
            ("name".to_string(), Type::String),
            ("stats".to_string(), Type::json_object([(
                "wins".to_string(),
                Type::Integer,
            )])),
        ]);

        assert_eq!(
            ty.get_inner(&Path::from_dotted("stats.wins")),
            Some(Type::Integer)
        );
        assert_eq!(ty.get_inner(&Path::from_dotted("missing")), None);
    }

    #[test]
    fn get_inner_strips_dotted_prefix() {
        let ty = Type::json_object([("a.b".to_string(), Type::json_object([(
            "c".to_string(),
            Type::Bool,
        )]))]);

        assert_eq!(ty.get_inner(&Path::from_dotted("a.b.c")), Some(Type::Bool));
    }

    #[test]
    fn get_inner_array_passthrough() {
        let ty = Type::json_array(Type::json_object([(
            "score".to_string(),
            Type::Integer,
        )]));

        // Undefined key on an array type yields the element type's inner.
        assert_eq!(
            ty.get_inner(&Path::from_dotted("score")),
            Some(Type::Integer)
        );
    }

    #[test]
    fn transform_recurses_containers() {
        let ty = Type::list(Type::Integer);
        let out = ty.transform(
            Value::List(vec![Value::I64(1), Value::I64(2)]),
            &mut |value, _| match value {
                Value::I64(v) => Value::I64(v * 10),
                other => other,
            },
        );
        assert_eq!(out, Value::List(vec![Value::I64(10), Value::I64(20)]));
    }
}
