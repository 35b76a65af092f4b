use super::Relation;
use crate::stmt::{Expr, JsonInner, Value, ValueRecord};
use crate::{Error, Result};

/// A declared field on a model.
#[derive(Debug, Clone)]
pub struct Field {
    /// The field name; may be dotted for fields nested inside json
    /// structure.
    pub name: String,

    /// The declared semantic type.
    pub ty: FieldTy,

    /// True if the field accepts null.
    pub nullable: bool,

    /// Value seeded by `create` when the caller omits the field.
    /// Defaults by type unless nullable.
    pub initial: Option<Value>,

    /// The defining expression of a computed (`expr`) field.
    pub expr: Option<Expr>,

    /// Former names of this field, addressable by migration callbacks.
    pub legacy_names: Vec<String>,

    /// Deprecated fields never participate in `create` defaulting but
    /// remain addressable for migration.
    pub deprecated: bool,

    /// The relation declared at this field position, if any.
    pub relation: Option<Relation>,
}

/// The declared type of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTy {
    Integer(Option<u32>),
    Unsigned(Option<u32>),
    Float,
    Double,
    Decimal { precision: u32, scale: u32 },
    Char(Option<u32>),
    String(Option<u32>),
    Text,
    Boolean,
    Timestamp,
    Date,
    Time,
    List,
    Json { inner: Option<JsonInner> },
    /// Autoincrement key; requires the owning model to enable
    /// autoincrement.
    Primary,
    Binary(Option<u32>),
    /// Computed field; evaluates its defining expression.
    Expr,
}

/// Duck-typed field declaration accepted by `extend`: either the
/// shorthand grammar or a full field record. Parsed eagerly into a
/// normalized [`Field`] at extension time.
#[derive(Debug, Clone)]
pub enum FieldDef {
    Shorthand(String),
    Field(Field),
}

impl Field {
    pub fn new(ty: FieldTy) -> Self {
        Self {
            name: String::new(),
            ty,
            nullable: false,
            initial: None,
            expr: None,
            legacy_names: vec![],
            deprecated: false,
            relation: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn initial(mut self, value: impl Into<Value>) -> Self {
        self.initial = Some(value.into());
        self
    }

    pub fn computed(mut self, expr: Expr) -> Self {
        self.expr = Some(expr);
        self
    }

    pub fn legacy(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.legacy_names = names.into_iter().collect();
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relation = Some(relation);
        self
    }

    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }

    /// Fills the missing `initial` from the type default. Nullable and
    /// deprecated fields keep no default.
    pub(crate) fn apply_default_initial(&mut self) {
        if self.initial.is_none() && !self.nullable && !self.deprecated {
            self.initial = self.ty.default_initial();
        }
    }
}

impl FieldTy {
    /// Parses the field shorthand grammar: `TYPE | TYPE(arg) | TYPE(p,s)`.
    pub fn parse_shorthand(field: &str, shorthand: &str) -> Result<FieldTy> {
        let (base, args) = split_shorthand(field, shorthand)?;

        let arity = |max: usize| -> Result<()> {
            if args.len() > max {
                return Err(Error::invalid_field(
                    field,
                    format!("type `{base}` takes at most {max} argument(s)"),
                ));
            }
            Ok(())
        };

        Ok(match base.as_str() {
            "integer" => {
                arity(1)?;
                FieldTy::Integer(args.first().copied())
            }
            "unsigned" => {
                arity(1)?;
                FieldTy::Unsigned(args.first().copied())
            }
            "float" => {
                arity(0)?;
                FieldTy::Float
            }
            "double" => {
                arity(0)?;
                FieldTy::Double
            }
            "decimal" => {
                arity(2)?;
                FieldTy::Decimal {
                    precision: args.first().copied().unwrap_or(10),
                    scale: args.get(1).copied().unwrap_or(0),
                }
            }
            "char" => {
                arity(1)?;
                FieldTy::Char(args.first().copied())
            }
            "string" => {
                arity(1)?;
                FieldTy::String(args.first().copied())
            }
            "text" => {
                arity(1)?;
                FieldTy::Text
            }
            // Length arguments on temporal and boolean types are accepted
            // and ignored.
            "boolean" => {
                arity(1)?;
                FieldTy::Boolean
            }
            "timestamp" => {
                arity(1)?;
                FieldTy::Timestamp
            }
            "date" => {
                arity(1)?;
                FieldTy::Date
            }
            "time" => {
                arity(1)?;
                FieldTy::Time
            }
            "list" => {
                arity(0)?;
                FieldTy::List
            }
            "json" => {
                arity(0)?;
                FieldTy::Json { inner: None }
            }
            "primary" => {
                arity(0)?;
                FieldTy::Primary
            }
            "binary" => {
                arity(1)?;
                FieldTy::Binary(args.first().copied())
            }
            "expr" => {
                arity(0)?;
                FieldTy::Expr
            }
            other => {
                return Err(Error::invalid_field(
                    field,
                    format!("unknown type `{other}`"),
                ))
            }
        })
    }

    /// The per-type `create` default: 0 for numerics, '' for strings,
    /// [] for lists, {} for json. Temporal, boolean, binary, key, and
    /// computed fields have no default.
    pub fn default_initial(&self) -> Option<Value> {
        Some(match self {
            FieldTy::Integer(_) => Value::I64(0),
            FieldTy::Unsigned(_) => Value::U64(0),
            FieldTy::Float | FieldTy::Double | FieldTy::Decimal { .. } => Value::F64(0.0),
            FieldTy::Char(_) | FieldTy::String(_) | FieldTy::Text => {
                Value::String(std::string::String::new())
            }
            FieldTy::List => Value::List(vec![]),
            FieldTy::Json { .. } => Value::Record(ValueRecord::new()),
            _ => return None,
        })
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldTy::Timestamp | FieldTy::Date | FieldTy::Time)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldTy::Integer(_)
                | FieldTy::Unsigned(_)
                | FieldTy::Float
                | FieldTy::Double
                | FieldTy::Decimal { .. }
                | FieldTy::Primary
        )
    }
}

fn split_shorthand(field: &str, shorthand: &str) -> Result<(String, Vec<u32>)> {
    let shorthand = shorthand.trim();

    let Some(open) = shorthand.find('(') else {
        return Ok((shorthand.to_string(), vec![]));
    };

    if !shorthand.ends_with(')') {
        return Err(Error::invalid_field(
            field,
            format!("malformed shorthand `{shorthand}`"),
        ));
    }

    let base = shorthand[..open].to_string();
    let inner = &shorthand[open + 1..shorthand.len() - 1];

    let mut args = vec![];
    for part in inner.split(',') {
        let part = part.trim();
        let arg = part.parse::<u32>().map_err(|_| {
            Error::invalid_field(
                field,
                format!("malformed shorthand argument `{part}` in `{shorthand}`"),
            )
        })?;
        args.push(arg);
    }

    Ok((base, args))
}

impl FieldDef {
    /// Normalizes the declaration into a [`Field`] named `name`.
    pub fn into_field(self, name: &str) -> Result<Field> {
        let mut field = match self {
            FieldDef::Shorthand(shorthand) => {
                Field::new(FieldTy::parse_shorthand(name, &shorthand)?)
            }
            FieldDef::Field(field) => field,
        };
        field.name = name.to_string();
        Ok(field)
    }
}

impl From<&str> for FieldDef {
    fn from(value: &str) -> Self {
        Self::Shorthand(value.to_string())
    }
}

impl From<String> for FieldDef {
    fn from(value: String) -> Self {
        Self::Shorthand(value)
    }
}

impl From<Field> for FieldDef {
    fn from(value: Field) -> Self {
        Self::Field(value)
    }
}
