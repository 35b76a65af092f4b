use super::{ExprLogic, ExprRef, LogicOp, Path, Select, SelectKind, Type, Value};
use indexmap::IndexMap;
use std::fmt;

/// A node of the evaluation expression tree.
///
/// Every node has a result type, recovered through [`Expr::ty`] (or
/// [`Expr::ty_with`] when column references can be resolved against a
/// scope). The type drives casting at the driver boundary and dispatch of
/// polymorphic operators.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value
    Value(Value),

    /// A column reference: `$(ref, dotted-path)`
    Ref(ExprRef),

    /// Variadic arithmetic, folded left to right
    Arith(ExprArith),

    /// Binary comparison; result is boolean
    Cmp(Box<ExprCmp>),

    /// Polymorphic logical/bitwise combinator
    Logic(ExprLogic),

    /// Aggregate over a group or a whole selection
    Aggregate(Box<ExprAggregate>),

    /// Two-armed conditional
    If(Box<ExprIf>),

    /// Multi-armed conditional
    Switch(Box<ExprSwitch>),

    /// Builds a nested json object from named terms
    Object(ExprObject),

    /// List constructor
    List(Vec<Expr>),

    /// Projects a path out of a record-valued expression
    Get(Box<ExprGet>),

    /// Pushes into a list-valued expression: projects the path out of
    /// each element
    El(Box<ExprGet>),

    /// Length of a list value
    Size(Box<Expr>),

    /// Concatenation; strings concatenate, lists append
    Concat(ExprConcat),

    /// Numeric coercion: dates become seconds since epoch, null becomes 0
    Number(Box<Expr>),

    /// Explicit type annotation
    Cast(Box<ExprCast>),

    /// Evaluates a subselection (`$exec`)
    Subquery(Box<Select>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Modulo,
    Power,
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggOp {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    Length,
    Array,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprArith {
    pub op: ArithOp,
    pub operands: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprCmp {
    pub op: CmpOp,
    pub lhs: Expr,
    pub rhs: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprAggregate {
    pub op: AggOp,
    pub arg: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprIf {
    pub cond: Expr,
    pub then: Expr,
    pub otherwise: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprSwitch {
    pub cases: Vec<SwitchCase>,
    pub default: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub cond: Expr,
    pub then: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprObject {
    pub fields: IndexMap<String, Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprGet {
    pub base: Expr,
    pub path: Path,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprConcat {
    pub items: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprCast {
    pub expr: Expr,
    pub ty: Type,
}

impl Expr {
    pub fn null() -> Self {
        Self::Value(Value::Null)
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// A reference into the current scope.
    pub fn col(path: impl Into<Path>) -> Self {
        Self::Ref(ExprRef {
            alias: None,
            path: path.into(),
        })
    }

    /// A reference into a named scope (a join participant or outer ref).
    pub fn scoped(alias: impl Into<String>, path: impl Into<Path>) -> Self {
        Self::Ref(ExprRef {
            alias: Some(alias.into()),
            path: path.into(),
        })
    }

    pub fn arith(op: ArithOp, operands: Vec<Expr>) -> Self {
        Self::Arith(ExprArith { op, operands })
    }

    pub fn cmp(op: CmpOp, lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::Cmp(Box::new(ExprCmp {
            op,
            lhs: lhs.into(),
            rhs: rhs.into(),
        }))
    }

    pub fn eq(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::cmp(CmpOp::Eq, lhs, rhs)
    }

    pub fn ne(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::cmp(CmpOp::Ne, lhs, rhs)
    }

    pub fn and(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::Logic(ExprLogic {
            op: LogicOp::And,
            operands: vec![lhs.into(), rhs.into()],
        })
    }

    pub fn or(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::Logic(ExprLogic {
            op: LogicOp::Or,
            operands: vec![lhs.into(), rhs.into()],
        })
    }

    pub fn not(expr: impl Into<Expr>) -> Self {
        Self::Logic(ExprLogic {
            op: LogicOp::Not,
            operands: vec![expr.into()],
        })
    }

    pub fn aggregate(op: AggOp, arg: impl Into<Expr>) -> Self {
        Self::Aggregate(Box::new(ExprAggregate {
            op,
            arg: arg.into(),
        }))
    }

    pub fn object(fields: impl IntoIterator<Item = (String, Expr)>) -> Self {
        Self::Object(ExprObject {
            fields: fields.into_iter().collect(),
        })
    }

    pub fn get(base: impl Into<Expr>, path: impl Into<Path>) -> Self {
        Self::Get(Box::new(ExprGet {
            base: base.into(),
            path: path.into(),
        }))
    }

    pub fn cast(expr: impl Into<Expr>, ty: Type) -> Self {
        Self::Cast(Box::new(ExprCast {
            expr: expr.into(),
            ty,
        }))
    }

    pub fn subquery(select: Select) -> Self {
        Self::Subquery(Box::new(select))
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Is a value that evaluates to null
    pub fn is_value_null(&self) -> bool {
        matches!(self, Self::Value(Value::Null))
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Self::Ref(_))
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate(_))
    }

    /// Returns true if any node in the tree is an aggregate.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Self::Aggregate(_) => true,
            Self::Arith(arith) => arith.operands.iter().any(Expr::contains_aggregate),
            Self::Cmp(cmp) => cmp.lhs.contains_aggregate() || cmp.rhs.contains_aggregate(),
            Self::Logic(logic) => logic.operands.iter().any(Expr::contains_aggregate),
            Self::If(e) => {
                e.cond.contains_aggregate()
                    || e.then.contains_aggregate()
                    || e.otherwise.contains_aggregate()
            }
            Self::Switch(e) => {
                e.cases
                    .iter()
                    .any(|case| case.cond.contains_aggregate() || case.then.contains_aggregate())
                    || e.default.contains_aggregate()
            }
            Self::Object(obj) => obj.fields.values().any(Expr::contains_aggregate),
            Self::List(items) => items.iter().any(Expr::contains_aggregate),
            Self::Get(get) | Self::El(get) => get.base.contains_aggregate(),
            Self::Size(e) | Self::Number(e) => e.contains_aggregate(),
            Self::Concat(concat) => concat.items.iter().any(Expr::contains_aggregate),
            Self::Cast(cast) => cast.expr.contains_aggregate(),
            Self::Value(_) | Self::Ref(_) | Self::Subquery(_) => false,
        }
    }

    pub fn take(&mut self) -> Self {
        std::mem::replace(self, Self::Value(Value::Null))
    }

    /// The result type, treating unresolved references as opaque.
    pub fn ty(&self) -> Type {
        self.ty_with(&mut |_| Type::Expr)
    }

    /// The result type, resolving column references through `resolve`.
    pub fn ty_with(&self, resolve: &mut dyn FnMut(&ExprRef) -> Type) -> Type {
        match self {
            Self::Value(value) => Type::from_value(value),
            Self::Ref(expr_ref) => resolve(expr_ref),
            Self::Arith(arith) => {
                let mut ty = Type::Integer;
                for operand in &arith.operands {
                    match operand.ty_with(resolve) {
                        Type::Float | Type::Double => return Type::Double,
                        Type::Decimal => ty = Type::Decimal,
                        _ => {}
                    }
                }
                ty
            }
            Self::Cmp(_) => Type::Bool,
            Self::Logic(logic) => logic.result_ty(resolve),
            Self::Aggregate(agg) => match agg.op {
                AggOp::Sum | AggOp::Min | AggOp::Max => {
                    let ty = agg.arg.ty_with(resolve);
                    if ty.is_numeric() {
                        ty
                    } else {
                        Type::Integer
                    }
                }
                AggOp::Avg => Type::Double,
                AggOp::Count | AggOp::Length => Type::Integer,
                AggOp::Array => Type::list(agg.arg.ty_with(resolve)),
            },
            Self::If(e) => e.then.ty_with(resolve),
            Self::Switch(e) => e
                .cases
                .first()
                .map(|case| case.then.ty_with(resolve))
                .unwrap_or_else(|| e.default.ty_with(resolve)),
            Self::Object(obj) => Type::json_object(
                obj.fields
                    .iter()
                    .map(|(name, expr)| (name.clone(), expr.ty_with(resolve))),
            ),
            Self::List(items) => Type::List(Box::new(
                items
                    .first()
                    .map(|item| item.ty_with(resolve))
                    .unwrap_or(Type::Unknown),
            )),
            Self::Get(get) => get
                .base
                .ty_with(resolve)
                .get_inner(&get.path)
                .unwrap_or(Type::Expr),
            Self::El(get) => Type::list(
                get.base
                    .ty_with(resolve)
                    .get_inner(&get.path)
                    .unwrap_or(Type::Expr),
            ),
            Self::Size(_) => Type::Integer,
            Self::Concat(concat) => match concat.items.first() {
                Some(first) => match first.ty_with(resolve) {
                    Type::String => Type::String,
                    ty => Type::list(ty),
                },
                None => Type::Unknown,
            },
            Self::Number(_) => Type::Double,
            Self::Cast(cast) => cast.ty.clone(),
            Self::Subquery(select) => match &select.kind {
                SelectKind::Eval(term) => term.ty(),
                _ => Type::list(Type::Json(None)),
            },
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Self::Value(value.into())
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Self::Value(value.into())
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithOp::Add => "+".fmt(f),
            ArithOp::Sub => "-".fmt(f),
            ArithOp::Mul => "*".fmt(f),
            ArithOp::Div => "/".fmt(f),
            ArithOp::Modulo => "%".fmt(f),
            ArithOp::Power => "^".fmt(f),
            ArithOp::Log => "log".fmt(f),
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmpOp::Eq => "=".fmt(f),
            CmpOp::Ne => "!=".fmt(f),
            CmpOp::Gt => ">".fmt(f),
            CmpOp::Gte => ">=".fmt(f),
            CmpOp::Lt => "<".fmt(f),
            CmpOp::Lte => "<=".fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arith_widens_to_double() {
        let expr = Expr::arith(
            ArithOp::Add,
            vec![Expr::value(1i64), Expr::value(2.5f64)],
        );
        assert_eq!(expr.ty(), Type::Double);
    }

    #[test]
    fn object_ty_carries_substructure() {
        let expr = Expr::object([("n".to_string(), Expr::value(1i64))]);
        assert_eq!(
            expr.ty(),
            Type::json_object([("n".to_string(), Type::Integer)])
        );
    }

    #[test]
    fn unresolved_ref_is_opaque() {
        assert_eq!(Expr::col("flags").ty(), Type::Expr);
    }
}
