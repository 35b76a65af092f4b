//! Builder functions for every eval operator, mirroring the `$`
//! convenience namespace of the application API.
//!
//! ```
//! use griddle::stmt::ops;
//!
//! // $.add($(user.value), 1)
//! let term = ops::add(ops::col("value"), ops::literal(1i64));
//! ```

use super::{
    AggOp, ArithOp, CmpOp, Expr, ExprConcat, ExprIf, ExprLogic, ExprSwitch, LogicOp, Path,
    Select, SwitchCase, Type, Value,
};

/// A reference into the current scope: `$(ref, path)` with the implicit
/// ref.
pub fn col(path: impl Into<Path>) -> Expr {
    Expr::col(path)
}

/// A reference into a named scope.
pub fn scoped(alias: impl Into<String>, path: impl Into<Path>) -> Expr {
    Expr::scoped(alias, path)
}

/// `$literal`
pub fn literal(value: impl Into<Value>) -> Expr {
    Expr::Value(value.into())
}

macro_rules! arith_ops {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
                Expr::arith(ArithOp::$op, vec![lhs.into(), rhs.into()])
            }
        )*
    };
}

arith_ops! {
    add => Add,
    sub => Sub,
    mul => Mul,
    div => Div,
    modulo => Modulo,
    power => Power,
    log => Log,
}

macro_rules! cmp_ops {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
                Expr::cmp(CmpOp::$op, lhs, rhs)
            }
        )*
    };
}

cmp_ops! {
    eq => Eq,
    ne => Ne,
    gt => Gt,
    gte => Gte,
    lt => Lt,
    lte => Lte,
}

/// `$and` — logical on boolean-typed arguments, bitwise otherwise.
pub fn and(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
    Expr::and(lhs, rhs)
}

/// `$or` — logical on boolean-typed arguments, bitwise otherwise.
pub fn or(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
    Expr::or(lhs, rhs)
}

/// `$not`
pub fn not(expr: impl Into<Expr>) -> Expr {
    Expr::not(expr)
}

/// `$xor`
pub fn xor(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
    Expr::Logic(ExprLogic {
        op: LogicOp::Xor,
        operands: vec![lhs.into(), rhs.into()],
    })
}

macro_rules! agg_ops {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(arg: impl Into<Expr>) -> Expr {
                Expr::aggregate(AggOp::$op, arg)
            }
        )*
    };
}

agg_ops! {
    sum => Sum,
    avg => Avg,
    min => Min,
    max => Max,
    count => Count,
    length => Length,
    array => Array,
}

/// `$object`
pub fn object(fields: impl IntoIterator<Item = (String, Expr)>) -> Expr {
    Expr::object(fields)
}

/// `$get`
pub fn get(base: impl Into<Expr>, path: impl Into<Path>) -> Expr {
    Expr::get(base, path)
}

/// `$el` — projects the path out of each element of a list value.
pub fn el(base: impl Into<Expr>, path: impl Into<Path>) -> Expr {
    Expr::El(Box::new(super::ExprGet {
        base: base.into(),
        path: path.into(),
    }))
}

/// `$size`
pub fn size(expr: impl Into<Expr>) -> Expr {
    Expr::Size(Box::new(expr.into()))
}

/// `$concat`
pub fn concat(items: Vec<Expr>) -> Expr {
    Expr::Concat(ExprConcat { items })
}

/// `$if`
pub fn if_(cond: impl Into<Expr>, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Expr {
    Expr::If(Box::new(ExprIf {
        cond: cond.into(),
        then: then.into(),
        otherwise: otherwise.into(),
    }))
}

/// `$switch`
pub fn switch(cases: Vec<(Expr, Expr)>, default: impl Into<Expr>) -> Expr {
    Expr::Switch(Box::new(ExprSwitch {
        cases: cases
            .into_iter()
            .map(|(cond, then)| SwitchCase { cond, then })
            .collect(),
        default: default.into(),
    }))
}

/// `$number` — coerces dates to seconds since epoch, null to 0.
pub fn number(expr: impl Into<Expr>) -> Expr {
    Expr::Number(Box::new(expr.into()))
}

/// Annotates an expression with an explicit result type.
pub fn cast(expr: impl Into<Expr>, ty: Type) -> Expr {
    Expr::cast(expr, ty)
}

/// `$exec` — evaluates a subselection.
pub fn exec(select: Select) -> Expr {
    Expr::subquery(select)
}
