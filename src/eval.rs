//! The portable evaluator: an in-memory interpreter over the query and
//! eval IRs.
//!
//! Drivers delegate back to this module for whole-row predicate callbacks
//! and for any operator they cannot push down; it is also what tests and
//! fixtures run against.

use crate::schema::Schema;
use crate::stmt::{
    AggOp, ArithOp, CmpOp, Expr, ExprRef, FieldOp, Filter, LogicMode, LogicOp, Path, Select,
    Type, Value, ValueRecord,
};
use crate::{Error, Result};
use std::cmp::Ordering;

/// Row bindings visible to an expression, innermost scope first.
///
/// Reference terms resolve against the current scope's tables, then the
/// join-table environment, then outer refs; all three are scopes on this
/// stack.
pub struct Env<'a> {
    parent: Option<&'a Env<'a>>,
    bindings: Vec<(&'a str, &'a ValueRecord)>,
    group: Option<(&'a str, &'a [ValueRecord])>,
}

impl<'a> Env<'a> {
    pub fn root() -> Self {
        Self {
            parent: None,
            bindings: vec![],
            group: None,
        }
    }

    /// A child environment with one named row bound.
    pub fn bind<'b>(&'b self, alias: &'b str, row: &'b ValueRecord) -> Env<'b> {
        Env {
            parent: Some(self),
            bindings: vec![(alias, row)],
            group: None,
        }
    }

    /// A child environment for a join row: the combined record is bound
    /// under the join alias and each record-valued participant is bound
    /// under its own name, so scoped references resolve per participant.
    pub fn bind_join<'b>(&'b self, alias: &'b str, row: &'b ValueRecord) -> Env<'b> {
        let mut bindings = vec![(alias, row)];
        for (name, value) in row.iter() {
            if let Value::Record(record) = value {
                bindings.push((name, record));
            }
        }
        Env {
            parent: Some(self),
            bindings,
            group: None,
        }
    }

    /// A child environment carrying the rows of the current group, which
    /// aggregates bind to.
    pub fn bind_group<'b>(&'b self, alias: &'b str, rows: &'b [ValueRecord]) -> Env<'b> {
        Env {
            parent: Some(self),
            bindings: vec![],
            group: Some((alias, rows)),
        }
    }

    fn row(&self, alias: Option<&str>) -> Option<&'_ ValueRecord> {
        match alias {
            Some(alias) => {
                for (name, row) in &self.bindings {
                    if *name == alias {
                        return Some(row);
                    }
                }
                self.parent.and_then(|parent| parent.row(Some(alias)))
            }
            None => self
                .bindings
                .first()
                .map(|(_, row)| *row)
                .or_else(|| self.parent.and_then(|parent| parent.row(None))),
        }
    }

    /// Resolves a reference. `Ok(None)` means the row is bound but the
    /// field is absent; an unresolvable alias is a hard error.
    fn resolve(&self, expr_ref: &ExprRef) -> Result<Option<&'_ Value>> {
        let alias = expr_ref.alias.as_deref();
        let Some(row) = self.row(alias) else {
            return Err(Error::expression_unlowerable(format!(
                "unresolvable reference `{}`",
                match alias {
                    Some(alias) => format!("{alias}.{}", expr_ref.path),
                    None => expr_ref.path.to_string(),
                }
            )));
        };

        // An unqualified path may still address a named binding, as join
        // rows are records keyed by participant name.
        match row.get_path(&expr_ref.path) {
            Some(value) => Ok(Some(value)),
            None if alias.is_none() => {
                if let Some(first) = expr_ref.path.first() {
                    if let Some(row) = self.row(Some(first)) {
                        return Ok(row.get_path(&expr_ref.path.rest()));
                    }
                }
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn group(&self) -> Option<(&str, &[ValueRecord])> {
        self.group
            .or_else(|| self.parent.and_then(|parent| parent.group()))
    }
}

/// Executes subselections on behalf of the evaluator: `$exec` terms and
/// lowered existence predicates call back into the owning driver through
/// this trait.
pub trait Backend {
    /// Executes a selection under an outer environment. `Get`-kind
    /// selections return a list of rows; `Eval`-kind return the terminal
    /// value.
    fn execute(&self, select: &Select, env: &Env<'_>) -> Result<Value>;
}

/// The interpreter. Stateless; borrows the schema and an optional
/// subquery backend.
pub struct Evaluator<'a> {
    pub schema: &'a Schema,
    pub backend: Option<&'a dyn Backend>,
}

impl<'a> Evaluator<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            backend: None,
        }
    }

    pub fn with_backend(schema: &'a Schema, backend: &'a dyn Backend) -> Self {
        Self {
            schema,
            backend: Some(backend),
        }
    }

    /// Evaluates a filter against a single row.
    pub fn matches(&self, filter: &Filter, alias: &str, row: &ValueRecord) -> Result<bool> {
        let root = Env::root();
        let env = root.bind(alias, row);
        self.matches_in(filter, &env)
    }

    /// Evaluates a filter in an existing environment.
    pub fn matches_in(&self, filter: &Filter, env: &Env<'_>) -> Result<bool> {
        match filter {
            // Empty $and matches all rows; both combinators short-circuit.
            Filter::And(branches) => {
                for branch in branches {
                    if !self.matches_in(branch, env)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            // Empty $or matches no rows.
            Filter::Or(branches) => {
                for branch in branches {
                    if self.matches_in(branch, env)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Not(branch) => Ok(!self.matches_in(branch, env)?),
            Filter::Expr(expr) => self.eval_bool(expr, env),
            Filter::Field(path, op) => {
                let value = env.resolve(&ExprRef::new(None, path.clone()))?;
                self.match_field(value, op)
            }
            Filter::Exists(select) => {
                let backend = self.backend.ok_or_else(|| {
                    Error::expression_unlowerable("existence subquery requires a backend")
                })?;
                match backend.execute(select, env)? {
                    Value::List(rows) => Ok(!rows.is_empty()),
                    value => Ok(!value.is_null()),
                }
            }
        }
    }

    fn match_field(&self, value: Option<&Value>, op: &FieldOp) -> Result<bool> {
        let null = Value::Null;
        let present = value.unwrap_or(&null);

        Ok(match op {
            FieldOp::Eq(rhs) => present.compares_eq(rhs),
            FieldOp::Ne(rhs) => !present.compares_eq(rhs),
            FieldOp::Gt(rhs) => matches!(present.compare(rhs), Some(Ordering::Greater)),
            FieldOp::Gte(rhs) => matches!(
                present.compare(rhs),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FieldOp::Lt(rhs) => matches!(present.compare(rhs), Some(Ordering::Less)),
            FieldOp::Lte(rhs) => {
                matches!(present.compare(rhs), Some(Ordering::Less | Ordering::Equal))
            }
            // Empty $in matches nothing.
            FieldOp::In(items) => items.iter().any(|item| present.compares_eq(item)),
            // Empty $nin matches everything.
            FieldOp::Nin(items) => !items.iter().any(|item| present.compares_eq(item)),
            FieldOp::Regex(pattern) => match present.as_str() {
                Some(text) => pattern.compile()?.is_match(text),
                None => false,
            },
            // Inverted operands: the data is the pattern.
            FieldOp::RegexFor(text) => match present.as_str() {
                Some(source) => crate::stmt::Pattern::new(source).compile()?.is_match(text),
                None => false,
            },
            FieldOp::Exists(true) => !present.is_null(),
            FieldOp::Exists(false) => present.is_null(),
            FieldOp::El(inner) => match present {
                Value::List(items) => {
                    for item in items {
                        if self.match_field(Some(item), inner)? {
                            return Ok(true);
                        }
                    }
                    false
                }
                _ => false,
            },
            FieldOp::Size(n) => match present {
                Value::List(items) => items.len() as u64 == *n,
                _ => false,
            },
            FieldOp::BitsAllSet(mask) => present
                .as_i64()
                .is_some_and(|bits| bits & mask == *mask),
            FieldOp::BitsAllClear(mask) => {
                present.as_i64().is_some_and(|bits| bits & mask == 0)
            }
            FieldOp::BitsAnySet(mask) => {
                present.as_i64().is_some_and(|bits| bits & mask != 0)
            }
            FieldOp::BitsAnyClear(mask) => present
                .as_i64()
                .is_some_and(|bits| bits & mask != *mask),
            FieldOp::Some(query) => {
                let rows = materialized_rows(present);
                for row in rows {
                    if self.matches(query, "", row)? {
                        return Ok(true);
                    }
                }
                false
            }
            FieldOp::None(query) => {
                let rows = materialized_rows(present);
                for row in rows {
                    if self.matches(query, "", row)? {
                        return Ok(false);
                    }
                }
                true
            }
            // Vacuously true when the child set is empty.
            FieldOp::Every(query) => {
                let rows = materialized_rows(present);
                for row in rows {
                    if !self.matches(query, "", row)? {
                        return Ok(false);
                    }
                }
                true
            }
        })
    }

    /// Evaluates an expression to a value.
    pub fn eval(&self, expr: &Expr, env: &Env<'_>) -> Result<Value> {
        match expr {
            Expr::Value(value) => Ok(value.clone()),
            Expr::Ref(expr_ref) => Ok(env.resolve(expr_ref)?.cloned().unwrap_or(Value::Null)),
            Expr::Arith(arith) => {
                let mut operands = arith.operands.iter();
                let Some(first) = operands.next() else {
                    return Ok(Value::Null);
                };
                let mut acc = self.eval(first, env)?;
                for operand in operands {
                    let rhs = self.eval(operand, env)?;
                    acc = arith_step(arith.op, acc, rhs)?;
                }
                Ok(acc)
            }
            Expr::Cmp(cmp) => {
                let lhs = self.eval(&cmp.lhs, env)?;
                let rhs = self.eval(&cmp.rhs, env)?;
                Ok(Value::Bool(match cmp.op {
                    CmpOp::Eq => lhs.compares_eq(&rhs),
                    CmpOp::Ne => !lhs.compares_eq(&rhs),
                    CmpOp::Gt => matches!(lhs.compare(&rhs), Some(Ordering::Greater)),
                    CmpOp::Gte => matches!(
                        lhs.compare(&rhs),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    CmpOp::Lt => matches!(lhs.compare(&rhs), Some(Ordering::Less)),
                    CmpOp::Lte => {
                        matches!(lhs.compare(&rhs), Some(Ordering::Less | Ordering::Equal))
                    }
                }))
            }
            Expr::Logic(logic) => {
                let mode = logic.mode(&mut |expr_ref| {
                    match env.resolve(expr_ref) {
                        Ok(Some(value)) => Type::from_value(value),
                        _ => Type::Expr,
                    }
                });

                match (mode, logic.op) {
                    (LogicMode::Logical, LogicOp::And) => {
                        for operand in &logic.operands {
                            if !self.eval_bool(operand, env)? {
                                return Ok(Value::Bool(false));
                            }
                        }
                        Ok(Value::Bool(true))
                    }
                    (LogicMode::Logical, LogicOp::Or) => {
                        for operand in &logic.operands {
                            if self.eval_bool(operand, env)? {
                                return Ok(Value::Bool(true));
                            }
                        }
                        Ok(Value::Bool(false))
                    }
                    (LogicMode::Logical, LogicOp::Not) => {
                        let [operand] = &logic.operands[..] else {
                            return Err(Error::expression_unlowerable(
                                "$not takes exactly one argument",
                            ));
                        };
                        Ok(Value::Bool(!self.eval_bool(operand, env)?))
                    }
                    (LogicMode::Logical, LogicOp::Xor) => {
                        let mut acc = false;
                        for operand in &logic.operands {
                            acc ^= self.eval_bool(operand, env)?;
                        }
                        Ok(Value::Bool(acc))
                    }
                    (LogicMode::Bitwise, op) => {
                        let mut bits = vec![];
                        for operand in &logic.operands {
                            bits.push(self.eval_i64(operand, env)?);
                        }
                        Ok(Value::I64(match op {
                            LogicOp::And => bits.into_iter().fold(-1, |acc, b| acc & b),
                            LogicOp::Or => bits.into_iter().fold(0, |acc, b| acc | b),
                            LogicOp::Xor => bits.into_iter().fold(0, |acc, b| acc ^ b),
                            LogicOp::Not => {
                                let &[bits] = bits.as_slice() else {
                                    return Err(Error::expression_unlowerable(
                                        "$not takes exactly one argument",
                                    ));
                                };
                                !bits
                            }
                        }))
                    }
                }
            }
            Expr::Aggregate(agg) => {
                let values = self.aggregate_input(&agg.arg, env)?;
                Ok(fold_aggregate(agg.op, values)?)
            }
            Expr::If(e) => {
                if self.eval_bool(&e.cond, env)? {
                    self.eval(&e.then, env)
                } else {
                    self.eval(&e.otherwise, env)
                }
            }
            Expr::Switch(e) => {
                for case in &e.cases {
                    if self.eval_bool(&case.cond, env)? {
                        return self.eval(&case.then, env);
                    }
                }
                self.eval(&e.default, env)
            }
            Expr::Object(obj) => {
                let mut record = ValueRecord::new();
                for (name, field) in &obj.fields {
                    record.insert_path(&Path::from_dotted(name), self.eval(field, env)?);
                }
                Ok(Value::Record(record))
            }
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, env)?);
                }
                Ok(Value::List(out))
            }
            Expr::Get(get) => {
                let base = self.eval(&get.base, env)?;
                Ok(match base {
                    Value::Record(record) => {
                        record.get_path(&get.path).cloned().unwrap_or(Value::Null)
                    }
                    Value::Null => Value::Null,
                    _ => {
                        return Err(Error::expression_unlowerable(
                            "$get requires an object-valued base",
                        ))
                    }
                })
            }
            Expr::El(get) => {
                let base = self.eval(&get.base, env)?;
                match base {
                    Value::List(items) => Ok(Value::List(
                        items
                            .into_iter()
                            .map(|item| match item {
                                Value::Record(record) => record
                                    .get_path(&get.path)
                                    .cloned()
                                    .unwrap_or(Value::Null),
                                item if get.path.is_empty() => item,
                                _ => Value::Null,
                            })
                            .collect(),
                    )),
                    Value::Null => Ok(Value::List(vec![])),
                    _ => Err(Error::expression_unlowerable(
                        "$el requires a list-valued base",
                    )),
                }
            }
            Expr::Size(inner) => match self.eval(inner, env)? {
                Value::List(items) => Ok(Value::I64(items.len() as i64)),
                Value::Null => Ok(Value::I64(0)),
                _ => Err(Error::expression_unlowerable(
                    "$size requires a list value",
                )),
            },
            Expr::Concat(concat) => {
                let mut values = Vec::with_capacity(concat.items.len());
                for item in &concat.items {
                    values.push(self.eval(item, env)?);
                }

                if values.iter().all(|v| matches!(v, Value::String(_))) {
                    let mut out = String::new();
                    for value in values {
                        let Value::String(s) = value else { unreachable!() };
                        out.push_str(&s);
                    }
                    Ok(Value::String(out))
                } else {
                    let mut out = vec![];
                    for value in values {
                        match value {
                            Value::List(items) => out.extend(items),
                            Value::Null => {}
                            value => out.push(value),
                        }
                    }
                    Ok(Value::List(out))
                }
            }
            Expr::Number(inner) => {
                let value = self.eval(inner, env)?;
                Ok(match value {
                    Value::Null => Value::I64(0),
                    Value::Bool(b) => Value::I64(b as i64),
                    value @ (Value::I64(_) | Value::U64(_) | Value::F64(_)) => value,
                    // Dates coerce to seconds since epoch.
                    value => match value.epoch_millis() {
                        Some(millis) => Value::I64(millis / 1000),
                        None => {
                            return Err(Error::expression_unlowerable(
                                "$number requires a numeric, boolean, or temporal value",
                            ))
                        }
                    },
                })
            }
            Expr::Cast(cast) => {
                let value = self.eval(&cast.expr, env)?;
                Ok(cast_value(value, &cast.ty))
            }
            Expr::Subquery(select) => {
                let backend = self.backend.ok_or_else(|| {
                    Error::expression_unlowerable("subquery requires a backend")
                })?;
                backend.execute(select, env)
            }
        }
    }

    pub fn eval_bool(&self, expr: &Expr, env: &Env<'_>) -> Result<bool> {
        match self.eval(expr, env)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            value => Err(Error::expression_unlowerable(format!(
                "expected boolean value, got {value:?}"
            ))),
        }
    }

    fn eval_i64(&self, expr: &Expr, env: &Env<'_>) -> Result<i64> {
        let value = self.eval(expr, env)?;
        value.as_i64().ok_or_else(|| {
            Error::expression_unlowerable(format!("expected integer value, got {value:?}"))
        })
    }

    /// The values an aggregate folds over. Inside a grouping context the
    /// argument binds to each row of the group; outside, the argument
    /// must itself evaluate to a list spanning the selection.
    fn aggregate_input(&self, arg: &Expr, env: &Env<'_>) -> Result<Vec<Value>> {
        if let Some((alias, rows)) = env.group() {
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let child = env.bind(alias, row);
                out.push(self.eval(arg, &child)?);
            }
            return Ok(out);
        }

        match self.eval(arg, env)? {
            Value::List(items) => Ok(items),
            Value::Null => Ok(vec![]),
            _ => Err(Error::expression_unlowerable(
                "aggregate outside grouping requires a list-valued argument",
            )),
        }
    }
}

fn materialized_rows(value: &Value) -> Vec<&ValueRecord> {
    match value {
        Value::List(items) => items.iter().filter_map(Value::as_record).collect(),
        _ => vec![],
    }
}

fn arith_step(op: ArithOp, lhs: Value, rhs: Value) -> Result<Value> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }

    let integral = matches!(lhs, Value::I64(_) | Value::U64(_))
        && matches!(rhs, Value::I64(_) | Value::U64(_))
        && !matches!(op, ArithOp::Div | ArithOp::Power | ArithOp::Log);

    if integral {
        let (a, b) = (lhs.as_i64().unwrap(), rhs.as_i64().unwrap());
        return Ok(Value::I64(match op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
            ArithOp::Mul => a.wrapping_mul(b),
            ArithOp::Modulo => {
                if b == 0 {
                    return Err(Error::expression_unlowerable("modulo by zero"));
                }
                a % b
            }
            ArithOp::Div | ArithOp::Power | ArithOp::Log => unreachable!(),
        }));
    }

    let (a, b) = match (lhs.numeric(), rhs.numeric()) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(Error::expression_unlowerable(
                "arithmetic requires numeric operands",
            ))
        }
    };

    Ok(Value::F64(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Modulo => a % b,
        ArithOp::Power => a.powf(b),
        ArithOp::Log => a.log(b),
    }))
}

fn fold_aggregate(op: AggOp, values: Vec<Value>) -> Result<Value> {
    // Scalar aggregates return their default on empty sets: 0 for the
    // numeric family, [] for $array.
    Ok(match op {
        AggOp::Count => Value::I64(values.iter().filter(|v| !v.is_null()).count() as i64),
        AggOp::Length => Value::I64(values.len() as i64),
        AggOp::Array => Value::List(values),
        AggOp::Sum => {
            let mut int_acc: i64 = 0;
            let mut float_acc: f64 = 0.0;
            let mut all_int = true;
            for value in &values {
                match value {
                    Value::Null => {}
                    Value::I64(v) => {
                        int_acc = int_acc.wrapping_add(*v);
                        float_acc += *v as f64;
                    }
                    Value::U64(v) => {
                        int_acc = int_acc.wrapping_add(*v as i64);
                        float_acc += *v as f64;
                    }
                    value => match value.numeric() {
                        Some(v) => {
                            all_int = false;
                            float_acc += v;
                        }
                        None => {
                            return Err(Error::expression_unlowerable(
                                "$sum requires numeric values",
                            ))
                        }
                    },
                }
            }
            if all_int {
                Value::I64(int_acc)
            } else {
                Value::F64(float_acc)
            }
        }
        AggOp::Avg => {
            let numerics: Vec<f64> = values.iter().filter_map(Value::numeric).collect();
            if numerics.is_empty() {
                Value::I64(0)
            } else {
                Value::F64(numerics.iter().sum::<f64>() / numerics.len() as f64)
            }
        }
        AggOp::Min | AggOp::Max => {
            let mut best: Option<Value> = None;
            for value in values {
                if value.is_null() {
                    continue;
                }
                best = Some(match best {
                    None => value,
                    Some(current) => {
                        let keep_new = match value.compare(&current) {
                            Some(Ordering::Less) => op == AggOp::Min,
                            Some(Ordering::Greater) => op == AggOp::Max,
                            _ => false,
                        };
                        if keep_new {
                            value
                        } else {
                            current
                        }
                    }
                });
            }
            best.unwrap_or(Value::I64(0))
        }
    })
}

fn cast_value(value: Value, ty: &Type) -> Value {
    match (ty, value) {
        (Type::Integer, Value::F64(v)) => Value::I64(v as i64),
        (Type::Integer, Value::U64(v)) => Value::I64(v as i64),
        (Type::Unsigned, Value::I64(v)) if v >= 0 => Value::U64(v as u64),
        (Type::Double | Type::Float | Type::Decimal, Value::I64(v)) => Value::F64(v as f64),
        (Type::Double | Type::Float | Type::Decimal, Value::U64(v)) => Value::F64(v as f64),
        (Type::String, Value::String(v)) => Value::String(v),
        (Type::Bool, Value::I64(v)) => Value::Bool(v != 0),
        (_, value) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stmt::ops;

    fn schema() -> Schema {
        Schema::new()
    }

    fn row(entries: &[(&str, Value)]) -> ValueRecord {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn empty_combinators() {
        let schema = schema();
        let evaluator = Evaluator::new(&schema);
        let row = row(&[("id", Value::I64(1))]);

        // Empty $and matches all rows; empty $or matches none.
        assert!(evaluator.matches(&Filter::And(vec![]), "t", &row).unwrap());
        assert!(!evaluator.matches(&Filter::Or(vec![]), "t", &row).unwrap());
    }

    #[test]
    fn in_nin_empty_semantics() {
        let schema = schema();
        let evaluator = Evaluator::new(&schema);
        let row = row(&[("id", Value::I64(1))]);

        assert!(!evaluator
            .matches(&Filter::is_in("id", vec![]), "t", &row)
            .unwrap());
        assert!(evaluator
            .matches(&Filter::not_in("id", vec![]), "t", &row)
            .unwrap());
    }

    #[test]
    fn bitwise_polymorphism() {
        let schema = schema();
        let evaluator = Evaluator::new(&schema);
        let root = Env::root();
        let row = row(&[("flags", Value::I64(5)), ("a", Value::Bool(true))]);
        let env = root.bind("t", &row);

        // Integer operands: bitwise. 5 & 6 == 4.
        let bitwise = ops::and(ops::col("flags"), ops::literal(6i64));
        assert_eq!(evaluator.eval(&bitwise, &env).unwrap(), Value::I64(4));

        // Boolean operands: logical.
        let logical = ops::and(ops::col("a"), ops::literal(false));
        assert_eq!(evaluator.eval(&logical, &env).unwrap(), Value::Bool(false));
    }

    #[test]
    fn every_vacuous_on_empty_child_set() {
        let schema = schema();
        let evaluator = Evaluator::new(&schema);
        let empty = row(&[("posts", Value::List(vec![]))]);

        let filter = Filter::every("posts", Filter::eq("author", Value::Null));
        assert!(evaluator.matches(&filter, "t", &empty).unwrap());

        let with_child = row(&[(
            "posts",
            Value::List(vec![Value::Record(row(&[("author", Value::I64(1))]))]),
        )]);
        assert!(!evaluator.matches(&filter, "t", &with_child).unwrap());
    }

    #[test]
    fn none_is_not_some() {
        let schema = schema();
        let evaluator = Evaluator::new(&schema);
        let data = row(&[(
            "posts",
            Value::List(vec![Value::Record(row(&[("score", Value::I64(2))]))]),
        )]);

        let query = Filter::gt("score", Value::I64(1));
        let some = Filter::some("posts", query.clone());
        let none = Filter::none("posts", query);

        assert!(evaluator.matches(&some, "t", &data).unwrap());
        assert!(!evaluator.matches(&none, "t", &data).unwrap());
    }

    #[test]
    fn aggregates_bind_to_group() {
        let schema = schema();
        let evaluator = Evaluator::new(&schema);

        let rows = vec![
            row(&[("value", Value::I64(1))]),
            row(&[("value", Value::I64(2))]),
            row(&[("value", Value::I64(4))]),
        ];
        let root = Env::root();
        let env = root.bind_group("t", &rows);

        assert_eq!(
            evaluator.eval(&ops::sum(ops::col("value")), &env).unwrap(),
            Value::I64(7)
        );
        assert_eq!(
            evaluator.eval(&ops::max(ops::col("value")), &env).unwrap(),
            Value::I64(4)
        );
        assert_eq!(
            evaluator
                .eval(&ops::count(ops::col("value")), &env)
                .unwrap(),
            Value::I64(3)
        );
    }

    #[test]
    fn aggregate_defaults_on_empty() {
        let schema = schema();
        let evaluator = Evaluator::new(&schema);
        let rows: Vec<ValueRecord> = vec![];
        let root = Env::root();
        let env = root.bind_group("t", &rows);

        assert_eq!(
            evaluator.eval(&ops::sum(ops::col("value")), &env).unwrap(),
            Value::I64(0)
        );
        assert_eq!(
            evaluator
                .eval(&ops::array(ops::col("value")), &env)
                .unwrap(),
            Value::List(vec![])
        );
    }

    #[test]
    fn number_coerces_dates_and_null() {
        use chrono::TimeZone;

        let schema = schema();
        let evaluator = Evaluator::new(&schema);
        let env = Env::root();

        let ts = chrono::Utc.with_ymd_and_hms(1970, 1, 1, 0, 1, 0).unwrap();
        assert_eq!(
            evaluator
                .eval(&ops::number(ops::literal(Value::Timestamp(ts))), &env)
                .unwrap(),
            Value::I64(60)
        );
        assert_eq!(
            evaluator
                .eval(&ops::number(ops::literal(Value::Null)), &env)
                .unwrap(),
            Value::I64(0)
        );
    }

    #[test]
    fn el_and_size() {
        let schema = schema();
        let evaluator = Evaluator::new(&schema);
        let data = row(&[(
            "scores",
            Value::List(vec![Value::I64(1), Value::I64(5)]),
        )]);

        let el = Filter::field("scores", FieldOp::El(Box::new(FieldOp::Gt(Value::I64(3)))));
        assert!(evaluator.matches(&el, "t", &data).unwrap());

        let size = Filter::field("scores", FieldOp::Size(2));
        assert!(evaluator.matches(&size, "t", &data).unwrap());
    }

    #[test]
    fn el_projects_each_element() {
        let schema = schema();
        let evaluator = Evaluator::new(&schema);
        let root = Env::root();
        let data = row(&[(
            "posts",
            Value::List(vec![
                Value::Record(row(&[("score", Value::I64(2))])),
                Value::Record(row(&[("score", Value::I64(3))])),
            ]),
        )]);
        let env = root.bind("t", &data);

        let scores = ops::el(ops::col("posts"), "score");
        assert_eq!(
            evaluator.eval(&scores, &env).unwrap(),
            Value::List(vec![Value::I64(2), Value::I64(3)])
        );

        // Composes with aggregates outside a grouping context.
        let total = ops::sum(ops::el(ops::col("posts"), "score"));
        assert_eq!(evaluator.eval(&total, &env).unwrap(), Value::I64(5));
    }

    #[test]
    fn regex_for_inverts_operands() {
        let schema = schema();
        let evaluator = Evaluator::new(&schema);
        let data = row(&[("pattern", Value::String("^ab+c".to_string()))]);

        let filter = Filter::field("pattern", FieldOp::RegexFor("abbbc".to_string()));
        assert!(evaluator.matches(&filter, "t", &data).unwrap());
    }
}
