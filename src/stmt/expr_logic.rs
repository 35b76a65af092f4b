use super::{Expr, ExprRef, Type};
use std::fmt;

/// The polymorphic logical/bitwise combinator family.
///
/// `$and`, `$or`, `$not`, and `$xor` are logical when every argument's
/// type is boolean and bitwise over 64-bit integers otherwise. The branch
/// is selected from the argument-type tuple during lowering or
/// evaluation, never by probing runtime values at the emission site.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprLogic {
    pub op: LogicOp,
    pub operands: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
    Not,
    Xor,
}

/// The branch a logic node lowers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicMode {
    Logical,
    Bitwise,
}

impl ExprLogic {
    /// Selects the lowering branch from the operand type tuple.
    pub fn mode(&self, resolve: &mut dyn FnMut(&ExprRef) -> Type) -> LogicMode {
        let all_bool = self
            .operands
            .iter()
            .all(|operand| operand.ty_with(resolve).is_bool());

        if all_bool {
            LogicMode::Logical
        } else {
            LogicMode::Bitwise
        }
    }

    pub(crate) fn result_ty(&self, resolve: &mut dyn FnMut(&ExprRef) -> Type) -> Type {
        match self.mode(resolve) {
            LogicMode::Logical => Type::Bool,
            LogicMode::Bitwise => Type::Integer,
        }
    }
}

impl fmt::Display for LogicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicOp::And => "and".fmt(f),
            LogicOp::Or => "or".fmt(f),
            LogicOp::Not => "not".fmt(f),
            LogicOp::Xor => "xor".fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_dispatches_on_types() {
        let bools = ExprLogic {
            op: LogicOp::And,
            operands: vec![Expr::value(true), Expr::value(false)],
        };
        assert_eq!(bools.mode(&mut |_| Type::Expr), LogicMode::Logical);

        let ints = ExprLogic {
            op: LogicOp::And,
            operands: vec![Expr::value(5i64), Expr::value(6i64)],
        };
        assert_eq!(ints.mode(&mut |_| Type::Expr), LogicMode::Bitwise);
    }

    #[test]
    fn mixed_operands_are_bitwise() {
        let mixed = ExprLogic {
            op: LogicOp::And,
            operands: vec![Expr::value(true), Expr::value(6i64)],
        };
        assert_eq!(mixed.mode(&mut |_| Type::Expr), LogicMode::Bitwise);
    }
}
