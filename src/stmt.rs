mod assignments;
pub use assignments::Assignments;

mod expr;
pub use expr::{
    AggOp, ArithOp, CmpOp, Expr, ExprAggregate, ExprArith, ExprCast, ExprCmp, ExprConcat,
    ExprGet, ExprIf, ExprObject, ExprSwitch, SwitchCase,
};

mod expr_logic;
pub use expr_logic::{ExprLogic, LogicMode, LogicOp};

mod expr_ref;
pub use expr_ref::ExprRef;

mod filter;
pub use filter::{FieldOp, Filter, Pattern};

mod mutation;
pub use mutation::{MutationPayload, RelationMutation};

pub mod ops;

mod path;
pub use path::Path;

mod select;
pub use select::{Direction, OrderBy, Select, SelectArgs, SelectKind, Source};

mod ty;
pub use ty::{JsonInner, Type};

mod value;
pub use value::{Value, ValueRecord};
