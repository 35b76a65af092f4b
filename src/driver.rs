pub mod memory;
pub use memory::MemoryDriver;

use crate::schema::Schema;
use crate::stmt::{Assignments, Expr, Select, Type, Value, ValueRecord};
use crate::{async_trait, Error, Result};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The narrow contract every backend implements.
///
/// Drivers receive selections already processed by the relation
/// resolver. They must preserve the IR semantics; anything they cannot
/// push down they complete by delegating to the portable evaluator on
/// retrieved rows.
#[async_trait]
pub trait Driver: Debug + Send + Sync + 'static {
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Synchronizes one table's physical schema and runs its migration
    /// callbacks through the host protocol.
    async fn prepare(&self, schema: &Schema, table: &str) -> Result<()>;

    async fn drop_table(&self, schema: &Schema, table: &str) -> Result<()>;

    async fn drop_all(&self, schema: &Schema) -> Result<()>;

    async fn stats(&self) -> Result<Stats>;

    /// Returns matching rows, decoded through the converter registry.
    async fn get(&self, schema: &Schema, select: &Select) -> Result<Vec<Value>>;

    /// Evaluates a terminal expression over the selection.
    async fn eval(&self, schema: &Schema, select: &Select, term: &Expr) -> Result<Value>;

    /// Applies assignments to matching rows; returns the affected count.
    async fn set(&self, schema: &Schema, select: &Select, update: &Assignments) -> Result<u64>;

    /// Inserts one row; returns the stored row, which carries the
    /// database-assigned key for autoincrement models.
    async fn create(&self, schema: &Schema, table: &str, row: &ValueRecord) -> Result<Value>;

    /// Inserts-or-updates rows keyed on `keys` (the model's primary key
    /// when empty).
    async fn upsert(
        &self,
        schema: &Schema,
        table: &str,
        rows: &[ValueRecord],
        keys: &[String],
    ) -> Result<()>;

    /// Deletes matching rows; returns the affected count.
    async fn remove(&self, schema: &Schema, select: &Select) -> Result<u64>;

    async fn begin(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;

    /// The driver's logical-type converter registry.
    fn converters(&self) -> &Converters;

    /// The cancellation signal threaded through this driver, when it
    /// supports external cancellation.
    fn cancel_token(&self) -> Option<&CancelToken> {
        None
    }
}

/// Table row counts and related bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub tables: HashMap<String, TableStats>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TableStats {
    pub count: u64,
}

/// An external cancellation signal. Any IR call observing a cancelled
/// token aborts with the cancelled condition and releases transactional
/// resources.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::cancelled())
        } else {
            Ok(())
        }
    }
}

/// The logical type tag a converter registers against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool,
    Integer,
    Unsigned,
    Float,
    Double,
    Decimal,
    String,
    Bytes,
    Timestamp,
    Date,
    Time,
    List,
    Json,
    Expr,
}

impl TypeTag {
    pub fn of(ty: &Type) -> TypeTag {
        match ty {
            Type::Bool => TypeTag::Bool,
            Type::Integer => TypeTag::Integer,
            Type::Unsigned => TypeTag::Unsigned,
            Type::Float => TypeTag::Float,
            Type::Double => TypeTag::Double,
            Type::Decimal => TypeTag::Decimal,
            Type::String => TypeTag::String,
            Type::Bytes => TypeTag::Bytes,
            Type::Timestamp => TypeTag::Timestamp,
            Type::Date => TypeTag::Date,
            Type::Time => TypeTag::Time,
            Type::List(_) => TypeTag::List,
            Type::Json(_) => TypeTag::Json,
            Type::Expr | Type::Null | Type::Unknown => TypeTag::Expr,
        }
    }
}

/// A `{dump, load}` pair mapping a logical type onto a driver's physical
/// representation and back.
#[derive(Clone, Copy)]
pub struct Converter {
    pub dump: fn(Value) -> Result<Value>,
    pub load: fn(Value) -> Result<Value>,
}

/// Per-driver converter registry with optional ancestor chains: a type
/// with no converter of its own falls back to its ancestor's (e.g.
/// `Time` extends `String` on backends lacking a time type).
#[derive(Default, Clone)]
pub struct Converters {
    converters: HashMap<TypeTag, Converter>,
    ancestors: HashMap<TypeTag, TypeTag>,
}

impl Converters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tag: TypeTag, converter: Converter) {
        self.converters.insert(tag, converter);
    }

    /// Declares `tag` to convert through `ancestor` when it has no
    /// converter of its own.
    pub fn ancestor(&mut self, tag: TypeTag, ancestor: TypeTag) {
        self.ancestors.insert(tag, ancestor);
    }

    pub fn lookup(&self, tag: TypeTag) -> Option<&Converter> {
        let mut current = tag;
        // Ancestor chains are short; the bound guards a declaration cycle.
        for _ in 0..8 {
            if let Some(converter) = self.converters.get(&current) {
                return Some(converter);
            }
            current = *self.ancestors.get(&current)?;
        }
        None
    }

    /// Encodes a value for storage, recursing through container types.
    pub fn dump(&self, value: Value, ty: &Type) -> Result<Value> {
        self.apply(value, ty, |converter| converter.dump)
    }

    /// Decodes a stored value, recursing through container types.
    pub fn load(&self, value: Value, ty: &Type) -> Result<Value> {
        self.apply(value, ty, |converter| converter.load)
    }

    fn apply(
        &self,
        value: Value,
        ty: &Type,
        pick: impl Fn(&Converter) -> fn(Value) -> Result<Value>,
    ) -> Result<Value> {
        let mut first_err = None;
        let out = ty.transform(value, &mut |value, leaf_ty| {
            match self.lookup(TypeTag::of(leaf_ty)) {
                Some(converter) => match pick(converter)(value) {
                    Ok(value) => value,
                    Err(err) => {
                        if first_err.is_none() {
                            first_err = Some(err);
                        }
                        Value::Null
                    }
                },
                None => value,
            }
        });

        match first_err {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }
}

impl Debug for Converters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converters")
            .field("registered", &self.converters.keys().collect::<Vec<_>>())
            .field("ancestors", &self.ancestors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestor_chain_lookup() {
        let mut converters = Converters::new();
        converters.register(
            TypeTag::String,
            Converter {
                dump: |v| Ok(v),
                load: |v| Ok(v),
            },
        );
        converters.ancestor(TypeTag::Time, TypeTag::String);

        assert!(converters.lookup(TypeTag::Time).is_some());
        assert!(converters.lookup(TypeTag::Date).is_none());
    }

    #[test]
    fn dump_recurses_into_lists() {
        let mut converters = Converters::new();
        converters.register(
            TypeTag::Integer,
            Converter {
                dump: |v| match v {
                    Value::I64(n) => Ok(Value::I64(n + 1)),
                    v => Ok(v),
                },
                load: |v| Ok(v),
            },
        );

        let out = converters
            .dump(
                Value::List(vec![Value::I64(1), Value::I64(2)]),
                &Type::list(Type::Integer),
            )
            .unwrap();
        assert_eq!(out, Value::List(vec![Value::I64(2), Value::I64(3)]));
    }

    #[test]
    fn cancel_token_trips_once_cancelled() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(token.check().unwrap_err().is_cancelled());
    }
}
