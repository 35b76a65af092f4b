//! The relation resolver.
//!
//! Rewrites relation-bearing selections into equivalent join/subselect
//! plans: lowers `$some`/`$none`/`$every` predicates into correlated
//! existence subqueries, plans include trees as secondary fetches keyed
//! by parent key, and decomposes nested mutation payloads into ordered
//! per-relation cascades. Resolution never mutates its input; it
//! produces a new selection tree.

mod cascade;
pub use cascade::{split_payload, RelationCascade};

mod include;
pub use include::{key_filter, Include};

mod predicate;

use crate::schema::Schema;
use crate::stmt::{Select, Source};
use crate::Result;

/// Stateless rewriter over selections. Borrows the registry; one value
/// can resolve any number of selections.
pub struct Resolver<'a> {
    pub schema: &'a Schema,
}

impl<'a> Resolver<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Produces an equivalent selection with every relation predicate
    /// lowered to a plan the driver contract understands.
    pub fn resolve_select(&self, select: &Select) -> Result<Select> {
        let mut out = select.clone();

        out.source = match out.source {
            Source::Table(table) => Source::Table(table),
            Source::Select(inner) => Source::Select(Box::new(self.resolve_select(&inner)?)),
            Source::Join(parts) => {
                let mut resolved = indexmap::IndexMap::new();
                for (name, part) in parts {
                    resolved.insert(name, self.resolve_select(&part)?);
                }
                Source::Join(resolved)
            }
        };

        if let Some(model) = out.model.clone() {
            out.filter = self.lower_filter(&model, &out.alias, out.filter)?;
            out.args.having = self.lower_filter(&model, &out.alias, out.args.having)?;
        }

        Ok(out)
    }
}
