use super::{Assignments, Expr, Filter, ValueRecord};
use indexmap::IndexMap;

/// An immutable selection: a logical table produced by composition.
///
/// Every combinator returns a new value; selections are freely shared.
/// The per-query lowering state drivers build from a selection is
/// single-use, but the selection itself never mutates.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// What the selection ranges over: a base table, a subselection, or
    /// a named map of join participants.
    pub source: Source,

    /// Stable alias for this scope. Column references resolve against it.
    pub alias: String,

    /// Row filter.
    pub filter: Filter,

    /// Modifiers: projection, window, sort, grouping.
    pub args: SelectArgs,

    /// What the selection *does* when executed.
    pub kind: SelectKind,

    /// The resolved target model, when the source is a single table.
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// A base table
    Table(String),

    /// A nested subselection
    Select(Box<Select>),

    /// Named join participants; the result row is a record keyed by
    /// these names.
    Join(IndexMap<String, Select>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectArgs {
    /// Projected fields. `None` projects the whole row.
    pub fields: Option<IndexMap<String, Expr>>,

    /// Rows to skip.
    pub offset: u64,

    /// Maximum rows to return.
    pub limit: Option<u64>,

    /// Sort terms, applied in order.
    pub order_by: Vec<OrderBy>,

    /// Grouping keys. When non-empty, only grouped keys and aggregates
    /// are projectable.
    pub group_by: Vec<String>,

    /// Filter over the aggregated row.
    pub having: Filter,

    /// Join participants marked optional become left-outer.
    pub optional: IndexMap<String, bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectKind {
    /// Return matching rows.
    Get,

    /// Evaluate a terminal expression over the selection.
    Eval(Expr),

    /// Apply assignments to matching rows.
    Set(Assignments),

    /// Delete matching rows.
    Remove,

    /// Insert-or-update rows, keyed on the named fields (or the model's
    /// primary key when empty).
    Upsert {
        rows: Vec<ValueRecord>,
        keys: Vec<String>,
    },

    /// Insert a single row.
    Create { row: ValueRecord },
}

impl Select {
    /// A selection over a base table. The table name doubles as the
    /// default alias and the resolved model.
    pub fn table(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: Source::Table(name.clone()),
            alias: name.clone(),
            filter: Filter::default(),
            args: SelectArgs::default(),
            kind: SelectKind::Get,
            model: Some(name),
        }
    }

    /// A selection over a subselection.
    pub fn from_select(inner: Select, alias: impl Into<String>) -> Self {
        let model = inner.model.clone();
        Self {
            source: Source::Select(Box::new(inner)),
            alias: alias.into(),
            filter: Filter::default(),
            args: SelectArgs::default(),
            kind: SelectKind::Get,
            model,
        }
    }

    /// A join over named participants. `on` is a predicate over the
    /// participant refs; `optional` participants become left-outer.
    pub fn join(
        parts: IndexMap<String, Select>,
        on: Expr,
        optional: IndexMap<String, bool>,
    ) -> Self {
        Self {
            source: Source::Join(parts),
            alias: String::new(),
            filter: Filter::Expr(on),
            args: SelectArgs {
                optional,
                ..SelectArgs::default()
            },
            kind: SelectKind::Get,
            model: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Conjoins a filter.
    pub fn where_(mut self, filter: Filter) -> Self {
        self.filter = self.filter.and(filter);
        self
    }

    pub fn order_by(mut self, expr: impl Into<Expr>, direction: Direction) -> Self {
        self.args.order_by.push(OrderBy {
            expr: expr.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.args.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.args.offset = offset;
        self
    }

    /// Projects named fields.
    pub fn project(mut self, fields: impl IntoIterator<Item = (String, Expr)>) -> Self {
        debug_assert!(self.is_composable(), "cannot project a mutating selection");
        self.args.fields = Some(fields.into_iter().collect());
        self
    }

    /// Groups by the given keys, projecting the keys plus the aggregate
    /// mapping.
    pub fn group_by(
        mut self,
        keys: Vec<String>,
        aggregates: impl IntoIterator<Item = (String, Expr)>,
    ) -> Self {
        debug_assert!(self.is_composable(), "cannot group a mutating selection");
        let mut fields: IndexMap<String, Expr> = keys
            .iter()
            .map(|key| (key.clone(), Expr::col(key.as_str())))
            .collect();
        fields.extend(aggregates);
        self.args.group_by = keys;
        self.args.fields = Some(fields);
        self
    }

    /// Filters the aggregated row.
    pub fn having(mut self, filter: Filter) -> Self {
        debug_assert!(
            !self.args.group_by.is_empty(),
            "having requires a grouped selection"
        );
        self.args.having = self.args.having.and(filter);
        self
    }

    /// Terminal: evaluate an expression over the selection.
    pub fn evaluate(mut self, term: impl Into<Expr>) -> Self {
        self.kind = SelectKind::Eval(term.into());
        self
    }

    /// Terminal: update matching rows.
    pub fn set(mut self, update: impl Into<Assignments>) -> Self {
        self.kind = SelectKind::Set(update.into());
        self
    }

    /// Terminal: delete matching rows.
    pub fn remove(mut self) -> Self {
        self.kind = SelectKind::Remove;
        self
    }

    /// Terminal: insert-or-update rows keyed on `keys`.
    pub fn upsert(mut self, rows: Vec<ValueRecord>, keys: Vec<String>) -> Self {
        self.kind = SelectKind::Upsert { rows, keys };
        self
    }

    /// Terminal: insert one row.
    pub fn create(mut self, row: ValueRecord) -> Self {
        self.kind = SelectKind::Create { row };
        self
    }

    /// Whether further shaping (projection, grouping, joins) is allowed.
    /// Mutating selections compose only via filter, offset, limit, and
    /// sort.
    pub fn is_composable(&self) -> bool {
        matches!(self.kind, SelectKind::Get)
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self.kind,
            SelectKind::Set(_)
                | SelectKind::Remove
                | SelectKind::Upsert { .. }
                | SelectKind::Create { .. }
        )
    }

    /// The base table name, when the source is a table.
    pub fn table_name(&self) -> Option<&str> {
        match &self.source {
            Source::Table(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_grouped(&self) -> bool {
        !self.args.group_by.is_empty()
    }
}

impl Source {
    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table(_))
    }

    pub fn is_join(&self) -> bool {
        matches!(self, Self::Join(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stmt::Value;

    #[test]
    fn composition_is_pure() {
        let base = Select::table("user");
        let filtered = base.clone().where_(Filter::eq("id", 1i64));

        assert!(base.filter.matches_all());
        assert!(!filtered.filter.matches_all());
    }

    #[test]
    fn group_by_projects_keys_and_aggregates() {
        let sel = Select::table("post").group_by(
            vec!["author".to_string()],
            [(
                "total".to_string(),
                Expr::aggregate(crate::stmt::AggOp::Count, Expr::col("id")),
            )],
        );

        let fields = sel.args.fields.as_ref().unwrap();
        assert!(fields.contains_key("author"));
        assert!(fields.contains_key("total"));
        assert!(sel.is_grouped());
    }

    #[test]
    fn mutation_is_terminal() {
        let sel = Select::table("user").create({
            let mut row = ValueRecord::new();
            row.insert("id", Value::I64(1));
            row
        });
        assert!(sel.is_mutation());
        assert!(!sel.is_composable());
    }
}
