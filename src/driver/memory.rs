use super::{CancelToken, Converter, Converters, Driver, Stats, TableStats, TypeTag};
use crate::eval::{Backend, Env, Evaluator};
use crate::schema::{MigrationHost, Model, Schema};
use crate::stmt::{
    Assignments, Direction, Expr, Path, Select, SelectKind, Source, Type, Value, ValueRecord,
};
use crate::{async_trait, Error, Result};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// An in-process reference backend.
///
/// Pushes nothing down: every predicate and expression is completed by
/// the portable evaluator, which makes this driver the executable
/// definition of the IR semantics and the backend the integration tests
/// run against. Transactions snapshot the whole store.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    state: Mutex<State>,
    converters: Converters,
    cancel: CancelToken,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    snapshot: Option<HashMap<String, Table>>,
    depth: usize,
}

#[derive(Debug, Default, Clone)]
struct Table {
    rows: Vec<ValueRecord>,
    auto: u64,
}

impl MemoryDriver {
    pub fn new() -> Self {
        let mut converters = Converters::new();

        // Time-of-day round-trips with the date component normalized to
        // the epoch.
        converters.register(
            TypeTag::Time,
            Converter {
                dump: |value| {
                    Ok(match value {
                        Value::Timestamp(ts) => Value::Time(ts.time()),
                        value => value,
                    })
                },
                load: Ok,
            },
        );

        Self {
            state: Mutex::new(State::default()),
            converters,
            cancel: CancelToken::new(),
        }
    }

    /// The cancellation token observed by every operation.
    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn dump_row(&self, model: &Model, row: &ValueRecord) -> Result<ValueRecord> {
        let flat = model.format(row, false, "")?;
        let mut out = ValueRecord::new();
        for (key, value) in flat.iter() {
            let value = match model.field(key) {
                Some(field) => self
                    .converters
                    .dump(value.clone(), &Type::from_field(field))?,
                None => value.clone(),
            };
            out.insert(key, model.resolve_value(key, value));
        }
        Ok(model.parse(&out))
    }

    fn load_row(&self, model: &Model, row: &ValueRecord) -> Result<ValueRecord> {
        let flat = model.format(row, false, "")?;
        let mut out = ValueRecord::new();
        for (key, value) in flat.iter() {
            let value = match model.field(key) {
                Some(field) => self
                    .converters
                    .load(value.clone(), &Type::from_field(field))?,
                None => value.clone(),
            };
            out.insert(key, value);
        }
        Ok(model.parse(&out))
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn prepare(&self, schema: &Schema, table: &str) -> Result<()> {
        self.cancel.check()?;
        let model = schema.model(table)?;

        self.state().tables.entry(table.to_string()).or_default();

        // A fresh store has no legacy columns, so no callback is
        // eligible; the protocol still runs to completion.
        let mut host = FreshStoreHost;
        model.run_migrations(&mut host)
    }

    async fn drop_table(&self, _schema: &Schema, table: &str) -> Result<()> {
        self.cancel.check()?;
        self.state().tables.remove(table);
        Ok(())
    }

    async fn drop_all(&self, _schema: &Schema) -> Result<()> {
        self.cancel.check()?;
        self.state().tables.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<Stats> {
        let state = self.state();
        Ok(Stats {
            tables: state
                .tables
                .iter()
                .map(|(name, table)| {
                    (
                        name.clone(),
                        TableStats {
                            count: table.rows.len() as u64,
                        },
                    )
                })
                .collect(),
        })
    }

    async fn get(&self, schema: &Schema, select: &Select) -> Result<Vec<Value>> {
        self.cancel.check()?;
        let state = self.state();
        let env = Env::root();
        let rows = exec_select(schema, &state, select, &env)?.unwrap_list();

        // Whole-row selections decode through the converter registry;
        // projected rows already carry expression-typed values.
        if select.args.fields.is_none() {
            if let Some(model) = select.model.as_deref().and_then(|m| schema.get_model(m)) {
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    match row {
                        Value::Record(record) => {
                            out.push(Value::Record(self.load_row(model, &record)?))
                        }
                        row => out.push(row),
                    }
                }
                return Ok(out);
            }
        }

        Ok(rows)
    }

    async fn eval(&self, schema: &Schema, select: &Select, term: &Expr) -> Result<Value> {
        self.cancel.check()?;
        let state = self.state();
        let mut select = select.clone();
        select.kind = SelectKind::Eval(term.clone());
        let env = Env::root();
        exec_select(schema, &state, &select, &env)
    }

    async fn set(
        &self,
        schema: &Schema,
        select: &Select,
        update: &Assignments,
    ) -> Result<u64> {
        self.cancel.check()?;
        let table = select
            .table_name()
            .ok_or_else(|| Error::msg("set requires a table selection"))?
            .to_string();
        let model = schema.model(&table)?;
        let update = model.format_assignments(update, false)?;

        let mut state = self.state();

        // Updated rows are computed against the pre-mutation store so
        // assignments may reference current row values.
        let updates: Vec<(usize, ValueRecord)> = {
            let state_ref = &*state;
            let backend = StateBackend {
                schema,
                state: state_ref,
            };
            let evaluator = Evaluator::with_backend(schema, &backend);
            let env = Env::root();

            let rows = state_ref
                .tables
                .get(&table)
                .map(|t| t.rows.as_slice())
                .unwrap_or_default();

            let mut updates = vec![];
            for (index, row) in rows.iter().enumerate() {
                let scope = env.bind(&select.alias, row);
                if !evaluator.matches_in(&select.filter, &scope)? {
                    continue;
                }

                let mut updated = row.clone();
                for (key, expr) in update.iter() {
                    let value = evaluator.eval(expr, &scope)?;
                    let value = self.converters.dump(
                        model.resolve_value(key, value),
                        &model
                            .field(key)
                            .map(Type::from_field)
                            .unwrap_or(Type::Expr),
                    )?;
                    updated.insert_path(&Path::from_dotted(key), value);
                }
                updates.push((index, updated));
            }
            updates
        };

        let count = updates.len() as u64;
        if let Some(entry) = state.tables.get_mut(&table) {
            for (index, updated) in updates {
                entry.rows[index] = updated;
            }
        }
        Ok(count)
    }

    async fn create(&self, schema: &Schema, table: &str, row: &ValueRecord) -> Result<Value> {
        self.cancel.check()?;
        let model = schema.model(table)?;
        let mut row = self.dump_row(model, row)?;

        let mut state = self.state();
        let entry = state.tables.entry(table.to_string()).or_default();

        // Autoincrement keys are assigned on insert and returned with
        // the stored row.
        if model.auto_increment {
            if let [pk] = model.primary_key() {
                let path = Path::from_dotted(pk);
                if row.get_path(&path).map(Value::is_null).unwrap_or(true) {
                    entry.auto += 1;
                    row.insert_path(&path, Value::U64(entry.auto));
                } else if let Some(value) = row.get_path(&path).and_then(Value::as_i64) {
                    entry.auto = entry.auto.max(value as u64);
                }
            }
        }

        if let Some(index) = violated_index(model, &entry.rows, &row, None) {
            return Err(Error::duplicate_entry(format!(
                "{table}({})",
                index.join(", ")
            )));
        }

        entry.rows.push(row.clone());
        drop(state);

        Ok(Value::Record(self.load_row(model, &row)?))
    }

    async fn upsert(
        &self,
        schema: &Schema,
        table: &str,
        rows: &[ValueRecord],
        keys: &[String],
    ) -> Result<()> {
        self.cancel.check()?;
        let model = schema.model(table)?;
        let keys: Vec<String> = if keys.is_empty() {
            model.primary_key().to_vec()
        } else {
            keys.to_vec()
        };

        for row in rows {
            let row = self.dump_row(model, row)?;
            let mut state = self.state();
            let entry = state.tables.entry(table.to_string()).or_default();

            let existing = entry.rows.iter().position(|candidate| {
                keys.iter().all(|key| {
                    let path = Path::from_dotted(key);
                    match (candidate.get_path(&path), row.get_path(&path)) {
                        (Some(a), Some(b)) => a.compares_eq(b),
                        _ => false,
                    }
                })
            });

            match existing {
                Some(index) => {
                    let target = &mut entry.rows[index];
                    for (key, value) in model.format(&row, false, "")?.iter() {
                        target.insert_path(&Path::from_dotted(key), value.clone());
                    }
                }
                None => {
                    let mut seeded = model.create(&row)?;
                    // `create` skips the primary key; an upsert row may
                    // carry it explicitly.
                    for pk in model.primary_key() {
                        let path = Path::from_dotted(pk);
                        if let Some(value) = row.get_path(&path) {
                            seeded.insert_path(&path, value.clone());
                        }
                    }

                    if model.auto_increment {
                        if let [pk] = model.primary_key() {
                            let path = Path::from_dotted(pk);
                            if seeded.get_path(&path).map(Value::is_null).unwrap_or(true) {
                                entry.auto += 1;
                                seeded.insert_path(&path, Value::U64(entry.auto));
                            }
                        }
                    }

                    if let Some(index) = violated_index(model, &entry.rows, &seeded, None) {
                        return Err(Error::duplicate_entry(format!(
                            "{table}({})",
                            index.join(", ")
                        )));
                    }
                    entry.rows.push(seeded);
                }
            }
        }

        Ok(())
    }

    async fn remove(&self, schema: &Schema, select: &Select) -> Result<u64> {
        self.cancel.check()?;
        let table = select
            .table_name()
            .ok_or_else(|| Error::msg("remove requires a table selection"))?
            .to_string();

        let mut state = self.state();

        let doomed: Vec<usize> = {
            let state_ref = &*state;
            let backend = StateBackend {
                schema,
                state: state_ref,
            };
            let evaluator = Evaluator::with_backend(schema, &backend);
            let env = Env::root();

            let rows = state_ref
                .tables
                .get(&table)
                .map(|t| t.rows.as_slice())
                .unwrap_or_default();

            let mut doomed = vec![];
            for (index, row) in rows.iter().enumerate() {
                let scope = env.bind(&select.alias, row);
                if evaluator.matches_in(&select.filter, &scope)? {
                    doomed.push(index);
                }
            }
            doomed
        };

        if let Some(entry) = state.tables.get_mut(&table) {
            for index in doomed.iter().rev() {
                entry.rows.remove(*index);
            }
        }
        Ok(doomed.len() as u64)
    }

    async fn begin(&self) -> Result<()> {
        self.cancel.check()?;
        let mut state = self.state();
        if state.depth == 0 {
            state.snapshot = Some(state.tables.clone());
        }
        // Nested transactions reuse the outer scope.
        state.depth += 1;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.state();
        if state.depth == 0 {
            return Err(Error::transaction_aborted("no active transaction"));
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.snapshot = None;
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut state = self.state();
        if state.depth == 0 {
            return Err(Error::transaction_aborted("no active transaction"));
        }
        if let Some(snapshot) = state.snapshot.take() {
            state.tables = snapshot;
        }
        state.depth = 0;
        Ok(())
    }

    fn converters(&self) -> &Converters {
        &self.converters
    }

    fn cancel_token(&self) -> Option<&CancelToken> {
        Some(&self.cancel)
    }
}

struct FreshStoreHost;

impl MigrationHost for FreshStoreHost {
    fn before(&mut self, _fields: &[String]) -> bool {
        false
    }

    fn after(&mut self, _fields: &[String]) {}

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }

    fn error(&mut self, err: &Error) {
        tracing::error!(%err, "migration callback failed");
    }
}

/// Subquery callback: correlated existence predicates and `$exec` terms
/// re-enter the executor with the outer environment.
struct StateBackend<'a> {
    schema: &'a Schema,
    state: &'a State,
}

impl Backend for StateBackend<'_> {
    fn execute(&self, select: &Select, env: &Env<'_>) -> Result<Value> {
        exec_select(self.schema, self.state, select, env)
    }
}

/// Executes a selection against the store. `Get`-kind selections return
/// a list of rows; `Eval`-kind return the terminal value.
fn exec_select(
    schema: &Schema,
    state: &State,
    select: &Select,
    env: &Env<'_>,
) -> Result<Value> {
    let backend = StateBackend { schema, state };
    let evaluator = Evaluator::with_backend(schema, &backend);

    let (source_rows, prefiltered) = match &select.source {
        Source::Table(name) => (
            state
                .tables
                .get(name)
                .map(|table| table.rows.clone())
                .unwrap_or_default(),
            false,
        ),
        Source::Select(inner) => {
            let rows = exec_select(schema, state, inner, env)?.unwrap_list();
            (
                rows.into_iter()
                    .map(|row| match row {
                        Value::Record(record) => Ok(record),
                        row => Err(Error::msg(format!(
                            "subselection produced a non-record row: {row:?}"
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?,
                false,
            )
        }
        Source::Join(parts) => (join_rows(schema, state, select, parts, env)?, true),
    };

    let mut kept = Vec::with_capacity(source_rows.len());
    for row in source_rows {
        let keep = prefiltered || {
            let scope = env.bind(&select.alias, &row);
            evaluator.matches_in(&select.filter, &scope)?
        };
        if keep {
            kept.push(row);
        }
    }

    // A terminal expression spans every matching row.
    if let SelectKind::Eval(term) = &select.kind {
        let scope = env.bind_group(&select.alias, &kept);
        return evaluator.eval(term, &scope);
    }

    let mut out_rows = if select.is_grouped() {
        let mut groups: Vec<(Vec<Value>, Vec<ValueRecord>)> = vec![];
        for row in kept {
            let key: Vec<Value> = select
                .args
                .group_by
                .iter()
                .map(|field| {
                    row.get_path(&Path::from_dotted(field))
                        .cloned()
                        .unwrap_or(Value::Null)
                })
                .collect();
            match groups.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, rows)) => rows.push(row),
                None => groups.push((key, vec![row])),
            }
        }

        let fields = select.args.fields.clone().unwrap_or_default();
        let mut out = vec![];
        for (key, rows) in &groups {
            let mut aggregated = ValueRecord::new();
            for (name, expr) in &fields {
                let value = match select.args.group_by.iter().position(|k| k == name) {
                    // Only grouped keys and aggregates are projectable.
                    Some(position) => key[position].clone(),
                    None => {
                        let scope = env.bind_group(&select.alias, rows);
                        evaluator.eval(expr, &scope)?
                    }
                };
                aggregated.insert_path(&Path::from_dotted(name), value);
            }

            let keep = {
                let scope = env.bind(&select.alias, &aggregated);
                evaluator.matches_in(&select.args.having, &scope)?
            };
            if keep {
                out.push(aggregated);
            }
        }
        out
    } else {
        kept
    };

    // Sorting by a non-column expression computes a transient key that
    // never appears in the output rows.
    if !select.args.order_by.is_empty() {
        let mut keyed = Vec::with_capacity(out_rows.len());
        for row in out_rows {
            let mut keys = Vec::with_capacity(select.args.order_by.len());
            {
                let scope = env.bind(&select.alias, &row);
                for order in &select.args.order_by {
                    keys.push(evaluator.eval(&order.expr, &scope)?);
                }
            }
            keyed.push((keys, row));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            for (index, order) in select.args.order_by.iter().enumerate() {
                let ord = cmp_sort_values(&a[index], &b[index]);
                let ord = match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        out_rows = keyed.into_iter().map(|(_, row)| row).collect();
    }

    let offset = select.args.offset as usize;
    let limit = select.args.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    let windowed: Vec<ValueRecord> = out_rows.into_iter().skip(offset).take(limit).collect();

    let projected = if !select.is_grouped() {
        match &select.args.fields {
            Some(fields) => {
                let mut out = Vec::with_capacity(windowed.len());
                for row in &windowed {
                    let mut projected = ValueRecord::new();
                    let scope = env.bind(&select.alias, row);
                    for (name, expr) in fields {
                        projected
                            .insert_path(&Path::from_dotted(name), evaluator.eval(expr, &scope)?);
                    }
                    out.push(projected);
                }
                out
            }
            None => windowed,
        }
    } else {
        windowed
    };

    Ok(Value::List(projected.into_iter().map(Value::Record).collect()))
}

fn join_rows(
    schema: &Schema,
    state: &State,
    select: &Select,
    parts: &indexmap::IndexMap<String, Select>,
    env: &Env<'_>,
) -> Result<Vec<ValueRecord>> {
    let backend = StateBackend { schema, state };
    let evaluator = Evaluator::with_backend(schema, &backend);

    let mut materialized: Vec<(String, Vec<ValueRecord>, bool)> = vec![];
    for (name, part) in parts {
        let rows = exec_select(schema, state, part, env)?
            .unwrap_list()
            .into_iter()
            .filter_map(|row| match row {
                Value::Record(record) => Some(record),
                _ => None,
            })
            .collect();
        let optional = select.args.optional.get(name).copied().unwrap_or(false);
        materialized.push((name.clone(), rows, optional));
    }

    // Full cross product, then the join predicate.
    let mut combos = vec![ValueRecord::new()];
    for (name, rows, _) in &materialized {
        let mut next = Vec::with_capacity(combos.len() * rows.len().max(1));
        for combo in &combos {
            for row in rows {
                let mut merged = combo.clone();
                merged.insert(name.clone(), Value::Record(row.clone()));
                next.push(merged);
            }
        }
        combos = next;
    }

    let mut survivors = vec![];
    for combo in combos {
        let keep = {
            let scope = env.bind_join(&select.alias, &combo);
            evaluator.matches_in(&select.filter, &scope)?
        };
        if keep {
            survivors.push(combo);
        }
    }

    // Required participants with no surviving match left-join against
    // null optional participants.
    let required: Vec<&(String, Vec<ValueRecord>, bool)> =
        materialized.iter().filter(|(_, _, opt)| !opt).collect();
    let optional_names: Vec<&String> = materialized
        .iter()
        .filter(|(_, _, opt)| *opt)
        .map(|(name, _, _)| name)
        .collect();

    if !optional_names.is_empty() && !required.is_empty() {
        let mut required_combos = vec![ValueRecord::new()];
        for (name, rows, _) in &required {
            let mut next = vec![];
            for combo in &required_combos {
                for row in rows {
                    let mut merged = combo.clone();
                    merged.insert(name.clone(), Value::Record(row.clone()));
                    next.push(merged);
                }
            }
            required_combos = next;
        }

        for combo in required_combos {
            let matched = survivors.iter().any(|survivor| {
                required.iter().all(|(name, _, _)| {
                    survivor.get(name) == combo.get(name)
                })
            });
            if !matched {
                let mut padded = combo;
                for name in &optional_names {
                    padded.insert((*name).clone(), Value::Null);
                }
                survivors.push(padded);
            }
        }
    }

    Ok(survivors)
}

fn cmp_sort_values(a: &Value, b: &Value) -> Ordering {
    match a.compare(b) {
        Some(ordering) => ordering,
        None => match (a.is_null(), b.is_null()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => Ordering::Equal,
        },
    }
}

/// The first primary/unique index `candidate` would violate, if any.
fn violated_index(
    model: &Model,
    rows: &[ValueRecord],
    candidate: &ValueRecord,
    skip: Option<usize>,
) -> Option<Vec<String>> {
    let mut indexes: Vec<Vec<String>> = vec![model.primary_key().to_vec()];
    indexes.extend(model.unique.iter().cloned());

    for index in indexes {
        if index.is_empty() {
            continue;
        }

        let candidate_values: Vec<Option<&Value>> = index
            .iter()
            .map(|field| candidate.get_path(&Path::from_dotted(field)))
            .collect();

        // Indexes with missing or null components never collide.
        if candidate_values
            .iter()
            .any(|value| value.map(Value::is_null).unwrap_or(true))
        {
            continue;
        }

        let collision = rows.iter().enumerate().any(|(position, row)| {
            if skip == Some(position) {
                return false;
            }
            index.iter().zip(&candidate_values).all(|(field, value)| {
                row.get_path(&Path::from_dotted(field))
                    .zip(*value)
                    .map(|(a, b)| a.compares_eq(b))
                    .unwrap_or(false)
            })
        });

        if collision {
            return Some(index);
        }
    }

    None
}
