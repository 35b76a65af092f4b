use crate::driver::Driver;
use crate::lower::{key_filter, split_payload, Include, RelationCascade, Resolver};
use crate::schema::{FieldDef, ModelConfig, RelationKind, Schema};
use crate::stmt::{
    Assignments, Expr, Filter, MutationPayload, Path, RelationMutation, Select, Value,
    ValueRecord,
};
use crate::{Error, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The application front-end: a scoped owner of one schema and one
/// driver.
///
/// Mutations run the relation resolver, execute their cascade plan
/// inside a transaction scope, and decode results through the driver's
/// converter registry. Instances are independent; tests create fresh
/// ones freely.
#[derive(Clone)]
pub struct Database {
    schema: Schema,
    driver: Arc<dyn Driver>,
}

impl Database {
    pub fn new(driver: impl Driver) -> Self {
        Self {
            schema: Schema::new(),
            driver: Arc::new(driver),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn driver(&self) -> &dyn Driver {
        &*self.driver
    }

    pub async fn start(&self) -> Result<()> {
        self.driver.start().await
    }

    pub async fn stop(&self) -> Result<()> {
        self.driver.stop().await
    }

    /// Declares a table (or merges fields into one). Validation errors
    /// here are fatal: the schema is unchanged on failure.
    pub fn extend(
        &mut self,
        name: impl Into<String>,
        defs: impl IntoIterator<Item = (String, FieldDef)>,
        config: Option<ModelConfig>,
    ) -> Result<()> {
        self.schema.extend(name, defs, config)
    }

    /// Synchronizes one table's physical schema.
    pub async fn prepare(&self, table: &str) -> Result<()> {
        self.driver.prepare(&self.schema, table).await
    }

    /// Synchronizes every registered table, association tables included.
    pub async fn prepare_all(&self) -> Result<()> {
        let tables: Vec<String> = self.schema.models().map(|m| m.name.clone()).collect();
        for table in tables {
            self.driver.prepare(&self.schema, &table).await?;
        }
        Ok(())
    }

    /// A fresh selection over a table.
    pub fn select(&self, table: impl Into<String>) -> Select {
        Select::table(table)
    }

    /// Returns matching rows, materializing any included relations.
    pub async fn get(&self, select: &Select, include: Option<&Include>) -> Result<Vec<Value>> {
        self.get_boxed(select.clone(), include).await
    }

    fn get_boxed<'a>(
        &'a self,
        select: Select,
        include: Option<&'a Include>,
    ) -> BoxFuture<'a, Result<Vec<Value>>> {
        Box::pin(async move {
            let resolved = Resolver::new(&self.schema).resolve_select(&select)?;
            let mut rows = self.driver.get(&self.schema, &resolved).await?;

            if let (Some(include), Some(model)) = (include, select.model.as_deref()) {
                if !include.is_empty() {
                    self.stitch_includes(model, &mut rows, include).await?;
                }
            }

            Ok(rows)
        })
    }

    /// Evaluates a terminal expression over a selection.
    pub async fn eval(&self, select: &Select, term: &Expr) -> Result<Value> {
        let resolved = Resolver::new(&self.schema).resolve_select(select)?;
        self.driver.eval(&self.schema, &resolved, term).await
    }

    /// Inserts a row, executing nested cascades atomically. Returns the
    /// stored row, autoincrement key included.
    pub async fn create(
        &self,
        table: &str,
        payload: impl Into<MutationPayload>,
    ) -> Result<Value> {
        let payload = payload.into();
        self.scoped(self.exec_create(table, &payload)).await
    }

    /// Updates matching rows, executing nested cascades atomically.
    /// Returns the number of directly updated rows.
    pub async fn set(
        &self,
        table: &str,
        filter: Filter,
        payload: impl Into<MutationPayload>,
    ) -> Result<u64> {
        let payload = payload.into();
        self.scoped(self.exec_update(table, &filter, &payload)).await
    }

    /// Deletes matching rows, propagating foreign-key cleanup to
    /// dependent children and association rows.
    pub async fn remove(&self, table: &str, filter: Filter) -> Result<u64> {
        self.scoped(self.exec_remove(table, filter)).await
    }

    /// Insert-or-update keyed on `keys` (the primary key when empty).
    pub async fn upsert(
        &self,
        table: &str,
        rows: Vec<ValueRecord>,
        keys: Vec<String>,
    ) -> Result<()> {
        self.scoped(async move {
            self.driver.upsert(&self.schema, table, &rows, &keys).await
        })
        .await
    }

    /// Runs `f` inside a dedicated transaction scope: commit on normal
    /// return, rollback on failure, release on every path. Nested calls
    /// reuse the outer scope.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a Database) -> BoxFuture<'a, Result<T>>,
    {
        self.scoped(f(self)).await
    }

    async fn scoped<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        self.driver.begin().await?;
        match work.await {
            Ok(value) => {
                self.driver.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.driver.rollback().await;
                Err(err)
            }
        }
    }

    async fn fetch(&self, table: &str, filter: Filter) -> Result<Vec<ValueRecord>> {
        let select = Select::table(table).where_(filter);
        let resolved = Resolver::new(&self.schema).resolve_select(&select)?;
        let rows = self.driver.get(&self.schema, &resolved).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Record(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    async fn driver_set(&self, table: &str, filter: Filter, update: Assignments) -> Result<u64> {
        let select = Select::table(table).where_(filter);
        let resolved = Resolver::new(&self.schema).resolve_select(&select)?;
        self.driver.set(&self.schema, &resolved, &update).await
    }

    async fn driver_remove(&self, table: &str, filter: Filter) -> Result<u64> {
        let select = Select::table(table).where_(filter);
        let resolved = Resolver::new(&self.schema).resolve_select(&select)?;
        self.driver.remove(&self.schema, &resolved).await
    }

    fn exec_create<'a>(
        &'a self,
        table: &'a str,
        payload: &'a MutationPayload,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let model = self.schema.model(table)?;
            let (data, cascades) = split_payload(&self.schema, model, payload)?;
            let row = model.create(&data)?;

            let created = self.driver.create(&self.schema, table, &row).await?;
            let mut parent = created.into_record();

            let rewrites_parent = cascades
                .iter()
                .any(|cascade| cascade.resolved.relation.is_to_one());

            for cascade in &cascades {
                self.exec_cascade(cascade, &parent).await?;
            }

            // To-one cascades write the parent's own foreign key; pick
            // up the final row.
            if rewrites_parent {
                let pk_filter = self.pk_filter(table, &parent)?;
                if let Some(fresh) = self.fetch(table, pk_filter).await?.into_iter().next() {
                    parent = fresh;
                }
            }

            Ok(Value::Record(parent))
        })
    }

    fn exec_update<'a>(
        &'a self,
        table: &'a str,
        filter: &'a Filter,
        payload: &'a MutationPayload,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let model = self.schema.model(table)?;
            let (data, cascades) = split_payload(&self.schema, model, payload)?;

            // Snapshot the affected parents before the scalar update; the
            // update may move rows out of the filter.
            let parents = if cascades.is_empty() {
                vec![]
            } else {
                self.fetch(table, filter.clone()).await?
            };

            let count = self
                .driver_set(table, filter.clone(), Assignments::from_record(data))
                .await?;

            for parent in &parents {
                for cascade in &cascades {
                    self.exec_cascade(cascade, parent).await?;
                }
            }

            Ok(count)
        })
    }

    fn exec_remove<'a>(&'a self, table: &'a str, filter: Filter) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let model = self.schema.model(table)?;

            // Foreign-key propagation: dependents of the doomed rows are
            // unlinked before the rows go away.
            let relations: Vec<String> = model
                .relations()
                .filter(|(_, relation)| {
                    matches!(
                        relation.kind,
                        RelationKind::OneToMany | RelationKind::ManyToMany
                    )
                })
                .map(|(name, _)| name.to_string())
                .collect();

            if !relations.is_empty() {
                let parents = self.fetch(table, filter.clone()).await?;
                for parent in &parents {
                    for field in &relations {
                        let resolved = self.schema.resolve_relation(table, field)?;
                        let cascade = RelationCascade {
                            resolved,
                            ops: vec![],
                        };
                        match cascade.resolved.relation.kind {
                            RelationKind::OneToMany => {
                                self.driver_set(
                                    &cascade.resolved.target.name.clone(),
                                    cascade.linked_filter(parent),
                                    cascade.fk_clear(),
                                )
                                .await?;
                            }
                            RelationKind::ManyToMany => {
                                let link_table = cascade
                                    .resolved
                                    .link
                                    .as_ref()
                                    .expect("many-to-many without link")
                                    .table
                                    .clone();
                                self.driver_remove(&link_table, cascade.link_filter(parent))
                                    .await?;
                            }
                            _ => {}
                        }
                    }
                }
            }

            self.driver_remove(table, filter).await
        })
    }

    fn exec_cascade<'a>(
        &'a self,
        cascade: &'a RelationCascade<'a>,
        parent: &'a ValueRecord,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for op in &cascade.ops {
                match cascade.resolved.relation.kind {
                    RelationKind::OneToOne | RelationKind::ManyToOne => {
                        self.cascade_to_one(cascade, parent, op).await?;
                    }
                    RelationKind::OneToMany => {
                        self.cascade_one_to_many(cascade, parent, op).await?;
                    }
                    RelationKind::ManyToMany => {
                        self.cascade_many_to_many(cascade, parent, op).await?;
                    }
                }
            }
            Ok(())
        })
    }

    /// To-one cascade: the foreign key lives on the parent row itself.
    async fn cascade_to_one(
        &self,
        cascade: &RelationCascade<'_>,
        parent: &ValueRecord,
        op: &RelationMutation,
    ) -> Result<()> {
        let resolved = &cascade.resolved;
        let owner_table = resolved.owner.name.clone();
        let target_table = resolved.target.name.clone();

        match op {
            RelationMutation::Connect(query) => {
                let Some(child) = self
                    .fetch(&target_table, query.clone())
                    .await?
                    .into_iter()
                    .next()
                else {
                    return Err(Error::relation_unresolved(&owner_table, resolved.field)
                        .context(Error::msg("no row matches $connect query")));
                };
                self.bind_to_one(cascade, parent, &child).await
            }
            RelationMutation::Disconnect(query) => {
                // Clear only when the current target matches the query.
                if let Some(current) = self.to_one_target(cascade, parent).await? {
                    let matches = self
                        .fetch(
                            &target_table,
                            query.clone().and(self.pk_filter(&target_table, &current)?),
                        )
                        .await?;
                    if !matches.is_empty() {
                        self.clear_to_one(cascade, parent).await?;
                    }
                }
                Ok(())
            }
            RelationMutation::Create(payloads) => {
                for payload in payloads {
                    let child = self
                        .exec_create(&target_table, payload)
                        .await?
                        .into_record();
                    self.bind_to_one(cascade, parent, &child).await?;
                }
                Ok(())
            }
            RelationMutation::Upsert { rows, keys } => {
                for row in rows {
                    let data: Vec<ValueRecord> = vec![row.data.clone()];
                    self.driver
                        .upsert(&self.schema, &target_table, &data, keys)
                        .await?;

                    let keys = if keys.is_empty() {
                        resolved.target.primary_key().to_vec()
                    } else {
                        keys.clone()
                    };
                    let lookup = Filter::all(keys.iter().map(|key| {
                        Filter::eq(
                            key.as_str(),
                            row.data
                                .get_path(&Path::from_dotted(key))
                                .cloned()
                                .unwrap_or(Value::Null),
                        )
                    }));
                    if let Some(child) =
                        self.fetch(&target_table, lookup).await?.into_iter().next()
                    {
                        self.bind_to_one(cascade, parent, &child).await?;
                    }
                }
                Ok(())
            }
            RelationMutation::Set { filter, update } => {
                if let Some(current) = self.to_one_target(cascade, parent).await? {
                    let mut target_filter = self.pk_filter(&target_table, &current)?;
                    if let Some(filter) = filter {
                        target_filter = target_filter.and(filter.clone());
                    }
                    self.exec_update(&target_table, &target_filter, update)
                        .await?;
                }
                Ok(())
            }
            RelationMutation::Remove(query) => {
                if let Some(current) = self.to_one_target(cascade, parent).await? {
                    let target_filter = self
                        .pk_filter(&target_table, &current)?
                        .and(query.clone());
                    self.clear_to_one(cascade, parent).await?;
                    self.driver_remove(&target_table, target_filter).await?;
                }
                Ok(())
            }
        }
    }

    /// Points the parent at `child`, clearing the previous holder and
    /// maintaining a reciprocal one-to-one pointer on the far side.
    async fn bind_to_one(
        &self,
        cascade: &RelationCascade<'_>,
        parent: &ValueRecord,
        child: &ValueRecord,
    ) -> Result<()> {
        let resolved = &cascade.resolved;
        let owner_table = resolved.owner.name.clone();
        let target_table = resolved.target.name.clone();

        let fk_values: Vec<(String, Value)> = resolved
            .local
            .iter()
            .zip(&resolved.remote)
            .map(|(local, remote)| {
                let value = child
                    .get_path(&Path::from_dotted(remote))
                    .cloned()
                    .unwrap_or(Value::Null);
                (local.clone(), value)
            })
            .collect();

        if resolved.relation.kind == RelationKind::OneToOne {
            // Exclusive: clear any other holder of this target.
            let holders = Filter::all(
                fk_values
                    .iter()
                    .map(|(local, value)| Filter::eq(local.as_str(), value.clone())),
            )
            .and(Filter::negate(self.pk_filter(&owner_table, parent)?));
            let cleared: Assignments = fk_values
                .iter()
                .map(|(local, _)| (local.clone(), Expr::Value(Value::Null)))
                .collect();
            self.driver_set(&owner_table, holders, cleared).await?;
        }

        let update: Assignments = fk_values
            .into_iter()
            .map(|(local, value)| (local, Expr::Value(value)))
            .collect();
        self.driver_set(
            &owner_table,
            self.pk_filter(&owner_table, parent)?,
            update,
        )
        .await?;

        // Reciprocal pointer pair: the inverse one-to-one holds its own
        // foreign key on the target table; both endpoints update
        // together.
        if let Ok(inverse) = self.schema.resolve_inverse(resolved) {
            if inverse.relation.kind == RelationKind::OneToOne
                && inverse.owner.name == target_table
            {
                let parent_key: Vec<(String, Value)> = inverse
                    .local
                    .iter()
                    .zip(&inverse.remote)
                    .map(|(local, remote)| {
                        let value = parent
                            .get_path(&Path::from_dotted(remote))
                            .cloned()
                            .unwrap_or(Value::Null);
                        (local.clone(), value)
                    })
                    .collect();

                let stale = Filter::all(
                    parent_key
                        .iter()
                        .map(|(local, value)| Filter::eq(local.as_str(), value.clone())),
                );
                let cleared: Assignments = parent_key
                    .iter()
                    .map(|(local, _)| (local.clone(), Expr::Value(Value::Null)))
                    .collect();
                self.driver_set(&target_table, stale, cleared).await?;

                let update: Assignments = parent_key
                    .into_iter()
                    .map(|(local, value)| (local, Expr::Value(value)))
                    .collect();
                self.driver_set(
                    &target_table,
                    self.pk_filter(&target_table, child)?,
                    update,
                )
                .await?;
            }
        }

        Ok(())
    }

    /// The row the parent's to-one foreign key currently points at.
    async fn to_one_target(
        &self,
        cascade: &RelationCascade<'_>,
        parent: &ValueRecord,
    ) -> Result<Option<ValueRecord>> {
        let resolved = &cascade.resolved;
        let mut filter = Filter::all_rows();
        let mut linked = true;

        for (local, remote) in resolved.local.iter().zip(&resolved.remote) {
            match parent.get_path(&Path::from_dotted(local)) {
                Some(value) if !value.is_null() => {
                    filter = filter.and(Filter::eq(remote.as_str(), value.clone()));
                }
                _ => linked = false,
            }
        }

        if !linked {
            return Ok(None);
        }
        Ok(self
            .fetch(&resolved.target.name, filter)
            .await?
            .into_iter()
            .next())
    }

    async fn clear_to_one(
        &self,
        cascade: &RelationCascade<'_>,
        parent: &ValueRecord,
    ) -> Result<()> {
        let resolved = &cascade.resolved;
        let owner_table = resolved.owner.name.clone();
        let cleared: Assignments = resolved
            .local
            .iter()
            .map(|local| (local.clone(), Expr::Value(Value::Null)))
            .collect();
        self.driver_set(&owner_table, self.pk_filter(&owner_table, parent)?, cleared)
            .await?;
        Ok(())
    }

    async fn cascade_one_to_many(
        &self,
        cascade: &RelationCascade<'_>,
        parent: &ValueRecord,
        op: &RelationMutation,
    ) -> Result<()> {
        let target_table = cascade.resolved.target.name.clone();

        match op {
            RelationMutation::Create(payloads) => {
                for payload in payloads {
                    let mut payload = payload.clone();
                    for (field, value) in cascade.fk_entries(parent) {
                        payload.data.insert(field, value);
                    }
                    self.exec_create(&target_table, &payload).await?;
                }
                Ok(())
            }
            RelationMutation::Upsert { rows, keys } => {
                let data: Vec<ValueRecord> = rows
                    .iter()
                    .map(|row| {
                        let mut data = row.data.clone();
                        for (field, value) in cascade.fk_entries(parent) {
                            data.insert(field, value);
                        }
                        data
                    })
                    .collect();
                self.driver
                    .upsert(&self.schema, &target_table, &data, keys)
                    .await
            }
            RelationMutation::Connect(query) => {
                self.driver_set(
                    &target_table,
                    query.clone(),
                    cascade.fk_assignments(parent),
                )
                .await?;
                Ok(())
            }
            RelationMutation::Disconnect(query) => {
                self.driver_set(
                    &target_table,
                    cascade.linked_filter(parent).and(query.clone()),
                    cascade.fk_clear(),
                )
                .await?;
                Ok(())
            }
            RelationMutation::Set { filter, update } => {
                let mut target_filter = cascade.linked_filter(parent);
                if let Some(filter) = filter {
                    target_filter = target_filter.and(filter.clone());
                }
                self.exec_update(&target_table, &target_filter, update)
                    .await?;
                Ok(())
            }
            RelationMutation::Remove(query) => {
                self.driver_remove(
                    &target_table,
                    cascade.linked_filter(parent).and(query.clone()),
                )
                .await?;
                Ok(())
            }
        }
    }

    async fn cascade_many_to_many(
        &self,
        cascade: &RelationCascade<'_>,
        parent: &ValueRecord,
        op: &RelationMutation,
    ) -> Result<()> {
        let resolved = &cascade.resolved;
        let target_table = resolved.target.name.clone();
        let link = resolved.link.as_ref().expect("many-to-many without link");
        let link_table = link.table.clone();
        let link_model = self.schema.model(&link_table)?;
        let link_keys = link_model.primary_key().to_vec();

        match op {
            RelationMutation::Connect(query) => {
                // Link-row upsert keyed on the full composite primary key
                // makes duplicate connects idempotent.
                let children = self.fetch(&target_table, query.clone()).await?;
                for child in &children {
                    let row = cascade.link_row(parent, child);
                    self.driver
                        .upsert(&self.schema, &link_table, &[row], &link_keys)
                        .await?;
                }
                Ok(())
            }
            RelationMutation::Disconnect(query) => {
                let children = self.fetch(&target_table, query.clone()).await?;
                for child in &children {
                    let row = cascade.link_row(parent, child);
                    let filter = Filter::all(
                        row.iter()
                            .map(|(column, value)| Filter::eq(column, value.clone())),
                    );
                    self.driver_remove(&link_table, filter).await?;
                }
                Ok(())
            }
            RelationMutation::Create(payloads) => {
                for payload in payloads {
                    let child = self
                        .exec_create(&target_table, payload)
                        .await?
                        .into_record();
                    let row = cascade.link_row(parent, &child);
                    self.driver
                        .upsert(&self.schema, &link_table, &[row], &link_keys)
                        .await?;
                }
                Ok(())
            }
            RelationMutation::Upsert { rows, keys } => {
                for row in rows {
                    let data: Vec<ValueRecord> = vec![row.data.clone()];
                    self.driver
                        .upsert(&self.schema, &target_table, &data, keys)
                        .await?;

                    let lookup_keys = if keys.is_empty() {
                        resolved.target.primary_key().to_vec()
                    } else {
                        keys.clone()
                    };
                    let lookup = Filter::all(lookup_keys.iter().map(|key| {
                        Filter::eq(
                            key.as_str(),
                            row.data
                                .get_path(&Path::from_dotted(key))
                                .cloned()
                                .unwrap_or(Value::Null),
                        )
                    }));
                    if let Some(child) =
                        self.fetch(&target_table, lookup).await?.into_iter().next()
                    {
                        let link_row = cascade.link_row(parent, &child);
                        self.driver
                            .upsert(&self.schema, &link_table, &[link_row], &link_keys)
                            .await?;
                    }
                }
                Ok(())
            }
            RelationMutation::Set { filter, update } => {
                let mut target_filter = self.linked_children_filter(cascade, parent).await?;
                if let Some(filter) = filter {
                    target_filter = target_filter.and(filter.clone());
                }
                self.exec_update(&target_table, &target_filter, update)
                    .await?;
                Ok(())
            }
            RelationMutation::Remove(query) => {
                let linked = self.linked_children_filter(cascade, parent).await?;
                let doomed = self
                    .fetch(&target_table, linked.and(query.clone()))
                    .await?;
                for child in &doomed {
                    let row = cascade.link_row(parent, child);
                    let filter = Filter::all(
                        row.iter()
                            .map(|(column, value)| Filter::eq(column, value.clone())),
                    );
                    self.driver_remove(&link_table, filter).await?;
                    self.driver_remove(
                        &target_table,
                        self.pk_filter(&target_table, child)?,
                    )
                    .await?;
                }
                Ok(())
            }
        }
    }

    /// A filter over the target table selecting children linked to
    /// `parent` through the association table.
    async fn linked_children_filter(
        &self,
        cascade: &RelationCascade<'_>,
        parent: &ValueRecord,
    ) -> Result<Filter> {
        let resolved = &cascade.resolved;
        let link = resolved.link.as_ref().expect("many-to-many without link");

        let link_rows = self
            .fetch(&link.table, cascade.link_filter(parent))
            .await?;
        let keys: Vec<Vec<Value>> = link_rows
            .iter()
            .map(|row| {
                link.target_columns
                    .iter()
                    .map(|column| row.get(column).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Ok(key_filter(&resolved.target.primary, &keys))
    }

    /// The primary-key filter identifying one row.
    fn pk_filter(&self, table: &str, row: &ValueRecord) -> Result<Filter> {
        let model = self.schema.model(table)?;
        Ok(Filter::all(
            model
                .primary_key()
                .iter()
                .zip(model.pk_values(row))
                .map(|(pk, value)| Filter::eq(pk.as_str(), value)),
        ))
    }

    /// Materializes an include tree onto fetched rows: each relation is
    /// a secondary fetch keyed by the parents' keys, stitched under the
    /// relation field (a record for to-one, a list for to-many).
    fn stitch_includes<'a>(
        &'a self,
        model: &'a str,
        rows: &'a mut Vec<Value>,
        include: &'a Include,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for (field, nested) in include.iter() {
                let resolved = self.schema.resolve_relation(model, field)?;
                let target_table = resolved.target.name.clone();
                let nested = (!nested.is_empty()).then_some(nested);

                match &resolved.link {
                    None => {
                        let keys: Vec<Vec<Value>> = rows
                            .iter()
                            .filter_map(Value::as_record)
                            .map(|row| {
                                resolved
                                    .local
                                    .iter()
                                    .map(|local| {
                                        row.get_path(&Path::from_dotted(local))
                                            .cloned()
                                            .unwrap_or(Value::Null)
                                    })
                                    .collect()
                            })
                            .filter(|key: &Vec<Value>| key.iter().all(|v| !v.is_null()))
                            .collect();

                        let children = self
                            .get_boxed(
                                Select::table(&target_table)
                                    .where_(key_filter(&resolved.remote, &keys)),
                                nested,
                            )
                            .await?;

                        for row in rows.iter_mut() {
                            let Some(record) = row.as_record_mut() else {
                                continue;
                            };

                            let parent_key: Vec<Value> = resolved
                                .local
                                .iter()
                                .map(|local| {
                                    record
                                        .get_path(&Path::from_dotted(local))
                                        .cloned()
                                        .unwrap_or(Value::Null)
                                })
                                .collect();

                            let matched: Vec<Value> = if parent_key
                                .iter()
                                .any(Value::is_null)
                            {
                                vec![]
                            } else {
                                children
                                    .iter()
                                    .filter(|child| {
                                        child.as_record().is_some_and(|child| {
                                            resolved.remote.iter().zip(&parent_key).all(
                                                |(remote, value)| {
                                                    child
                                                        .get_path(&Path::from_dotted(remote))
                                                        .map(|v| v.compares_eq(value))
                                                        .unwrap_or(false)
                                                },
                                            )
                                        })
                                    })
                                    .cloned()
                                    .collect()
                            };

                            if resolved.relation.is_to_one() {
                                record.insert(
                                    field,
                                    matched.into_iter().next().unwrap_or(Value::Null),
                                );
                            } else {
                                record.insert(field, Value::List(matched));
                            }
                        }
                    }
                    Some(link) => {
                        let parent_keys: Vec<Vec<Value>> = rows
                            .iter()
                            .filter_map(Value::as_record)
                            .map(|row| resolved.owner.pk_values(row))
                            .collect();

                        let link_rows = self
                            .fetch(
                                &link.table,
                                key_filter(&link.owner_columns, &parent_keys),
                            )
                            .await?;

                        let child_keys: Vec<Vec<Value>> = link_rows
                            .iter()
                            .map(|row| {
                                link.target_columns
                                    .iter()
                                    .map(|column| {
                                        row.get(column).cloned().unwrap_or(Value::Null)
                                    })
                                    .collect()
                            })
                            .collect();

                        let children = self
                            .get_boxed(
                                Select::table(&target_table).where_(key_filter(
                                    &resolved.target.primary,
                                    &child_keys,
                                )),
                                nested,
                            )
                            .await?;

                        for row in rows.iter_mut() {
                            let Some(record) = row.as_record_mut() else {
                                continue;
                            };

                            let parent_key = resolved.owner.pk_values(record);

                            let my_children: Vec<Value> = link_rows
                                .iter()
                                .filter(|link_row| {
                                    link.owner_columns.iter().zip(&parent_key).all(
                                        |(column, value)| {
                                            link_row
                                                .get(column)
                                                .map(|v| v.compares_eq(value))
                                                .unwrap_or(false)
                                        },
                                    )
                                })
                                .filter_map(|link_row| {
                                    let child_key: Vec<Value> = link
                                        .target_columns
                                        .iter()
                                        .map(|column| {
                                            link_row
                                                .get(column)
                                                .cloned()
                                                .unwrap_or(Value::Null)
                                        })
                                        .collect();
                                    children.iter().find(|child| {
                                        child.as_record().is_some_and(|child| {
                                            resolved
                                                .target
                                                .primary
                                                .iter()
                                                .zip(&child_key)
                                                .all(|(pk, value)| {
                                                    child
                                                        .get_path(&Path::from_dotted(pk))
                                                        .map(|v| v.compares_eq(value))
                                                        .unwrap_or(false)
                                                })
                                        })
                                    })
                                })
                                .cloned()
                                .collect();

                            record.insert(field, Value::List(my_children));
                        }
                    }
                }
            }

            Ok(())
        })
    }
}
