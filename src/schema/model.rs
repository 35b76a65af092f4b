use super::{Field, FieldDef, FieldTy, Migration, MigrationHost, Relation};
use crate::stmt::{Assignments, Expr, Path, Value, ValueRecord};
use crate::{Error, Result};
use indexmap::IndexMap;

/// A named collection of fields plus key, index, relation, and migration
/// metadata. Models live for the lifetime of their owning [`Schema`]
/// (registered at startup, append-only afterwards); extending a model
/// merges fields.
///
/// [`Schema`]: crate::Schema
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,

    /// Declared fields in declaration order.
    pub fields: IndexMap<String, Field>,

    /// Primary key; single or composite.
    pub primary: Vec<String>,

    /// True when the (single-field) primary key is database-assigned.
    pub auto_increment: bool,

    /// Unique indexes; each entry may be composite.
    pub unique: Vec<Vec<String>>,

    /// Outgoing foreign keys, keyed by local field.
    pub foreign: IndexMap<String, ForeignKey>,

    /// Migration callbacks in registration order.
    pub migrations: Vec<Migration>,

    /// True for synthesized association tables.
    pub internal: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub table: String,
    pub field: String,
}

/// Configuration accepted by `extend`.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub primary: Vec<String>,
    pub auto_increment: bool,
    pub unique: Vec<Vec<String>>,
    pub foreign: IndexMap<String, ForeignKey>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            primary: vec!["id".to_string()],
            auto_increment: false,
            unique: vec![],
            foreign: IndexMap::new(),
        }
    }
}

impl ModelConfig {
    pub fn primary(mut self, fields: Vec<String>) -> Self {
        self.primary = fields;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn unique(mut self, index: Vec<String>) -> Self {
        self.unique.push(index);
        self
    }

    pub fn foreign(
        mut self,
        field: impl Into<String>,
        table: impl Into<String>,
        remote: impl Into<String>,
    ) -> Self {
        self.foreign.insert(
            field.into(),
            ForeignKey {
                table: table.into(),
                field: remote.into(),
            },
        );
        self
    }
}

impl Model {
    /// Builds and validates a model from normalized declarations.
    pub fn build(
        name: impl Into<String>,
        defs: impl IntoIterator<Item = (String, FieldDef)>,
        config: ModelConfig,
    ) -> Result<Model> {
        let name = name.into();

        let mut fields = IndexMap::new();
        for (field_name, def) in defs {
            let mut field = def.into_field(&field_name)?;
            field.apply_default_initial();
            fields.insert(field_name, field);
        }

        let mut model = Model {
            name,
            fields,
            primary: config.primary,
            auto_increment: config.auto_increment,
            unique: config.unique,
            foreign: config.foreign,
            migrations: vec![],
            internal: false,
        };
        model.verify()?;
        Ok(model)
    }

    /// Merges additional fields and configuration into an existing model.
    pub fn merge(
        &mut self,
        defs: impl IntoIterator<Item = (String, FieldDef)>,
        config: Option<ModelConfig>,
    ) -> Result<()> {
        for (field_name, def) in defs {
            let mut field = def.into_field(&field_name)?;
            field.apply_default_initial();
            self.fields.insert(field_name, field);
        }

        if let Some(config) = config {
            self.primary = config.primary;
            self.auto_increment = config.auto_increment;
            self.unique.extend(config.unique);
            self.foreign.extend(config.foreign);
        }

        self.verify()
    }

    fn verify(&mut self) -> Result<()> {
        // Composite primary keys disable autoincrement.
        if self.primary.len() > 1 {
            self.auto_increment = false;
        }

        for pk in &self.primary {
            if !self.fields.contains_key(pk) {
                return Err(Error::index_missing(&self.name, pk));
            }
        }

        for index in &self.unique {
            for field in index {
                if !self.fields.contains_key(field) {
                    return Err(Error::index_missing(&self.name, field));
                }
            }
        }

        for (field_name, field) in &self.fields {
            if matches!(field.ty, FieldTy::Primary) && !self.auto_increment {
                return Err(Error::primary_auto_inc_mismatch(&self.name, field_name));
            }
        }

        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary
    }

    /// The single primary-key field; relation shorthand queries target it.
    pub fn pk_single(&self) -> Result<&str> {
        match &self.primary[..] {
            [pk] => Ok(pk),
            _ => Err(Error::msg(format!(
                "model `{}` has a composite primary key",
                self.name
            ))),
        }
    }

    /// Primary-key values of a row, in declared order.
    pub fn pk_values(&self, row: &ValueRecord) -> Vec<Value> {
        self.primary
            .iter()
            .map(|pk| {
                row.get_path(&Path::from_dotted(pk))
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect()
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, &Relation)> {
        self.fields
            .iter()
            .filter_map(|(name, field)| field.relation.as_ref().map(|r| (name.as_str(), r)))
    }

    pub fn relation(&self, name: &str) -> Result<&Relation> {
        self.fields
            .get(name)
            .and_then(|field| field.relation.as_ref())
            .ok_or_else(|| Error::relation_unresolved(&self.name, name))
    }

    /// Flattens nested values into dotted-path keys, using the declared
    /// field set as cut points. Unknown top-level fields are rejected
    /// under `strict`. `prefix` scopes every key.
    pub fn format(&self, record: &ValueRecord, strict: bool, prefix: &str) -> Result<ValueRecord> {
        let mut out = ValueRecord::new();
        for (key, value) in record.iter() {
            let dotted = if prefix.is_empty() {
                key.to_string()
            } else {
                format!("{prefix}.{key}")
            };
            self.format_entry(&mut out, dotted, value, strict, prefix.is_empty())?;
        }
        Ok(out)
    }

    fn format_entry(
        &self,
        out: &mut ValueRecord,
        key: String,
        value: &Value,
        strict: bool,
        top: bool,
    ) -> Result<()> {
        if self.fields.contains_key(&key) {
            out.insert(key, value.clone());
            return Ok(());
        }

        let nested_prefix = format!("{key}.");
        let has_nested = self
            .fields
            .keys()
            .any(|field| field.starts_with(&nested_prefix));

        match value {
            Value::Record(record) if has_nested => {
                for (sub_key, sub_value) in record.iter() {
                    self.format_entry(
                        out,
                        format!("{key}.{sub_key}"),
                        sub_value,
                        strict,
                        false,
                    )?;
                }
                Ok(())
            }
            _ if strict && top => Err(Error::invalid_field(
                key,
                format!("unknown field on model `{}`", self.name),
            )),
            _ => {
                out.insert(key, value.clone());
                Ok(())
            }
        }
    }

    /// Flattens update assignments. Literal records route through
    /// [`Model::format`]; expression terms pass through verbatim.
    pub fn format_assignments(
        &self,
        assignments: &Assignments,
        strict: bool,
    ) -> Result<Assignments> {
        let mut out = Assignments::new();
        for (key, expr) in assignments.iter() {
            match expr {
                Expr::Value(value) => {
                    let mut single = ValueRecord::new();
                    single.insert(key, value.clone());
                    for (flat_key, flat_value) in self.format(&single, strict, "")? {
                        out.set(flat_key, Expr::Value(flat_value));
                    }
                }
                expr => out.set(key, expr.clone()),
            }
        }
        Ok(out)
    }

    /// Regroups dotted-path keys back into nested structure.
    pub fn parse(&self, flat: &ValueRecord) -> ValueRecord {
        let mut out = ValueRecord::new();
        for (key, value) in flat.iter() {
            out.insert_path(&Path::from_dotted(key), value.clone());
        }
        out
    }

    /// Seeds a record from per-field initials, then overlays caller data.
    ///
    /// Initials are deep-cloned and omitted for primary-key fields and
    /// deprecated fields. Caller data is flattened strictly and regrouped
    /// through [`Model::parse`].
    pub fn create(&self, data: &ValueRecord) -> Result<ValueRecord> {
        let mut row = ValueRecord::new();

        for (field_name, field) in &self.fields {
            if field.deprecated || field.is_relation() || self.primary.contains(field_name) {
                continue;
            }
            if let Some(initial) = &field.initial {
                row.insert_path(&Path::from_dotted(field_name), initial.clone());
            }
        }

        for (key, value) in self.format(data, true, "")? {
            let value = self.resolve_value(&key, value);
            row.insert_path(&Path::from_dotted(&key), value);
        }

        Ok(row)
    }

    /// Normalizes a value for a field. Time-of-day values reset their
    /// date component to the epoch.
    pub fn resolve_value(&self, key: &str, value: Value) -> Value {
        match self.fields.get(key).map(|field| &field.ty) {
            Some(FieldTy::Time) => match value {
                Value::Timestamp(ts) => Value::Time(ts.time()),
                value => value,
            },
            _ => value,
        }
    }

    /// Registers a migration callback tagged with the fields it governs.
    pub fn migrate(
        &mut self,
        fields: Vec<String>,
        hook: impl Fn() -> Result<()> + Send + Sync + 'static,
    ) {
        self.migrations.push(Migration::new(fields, hook));
    }

    /// Runs every registered migration through the host protocol:
    /// eligibility check, callback, bookkeeping, then one finalize. A
    /// failing callback is reported and does not abort the rest.
    pub fn run_migrations(&self, host: &mut dyn MigrationHost) -> Result<()> {
        for migration in &self.migrations {
            if !host.before(&migration.fields) {
                continue;
            }
            match (migration.hook)() {
                Ok(()) => host.after(&migration.fields),
                Err(err) => host.error(&err),
            }
        }
        host.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_model() -> Model {
        Model::build(
            "user",
            [
                ("id".to_string(), FieldDef::from("unsigned")),
                ("name".to_string(), FieldDef::from("string")),
                ("profile.age".to_string(), FieldDef::from("integer")),
                (
                    "flags".to_string(),
                    FieldDef::from(Field::new(FieldTy::Integer(None)).initial(Value::I64(1))),
                ),
            ],
            ModelConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn format_flattens_to_declared_cut_points() {
        let model = user_model();

        let mut profile = ValueRecord::new();
        profile.insert("age", Value::I64(3));
        let mut record = ValueRecord::new();
        record.insert("name", Value::String("ada".into()));
        record.insert("profile", Value::Record(profile));

        let flat = model.format(&record, true, "").unwrap();
        assert_eq!(flat.get("name"), Some(&Value::String("ada".into())));
        assert_eq!(flat.get("profile.age"), Some(&Value::I64(3)));
    }

    #[test]
    fn format_strict_rejects_unknown_top_level() {
        let model = user_model();
        let mut record = ValueRecord::new();
        record.insert("nope", Value::I64(1));

        assert!(model.format(&record, true, "").unwrap_err().is_invalid_field());
        assert!(model.format(&record, false, "").is_ok());
    }

    #[test]
    fn parse_inverts_format() {
        let model = user_model();

        let mut profile = ValueRecord::new();
        profile.insert("age", Value::I64(3));
        let mut record = ValueRecord::new();
        record.insert("name", Value::String("ada".into()));
        record.insert("profile", Value::Record(profile));

        let flat = model.format(&record, false, "").unwrap();
        assert_eq!(model.parse(&flat), record);
    }

    #[test]
    fn create_seeds_initials_then_overlays() {
        let model = user_model();

        let mut data = ValueRecord::new();
        data.insert("name", Value::String("ada".into()));

        let row = model.create(&data).unwrap();
        // Primary key is never seeded.
        assert_eq!(row.get("id"), None);
        assert_eq!(row.get("flags"), Some(&Value::I64(1)));
        assert_eq!(row.get("name"), Some(&Value::String("ada".into())));
        // Nested declared field defaults regroup.
        assert_eq!(
            row.get_path(&Path::from_dotted("profile.age")),
            Some(&Value::I64(0))
        );
    }

    #[test]
    fn composite_primary_disables_auto_increment() {
        let model = Model::build(
            "login",
            [
                ("platform".to_string(), FieldDef::from("string")),
                ("id".to_string(), FieldDef::from("string")),
            ],
            ModelConfig {
                primary: vec!["platform".to_string(), "id".to_string()],
                auto_increment: true,
                ..ModelConfig::default()
            },
        )
        .unwrap();

        assert!(!model.auto_increment);
    }

    #[test]
    fn unknown_index_field_fails_registration() {
        let err = Model::build(
            "user",
            [("id".to_string(), FieldDef::from("unsigned"))],
            ModelConfig::default().unique(vec!["missing".to_string()]),
        )
        .unwrap_err();
        assert!(err.is_index_missing());
    }

    #[test]
    fn primary_type_requires_auto_increment() {
        let err = Model::build(
            "user",
            [("id".to_string(), FieldDef::from("primary"))],
            ModelConfig::default(),
        )
        .unwrap_err();
        assert!(err.is_primary_auto_inc_mismatch());
    }

    #[test]
    fn migrations_report_errors_without_aborting() {
        struct Host {
            ran: Vec<Vec<String>>,
            errors: usize,
            finalized: bool,
        }

        impl MigrationHost for Host {
            fn before(&mut self, _fields: &[String]) -> bool {
                true
            }
            fn after(&mut self, fields: &[String]) {
                self.ran.push(fields.to_vec());
            }
            fn finalize(&mut self) -> Result<()> {
                self.finalized = true;
                Ok(())
            }
            fn error(&mut self, _err: &Error) {
                self.errors += 1;
            }
        }

        let mut model = user_model();
        model.migrate(vec!["name".to_string()], || Err(Error::msg("boom")));
        model.migrate(vec!["flags".to_string()], || Ok(()));

        let mut host = Host {
            ran: vec![],
            errors: 0,
            finalized: false,
        };
        model.run_migrations(&mut host).unwrap();

        assert_eq!(host.errors, 1);
        assert_eq!(host.ran, vec![vec!["flags".to_string()]]);
        assert!(host.finalized);
    }
}
