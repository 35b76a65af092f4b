use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// A registered migration callback, tagged with the fields it governs.
#[derive(Clone)]
pub struct Migration {
    /// The fields this callback introduces; a driver consults them to
    /// decide eligibility and to record which legacy fields are safe to
    /// drop.
    pub fields: Vec<String>,

    /// The callback itself.
    pub hook: MigrationHook,
}

pub type MigrationHook = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// The per-table protocol a driver implements while preparing a table.
///
/// For each registered callback, `before` decides eligibility from the
/// legacy field set, the callback runs, and `after` records the fields
/// now safe to drop. `finalize` runs exactly once per table. A callback
/// error is reported through `error` and does not advance the migration
/// or abort the remaining callbacks.
pub trait MigrationHost {
    fn before(&mut self, fields: &[String]) -> bool;
    fn after(&mut self, fields: &[String]);
    fn finalize(&mut self) -> Result<()>;
    fn error(&mut self, err: &Error);
}

impl Migration {
    pub fn new(fields: Vec<String>, hook: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            fields,
            hook: Arc::new(hook),
        }
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}
