use super::Path;
use std::fmt;

/// A column reference.
///
/// Resolves first against the current scope's tables, then against the
/// join-table environment, then against outer refs. Failing all three is
/// a lowering error.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ExprRef {
    /// The scope to resolve against. `None` means the nearest enclosing
    /// scope.
    pub alias: Option<String>,

    /// Dotted path within the referenced row.
    pub path: Path,
}

impl ExprRef {
    pub fn new(alias: Option<String>, path: impl Into<Path>) -> Self {
        Self {
            alias,
            path: path.into(),
        }
    }
}

impl fmt::Debug for ExprRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "ExprRef({alias}, {})", self.path),
            None => write!(f, "ExprRef({})", self.path),
        }
    }
}
