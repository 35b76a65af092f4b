use super::Error;

/// Error when a cascade or include references a relation that does not
/// exist, or whose inverse cannot be found.
#[derive(Debug)]
pub(super) struct RelationUnresolved {
    model: Box<str>,
    relation: Box<str>,
}

impl std::error::Error for RelationUnresolved {}

impl core::fmt::Display for RelationUnresolved {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "cannot resolve relation `{}` on model `{}`",
            self.relation, self.model
        )
    }
}

impl Error {
    /// Creates a relation unresolved error.
    pub fn relation_unresolved(
        model: impl Into<String>,
        relation: impl Into<String>,
    ) -> Error {
        Error::from(super::ErrorKind::RelationUnresolved(RelationUnresolved {
            model: model.into().into(),
            relation: relation.into().into(),
        }))
    }

    /// Returns `true` if this error is a relation unresolved error.
    pub fn is_relation_unresolved(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::RelationUnresolved(_))
    }
}
