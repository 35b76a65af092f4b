use super::Error;

/// Error when a primary or unique key references an unknown field.
///
/// Caught at schema extension time; registration fails.
#[derive(Debug)]
pub(super) struct IndexMissing {
    model: Box<str>,
    field: Box<str>,
}

impl std::error::Error for IndexMissing {}

impl core::fmt::Display for IndexMissing {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "primary or unique key of `{}` references unknown field `{}`",
            self.model, self.field
        )
    }
}

impl Error {
    /// Creates an index missing error.
    pub fn index_missing(model: impl Into<String>, field: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::IndexMissing(IndexMissing {
            model: model.into().into(),
            field: field.into().into(),
        }))
    }

    /// Returns `true` if this error is an index missing error.
    pub fn is_index_missing(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::IndexMissing(_))
    }
}
