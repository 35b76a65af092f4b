use super::Error;

/// Error when a field of type `primary` is declared on a model without
/// autoincrement enabled.
#[derive(Debug)]
pub(super) struct PrimaryAutoIncMismatch {
    model: Box<str>,
    field: Box<str>,
}

impl std::error::Error for PrimaryAutoIncMismatch {}

impl core::fmt::Display for PrimaryAutoIncMismatch {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "field `{}.{}` has type `primary` but the model does not enable autoincrement",
            self.model, self.field
        )
    }
}

impl Error {
    /// Creates a primary/autoincrement mismatch error.
    pub fn primary_auto_inc_mismatch(
        model: impl Into<String>,
        field: impl Into<String>,
    ) -> Error {
        Error::from(super::ErrorKind::PrimaryAutoIncMismatch(
            PrimaryAutoIncMismatch {
                model: model.into().into(),
                field: field.into().into(),
            },
        ))
    }

    /// Returns `true` if this error is a primary/autoincrement mismatch error.
    pub fn is_primary_auto_inc_mismatch(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::PrimaryAutoIncMismatch(_))
    }
}
