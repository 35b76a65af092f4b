use super::Error;

/// Error when a field definition or reference is invalid.
///
/// This occurs when:
/// - A field shorthand does not match the `TYPE | TYPE(arg) | TYPE(p,s)` grammar
/// - `format` encounters an unknown top-level field under strict mode
/// - A field attribute is used with an incompatible type (precision on non-decimal)
#[derive(Debug)]
pub(super) struct InvalidField {
    field: Box<str>,
    message: Box<str>,
}

impl std::error::Error for InvalidField {}

impl core::fmt::Display for InvalidField {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "invalid field `{}`: {}", self.field, self.message)
    }
}

impl Error {
    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::InvalidField(InvalidField {
            field: field.into().into(),
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an invalid field error.
    pub fn is_invalid_field(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::InvalidField(_))
    }
}
