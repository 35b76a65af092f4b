use super::Error;

/// An ad-hoc error created from a format string.
#[derive(Debug)]
pub(super) struct Adhoc {
    message: Box<str>,
}

impl std::error::Error for Adhoc {}

impl core::fmt::Display for Adhoc {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.message, f)
    }
}

impl Error {
    /// Creates an error from a format string.
    pub fn from_args(message: core::fmt::Arguments<'_>) -> Error {
        Error::from(super::ErrorKind::Adhoc(Adhoc {
            message: message.to_string().into_boxed_str(),
        }))
    }

    /// Creates an error from a message.
    pub fn msg(message: impl Into<String>) -> Error {
        Error::from_args(format_args!("{}", message.into()))
    }

    /// Returns `true` if this error is an adhoc error.
    pub fn is_adhoc(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::Adhoc(_))
    }
}
