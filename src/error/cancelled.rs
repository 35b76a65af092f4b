use super::Error;

/// Error when an operation is aborted by an external cancellation signal.
#[derive(Debug)]
pub(super) struct Cancelled;

impl std::error::Error for Cancelled {}

impl core::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl Error {
    /// Creates a cancelled error.
    pub fn cancelled() -> Error {
        Error::from(super::ErrorKind::Cancelled(Cancelled))
    }

    /// Returns `true` if this error is a cancelled error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::Cancelled(_))
    }
}
