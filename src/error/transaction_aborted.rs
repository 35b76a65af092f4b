use super::Error;

/// Error when a transaction rolls back or its connection is lost.
#[derive(Debug)]
pub(super) struct TransactionAborted {
    message: Box<str>,
}

impl std::error::Error for TransactionAborted {}

impl core::fmt::Display for TransactionAborted {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "transaction aborted: {}", self.message)
    }
}

impl Error {
    /// Creates a transaction aborted error.
    pub fn transaction_aborted(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::TransactionAborted(TransactionAborted {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is a transaction aborted error.
    pub fn is_transaction_aborted(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::TransactionAborted(_))
    }
}
