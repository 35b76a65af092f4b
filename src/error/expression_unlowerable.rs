use super::Error;

/// Error when a query or eval operator has no driver translation and no
/// evaluator fallback.
///
/// Also raised when a column reference cannot be resolved against the
/// current scope, the join environment, or any outer scope.
#[derive(Debug)]
pub(super) struct ExpressionUnlowerable {
    message: Box<str>,
}

impl std::error::Error for ExpressionUnlowerable {}

impl core::fmt::Display for ExpressionUnlowerable {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "expression cannot be lowered: {}", self.message)
    }
}

impl Error {
    /// Creates an expression unlowerable error.
    pub fn expression_unlowerable(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::ExpressionUnlowerable(
            ExpressionUnlowerable {
                message: message.into().into(),
            },
        ))
    }

    /// Returns `true` if this error is an expression unlowerable error.
    pub fn is_expression_unlowerable(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::ExpressionUnlowerable(_))
    }
}
