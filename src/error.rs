mod adhoc;
mod cancelled;
mod duplicate_entry;
mod expression_unlowerable;
mod index_missing;
mod invalid_field;
mod primary_auto_inc;
mod relation_unresolved;
mod transaction_aborted;

use adhoc::Adhoc;
use cancelled::Cancelled;
use duplicate_entry::DuplicateEntry;
use expression_unlowerable::ExpressionUnlowerable;
use index_missing::IndexMissing;
use invalid_field::InvalidField;
use primary_auto_inc::PrimaryAutoIncMismatch;
use relation_unresolved::RelationUnresolved;
use std::sync::Arc;
use transaction_aborted::TransactionAborted;

/// An error that can occur in Griddle.
#[derive(Clone)]
pub struct Error {
    inner: Arc<ErrorInner>,
}

/// Trait for types that can be converted into an Error.
pub trait IntoError {
    /// Converts this type into an Error.
    fn into_error(self) -> Error;
}

#[derive(Debug)]
struct ErrorInner {
    kind: ErrorKind,
    cause: Option<Error>,
}

#[derive(Debug)]
enum ErrorKind {
    Adhoc(Adhoc),
    Cancelled(Cancelled),
    DuplicateEntry(DuplicateEntry),
    ExpressionUnlowerable(ExpressionUnlowerable),
    IndexMissing(IndexMissing),
    InvalidField(InvalidField),
    PrimaryAutoIncMismatch(PrimaryAutoIncMismatch),
    RelationUnresolved(RelationUnresolved),
    TransactionAborted(TransactionAborted),
}

impl Error {
    /// Adds context to this error.
    ///
    /// Context is displayed in reverse order: the most recently added context is shown first,
    /// followed by earlier context, ending with the root cause.
    pub fn context(self, consequent: impl IntoError) -> Error {
        self.context_impl(consequent.into_error())
    }

    fn context_impl(self, consequent: Error) -> Error {
        let mut err = consequent;
        let inner = Arc::get_mut(&mut err.inner).unwrap();
        assert!(
            inner.cause.is_none(),
            "consequent error must not already have a cause"
        );
        inner.cause = Some(self);
        err
    }

    fn chain(&self) -> impl Iterator<Item = &Error> {
        let mut err = self;
        core::iter::once(err).chain(core::iter::from_fn(move || {
            err = err.inner.cause.as_ref()?;
            Some(err)
        }))
    }

    fn kind(&self) -> &ErrorKind {
        &self.inner.kind
    }
}

impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let mut it = self.chain().peekable();
        while let Some(err) = it.next() {
            core::fmt::Display::fmt(err.kind(), f)?;
            if it.peek().is_some() {
                f.write_str(": ")?;
            }
        }
        Ok(())
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if !f.alternate() {
            core::fmt::Display::fmt(self, f)
        } else {
            f.debug_struct("Error")
                .field("kind", &self.inner.kind)
                .field("cause", &self.inner.cause)
                .finish()
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        use self::ErrorKind::*;

        match self {
            Adhoc(err) => core::fmt::Display::fmt(err, f),
            Cancelled(err) => core::fmt::Display::fmt(err, f),
            DuplicateEntry(err) => core::fmt::Display::fmt(err, f),
            ExpressionUnlowerable(err) => core::fmt::Display::fmt(err, f),
            IndexMissing(err) => core::fmt::Display::fmt(err, f),
            InvalidField(err) => core::fmt::Display::fmt(err, f),
            PrimaryAutoIncMismatch(err) => core::fmt::Display::fmt(err, f),
            RelationUnresolved(err) => core::fmt::Display::fmt(err, f),
            TransactionAborted(err) => core::fmt::Display::fmt(err, f),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Arc::new(ErrorInner { kind, cause: None }),
        }
    }
}

impl IntoError for Error {
    fn into_error(self) -> Error {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_size() {
        // Ensure Error stays at one word (size of pointer/Arc)
        let expected_size = core::mem::size_of::<usize>();
        assert_eq!(expected_size, core::mem::size_of::<Error>());
    }

    #[test]
    fn error_chain_display() {
        let root = Error::invalid_field("value", "no such field");
        let top = Error::from_args(format_args!("extending model `user` failed"));

        let chained = root.context(top);
        assert_eq!(
            chained.to_string(),
            "extending model `user` failed: invalid field `value`: no such field"
        );
    }

    #[test]
    fn index_missing_display() {
        let err = Error::index_missing("user", "missing");
        assert_eq!(
            err.to_string(),
            "primary or unique key of `user` references unknown field `missing`"
        );
    }

    #[test]
    fn cancelled_display() {
        let err = Error::cancelled();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "operation cancelled");
    }

    #[test]
    fn transaction_aborted_display() {
        let err = Error::transaction_aborted("connection lost");
        assert_eq!(err.to_string(), "transaction aborted: connection lost");
    }
}
