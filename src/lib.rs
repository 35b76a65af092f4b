mod error;
pub use error::Error;

pub mod schema;
pub use schema::Schema;

pub mod stmt;

pub mod eval;

pub mod lower;

pub mod driver;
pub use driver::Driver;

mod db;
pub use db::Database;

/// A Result type alias that uses Griddle's [`Error`] type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

pub use async_trait::async_trait;
