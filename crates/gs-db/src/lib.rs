//! gs-db - Database abstraction layer for Geostash
//!
//! This crate provides the `Database` trait, the MySQL implementation used
//! in production, and identifier validation for names that end up inside
//! DDL statements.

pub mod error;
pub mod ident;
pub mod mysql;
pub mod traits;

pub use error::{DbError, DbResult};
pub use ident::{quote_ident, validate_identifier};
pub use mysql::MySqlBackend;
pub use traits::{Database, Param, RoutineKind, Row, TableCollation};
