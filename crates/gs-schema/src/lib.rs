//! gs-schema - Schema versioning engine for Geostash
//!
//! Advances a production database through numbered, idempotent structural
//! mutations: the [`MigrationDriver`] reads the persisted schema version,
//! applies the next registered [`MutationUnit`] until none is left, then
//! normalizes table charsets and storage engines. Stored procedures and
//! triggers are regenerated on demand through the [`TriggerSync`].

pub mod consistency;
pub mod driver;
pub mod error;
pub mod inspector;
pub mod ledger;
pub mod mutations;
pub mod registry;
pub mod triggers;

#[cfg(test)]
pub(crate) mod test_support;

pub use consistency::{CharsetReport, EngineReport};
pub use driver::{AppliedMutation, MigrationDriver, UpdateOutcome};
pub use error::{SchemaError, SchemaResult};
pub use inspector::SchemaInspector;
pub use ledger::{VersionLedger, VERSION_FLOOR};
pub use registry::{MutationContext, MutationRegistry, MutationUnit};
pub use triggers::TriggerSync;
