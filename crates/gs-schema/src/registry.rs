//! Ordered registry of schema mutation units.
//!
//! Units are registered explicitly at startup, keyed by their version
//! number. The driver probes for `current + 1`; the first missing number
//! ends the run, so the sequence must stay contiguous: a superseded
//! mutation is registered as a documented no-op, never removed.

use crate::error::SchemaResult;
use crate::inspector::SchemaInspector;
use crate::ledger::VERSION_FLOOR;
use crate::mutations;
use crate::triggers::TriggerSync;
use futures::future::BoxFuture;
use gs_core::Config;
use gs_db::Database;
use std::collections::BTreeMap;

/// Everything a mutation unit may touch, passed explicitly instead of
/// living in process-global state.
pub struct MutationContext<'a> {
    pub db: &'a dyn Database,
    pub inspector: &'a SchemaInspector,
    pub triggers: &'a TriggerSync,
    pub config: &'a Config,
    /// The unit's own version number; also the target version for trigger
    /// regeneration requested from inside the unit.
    pub version: u32,
}

type MutationBody =
    Box<dyn for<'a> Fn(&'a MutationContext<'a>) -> BoxFuture<'a, SchemaResult<()>> + Send + Sync>;

/// One versioned, idempotent schema/data change.
pub struct MutationUnit {
    pub version: u32,
    pub summary: &'static str,
    body: MutationBody,
}

impl MutationUnit {
    /// Apply the unit. Safe to call again once it has succeeded; the body
    /// checks its preconditions through the inspector.
    pub async fn apply(&self, ctx: &MutationContext<'_>) -> SchemaResult<()> {
        (self.body)(ctx).await
    }
}

/// Ordered, gap-tolerant collection of mutation units.
#[derive(Default)]
pub struct MutationRegistry {
    units: BTreeMap<u32, MutationUnit>,
}

impl MutationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every known mutation of the production schema.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        mutations::register_all(&mut registry);
        registry
    }

    /// Register a unit. Versions must be unique and above the ledger floor.
    pub fn register<F>(&mut self, version: u32, summary: &'static str, body: F)
    where
        F: for<'a> Fn(&'a MutationContext<'a>) -> BoxFuture<'a, SchemaResult<()>>
            + Send
            + Sync
            + 'static,
    {
        debug_assert!(version > VERSION_FLOOR, "mutation #{version} below floor");
        let previous = self.units.insert(
            version,
            MutationUnit {
                version,
                summary,
                body: Box::new(body),
            },
        );
        debug_assert!(previous.is_none(), "duplicate mutation #{version}");
    }

    pub fn get(&self, version: u32) -> Option<&MutationUnit> {
        self.units.get(&version)
    }

    pub fn contains(&self, version: u32) -> bool {
        self.units.contains_key(&version)
    }

    /// Highest registered version, `None` for an empty registry.
    pub fn highest(&self) -> Option<u32> {
        self.units.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Versions the driver would apply starting from `current`, in order.
    ///
    /// Stops at the first gap, mirroring the driver's probe loop.
    pub fn pending_after(&self, current: u32) -> Vec<&MutationUnit> {
        let mut pending = Vec::new();
        let mut version = current + 1;
        while let Some(unit) = self.units.get(&version) {
            pending.push(unit);
            version += 1;
        }
        pending
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
