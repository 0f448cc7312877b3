//! Unit registry
//!
//! The name → instance table sessions resolve originals from and install
//! patched copies into. `install` is the only write the core performs.

use crate::unit::{CallArgs, Unit, UnitRef, Value};
use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Name → live unit instance table that sessions patch through
///
/// Implementations must be read-your-writes consistent within one thread:
/// `resolve` after `install` returns the installed instance. No transactional
/// isolation is expected; concurrent writers to the same name are the
/// caller's problem.
pub trait UnitRegistry: Send + Sync {
    /// Look up the instance currently bound to `name`
    fn resolve(&self, name: &str) -> Option<UnitRef>;

    /// Bind `name` to `unit`, unconditionally overwriting the current binding
    fn install(&self, name: &str, unit: UnitRef);
}

/// In-memory registry of units keyed by qualified name
///
/// # Example Usage
/// ```
/// use modtrace::registry::{ModuleTable, UnitRegistry};
/// use modtrace::unit::Unit;
///
/// let table = ModuleTable::new();
/// table.register(Unit::new("numlib"));
/// assert!(table.resolve("numlib").is_some());
/// assert!(table.resolve("missing").is_none());
/// ```
#[derive(Debug, Default)]
pub struct ModuleTable {
    units: RwLock<HashMap<String, UnitRef>>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit under its own qualified name, returning the shared instance
    pub fn register(&self, unit: Unit) -> UnitRef {
        let unit = unit.into_ref();
        self.install(unit.name(), unit.clone());
        unit
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    // Poisoning only means a writer panicked mid-insert; the map itself is
    // always in a consistent state, so recover the guard.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, UnitRef>> {
        self.units.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, UnitRef>> {
        self.units.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl UnitRegistry for ModuleTable {
    fn resolve(&self, name: &str) -> Option<UnitRef> {
        self.read().get(name).cloned()
    }

    fn install(&self, name: &str, unit: UnitRef) {
        tracing::trace!(unit = name, "registry install");
        self.write().insert(name.to_string(), unit);
    }
}

/// Resolve `unit` through the registry and invoke its `callable` member
///
/// This is how external code reaches a unit: always via whatever instance is
/// installed right now, so calls made during an active session hit wrappers.
pub fn call_through<R>(
    registry: &R,
    unit: &str,
    callable: &str,
    args: &CallArgs,
) -> anyhow::Result<Value>
where
    R: UnitRegistry + ?Sized,
{
    let instance = registry
        .resolve(unit)
        .ok_or_else(|| anyhow!("Unit not found in registry: {}", unit))?;
    instance.call(callable, args)
}
