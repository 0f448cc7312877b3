//! Unit patcher
//!
//! Builds a patched copy of exactly one unit: every exposed callable member is
//! replaced by a wrapper, everything else is carried over unchanged. The
//! original instance is never touched and nothing is installed here; the
//! session decides what goes into the registry. Nested units are only
//! collected (one level), never patched.

use crate::config::SessionConfig;
use crate::error::{Result, TraceError};
use crate::registry::UnitRegistry;
use crate::unit::{Callable, Member, Unit, UnitRef};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Result of patching one unit
#[derive(Debug)]
pub struct PatchOutcome {
    /// Instance the patch was built from
    pub original: UnitRef,
    /// Patched copy, not yet installed anywhere
    pub patched: Unit,
    /// Exposed names whose callables were wrapped
    pub patched_names: BTreeSet<String>,
    /// Nested units reachable through exposed names, in discovery order
    pub discovered_subunits: Vec<UnitRef>,
}

/// Resolve `unit_name` from the registry and patch it
///
/// # Errors
/// `TraceError::NotFound` if the registry has no unit under `unit_name`.
pub fn patch<R, F>(
    registry: &R,
    unit_name: &str,
    make_wrapper: &F,
    config: &SessionConfig,
) -> Result<PatchOutcome>
where
    R: UnitRegistry + ?Sized,
    F: Fn(Callable, &str, &str) -> Callable,
{
    let original = registry.resolve(unit_name).ok_or_else(|| TraceError::NotFound {
        unit: unit_name.to_string(),
    })?;
    Ok(patch_instance(&original, unit_name, make_wrapper, config))
}

/// Patch an already resolved instance, attributing records to `unit_name`
///
/// Aliases are wrapped independently: two names bound to one callable yield
/// two wrappers, each recording under its own name.
pub fn patch_instance<F>(
    original: &UnitRef,
    unit_name: &str,
    make_wrapper: &F,
    config: &SessionConfig,
) -> PatchOutcome
where
    F: Fn(Callable, &str, &str) -> Callable,
{
    let mut patched = Unit::clone(original);
    let mut patched_names = BTreeSet::new();

    for name in original.exposed_names() {
        if let Some(Member::Callable(callable)) = original.get_member(name) {
            let wrapper = make_wrapper(callable.clone(), unit_name, name);
            patched.set_member(name, Member::Callable(wrapper));
            patched_names.insert(name.to_string());
        }
    }

    let discovered_subunits = discover_subunits(original, config);

    tracing::debug!(
        unit = unit_name,
        patched = patched_names.len(),
        subunits = discovered_subunits.len(),
        "patched unit"
    );

    PatchOutcome {
        original: original.clone(),
        patched,
        patched_names,
        discovered_subunits,
    }
}

/// Nested units bound to exposed names of `unit`, one level deep
///
/// Skips the unit itself (by identity or name), instances already collected
/// under another name, and anything the denylist matches (see
/// [`SessionConfig::is_denied_subunit`]).
pub fn discover_subunits(unit: &UnitRef, config: &SessionConfig) -> Vec<UnitRef> {
    let mut found: Vec<UnitRef> = Vec::new();

    for name in unit.exposed_names() {
        let Some(Member::Unit(sub)) = unit.get_member(name) else {
            continue;
        };
        if Arc::ptr_eq(sub, unit) || sub.name() == unit.name() {
            continue;
        }
        if found.iter().any(|seen| Arc::ptr_eq(seen, sub)) {
            continue;
        }
        if config.is_denied_subunit(unit.name(), name, sub.name()) {
            tracing::trace!(unit = unit.name(), member = name, "skipping denylisted sub-unit");
            continue;
        }
        found.push(sub.clone());
    }

    found
}
