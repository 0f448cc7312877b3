//! Tracing sessions
//!
//! A [`Session`] moves through `Inert → Active → Inactive` exactly once.
//! `begin()` captures the original instances, builds patched copies of the
//! traced unit (and, when enabled, of its directly reachable sub-units) and
//! only then installs them into the registry. `end()` puts the captured
//! originals back. Nothing is reloaded; restoration always reinstalls the
//! saved reference.
//!
//! # Example
//! ```
//! use modtrace::registry::{call_through, ModuleTable};
//! use modtrace::session::Session;
//! use modtrace::unit::{CallArgs, Unit};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let table = Arc::new(ModuleTable::new());
//! table.register(Unit::new("m").with_function("f", |args| Ok(json!(args.positional.len()))));
//!
//! let mut session = Session::new(table.clone(), "m", |id| println!("{}", id));
//! session.begin()?;
//! call_through(&*table, "m", "f", &CallArgs::positional([1, 2]))?;
//! session.end()?;
//!
//! let trace = session.get_trace();
//! assert_eq!(trace.len(), 1);
//! assert_eq!(trace.identifiers(), vec!["m.f"]);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::config::SessionConfig;
use crate::error::{Result, TraceError};
use crate::patcher;
use crate::registry::UnitRegistry;
use crate::trace::Trace;
use crate::unit::{Callable, Member, Unit, UnitRef};
use crate::wrapper::{Callback, WrapperFactory};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, nothing patched yet
    Inert,
    /// Patched instances installed in the registry
    Active,
    /// Originals restored; terminal
    Inactive,
}

/// One unit under interception
#[derive(Debug)]
struct TracedUnit {
    name: String,
    /// Instance to put back at `end()`
    original: UnitRef,
    /// Instance installed at `begin()`
    patched: UnitRef,
    patched_names: BTreeSet<String>,
    /// Whether this unit owns a registry entry (sub-units may be reachable only
    /// through their parent)
    registered: bool,
}

/// Bounded interval during which one unit's callables are intercepted
pub struct Session {
    registry: Arc<dyn UnitRegistry>,
    unit_name: String,
    callback: Callback,
    config: SessionConfig,
    state: SessionState,
    root: Option<TracedUnit>,
    subunits: Vec<TracedUnit>,
    traced_names: BTreeMap<String, BTreeSet<String>>,
    trace: Trace,
}

impl Session {
    /// Session over `unit_name` without sub-unit tracing
    pub fn new<C>(registry: Arc<dyn UnitRegistry>, unit_name: impl Into<String>, callback: C) -> Self
    where
        C: Fn(&str) + Send + Sync + 'static,
    {
        Self::with_config(registry, unit_name, callback, SessionConfig::default())
    }

    /// Session that also traces sub-units directly reachable from `unit_name`
    pub fn with_submodules<C>(
        registry: Arc<dyn UnitRegistry>,
        unit_name: impl Into<String>,
        callback: C,
        trace_submodules: bool,
    ) -> Self
    where
        C: Fn(&str) + Send + Sync + 'static,
    {
        let config = SessionConfig::default().with_submodules(trace_submodules);
        Self::with_config(registry, unit_name, callback, config)
    }

    pub fn with_config<C>(
        registry: Arc<dyn UnitRegistry>,
        unit_name: impl Into<String>,
        callback: C,
        config: SessionConfig,
    ) -> Self
    where
        C: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            registry,
            unit_name: unit_name.into(),
            callback: Arc::new(callback),
            config,
            state: SessionState::Inert,
            root: None,
            subunits: Vec::new(),
            traced_names: BTreeMap::new(),
            trace: Trace::new(),
        }
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Unit name → callable names wrapped in it, populated by `begin()`
    pub fn traced_names(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.traced_names
    }

    /// Patch and install the traced unit (and sub-units, if enabled)
    ///
    /// All patched copies are built before the registry is written to, so a
    /// failure leaves the registry exactly as it was.
    ///
    /// # Errors
    /// - `TraceError::AlreadyActive` unless the session is `Inert`
    /// - `TraceError::NotFound` if the unit is not in the registry
    pub fn begin(&mut self) -> Result<()> {
        if self.state != SessionState::Inert {
            return Err(TraceError::AlreadyActive {
                unit: self.unit_name.clone(),
            });
        }

        let factory = WrapperFactory::new(self.trace.clone(), self.callback.clone());
        let make_wrapper =
            |original: Callable, unit: &str, name: &str| factory.wrap(original, unit, name);

        let outcome =
            patcher::patch(&*self.registry, &self.unit_name, &make_wrapper, &self.config)?;
        let mut patched_root = outcome.patched;
        let mut subunits: Vec<TracedUnit> = Vec::new();

        if self.config.trace_submodules {
            for sub in &outcome.discovered_subunits {
                // The same instance may already be traced as another unit's
                // registry entry; reuse that copy so identity stays shared.
                if let Some(traced) = subunits.iter().find(|t| Arc::ptr_eq(&t.original, sub)) {
                    let patched_sub = traced.patched.clone();
                    rebind(&outcome.original, &mut patched_root, sub, &patched_sub);
                    continue;
                }

                let sub_name = sub.name().to_string();
                let sub_outcome =
                    patcher::patch_instance(sub, &sub_name, &make_wrapper, &self.config);
                let patched_sub = sub_outcome.patched.into_ref();
                rebind(&outcome.original, &mut patched_root, sub, &patched_sub);

                let name_taken = subunits.iter().any(|t| t.registered && t.name == sub_name);
                if name_taken {
                    tracing::debug!(
                        unit = %sub_name,
                        "another instance with this name is already traced; tracing this one through '{}' only",
                        self.unit_name
                    );
                }
                let registered = if name_taken || sub_name == self.unit_name {
                    None
                } else {
                    self.registry.resolve(&sub_name)
                };

                match registered {
                    Some(existing) if Arc::ptr_eq(&existing, sub) => {
                        subunits.push(TracedUnit {
                            name: sub_name,
                            original: existing,
                            patched: patched_sub,
                            patched_names: sub_outcome.patched_names,
                            registered: true,
                        });
                    }
                    Some(existing) => {
                        // The registry serves a different instance under this
                        // name; it gets its own patched copy so registry
                        // callers keep seeing its behaviour.
                        tracing::debug!(
                            unit = %sub_name,
                            "registry entry differs from instance reachable through '{}'",
                            self.unit_name
                        );
                        let entry_outcome = patcher::patch_instance(
                            &existing,
                            &sub_name,
                            &make_wrapper,
                            &self.config,
                        );
                        subunits.push(TracedUnit {
                            name: sub_name.clone(),
                            original: sub.clone(),
                            patched: patched_sub,
                            patched_names: sub_outcome.patched_names,
                            registered: false,
                        });
                        subunits.push(TracedUnit {
                            name: sub_name,
                            original: existing,
                            patched: entry_outcome.patched.into_ref(),
                            patched_names: entry_outcome.patched_names,
                            registered: true,
                        });
                    }
                    None => {
                        subunits.push(TracedUnit {
                            name: sub_name,
                            original: sub.clone(),
                            patched: patched_sub,
                            patched_names: sub_outcome.patched_names,
                            registered: false,
                        });
                    }
                }
            }
        }

        let root = TracedUnit {
            name: self.unit_name.clone(),
            original: outcome.original,
            patched: patched_root.into_ref(),
            patched_names: outcome.patched_names,
            registered: true,
        };

        // Originals are captured above; from here on only installs happen.
        self.registry.install(&root.name, root.patched.clone());
        for sub in subunits.iter().filter(|s| s.registered) {
            self.registry.install(&sub.name, sub.patched.clone());
        }

        let mut traced_names: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for traced in std::iter::once(&root).chain(subunits.iter()) {
            traced_names
                .entry(traced.name.clone())
                .or_default()
                .extend(traced.patched_names.iter().cloned());
        }
        self.traced_names = traced_names;

        tracing::debug!(
            unit = %self.unit_name,
            callables = root.patched_names.len(),
            subunits = subunits.len(),
            "session active"
        );

        self.root = Some(root);
        self.subunits = subunits;
        self.state = SessionState::Active;
        Ok(())
    }

    /// Restore the original instances captured by `begin()`
    ///
    /// # Errors
    /// `TraceError::NotActive` unless the session is `Active`; the registry is
    /// not touched in that case.
    pub fn end(&mut self) -> Result<()> {
        if self.state != SessionState::Active {
            return Err(TraceError::NotActive {
                unit: self.unit_name.clone(),
            });
        }
        self.restore();
        self.state = SessionState::Inactive;
        tracing::debug!(unit = %self.unit_name, calls = self.trace.len(), "session ended");
        Ok(())
    }

    /// The accumulated trace
    ///
    /// Read before `end()` this is a live view that may still grow.
    pub fn get_trace(&self) -> Trace {
        self.trace.clone()
    }

    /// Begin, hand back a guard that ends the session when dropped
    pub fn enter(mut self) -> Result<SessionGuard> {
        self.begin()?;
        Ok(SessionGuard { session: self })
    }

    /// Run `f` inside an active session and return its output with the trace
    ///
    /// The session is ended on every path out of `f`, unwinding included.
    pub fn run<T, F>(self, f: F) -> Result<(T, Trace)>
    where
        F: FnOnce(&Session) -> T,
    {
        let guard = self.enter()?;
        let output = f(&*guard);
        let trace = guard.finish()?;
        Ok((output, trace))
    }

    fn restore(&mut self) {
        for sub in self.subunits.drain(..).rev() {
            if sub.registered {
                reinstall(&*self.registry, &sub);
            }
        }
        if let Some(root) = self.root.take() {
            reinstall(&*self.registry, &root);
        }
    }
}

/// Point every exposed member of `original` bound to `from` at `to` in `patched`
fn rebind(original: &Unit, patched: &mut Unit, from: &UnitRef, to: &UnitRef) {
    for name in original.exposed_names() {
        if let Some(Member::Unit(bound)) = original.get_member(name) {
            if Arc::ptr_eq(bound, from) {
                patched.set_member(name, Member::Unit(to.clone()));
            }
        }
    }
}

/// Put `unit.original` back, noting if someone rebound the entry meanwhile
fn reinstall(registry: &dyn UnitRegistry, unit: &TracedUnit) {
    match registry.resolve(&unit.name) {
        Some(current) if Arc::ptr_eq(&current, &unit.patched) => {}
        _ => tracing::warn!(
            unit = %unit.name,
            "registry entry was rebound during the session; restoring the captured original anyway"
        ),
    }
    registry.install(&unit.name, unit.original.clone());
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state == SessionState::Active {
            tracing::warn!(unit = %self.unit_name, "session dropped while active; restoring originals");
            self.restore();
            self.state = SessionState::Inactive;
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("unit_name", &self.unit_name)
            .field("state", &self.state)
            .field("config", &self.config)
            .field("traced_names", &self.traced_names)
            .field("calls", &self.trace.len())
            .finish()
    }
}

/// Scoped session: active while alive, ended on drop
#[derive(Debug)]
pub struct SessionGuard {
    session: Session,
}

impl SessionGuard {
    /// End the session now and return its trace
    pub fn finish(mut self) -> Result<Trace> {
        self.session.end()?;
        Ok(self.session.get_trace())
    }
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.session.is_active() {
            if let Err(e) = self.session.end() {
                tracing::warn!("failed to end session for '{}': {}", self.session.unit_name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{call_through, ModuleTable};
    use crate::unit::{CallArgs, Unit};
    use serde_json::json;
    use std::sync::Mutex;

    fn table() -> Arc<ModuleTable> {
        let table = Arc::new(ModuleTable::new());
        let sub = table.register(Unit::new("m.sub").with_function("h", |_| Ok(json!("h"))));
        table.register(
            Unit::new("m")
                .with_function("f", |_| Ok(json!("f")))
                .with_function("g", |_| Ok(json!("g")))
                .with_subunit("sub", sub),
        );
        table
    }

    fn quiet() -> impl Fn(&str) + Send + Sync + 'static {
        |_| {}
    }

    #[test]
    fn test_state_machine() -> Result<()> {
        let table = table();
        let mut session = Session::new(table, "m", quiet());
        assert_eq!(session.state(), SessionState::Inert);
        session.begin()?;
        assert!(session.is_active());
        session.end()?;
        assert_eq!(session.state(), SessionState::Inactive);
        Ok(())
    }

    #[test]
    fn test_end_before_begin_is_not_active() {
        let table = table();
        let before = table.resolve("m").unwrap();
        let mut session = Session::new(table.clone(), "m", quiet());
        assert!(matches!(session.end(), Err(TraceError::NotActive { .. })));
        assert!(Arc::ptr_eq(&before, &table.resolve("m").unwrap()));
        assert_eq!(session.state(), SessionState::Inert);
    }

    #[test]
    fn test_double_begin_and_restart_rejected() -> Result<()> {
        let mut session = Session::new(table(), "m", quiet());
        session.begin()?;
        assert!(matches!(session.begin(), Err(TraceError::AlreadyActive { .. })));
        session.end()?;
        assert!(matches!(session.begin(), Err(TraceError::AlreadyActive { .. })));
        assert!(matches!(session.end(), Err(TraceError::NotActive { .. })));
        Ok(())
    }

    #[test]
    fn test_begin_missing_unit_leaves_session_inert() {
        let table = table();
        let mut session = Session::new(table.clone(), "missing", quiet());
        assert!(matches!(session.begin(), Err(TraceError::NotFound { .. })));
        assert_eq!(session.state(), SessionState::Inert);
        assert!(!table.contains("missing"));
    }

    #[test]
    fn test_registry_serves_patched_instance_while_active() -> Result<()> {
        let table = table();
        let original = table.resolve("m").unwrap();
        let mut session = Session::new(table.clone(), "m", quiet());
        session.begin()?;
        assert!(!Arc::ptr_eq(&original, &table.resolve("m").unwrap()));
        session.end()?;
        assert!(Arc::ptr_eq(&original, &table.resolve("m").unwrap()));
        Ok(())
    }

    #[test]
    fn test_callback_receives_identifiers() -> Result<()> {
        let table = table();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut session = Session::new(table.clone(), "m", move |id| {
            sink.lock().unwrap().push(id.to_string())
        });
        session.begin()?;
        call_through(&*table, "m", "g", &CallArgs::new()).unwrap();
        call_through(&*table, "m", "f", &CallArgs::new()).unwrap();
        session.end()?;
        assert_eq!(*seen.lock().unwrap(), vec!["m.g", "m.f"]);
        Ok(())
    }

    #[test]
    fn test_traced_names_with_submodules() -> Result<()> {
        let mut session = Session::with_submodules(table(), "m", quiet(), true);
        session.begin()?;
        let names = session.traced_names();
        assert_eq!(names.len(), 2);
        assert!(names["m"].contains("f"));
        assert!(names["m.sub"].contains("h"));
        session.end()?;
        Ok(())
    }

    #[test]
    fn test_distinct_subunits_sharing_a_name_are_both_traced() -> Result<()> {
        let table = Arc::new(ModuleTable::new());
        let first = Unit::new("m.dup").with_function("x", |_| Ok(json!(1))).into_ref();
        let second = Unit::new("m.dup").with_function("y", |_| Ok(json!(2))).into_ref();
        table.register(
            Unit::new("m")
                .with_subunit("first", first)
                .with_subunit("second", second),
        );

        let mut session = Session::with_submodules(table.clone(), "m", quiet(), true);
        session.begin()?;
        let names = &session.traced_names()["m.dup"];
        assert!(names.contains("x") && names.contains("y"));

        let root = table.resolve("m").unwrap();
        root.subunit("first").unwrap().call("x", &CallArgs::new()).unwrap();
        root.subunit("second").unwrap().call("y", &CallArgs::new()).unwrap();
        session.end()?;

        assert_eq!(session.get_trace().identifiers(), vec!["m.dup.x", "m.dup.y"]);
        assert!(!table.contains("m.dup"));
        Ok(())
    }

    #[test]
    fn test_drop_while_active_restores() -> Result<()> {
        let table = table();
        let original = table.resolve("m").unwrap();
        {
            let mut session = Session::new(table.clone(), "m", quiet());
            session.begin()?;
        }
        assert!(Arc::ptr_eq(&original, &table.resolve("m").unwrap()));
        Ok(())
    }

    #[test]
    fn test_guard_ends_on_drop() -> Result<()> {
        let table = table();
        let original = table.resolve("m").unwrap();
        let trace = {
            let guard = Session::new(table.clone(), "m", quiet()).enter()?;
            call_through(&*table, "m", "f", &CallArgs::new()).unwrap();
            guard.get_trace()
        };
        assert!(Arc::ptr_eq(&original, &table.resolve("m").unwrap()));
        assert_eq!(trace.len(), 1);
        Ok(())
    }

    #[test]
    fn test_run_returns_output_and_trace() -> Result<()> {
        let table = table();
        let original = table.resolve("m").unwrap();
        let (output, trace) = Session::new(table.clone(), "m", quiet()).run(|session| {
            assert!(session.is_active());
            call_through(&*table, "m", "f", &CallArgs::new())
        })?;
        assert_eq!(output.unwrap(), json!("f"));
        assert_eq!(trace.identifiers(), vec!["m.f"]);
        assert!(Arc::ptr_eq(&original, &table.resolve("m").unwrap()));
        Ok(())
    }

    #[test]
    fn test_rebound_entry_still_restored() -> Result<()> {
        let table = table();
        let original = table.resolve("m").unwrap();
        let mut session = Session::new(table.clone(), "m", quiet());
        session.begin()?;
        table.install("m", Unit::new("m").into_ref());
        session.end()?;
        assert!(Arc::ptr_eq(&original, &table.resolve("m").unwrap()));
        Ok(())
    }
}
