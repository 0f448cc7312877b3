//! Units and the values bound inside them
//!
//! A [`Unit`] is a named table of members: callables, nested units and plain
//! values. Shared instances ([`UnitRef`]) are immutable; the only way to change
//! a binding is to build a new `Unit` and install it through a registry.
//! Identity of units and callables is pointer identity of their `Arc`s.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Dynamic value passed to and returned from callables
pub type Value = serde_json::Value;

/// Shared handle to a live unit instance
pub type UnitRef = Arc<Unit>;

/// Signature every callable body implements
pub type CallFn = dyn Fn(&CallArgs) -> anyhow::Result<Value> + Send + Sync;

/// Arguments of a single invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    /// Positional arguments in call order
    pub positional: Vec<Value>,
    /// Keyword arguments (ordering is not significant)
    pub keyword: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from positional arguments only
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            keyword: BTreeMap::new(),
        }
    }

    /// Append a positional argument
    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument
    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(key.into(), value.into());
        self
    }

    /// Positional argument at `index`, if present
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Keyword argument, if present
    pub fn kwarg(&self, key: &str) -> Option<&Value> {
        self.keyword.get(key)
    }

    /// Look up an argument by keyword first, then by position
    pub fn get(&self, key: &str, index: usize) -> Option<&Value> {
        self.kwarg(key).or_else(|| self.arg(index))
    }
}

/// A named, cheaply clonable callable
///
/// Clones share the same body, so `ptr_eq` holds between them. Two separately
/// constructed callables are never identical, even with identical bodies.
#[derive(Clone)]
pub struct Callable {
    name: Arc<str>,
    func: Arc<CallFn>,
}

impl Callable {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&CallArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    /// Intrinsic name of the callable (not necessarily the name it is bound to)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the callable
    pub fn call(&self, args: &CallArgs) -> anyhow::Result<Value> {
        (self.func)(args)
    }

    /// True when both handles share the same body
    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.name)
    }
}

/// A value bound to a name inside a unit
#[derive(Debug, Clone)]
pub enum Member {
    Callable(Callable),
    Unit(UnitRef),
    Value(Value),
}

impl Member {
    pub fn is_callable(&self) -> bool {
        matches!(self, Member::Callable(_))
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Member::Unit(_))
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Member::Callable(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_unit(&self) -> Option<&UnitRef> {
        match self {
            Member::Unit(u) => Some(u),
            _ => None,
        }
    }
}

/// A named grouping of exposed values and callables
#[derive(Debug, Clone)]
pub struct Unit {
    name: String,
    members: BTreeMap<String, Member>,
}

impl Unit {
    /// Create an empty unit with a qualified name (e.g. `numlib.linalg`)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeMap::new(),
        }
    }

    /// Bind a callable built from a closure under its own name
    pub fn with_function<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(&CallArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.set_member(name, Member::Callable(Callable::new(name, func)));
        self
    }

    /// Bind an existing callable (possibly under an alias)
    pub fn with_callable(mut self, name: &str, callable: Callable) -> Self {
        self.set_member(name, Member::Callable(callable));
        self
    }

    /// Bind a nested unit
    pub fn with_subunit(mut self, name: &str, unit: UnitRef) -> Self {
        self.set_member(name, Member::Unit(unit));
        self
    }

    /// Bind a plain value
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_member(name, Member::Value(value.into()));
        self
    }

    /// Freeze into a shared instance
    pub fn into_ref(self) -> UnitRef {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Visibility rule: names starting with an underscore are internal
    pub fn is_exposed(name: &str) -> bool {
        !name.starts_with('_')
    }

    /// Exposed member names in sorted order
    pub fn exposed_names(&self) -> impl Iterator<Item = &str> {
        self.members
            .keys()
            .map(String::as_str)
            .filter(|name| Self::is_exposed(name))
    }

    pub fn get_member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// Replace a binding, returning the previous one
    pub fn set_member(&mut self, name: &str, member: Member) -> Option<Member> {
        self.members.insert(name.to_string(), member)
    }

    pub fn callable(&self, name: &str) -> Option<&Callable> {
        self.get_member(name).and_then(Member::as_callable)
    }

    pub fn subunit(&self, name: &str) -> Option<&UnitRef> {
        self.get_member(name).and_then(Member::as_unit)
    }

    /// Number of bound members, internal ones included
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Invoke the callable bound to `name`
    pub fn call(&self, name: &str, args: &CallArgs) -> anyhow::Result<Value> {
        let callable = self
            .callable(name)
            .ok_or_else(|| anyhow!("'{}' has no callable member '{}'", self.name, name))?;
        callable.call(args)
    }
}
