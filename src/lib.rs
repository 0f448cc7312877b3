//! modtrace - Session-scoped call interception for registry-resolved units
//!
//! This library observes every call made to the exposed callables of a unit
//! during a bounded session, without modifying the callables themselves:
//! a [`session::Session`] builds patched copies whose callables record into a
//! shared [`trace::Trace`], installs them through an injected
//! [`registry::UnitRegistry`], and restores the captured originals on `end()`.

pub mod cli;
pub mod config;
pub mod csv_output;
pub mod demo;
pub mod error;
pub mod json_output;
pub mod patcher;
pub mod registry;
pub mod session;
pub mod trace;
pub mod unit;
pub mod wrapper;

pub use error::{Result, TraceError};
pub use session::{Session, SessionGuard, SessionState};
pub use trace::{CallRecord, Trace};
