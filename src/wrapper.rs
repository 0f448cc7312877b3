//! Callable wrapper factory
//!
//! A wrapper forwards every call to the original callable and, once the
//! original has returned successfully, appends exactly one [`CallRecord`] to the
//! sink and invokes the callback with `"{unit}.{callable}"`. A failing original
//! produces no record and no callback; its error is returned as-is.
//!
//! [`CallRecord`]: crate::trace::CallRecord

use crate::trace::Trace;
use crate::unit::Callable;
use std::sync::Arc;

/// Notification hook invoked with `"{unit_name}.{callable_name}"` per recorded call
pub type Callback = Arc<dyn Fn(&str) + Send + Sync>;

/// Wrap `original` so calls through it are recorded into `sink`
///
/// The returned callable keeps the original's intrinsic name.
pub fn wrap(
    original: Callable,
    unit_name: &str,
    callable_name: &str,
    sink: Trace,
    callback: Callback,
) -> Callable {
    let unit_name = unit_name.to_string();
    let callable_name = callable_name.to_string();
    let identifier = format!("{}.{}", unit_name, callable_name);
    let intrinsic = original.name().to_string();

    Callable::new(intrinsic, move |args| {
        let result = original.call(args)?;
        let sequence = sink.record(&unit_name, &callable_name, args);
        tracing::trace!(call = %identifier, sequence, "intercepted call");
        callback(&identifier);
        Ok(result)
    })
}

/// Produces wrappers that all feed one trace and one callback
#[derive(Clone)]
pub struct WrapperFactory {
    sink: Trace,
    callback: Callback,
}

impl WrapperFactory {
    pub fn new(sink: Trace, callback: Callback) -> Self {
        Self { sink, callback }
    }

    pub fn wrap(&self, original: Callable, unit_name: &str, callable_name: &str) -> Callable {
        wrap(
            original,
            unit_name,
            callable_name,
            self.sink.clone(),
            self.callback.clone(),
        )
    }

    pub fn sink(&self) -> &Trace {
        &self.sink
    }
}
