//! Unified error types.
//!
//! Misses (404, 405, OPTIONS) are not errors: they are answered as HTTP
//! responses by the [`Dispatcher`](crate::Dispatcher). [`Error`] surfaces the
//! failures that reach a caller: route registration, configuration, socket
//! I/O, lifecycle misuse, and panics intercepted at the request boundary.

use thiserror::Error;

/// The error type returned by switchyard's fallible operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid route: {0}")]
    Route(#[from] RouteError),

    #[error("config: {0}")]
    Config(String),

    /// The lifecycle latch was not in `NotStarted`.
    #[error("cannot start")]
    CannotStart,

    /// The lifecycle latch was not in `Started`.
    #[error("cannot stop")]
    CannotStop,

    /// A handler panicked; carries the panic message.
    #[error("panic: {0}")]
    Panic(String),
}

/// Rejected route registration.
///
/// Always fatal at startup. None of these are ever deferred to request time.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum RouteError {
    #[error("pattern must not be empty")]
    EmptyPattern,

    #[error("pattern must begin with '/' in `{0}`")]
    MissingLeadingSlash(String),

    #[error("wildcard segment must be named in `{0}`")]
    EmptyParameterName(String),

    #[error("catch-all must be the final segment in `{0}`")]
    CatchAllNotLast(String),

    #[error("parameter `{name}` appears twice in `{pattern}`")]
    DuplicateParameter { pattern: String, name: String },

    #[error("`{pattern}` conflicts with wildcard `{existing}` at the same position")]
    Conflict { pattern: String, existing: String },

    #[error("route `{0}` is already registered")]
    Duplicate(String),
}

impl Error {
    /// Builds an [`Error::Panic`] from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_owned()
        };
        Self::Panic(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("boom"));
        assert!(matches!(Error::from_panic(owned.as_ref()), Error::Panic(m) if m == "boom"));

        let borrowed: Box<dyn std::any::Any + Send> = Box::new("static boom");
        assert!(matches!(Error::from_panic(borrowed.as_ref()), Error::Panic(m) if m == "static boom"));

        let other: Box<dyn std::any::Any + Send> = Box::new(42_u32);
        assert!(matches!(Error::from_panic(other.as_ref()), Error::Panic(m) if m == "unknown panic"));
    }

    #[test]
    fn lifecycle_errors_display() {
        assert_eq!(Error::CannotStart.to_string(), "cannot start");
        assert_eq!(Error::CannotStop.to_string(), "cannot stop");
    }
}
