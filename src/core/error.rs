//! Unified error handling for actgate
//!
//! Every failure in the engine surfaces as an [`ActError`]. Errors are `Clone`
//! because a single in-flight cache generation hands the same outcome to
//! every caller waiting on it.

use std::{fmt, time::Duration};

/// Unified error types for the action engine
#[derive(Debug, Clone, PartialEq)]
pub enum ActError {
    /// Malformed action, cache, handler or gateway options. Fatal at bind time.
    Configuration(String),

    /// A compact pattern string or template could not be parsed
    Parse(String),

    /// The RPC layer failed to run an action (transport or handler error)
    Invocation(String),

    /// One embedded action of a composition failed
    Composition {
        location: String,
        source: Box<ActError>,
    },

    /// A cache regeneration outlived its `generateTimeout`
    RegenerationTimeout { key: String, timeout: Duration },

    /// The rendering collaborator failed
    Render(String),

    /// Resource not found errors
    NotFound(String),

    /// Internal system errors
    Internal(String),
}

impl fmt::Display for ActError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            ActError::Parse(msg) => write!(f, "Parse error: {msg}"),
            ActError::Invocation(msg) => write!(f, "Invocation failed: {msg}"),
            ActError::Composition { location, source } => {
                write!(f, "Composition failed at '{location}': {source}")
            }
            ActError::RegenerationTimeout { key, timeout } => write!(
                f,
                "Cache regeneration for '{key}' timed out after {}ms",
                timeout.as_millis()
            ),
            ActError::Render(msg) => write!(f, "Render error: {msg}"),
            ActError::NotFound(msg) => write!(f, "Resource not found: {msg}"),
            ActError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ActError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ActError::Composition { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl ActError {
    /// Wrap a failure of the task resolving `location` inside a composition
    pub fn composition(location: impl Into<String>, source: ActError) -> Self {
        ActError::Composition {
            location: location.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through composition wrappers
    pub fn root_cause(&self) -> &ActError {
        match self {
            ActError::Composition { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

// Error conversions
impl From<serde_json::Error> for ActError {
    fn from(err: serde_json::Error) -> Self {
        ActError::Configuration(err.to_string())
    }
}

impl From<serde_yaml::Error> for ActError {
    fn from(err: serde_yaml::Error) -> Self {
        ActError::Configuration(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ActError {
    fn from(err: validator::ValidationErrors) -> Self {
        ActError::Configuration(err.to_string())
    }
}

impl From<std::io::Error> for ActError {
    fn from(err: std::io::Error) -> Self {
        ActError::Internal(err.to_string())
    }
}

/// Result type alias for engine operations
pub type ActResult<T> = std::result::Result<T, ActError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn with_context(self, context: &str) -> ActResult<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn with_context(self, context: &str) -> ActResult<T> {
        self.map_err(|e| ActError::Internal(format!("{context}: {e}")))
    }
}

/// Build an `ActError::Configuration`, formatting like `format!`
#[macro_export]
macro_rules! config_error {
    ($fmt:literal $(, $($arg:tt)*)?) => {
        $crate::core::ActError::Configuration(format!($fmt $(, $($arg)*)?))
    };
    ($msg:expr) => {
        $crate::core::ActError::Configuration($msg.to_string())
    };
}
