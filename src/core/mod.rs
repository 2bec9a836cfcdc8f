//! Core abstractions and interfaces for actgate
//!
//! This module provides the foundational traits, types, and utilities
//! shared by action binding, composition and the route handlers.

pub mod context;
pub mod error;
pub mod pattern;
pub mod registry;
pub mod traits;


// Re-export commonly used types
pub use context::{RawRequest, RequestDelegate, TxIdGenerator};
pub use error::{ActError, ActResult, ErrorContext};
pub use pattern::{Additions, Pattern, PatternSource};
pub use registry::{MethodRegistry, MethodStats};
pub use traits::*;
