//! This crate contains the core logic of the actgate action engine.
//!
//! It binds named actions to RPC patterns, memoizes their results, composes
//! several concurrent actions into one view context and exposes route
//! handlers an HTTP server can mount.

pub mod action;
pub mod cache;
pub mod compose;
pub mod config;
pub mod core;
pub mod gateway;
pub mod handler;
pub mod logging;
pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{ActionBinder, ActionMethod, ActionOptions, CacheKey, CacheOptions};
pub use cache::MemoryCache;
pub use compose::Composer;
pub use config::Config;
pub use core::{
    ActError, ActResult, Additions, Pattern, RawRequest, RequestDelegate, RpcLayer,
};
pub use gateway::Gateway;
pub use handler::{build_handler, Reply, RouteHandler};
