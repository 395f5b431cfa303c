//! Service layer for business logic
//!
//! Ties the storage, cache, limiter and analytics components into the two
//! request paths (create and resolve) and exposes them behind the
//! [`UrlRegistry`] facade that embedders construct from configuration.

mod coordinator;
mod registry;
mod resolver;

pub use coordinator::*;
pub use registry::*;
pub use resolver::*;
