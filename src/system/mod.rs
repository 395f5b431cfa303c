//! System-level modules
//!
//! Process-level plumbing shared by embedders, currently logging
//! initialization. Configuration lives in [`crate::config`].

pub mod logging;
