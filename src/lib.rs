//! Linkshard - a globally distributed URL-shortening registry core
//!
//! This library provides the storage and coordination heart of a
//! URL-shortening service: identifier generation, directory/shard routing
//! with reservation commits, cache-aside reads, admission control and the
//! asynchronous click-analytics pipeline. HTTP routing, authentication and
//! process bootstrap are left to the embedding service.
//!
//! # Architecture
//! - `id`: region-aware 64-bit identifier layout and generator
//! - `region`: region name → 2-bit code table, fixed at startup
//! - `directory`: global short-key authority with reserve/commit protocol
//! - `shard`: per-region record stores and the routing formula
//! - `cache`: TTL-only cache-aside layer in front of the shards
//! - `limiter`: tiered fixed-window admission control
//! - `analytics`: click event pipeline and daily aggregation
//! - `services`: create/resolve coordination and the [`services::UrlRegistry`] facade
//! - `storage`: shared database plumbing (connection, migration, retry)
//! - `config`: TOML + environment configuration
//! - `system`: process-level plumbing (logging)

pub mod analytics;
pub mod cache;
pub mod config;
pub mod directory;
pub mod errors;
pub mod id;
pub mod limiter;
pub mod region;
pub mod services;
pub mod shard;
pub mod storage;
pub mod system;
pub mod utils;
