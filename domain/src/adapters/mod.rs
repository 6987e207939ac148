//! Adapters that live inside the domain crate for convenience.
//!
//! The in-memory store backs unit tests, the demo CLI and the `memory`
//! storage provider of the api-server. SQL adapters live in separate crates.

pub mod memory_repo;
