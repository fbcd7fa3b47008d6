//! Instance store backends for cardwire.
//!
//! All backends implement `cardwire_core::InstanceStore`.

pub mod in_memory;

pub use in_memory::{InMemoryStore, MAX_TTL, spawn_sweeper};
