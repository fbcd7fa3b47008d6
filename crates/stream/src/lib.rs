//! Inbound event plumbing for cardwire.
//!
//! An [`EventSource`](cardwire_core::EventSource) yields events, the
//! [`EventDispatcher`] routes each one to its topic handler, and the
//! [`StreamRunner`] ties the two together so that every event is
//! acknowledged exactly once.

pub mod dispatcher;
pub mod in_process;
pub mod runner;

pub use dispatcher::EventDispatcher;
pub use in_process::InProcessSource;
pub use runner::StreamRunner;
