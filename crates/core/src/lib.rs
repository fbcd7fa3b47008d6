//! # cardwire core
//!
//! Domain types, traits, and error definitions for building chatbot-driven
//! interactive cards. This crate has **no transport dependencies**; it
//! defines the domain model that all other crates implement against.
//!
//! ## Layout
//!
//! - [`card`]: instance ids, delivery envelopes, request shapes
//! - [`params`]: the all-string `cardParamMap` conversion
//! - [`event`]: inbound events, acknowledgements, topic payloads
//! - [`service`], [`source`], [`store`]: the seams implemented elsewhere
//! - [`lock`]: per-instance serialization of read-modify-write sequences

pub mod card;
pub mod error;
pub mod event;
pub mod lock;
pub mod message;
pub mod params;
pub mod service;
pub mod source;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use card::{CallbackReply, CardInstanceId, CreateOptions, DeliveryTarget, UpdateOptions};
pub use error::{Error, Result};
pub use event::{Ack, AckPayload, EventEnvelope, EventHandler};
pub use lock::InstanceLocks;
pub use message::{ConversationType, IncomingMessage};
pub use params::{CardParamMap, to_param_map, to_param_map_from};
pub use service::CardService;
pub use source::EventSource;
pub use store::InstanceStore;
