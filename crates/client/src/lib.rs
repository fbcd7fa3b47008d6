//! HTTP implementation of the card API for cardwire.
//!
//! [`CardSessionClient`] implements `cardwire_core::CardService` on top of
//! `reqwest`. Access tokens come from a [`TokenProvider`]; transient failures
//! are retried under a [`RetryPolicy`].

pub mod card_client;
pub mod retry;
pub mod token;

pub use card_client::CardSessionClient;
pub use retry::RetryPolicy;
pub use token::{OAuthTokenProvider, StaticTokenProvider, TokenProvider};
