//! CardService trait: the outbound side of the interactive card API.
//!
//! Handlers talk to the platform only through this trait, so scenarios can
//! be exercised against a recording double instead of the network.

use async_trait::async_trait;

use crate::card::{
    CardInstanceId, CreateOptions, PrivateDataPatch, StreamingUpdate, UpdateOptions, UserProfile,
};
use crate::error::CardError;
use crate::message::IncomingMessage;
use crate::params::CardParamMap;

#[async_trait]
pub trait CardService: Send + Sync {
    /// Create a card from a template and deliver it into the conversation of
    /// `target`. Returns the new instance id.
    async fn create_and_deliver(
        &self,
        template_id: &str,
        public_data: CardParamMap,
        target: &IncomingMessage,
        options: CreateOptions,
    ) -> Result<CardInstanceId, CardError>;

    /// Patch a delivered card's public and/or per-viewer private data.
    async fn update(
        &self,
        instance_id: &CardInstanceId,
        public_patch: Option<CardParamMap>,
        private_patch: Option<PrivateDataPatch>,
        options: UpdateOptions,
    ) -> Result<(), CardError>;

    /// Stream content into one variable of an AI card.
    async fn stream_update(
        &self,
        instance_id: &CardInstanceId,
        update: StreamingUpdate,
    ) -> Result<(), CardError>;

    /// Look up a user's display name and avatar.
    async fn user_profile(&self, user_id: &str) -> Result<UserProfile, CardError>;
}
