//! Card instances and the request shapes of the interactive card API.
//!
//! A card instance is one rendered card in one conversation. Its id (the
//! platform calls it `outTrackId`) is minted locally before creation, which
//! is what lets a failed create be re-issued without duplicating the card.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CardError;
use crate::message::{ConversationType, IncomingMessage};
use crate::params::CardParamMap;

/// Platform-wide unique identifier of a card instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardInstanceId(pub String);

impl CardInstanceId {
    /// Derive a fresh id for a card replying to `msg`.
    ///
    /// SHA-256 over the sender, organization, conversation and message ids
    /// plus a random nonce. The nonce matters: the same message can be
    /// delivered to a handler more than once, and every reply needs its own
    /// instance.
    pub fn derive(msg: &IncomingMessage) -> Self {
        Self::derive_with_nonce(msg, &uuid::Uuid::new_v4().to_string())
    }

    fn derive_with_nonce(msg: &IncomingMessage, nonce: &str) -> Self {
        let factor = format!(
            "{}_{}_{}_{}_{}",
            msg.sender_id, msg.sender_corp_id, msg.conversation_id, msg.msg_id, nonce
        );
        let digest = Sha256::digest(factor.as_bytes());
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CardInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CardInstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// --- Delivery ---

/// Where a new card goes, resolved from the conversation it answers.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryTarget {
    Group(GroupDelivery),
    Direct(DirectDelivery),
}

/// Group delivery: the robot posts into the group, optionally @-mentioning
/// people and optionally restricting who can see the card.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDelivery {
    pub conversation_id: String,
    pub robot_code: String,
    pub at_user_ids: Option<BTreeMap<String, String>>,
    pub recipients: Option<Vec<String>>,
}

/// Direct delivery into the robot's one-on-one space with a user.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectDelivery {
    pub staff_id: String,
}

impl DeliveryTarget {
    /// Pick the envelope for `msg`'s conversation.
    pub fn resolve(
        msg: &IncomingMessage,
        robot_code: &str,
        options: &CreateOptions,
    ) -> Result<Self, CardError> {
        match msg.conversation() {
            ConversationType::Group => {
                let at_user_ids = if options.at_all {
                    Some(BTreeMap::from([("@ALL".to_string(), "@ALL".to_string())]))
                } else if options.at_sender {
                    Some(BTreeMap::from([(
                        msg.sender_staff_id.clone(),
                        msg.sender_nick.clone(),
                    )]))
                } else {
                    None
                };
                Ok(Self::Group(GroupDelivery {
                    conversation_id: msg.conversation_id.clone(),
                    robot_code: robot_code.to_string(),
                    at_user_ids,
                    recipients: options.recipients.clone(),
                }))
            }
            ConversationType::Direct => Ok(Self::Direct(DirectDelivery {
                staff_id: msg.sender_staff_id.clone(),
            })),
            ConversationType::Unknown(tag) => Err(CardError::UnsupportedConversation(tag)),
        }
    }

    pub fn open_space_id(&self) -> String {
        match self {
            Self::Group(g) => format!("dtv1.card//IM_GROUP.{}", g.conversation_id),
            Self::Direct(d) => format!("dtv1.card//IM_ROBOT.{}", d.staff_id),
        }
    }
}

/// Pin the card to the top of a conversation until it expires.
#[derive(Debug, Clone, PartialEq)]
pub struct TopBoxDelivery {
    pub conversation_id: String,
    pub expired_time_millis: i64,
}

impl TopBoxDelivery {
    pub fn expiring_in(conversation_id: impl Into<String>, ttl: Duration) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            conversation_id: conversation_id.into(),
            expired_time_millis: (now + ttl).as_millis() as i64,
        }
    }
}

/// How often the platform pulls a dynamic data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pullStrategy", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PullConfig {
    /// Pull once after delivery.
    Once,
    /// Pull every time the card renders.
    Render,
    /// Pull on a fixed interval.
    Interval {
        interval: u32,
        #[serde(rename = "timeUnit")]
        time_unit: TimeUnit,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicDataSourceConfig {
    pub dynamic_data_source_id: String,
    pub pull_config: PullConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicDataConfig {
    pub dynamic_data_source_configs: Vec<DynamicDataSourceConfig>,
}

/// Options for creating and delivering a card.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// `STREAM` routes callbacks through the event stream.
    pub callback_type: String,
    pub at_sender: bool,
    pub at_all: bool,
    /// Restrict a group card to these staff ids.
    pub recipients: Option<Vec<String>>,
    pub support_forward: bool,
    /// Conversation-list preview text, sent as `lastMessageI18n.ZH_CN`.
    pub last_message: Option<String>,
    pub top_box: Option<TopBoxDelivery>,
    pub dynamic_data: Option<DynamicDataConfig>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            callback_type: "STREAM".into(),
            at_sender: false,
            at_all: false,
            recipients: None,
            support_forward: true,
            last_message: None,
            top_box: None,
            dynamic_data: None,
        }
    }
}

/// Per-key merge flags for an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOptions {
    pub update_card_data_by_key: bool,
    pub update_private_data_by_key: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            update_card_data_by_key: true,
            update_private_data_by_key: true,
        }
    }
}

/// Private data per viewer: user id → that viewer's params.
pub type PrivateDataPatch = BTreeMap<String, CardParamMap>;

// --- Wire shapes ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
    pub card_param_map: CardParamMap,
}

impl From<CardParamMap> for CardData {
    fn from(card_param_map: CardParamMap) -> Self {
        Self { card_param_map }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceModel {
    pub support_forward: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_i18n: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDeliverModel {
    pub robot_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_user_ids: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotDeliverModel {
    pub space_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopSpaceModel {
    pub space_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopDeliverModel {
    pub expired_time_millis: i64,
}

/// Body of `POST /v1.0/card/instances/createAndDeliver`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardRequest {
    pub card_template_id: String,
    pub out_track_id: CardInstanceId,
    pub callback_type: String,
    pub card_data: CardData,
    pub open_space_id: String,
    pub im_group_open_space_model: SpaceModel,
    pub im_robot_open_space_model: SpaceModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub im_group_open_deliver_model: Option<GroupDeliverModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub im_robot_open_deliver_model: Option<RobotDeliverModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_open_space_model: Option<TopSpaceModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_open_deliver_model: Option<TopDeliverModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_dynamic_data_config: Option<DynamicDataConfig>,
}

impl CreateCardRequest {
    pub fn build(
        template_id: &str,
        instance_id: CardInstanceId,
        public_data: CardParamMap,
        target: &DeliveryTarget,
        options: &CreateOptions,
    ) -> Self {
        let space = || SpaceModel {
            support_forward: options.support_forward,
            last_message_i18n: options
                .last_message
                .as_ref()
                .map(|text| BTreeMap::from([("ZH_CN".to_string(), text.clone())])),
        };
        let mut request = Self {
            card_template_id: template_id.to_string(),
            out_track_id: instance_id,
            callback_type: options.callback_type.clone(),
            card_data: public_data.into(),
            open_space_id: target.open_space_id(),
            im_group_open_space_model: space(),
            im_robot_open_space_model: space(),
            im_group_open_deliver_model: None,
            im_robot_open_deliver_model: None,
            top_open_space_model: None,
            top_open_deliver_model: None,
            open_dynamic_data_config: options.dynamic_data.clone(),
        };

        match target {
            DeliveryTarget::Group(g) => {
                request.im_group_open_deliver_model = Some(GroupDeliverModel {
                    robot_code: g.robot_code.clone(),
                    at_user_ids: g.at_user_ids.clone(),
                    recipients: g.recipients.clone(),
                });
            }
            DeliveryTarget::Direct(_) => {
                request.im_robot_open_deliver_model = Some(RobotDeliverModel {
                    space_type: "IM_ROBOT".into(),
                });
            }
        }

        // A top box replaces the conversation space but keeps the IM models.
        if let Some(top) = &options.top_box {
            request.open_space_id = format!("dtv1.card//ONE_BOX.{}", top.conversation_id);
            request.top_open_space_model = Some(TopSpaceModel {
                space_type: "ONE_BOX".into(),
            });
            request.top_open_deliver_model = Some(TopDeliverModel {
                expired_time_millis: top.expired_time_millis,
            });
        }

        request
    }
}

/// Body of `PUT /v1.0/card/instances`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCardRequest {
    pub out_track_id: CardInstanceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_data: Option<CardData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_data: Option<BTreeMap<String, CardData>>,
    pub card_update_options: UpdateOptions,
}

impl UpdateCardRequest {
    pub fn build(
        instance_id: CardInstanceId,
        public_patch: Option<CardParamMap>,
        private_patch: Option<PrivateDataPatch>,
        options: UpdateOptions,
    ) -> Self {
        Self {
            out_track_id: instance_id,
            card_data: public_patch.map(CardData::from),
            private_data: private_patch.map(|patch| {
                patch
                    .into_iter()
                    .map(|(user, params)| (user, CardData::from(params)))
                    .collect()
            }),
            card_update_options: options,
        }
    }
}

/// One chunk of an AI card typewriter update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingUpdate {
    pub guid: String,
    /// The card variable being streamed into
    pub key: String,
    pub content: String,
    /// `content` replaces the variable instead of appending
    pub is_full: bool,
    pub is_finalize: bool,
    pub is_error: bool,
}

impl StreamingUpdate {
    pub fn full(key: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            guid: uuid::Uuid::new_v4().to_string(),
            key: key.into(),
            content: content.into(),
            is_full: true,
            is_finalize: false,
            is_error: false,
        }
    }

    pub fn finalize(mut self) -> Self {
        self.is_finalize = true;
        self
    }

    pub fn failed(mut self) -> Self {
        self.is_error = true;
        self
    }
}

/// Reply to a card callback: how the card should change for everyone and for
/// the viewer who triggered it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_data: Option<CardData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_private_data: Option<CardData>,
    pub card_update_options: UpdateOptions,
}

impl CallbackReply {
    pub fn new(public: Option<CardParamMap>, private: Option<CardParamMap>) -> Self {
        Self {
            card_data: public.map(CardData::from),
            user_private_data: private.map(CardData::from),
            card_update_options: UpdateOptions::default(),
        }
    }
}

/// Profile fields used to decorate roster entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: String,
}
