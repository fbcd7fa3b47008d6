//! Robot message types: what the bot receives when someone talks to it.

use serde::{Deserialize, Serialize};

/// Conversation kind, carried on the wire as a numeric string tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationType {
    /// One-on-one chat with the robot (`"1"`).
    Direct,
    /// Group chat the robot is a member of (`"2"`).
    Group,
    /// Any tag this crate does not know how to deliver to.
    Unknown(String),
}

impl ConversationType {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "1" => Self::Direct,
            "2" => Self::Group,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::Direct => "1",
            Self::Group => "2",
            Self::Unknown(tag) => tag,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub content: String,
}

/// A message delivered to the robot on the robot topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    #[serde(default)]
    pub conversation_id: String,

    /// "1" for direct chats, "2" for group chats
    #[serde(default)]
    pub conversation_type: String,

    #[serde(default)]
    pub sender_id: String,

    #[serde(default)]
    pub sender_corp_id: String,

    /// Staff (user) id of the sender inside their organization
    #[serde(default)]
    pub sender_staff_id: String,

    #[serde(default)]
    pub sender_nick: String,

    #[serde(default)]
    pub msg_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chatbot_user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robot_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msgtype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_webhook: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_at: Option<i64>,

    #[serde(default)]
    pub is_admin: bool,
}

impl IncomingMessage {
    pub fn conversation(&self) -> ConversationType {
        ConversationType::parse(&self.conversation_type)
    }

    /// Trimmed text content, or an empty string for non-text messages.
    pub fn text(&self) -> &str {
        self.text.as_ref().map(|t| t.content.trim()).unwrap_or("")
    }

    /// A synthetic direct-chat message addressed to `staff_id`.
    ///
    /// Used for proactive cards that are not replies to anything.
    pub fn direct_to(staff_id: impl Into<String>) -> Self {
        Self {
            conversation_type: ConversationType::Direct.tag().to_string(),
            sender_staff_id: staff_id.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_robot_payload() {
        let raw = r#"{
            "conversationId": "cid123",
            "conversationType": "2",
            "senderId": "$:LWCP_v1:$abc",
            "senderCorpId": "corp1",
            "senderStaffId": "staff1",
            "senderNick": "Alice",
            "msgId": "msg1",
            "msgtype": "text",
            "text": { "content": "  INTERVAL \n" },
            "isAdmin": true
        }"#;
        let msg: IncomingMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.conversation(), ConversationType::Group);
        assert_eq!(msg.text(), "INTERVAL");
        assert_eq!(msg.sender_nick, "Alice");
        assert!(msg.is_admin);
    }

    #[test]
    fn missing_text_is_empty() {
        let msg: IncomingMessage = serde_json::from_str(r#"{"conversationType":"1"}"#).unwrap();
        assert_eq!(msg.text(), "");
        assert_eq!(msg.conversation(), ConversationType::Direct);
    }

    #[test]
    fn unknown_conversation_tag_is_preserved() {
        assert_eq!(
            ConversationType::parse("9"),
            ConversationType::Unknown("9".into())
        );
        assert_eq!(ConversationType::parse("9").tag(), "9");
    }

    #[test]
    fn direct_to_builds_direct_message() {
        let msg = IncomingMessage::direct_to("manager01");
        assert_eq!(msg.conversation(), ConversationType::Direct);
        assert_eq!(msg.sender_staff_id, "manager01");
    }
}
