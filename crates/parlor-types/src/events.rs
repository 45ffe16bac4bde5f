use serde::{Deserialize, Serialize};

/// Events sent FROM client TO server over the WebSocket.
///
/// Frames are JSON envelopes of the form `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "send-chat-message")]
    SendChatMessage(SendChatMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendChatMessage {
    pub message: String,
    #[serde(rename = "isAnonymous", default)]
    pub is_anonymous: bool,
}

/// Events pushed FROM server TO every bound client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "chat-message")]
    ChatMessage(ChatMessage),
}

/// Broadcast payload for a newly accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub name: String,
    pub message: String,
    /// RFC 3339 timestamp taken from the server clock at broadcast time.
    pub created_at: String,
    pub profile_pic_url: String,
}
