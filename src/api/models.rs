use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::conversation_key;

/// Numeric participant id as used by the marketplace backend.
pub type UserId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(deserialize_with = "de_user_id")]
    pub id: UserId,
    #[serde(default, alias = "fullName", alias = "name", alias = "username")]
    pub display_name: String,
    #[serde(default, alias = "avatar")]
    pub avatar_url: Option<String>,
}

impl Participant {
    pub fn label(&self) -> String {
        if self.display_name.trim().is_empty() {
            format!("User {}", self.id)
        } else {
            self.display_name.clone()
        }
    }
}

/// Cached summary of the newest message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub text: String,
    pub sent_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub key: String,
    pub peer: Participant,
    pub preview: Option<Preview>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Shown optimistically, server has not confirmed yet.
    Pending,
    Delivered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Option<String>,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub conversation_key: String,
    /// Unix epoch milliseconds.
    pub sent_at: i64,
    pub delivery: Delivery,
}

/// Conversation entry as returned by the listing endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    #[serde(default, alias = "conversationKey", alias = "id")]
    pub conversation_id: Option<String>,
    #[serde(alias = "participant", alias = "partner")]
    pub other_user: Participant,
    #[serde(default, alias = "lastMessageContent")]
    pub last_message: Option<String>,
    #[serde(default, deserialize_with = "de_opt_timestamp", alias = "lastMessageAt")]
    pub last_message_time: Option<i64>,
}

impl ConversationDto {
    pub fn into_conversation(self, me: UserId) -> Conversation {
        let key = conversation_key(me, self.other_user.id);
        if let Some(wire) = self.conversation_id.as_deref() {
            if wire != key {
                log::debug!("conversation {wire} listed under derived key {key}");
            }
        }
        let preview = self.last_message.map(|text| Preview {
            text,
            sent_at: self.last_message_time.unwrap_or_default(),
        });
        Conversation {
            key,
            peer: self.other_user,
            preview,
        }
    }
}

/// Message shape shared by the history endpoint and the push channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    #[serde(default, deserialize_with = "de_opt_server_id", alias = "_id", alias = "messageId")]
    pub id: Option<String>,
    #[serde(deserialize_with = "de_user_id", alias = "sender_id", alias = "from")]
    pub sender_id: UserId,
    #[serde(deserialize_with = "de_user_id", alias = "receiver_id", alias = "to")]
    pub receiver_id: UserId,
    #[serde(alias = "content", alias = "text", alias = "body")]
    pub message: String,
    #[serde(default, alias = "conversationKey", alias = "conversation_id")]
    pub conversation_id: Option<String>,
    #[serde(deserialize_with = "de_timestamp", alias = "createdAt", alias = "sentAt")]
    pub timestamp: i64,
}

impl MessageDto {
    /// The derived key always wins over whatever the wire carried.
    pub fn into_message(self) -> ChatMessage {
        let key = conversation_key(self.sender_id, self.receiver_id);
        if let Some(wire) = self.conversation_id.as_deref() {
            if wire != key {
                log::debug!("message tagged {wire} belongs to {key}");
            }
        }
        ChatMessage {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            content: self.message,
            conversation_key: key,
            sent_at: self.timestamp,
            delivery: Delivery::Delivered,
        }
    }
}

/// Body of the send endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub message: String,
    pub conversation_id: String,
    pub timestamp: i64,
}

impl From<&ChatMessage> for OutgoingMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            sender_id: msg.sender_id,
            receiver_id: msg.receiver_id,
            message: msg.content.clone(),
            conversation_id: msg.conversation_key.clone(),
            timestamp: msg.sent_at,
        }
    }
}

pub(crate) fn de_user_id<'de, D: Deserializer<'de>>(d: D) -> Result<UserId, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| de::Error::custom(format!("user id out of range: {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("non-numeric user id: {s:?}"))),
        other => Err(de::Error::custom(format!("unexpected user id: {other}"))),
    }
}

pub(crate) fn de_opt_server_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(de::Error::custom(format!("unexpected message id: {other}"))),
    }
}

/// Accepts epoch milliseconds (number or numeric string) or an RFC 3339 date.
pub(crate) fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                chrono::DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.timestamp_millis())
            })
        }
        _ => None,
    }
}

pub(crate) fn de_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(d)?;
    parse_timestamp(&value).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {value}")))
}

pub(crate) fn de_opt_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(d)?;
    if value.is_null() {
        return Ok(None);
    }
    parse_timestamp(&value)
        .map(Some)
        .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {value}")))
}
