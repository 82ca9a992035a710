//! Shared data models for the auth service, the forum service and the chat relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Validation ---

/// Display-name prefix reserved for synthesized guest identities.
pub const GUEST_PREFIX: &str = "Guest";

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 8;

/// Usernames are 3-32 chars of ASCII letters, digits, `.`, `_` or `-`, and may not
/// collide with the guest namespace.
pub fn validate_username(name: &str) -> Result<(), String> {
    let len = name.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(format!(
            "username must be between {USERNAME_MIN_LEN}-{USERNAME_MAX_LEN} characters"
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(
            "username may only contain letters, digits, periods, underscores, or dashes".to_string(),
        );
    }
    if name.starts_with(GUEST_PREFIX) {
        return Err(format!("username may not start with '{GUEST_PREFIX}'"));
    }
    Ok(())
}

/// Loose `local@domain.tld` check; deliverability is not our concern.
pub fn validate_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .rsplit_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}

// --- Auth ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_username(&self.username)?;
        if self.password.chars().count() < PASSWORD_MIN_LEN {
            return Err(format!(
                "password must be at least {PASSWORD_MIN_LEN} characters"
            ));
        }
        if !validate_email(&self.email) {
            return Err("email is not valid".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidateResponse {
    pub user_id: i64,
}

// --- Posts ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusMessage {
    pub message: String,
}

// --- Chat ---

/// A chat message as persisted by the message store. Only authenticated users
/// ever end up here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: i64,
    pub content: String,
    pub username: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn to_wire(&self) -> WsMessage {
        WsMessage::chat(self.content.clone(), self.username.clone(), self.user_id, self.created_at)
    }
}

/// Frame kind on the chat socket. Encoded as an integer on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageKind {
    Chat,
    System,
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Chat => 1,
            MessageKind::System => 2,
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageKind::Chat),
            2 => Ok(MessageKind::System),
            other => Err(format!("unknown message type {other}")),
        }
    }
}

/// Outbound chat frame: `{type, content, sender, timestamp, user_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub sender: String,
    /// Unix seconds.
    pub timestamp: i64,
    /// 0 for guests and system frames.
    #[serde(default)]
    pub user_id: i64,
}

impl WsMessage {
    /// A live chat frame as relayed by the hub.
    pub fn chat(content: impl Into<String>, sender: impl Into<String>, user_id: i64, at: DateTime<Utc>) -> Self {
        Self {
            kind: MessageKind::Chat,
            content: content.into(),
            sender: sender.into(),
            timestamp: at.timestamp(),
            user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("al").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("Guest_abc123").is_err());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("a@b.io"));
        assert!(!validate_email("a@b"));
        assert!(!validate_email("@b.io"));
        assert!(!validate_email("a@@b.io"));
        assert!(!validate_email("a b@c.io"));
    }

    #[test]
    fn register_request_checks_password_length() {
        let mut req = RegisterRequest {
            username: "alice".into(),
            password: "short".into(),
            email: "alice@example.com".into(),
        };
        assert!(req.validate().unwrap_err().contains("password"));
        req.password = "long enough".into();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn ws_message_wire_shape() {
        let msg = WsMessage {
            kind: MessageKind::Chat,
            content: "hi".into(),
            sender: "alice".into(),
            timestamp: 1_700_000_000,
            user_id: 7,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": 1,
                "content": "hi",
                "sender": "alice",
                "timestamp": 1_700_000_000,
                "user_id": 7
            })
        );
        assert!(serde_json::from_str::<WsMessage>(
            r#"{"type":9,"content":"","sender":"","timestamp":0}"#
        )
        .is_err());
    }

    #[test]
    fn chat_message_maps_to_chat_frame() {
        let stored = ChatMessage {
            id: 3,
            content: "hello".into(),
            username: "bob".into(),
            user_id: 2,
            created_at: DateTime::from_timestamp(1_700_000_123, 0).unwrap(),
        };
        let wire = stored.to_wire();
        assert_eq!(wire.kind, MessageKind::Chat);
        assert_eq!(wire.sender, "bob");
        assert_eq!(wire.timestamp, 1_700_000_123);
        assert_eq!(wire.user_id, 2);
    }
}
