use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// User roles as stored in the `role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum Role {
    Student = 1,
    Tutor = 2,
    Client = 3,
    Coordinator = 4,
    Admin = 5,
}

impl Role {
    pub fn from_i64(v: i64) -> Option<Role> {
        match v {
            1 => Some(Role::Student),
            2 => Some(Role::Tutor),
            3 => Some(Role::Client),
            4 => Some(Role::Coordinator),
            5 => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub course: String,
    pub role: i64,
    pub team_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Team {
    pub id: i64,
    pub show_id: i64,
    pub name: String,
    pub course: String,
    pub allocated_project: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub field: String,
    pub description: String,
    pub max_teams: i64,
    pub visibility: i64,
    pub client_id: Option<i64>,
    pub tutor_id: Option<i64>,
    pub coordinator_id: Option<i64>,
    pub spec_url: Option<String>,
    pub created_at: i64,
}

pub const VISIBILITY_PUBLIC: i64 = 1;
pub const VISIBILITY_ARCHIVED: i64 = 2;

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub kind: i64,
    pub created_at: i64,
}

pub const CHANNEL_PRIVATE: i64 = 1;
pub const CHANNEL_GROUP: i64 = 2;

pub const MESSAGE_PLAIN: i64 = 1;
pub const MESSAGE_CARD: i64 = 2;

/// Message payload, discriminated by the request's `messageType` field.
///
/// Plain text serializes as a bare string, cards as `{name, email}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Plain(String),
    Card { name: String, email: String },
}

#[derive(Deserialize)]
struct CardFields {
    name: String,
    email: String,
}

impl MessageContent {
    /// Decode a request body value against the declared message type.
    pub fn from_request(kind: i64, value: &serde_json::Value) -> Result<MessageContent> {
        match kind {
            MESSAGE_PLAIN => match value.as_str() {
                Some(s) => Ok(MessageContent::Plain(s.to_string())),
                None => Err(Error::Invalid(
                    "plain message content must be a string".into(),
                )),
            },
            MESSAGE_CARD => {
                if !value.is_object() {
                    return Err(Error::Invalid(
                        "card message content must be an object".into(),
                    ));
                }
                let card: CardFields = serde_json::from_value(value.clone())
                    .map_err(|e| Error::Invalid(format!("invalid card content: {e}")))?;
                Ok(MessageContent::Card {
                    name: card.name,
                    email: card.email,
                })
            }
            other => Err(Error::Invalid(format!("unknown message type {other}"))),
        }
    }

    pub fn kind(&self) -> i64 {
        match self {
            MessageContent::Plain(_) => MESSAGE_PLAIN,
            MessageContent::Card { .. } => MESSAGE_CARD,
        }
    }

    /// Serialize for storage; cards become a JSON text blob.
    pub fn to_stored(&self) -> Result<String> {
        match self {
            MessageContent::Plain(s) => Ok(s.clone()),
            MessageContent::Card { name, email } => {
                let blob = serde_json::json!({ "name": name, "email": email });
                Ok(serde_json::to_string(&blob)?)
            }
        }
    }

    /// Decode a stored row back into a payload. Corrupt card blobs are an
    /// internal error, never a client fault.
    pub fn from_stored(kind: i64, raw: &str) -> Result<MessageContent> {
        match kind {
            MESSAGE_PLAIN => Ok(MessageContent::Plain(raw.to_string())),
            MESSAGE_CARD => {
                let card: CardFields = serde_json::from_str(raw)?;
                Ok(MessageContent::Card {
                    name: card.name,
                    email: card.email,
                })
            }
            other => Err(Error::Internal(anyhow::anyhow!(
                "unknown stored message kind {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_rejects_non_string() {
        let v = serde_json::json!({"oops": 1});
        assert!(matches!(
            MessageContent::from_request(MESSAGE_PLAIN, &v),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn card_round_trip() {
        let v = serde_json::json!({"name": "Ann", "email": "a@x.com"});
        let content = MessageContent::from_request(MESSAGE_CARD, &v).unwrap();
        let stored = content.to_stored().unwrap();
        let back = MessageContent::from_stored(MESSAGE_CARD, &stored).unwrap();
        assert_eq!(back, content);
        match back {
            MessageContent::Card { name, email } => {
                assert_eq!(name, "Ann");
                assert_eq!(email, "a@x.com");
            }
            _ => panic!("expected card"),
        }
    }

    #[test]
    fn card_rejects_missing_fields() {
        let v = serde_json::json!({"name": "Ann"});
        assert!(matches!(
            MessageContent::from_request(MESSAGE_CARD, &v),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn unknown_type_rejected() {
        let v = serde_json::json!("hello");
        assert!(MessageContent::from_request(7, &v).is_err());
    }
}
