// Shared data model for the marketplace chat client.
// These shapes mirror what the REST endpoints and the socket both deliver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix for locally-synthesized message ids. A message carrying one of
/// these has not been confirmed by the server yet.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// A participant as the server serializes it. The id is the canonical key;
/// the email is kept because some server payloads ship inconsistent ids and
/// the email is the second signal we can compare against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UserRef {
    pub fn new(id: &str) -> Self {
        UserRef {
            id: id.to_string(),
            email: None,
            name: None,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    /// Two-key identity comparison: id equality first, falling back to
    /// case-insensitive email equality when both sides carry one.
    pub fn is_same_user(&self, other: &UserRef) -> bool {
        if !self.id.is_empty() && self.id == other.id {
            return true;
        }
        match (&self.email, &other.email) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }
}

/// Product a conversation was started about, as denormalized into the
/// conversation payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductRef {
    pub id: String,
    pub title: String,
    pub price: f64,
}

/// Structured metadata attached to offer-status-update messages. Plain chat
/// messages carry no metadata at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageMeta {
    #[serde(default)]
    pub offer_status_update: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_offer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender: UserRef,
    pub content: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMeta>,
}

impl Message {
    /// Build a local optimistic entry for a just-typed message. The id is
    /// temporary and will be swapped for the server-assigned one on
    /// reconciliation.
    pub fn optimistic(conversation_id: &str, sender: &UserRef, content: &str) -> Self {
        Message {
            id: format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4()),
            conversation_id: conversation_id.to_string(),
            sender: sender.clone(),
            content: content.to_string(),
            read: false,
            created_at: Utc::now(),
            metadata: None,
        }
    }

    pub fn is_optimistic(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }

    pub fn is_offer_status_update(&self) -> bool {
        self.metadata
            .as_ref()
            .map(|m| m.offer_status_update)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<UserRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub archived: bool,
}

impl Conversation {
    /// The participant that is not `user`, when the conversation has the
    /// expected two-party shape.
    pub fn counterparty(&self, user: &UserRef) -> Option<&UserRef> {
        self.participants.iter().find(|p| !p.is_same_user(user))
    }
}

/// Pagination envelope reported by the message-history endpoint. Page 1 is
/// the most recent page; higher numbers go further back in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pagination {
    pub page: u32,
    pub pages: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub pagination: Pagination,
}
