// Shared helpers for the integration tests
#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use haggle::models::{Conversation, Message, MessageMeta, Pagination, MessagePage, ProductRef, UserRef};

pub fn setup_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn buyer() -> UserRef {
    UserRef::new("buyer-1").with_email("buyer@example.com")
}

pub fn seller() -> UserRef {
    UserRef::new("seller-1").with_email("seller@example.com")
}

/// A server-confirmed message `seconds` after a fixed base instant.
pub fn server_message(
    id: &str,
    conversation_id: &str,
    sender: &UserRef,
    content: &str,
    seconds: i64,
) -> Message {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    Message {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        sender: sender.clone(),
        content: content.to_string(),
        read: false,
        created_at: base + Duration::seconds(seconds),
        metadata: None,
    }
}

/// An offer-status-update message targeting `original_offer_id`.
pub fn status_update_message(
    id: &str,
    conversation_id: &str,
    sender: &UserRef,
    original_offer_id: &str,
    status: &str,
    seconds: i64,
) -> Message {
    let mut message = server_message(id, conversation_id, sender, "Offer status updated", seconds);
    message.metadata = Some(MessageMeta {
        offer_status_update: true,
        original_offer_id: Some(original_offer_id.to_string()),
        status: Some(status.to_string()),
        order_reference: None,
    });
    message
}

pub fn page(messages: Vec<Message>, page: u32, pages: u32) -> MessagePage {
    MessagePage {
        messages,
        pagination: Pagination { page, pages },
    }
}

pub fn conversation(id: &str, participants: Vec<UserRef>) -> Conversation {
    Conversation {
        id: id.to_string(),
        participants,
        product: None,
        last_message: None,
        unread_count: 0,
        archived: false,
    }
}

pub fn camera() -> ProductRef {
    ProductRef {
        id: "p1".to_string(),
        title: "Vintage Film Camera".to_string(),
        price: 120.0,
    }
}
