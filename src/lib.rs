// Client core for the marketplace buyer/seller chat: socket lifecycle,
// message/offer reconciliation, and the REST surface they sit on.

pub mod api;
pub mod conversations;
pub mod error;
pub mod message_store;
pub mod models;
pub mod offers;
pub mod socket;
pub mod storage;

// Re-export main types for convenience
pub use conversations::ConversationList;
pub use error::{ChatError, Result};
pub use message_store::MessageStore;
pub use models::*;
pub use socket::{ChatSocket, ClientState};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_identity_comparison_fallback() {
        let by_id_a = UserRef::new("u1").with_email("alice@example.com");
        let by_id_b = UserRef::new("u1").with_email("other@example.com");
        assert!(by_id_a.is_same_user(&by_id_b), "id equality should win");

        // Inconsistent ids from the server; the email is the second signal.
        let inconsistent = UserRef::new("mongo-u1").with_email("Alice@Example.com");
        assert!(by_id_a.is_same_user(&inconsistent));

        let stranger = UserRef::new("u2").with_email("bob@example.com");
        assert!(!by_id_a.is_same_user(&stranger));

        // No email on either side and different ids: not the same user.
        assert!(!UserRef::new("u1").is_same_user(&UserRef::new("u3")));
    }

    #[test]
    fn test_optimistic_message_shape() {
        let sender = UserRef::new("u1");
        let msg = Message::optimistic("c1", &sender, "hello there");

        assert!(msg.is_optimistic());
        assert!(msg.id.starts_with(TEMP_ID_PREFIX));
        assert_eq!(msg.conversation_id, "c1");
        assert_eq!(msg.content, "hello there");
        assert!(!msg.read);
        assert!(msg.metadata.is_none());
        assert!(!msg.is_offer_status_update());
    }

    #[test]
    fn test_offer_status_update_metadata() {
        let mut msg = Message::optimistic("c1", &UserRef::new("u1"), "Offer was accepted");
        msg.metadata = Some(MessageMeta {
            offer_status_update: true,
            original_offer_id: Some("m42".to_string()),
            status: Some("accepted".to_string()),
            order_reference: Some("ORD-7".to_string()),
        });

        assert!(msg.is_offer_status_update());
    }

    #[test]
    fn test_message_deserializes_server_payload() {
        let raw = r#"{
            "id": "m1",
            "conversationId": "c1",
            "sender": {"id": "u2", "email": "seller@example.com"},
            "content": "hi",
            "read": false,
            "createdAt": "2024-05-01T10:30:00Z"
        }"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.sender.id, "u2");
        assert!(msg.created_at < Utc::now());
        assert!(msg.metadata.is_none());
    }

    #[test]
    fn test_conversation_counterparty() {
        let me = UserRef::new("u1");
        let seller = UserRef::new("u2").with_email("seller@example.com");
        let conversation = Conversation {
            id: "c1".to_string(),
            participants: vec![me.clone(), seller.clone()],
            product: None,
            last_message: None,
            unread_count: 0,
            archived: false,
        };

        assert_eq!(conversation.counterparty(&me).unwrap().id, "u2");
        assert_eq!(conversation.counterparty(&seller).unwrap().id, "u1");
    }
}
