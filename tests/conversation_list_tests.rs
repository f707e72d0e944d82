// Conversation list sync tests: unread accounting, ordering, and read
// reconciliation.

mod common;
use common::{buyer, conversation, seller, server_message, setup_logging};

use haggle::ConversationList;

fn seeded_list() -> ConversationList {
    let mut list = ConversationList::new(buyer());
    list.replace(vec![
        conversation("c1", vec![buyer(), seller()]),
        conversation("c2", vec![buyer(), seller()]),
        conversation("c3", vec![buyer(), seller()]),
    ]);
    list
}

#[test]
fn test_incoming_message_bumps_unread_and_moves_to_head() {
    setup_logging();
    let mut list = seeded_list();

    let msg = server_message("m1", "c3", &seller(), "still available?", 0);
    assert!(list.apply_incoming(&msg));

    let ids: Vec<&str> = list.items().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c3", "c1", "c2"]);
    assert_eq!(list.items()[0].unread_count, 1);
    assert_eq!(
        list.items()[0].last_message.as_ref().unwrap().content,
        "still available?"
    );
}

#[test]
fn test_own_message_does_not_increment_unread() {
    let mut list = seeded_list();

    // Our own message from another device: conversation surfaces, but
    // nothing is unread.
    let msg = server_message("m1", "c2", &buyer(), "sent elsewhere", 0);
    assert!(list.apply_incoming(&msg));

    assert_eq!(list.items()[0].id, "c2");
    assert_eq!(list.items()[0].unread_count, 0);
}

#[test]
fn test_identity_fallback_uses_email_when_ids_differ() {
    let mut list = seeded_list();

    // Same person, inconsistent id serialization; the email match stops
    // the unread bump.
    let sender = haggle::models::UserRef::new("mongo-buyer-1").with_email("buyer@example.com");
    let msg = server_message("m1", "c2", &sender, "from my phone", 0);
    list.apply_incoming(&msg);

    assert_eq!(list.items()[0].unread_count, 0);
}

#[test]
fn test_open_conversation_bypasses_the_list() {
    let mut list = seeded_list();
    list.set_open(Some("c2"));

    let msg = server_message("m1", "c2", &seller(), "hi", 0);
    assert!(!list.apply_incoming(&msg));

    // Untouched: order, unread and last message all stay as loaded.
    assert_eq!(list.items()[0].id, "c1");
    assert_eq!(list.get("c2").unwrap().unread_count, 0);
    assert!(list.get("c2").unwrap().last_message.is_none());
}

#[test]
fn test_mark_read_and_receipt_reconciliation() {
    let mut list = seeded_list();
    list.apply_incoming(&server_message("m1", "c3", &seller(), "one", 0));
    list.apply_incoming(&server_message("m2", "c3", &seller(), "two", 1));
    assert_eq!(list.get("c3").unwrap().unread_count, 2);

    // Optimistic local reset.
    list.mark_read("c3");
    assert_eq!(list.get("c3").unwrap().unread_count, 0);

    // Server-confirmed receipt for us: idempotent re-zero.
    list.apply_read_receipt("c3", "buyer-1");
    assert_eq!(list.get("c3").unwrap().unread_count, 0);

    // The counterparty's receipt does not touch our counter.
    list.apply_incoming(&server_message("m3", "c3", &seller(), "three", 2));
    list.apply_read_receipt("c3", "seller-1");
    assert_eq!(list.get("c3").unwrap().unread_count, 1);
}

#[test]
fn test_archive_and_remove() {
    let mut list = seeded_list();

    list.apply_archive("c2", true);
    assert!(list.get("c2").unwrap().archived);
    list.apply_archive("c2", false);
    assert!(!list.get("c2").unwrap().archived);

    list.set_open(Some("c1"));
    assert!(list.remove("c1"));
    assert!(!list.remove("c1"));
    assert!(list.get("c1").is_none());
    assert_eq!(list.open_conversation(), None);
}

#[test]
fn test_unknown_conversation_is_ignored() {
    let mut list = seeded_list();
    let msg = server_message("m1", "c-unknown", &seller(), "?", 0);
    assert!(!list.apply_incoming(&msg));
    assert_eq!(list.items().len(), 3);
}
