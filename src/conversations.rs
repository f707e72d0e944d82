// Conversation summary list, kept consistent with events arriving for
// conversations that are not currently open: head-move on activity, unread
// accounting, and optimistic mark-read with server reconciliation.

use crate::models::{Conversation, Message, UserRef};
use log::debug;

pub struct ConversationList {
    current_user: UserRef,
    open_conversation: Option<String>,
    items: Vec<Conversation>,
}

impl ConversationList {
    pub fn new(current_user: UserRef) -> Self {
        ConversationList {
            current_user,
            open_conversation: None,
            items: Vec::new(),
        }
    }

    pub fn replace(&mut self, items: Vec<Conversation>) {
        self.items = items;
    }

    pub fn items(&self) -> &[Conversation] {
        &self.items
    }

    pub fn get(&self, conversation_id: &str) -> Option<&Conversation> {
        self.items.iter().find(|c| c.id == conversation_id)
    }

    /// The conversation whose message log is on screen; its events bypass
    /// this list and go to the MessageStore instead.
    pub fn set_open(&mut self, conversation_id: Option<&str>) {
        self.open_conversation = conversation_id.map(|id| id.to_string());
    }

    pub fn open_conversation(&self) -> Option<&str> {
        self.open_conversation.as_deref()
    }

    pub fn unread_total(&self) -> u32 {
        self.items.iter().map(|c| c.unread_count).sum()
    }

    /// An inbound message for a conversation that is not open: move it to
    /// the head of the list, refresh its denormalized last message, and
    /// bump the unread count unless the sender is the current user (their
    /// own message from another device is not unread). Returns true when
    /// the list changed.
    pub fn apply_incoming(&mut self, message: &Message) -> bool {
        if self.open_conversation.as_deref() == Some(message.conversation_id.as_str()) {
            return false;
        }

        let Some(index) = self
            .items
            .iter()
            .position(|c| c.id == message.conversation_id)
        else {
            debug!(
                "Message {} for unknown conversation {}, list unchanged",
                message.id, message.conversation_id
            );
            return false;
        };

        let mut conversation = self.items.remove(index);
        conversation.last_message = Some(message.clone());
        if !self.current_user.is_same_user(&message.sender) {
            conversation.unread_count += 1;
        }
        self.items.insert(0, conversation);
        true
    }

    /// Optimistic local reset; the caller emits the mark-read network
    /// action and the echoed receipt re-zeros idempotently.
    pub fn mark_read(&mut self, conversation_id: &str) {
        if let Some(conversation) = self.items.iter_mut().find(|c| c.id == conversation_id) {
            conversation.unread_count = 0;
        }
    }

    /// Server-confirmed read receipt. Only the current user's own receipt
    /// zeroes the local counter; the counterparty reading their side does
    /// not change what is unread for us.
    pub fn apply_read_receipt(&mut self, conversation_id: &str, reader_id: &str) {
        if reader_id == self.current_user.id {
            self.mark_read(conversation_id);
        }
    }

    /// Replace a conversation in place, or insert a new one at the head.
    pub fn apply_update(&mut self, conversation: Conversation) {
        match self.items.iter_mut().find(|c| c.id == conversation.id) {
            Some(existing) => *existing = conversation,
            None => self.items.insert(0, conversation),
        }
    }

    pub fn apply_archive(&mut self, conversation_id: &str, archived: bool) {
        if let Some(conversation) = self.items.iter_mut().find(|c| c.id == conversation_id) {
            conversation.archived = archived;
        }
    }

    pub fn remove(&mut self, conversation_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|c| c.id != conversation_id);
        if self.open_conversation.as_deref() == Some(conversation_id) {
            self.open_conversation = None;
        }
        self.items.len() != before
    }
}
