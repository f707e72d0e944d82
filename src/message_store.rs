// Ordered message log for the open conversation: optimistic insertion,
// id-based de-duplication, reconciliation against server echoes, and
// backward pagination. Exactly one conversation's log lives here at a
// time; switching conversations replaces it wholesale.

use crate::api::ApiClient;
use crate::error::Result;
use crate::models::{Message, MessagePage, UserRef};
use crate::offers::{OfferBoard, OfferStatus};
use log::debug;
use std::collections::HashSet;

#[derive(Default)]
pub struct MessageStore {
    conversation_id: Option<String>,
    messages: Vec<Message>,
    /// Final ids already present; the same message can arrive both via
    /// direct delivery and via room broadcast, so membership checks are
    /// mandatory.
    ids: HashSet<String>,
    current_page: u32,
    total_pages: u32,
    offers: OfferBoard,
}

impl MessageStore {
    pub fn new() -> Self {
        MessageStore::default()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Derived offer status for the offer proposed in `message_id`.
    pub fn offer_status(&self, message_id: &str) -> OfferStatus {
        self.offers.status(message_id)
    }

    pub fn offers_mut(&mut self) -> &mut OfferBoard {
        &mut self.offers
    }

    /// More history available beyond what has been paged in?
    pub fn has_older_pages(&self) -> bool {
        self.current_page < self.total_pages
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Fetch one page of history (page 1 = most recent) and fold it in:
    /// replaces the log when switching conversations, prepends when paging
    /// backward within the same one.
    pub async fn load_page(
        &mut self,
        api: &ApiClient,
        conversation_id: &str,
        page: u32,
    ) -> Result<()> {
        let fetched = api.fetch_messages(conversation_id, page).await?;
        self.apply_page(conversation_id, fetched);
        Ok(())
    }

    /// Pure half of [`MessageStore::load_page`].
    pub fn apply_page(&mut self, conversation_id: &str, page: MessagePage) {
        let switching = self.conversation_id.as_deref() != Some(conversation_id);
        if switching {
            self.reset_to(conversation_id);
        }

        let MessagePage {
            messages,
            pagination,
        } = page;

        let mut fresh: Vec<Message> = Vec::with_capacity(messages.len());
        for message in messages {
            if self.ids.contains(&message.id) {
                continue;
            }
            self.ids.insert(message.id.clone());
            self.offers.note_message(&message);
            fresh.push(message);
        }

        if self.messages.is_empty() {
            self.messages = fresh;
        } else {
            // Older page goes in front of what is already loaded.
            fresh.extend(self.messages.drain(..));
            self.messages = fresh;
        }

        self.current_page = pagination.page;
        self.total_pages = pagination.pages;
    }

    /// Append a locally-synthesized entry for a just-sent message and
    /// return it. The caller issues the network send and later either
    /// [`MessageStore::reconcile`]s or [`MessageStore::rollback`]s the
    /// temporary id.
    pub fn send_optimistic(
        &mut self,
        conversation_id: &str,
        sender: &UserRef,
        content: &str,
    ) -> Message {
        if self.conversation_id.as_deref() != Some(conversation_id) {
            self.reset_to(conversation_id);
        }
        let message = Message::optimistic(conversation_id, sender, content);
        self.messages.push(message.clone());
        message
    }

    /// Swap the optimistic entry for the server-confirmed message, in
    /// place, preserving list order. If the confirmed message already
    /// arrived through the socket, the temporary entry is simply dropped.
    pub fn reconcile(&mut self, temp_id: &str, server_message: Message) -> bool {
        if self.ids.contains(&server_message.id) {
            debug!(
                "Server message {} already ingested; dropping optimistic {}",
                server_message.id, temp_id
            );
            return self.rollback(temp_id);
        }

        match self.messages.iter().position(|m| m.id == temp_id) {
            Some(index) => {
                self.ids.insert(server_message.id.clone());
                self.offers.note_message(&server_message);
                self.messages[index] = server_message;
                true
            }
            None => {
                debug!("No optimistic entry {} to reconcile", temp_id);
                false
            }
        }
    }

    /// Remove a failed optimistic entry so the caller can surface a retry
    /// affordance.
    pub fn rollback(&mut self, temp_id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != temp_id);
        self.messages.len() != before
    }

    /// Fold in a message delivered over the socket. Idempotent per id:
    /// a duplicate delivery is a no-op. Returns true when the log grew.
    pub fn ingest(&mut self, message: Message) -> bool {
        if let Some(open) = self.conversation_id.as_deref() {
            if open != message.conversation_id {
                debug!(
                    "Ignoring message {} for conversation {} (open: {})",
                    message.id, message.conversation_id, open
                );
                return false;
            }
        } else {
            self.conversation_id = Some(message.conversation_id.clone());
        }

        if self.ids.contains(&message.id) {
            debug!("Duplicate delivery of message {}, ignoring", message.id);
            return false;
        }

        self.ids.insert(message.id.clone());
        self.offers.note_message(&message);
        self.messages.push(message);
        true
    }

    /// Drop a deleted message from the log.
    pub fn remove(&mut self, message_id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != message_id);
        self.ids.remove(message_id);
        self.messages.len() != before
    }

    /// `reader_id` has read the conversation: flip the read flag on every
    /// message they did not send. Idempotent.
    pub fn apply_read_receipt(&mut self, reader_id: &str) {
        for message in &mut self.messages {
            if message.sender.id != reader_id {
                message.read = true;
            }
        }
    }

    fn reset_to(&mut self, conversation_id: &str) {
        self.conversation_id = Some(conversation_id.to_string());
        self.messages.clear();
        self.ids.clear();
        self.offers.clear();
        self.current_page = 0;
        self.total_pages = 0;
    }
}
