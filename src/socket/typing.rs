// Typing indicators: outbound start/stop notifications and a small tracker
// for who is currently typing where.

use crate::socket::dispatcher::ChatEvent;
use crate::socket::wire::ClientEvent;
use crate::socket::ChatSocket;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::timeout;

const TYPING_SEND_TIMEOUT: Duration = Duration::from_millis(500);

impl ChatSocket {
    /// Notify the room that the local user started or stopped typing.
    /// Fire-and-forget with a very short timeout: a lost typing indicator
    /// is harmless and must never block input handling.
    pub fn send_typing(&self, conversation_id: &str, active: bool) {
        let socket = self.clone();
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            let event = if active {
                ClientEvent::TypingStart {
                    conversation_id: conversation_id.clone(),
                }
            } else {
                ClientEvent::TypingStop {
                    conversation_id: conversation_id.clone(),
                }
            };
            match timeout(TYPING_SEND_TIMEOUT, socket.send_event(event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Typing notification not sent: {}", e),
                Err(_) => debug!("Timed out sending typing notification"),
            }
        });
    }
}

/// Which users are typing in which conversation right now. Fed from the
/// dispatcher's typing events.
#[derive(Debug, Default)]
pub struct TypingTracker {
    typing: HashMap<String, HashSet<String>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        TypingTracker::default()
    }

    pub fn apply(&mut self, event: &ChatEvent) {
        match event {
            ChatEvent::TypingStart {
                user_id,
                conversation_id,
            } => {
                self.typing
                    .entry(conversation_id.clone())
                    .or_default()
                    .insert(user_id.clone());
            }
            ChatEvent::TypingStop {
                user_id,
                conversation_id,
            } => {
                if let Some(users) = self.typing.get_mut(conversation_id) {
                    users.remove(user_id);
                    if users.is_empty() {
                        self.typing.remove(conversation_id);
                    }
                }
            }
            _ => {}
        }
    }

    pub fn is_typing(&self, conversation_id: &str, user_id: &str) -> bool {
        self.typing
            .get(conversation_id)
            .map(|users| users.contains(user_id))
            .unwrap_or(false)
    }

    pub fn typists(&self, conversation_id: &str) -> Vec<String> {
        self.typing
            .get(conversation_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }
}
