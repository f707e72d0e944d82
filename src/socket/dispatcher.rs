// De-duplicated callback registry for chat events. Consumers register
// against this stable object, not against the transport, so listener
// identity survives transport replacement across reconnects.

use crate::models::{Conversation, Message};
use log::error;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Event categories observers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewMessage,
    TypingStart,
    TypingStop,
    MessagesRead,
    ConversationUpdate,
    ConversationDelete,
    ConversationArchive,
    MessageDelete,
    Connected,
    Disconnected,
    Reconnected,
    ReconnectFailed,
}

/// A dispatched chat event, one variant per [`EventKind`].
#[derive(Debug, Clone)]
pub enum ChatEvent {
    NewMessage(Message),
    TypingStart {
        user_id: String,
        conversation_id: String,
    },
    TypingStop {
        user_id: String,
        conversation_id: String,
    },
    MessagesRead {
        conversation_id: String,
        user_id: String,
    },
    ConversationUpdate(Conversation),
    ConversationDelete {
        conversation_id: String,
    },
    ConversationArchive {
        conversation_id: String,
        archived: bool,
    },
    MessageDelete {
        conversation_id: String,
        message_id: String,
    },
    Connected,
    Disconnected {
        reason: String,
    },
    Reconnected,
    ReconnectFailed,
}

impl ChatEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChatEvent::NewMessage(_) => EventKind::NewMessage,
            ChatEvent::TypingStart { .. } => EventKind::TypingStart,
            ChatEvent::TypingStop { .. } => EventKind::TypingStop,
            ChatEvent::MessagesRead { .. } => EventKind::MessagesRead,
            ChatEvent::ConversationUpdate(_) => EventKind::ConversationUpdate,
            ChatEvent::ConversationDelete { .. } => EventKind::ConversationDelete,
            ChatEvent::ConversationArchive { .. } => EventKind::ConversationArchive,
            ChatEvent::MessageDelete { .. } => EventKind::MessageDelete,
            ChatEvent::Connected => EventKind::Connected,
            ChatEvent::Disconnected { .. } => EventKind::Disconnected,
            ChatEvent::Reconnected => EventKind::Reconnected,
            ChatEvent::ReconnectFailed => EventKind::ReconnectFailed,
        }
    }
}

type Callback = Arc<dyn Fn(&ChatEvent) + Send + Sync>;

struct Entry {
    id: u64,
    key: Option<String>,
    callback: Callback,
}

type Registry = HashMap<EventKind, Vec<Entry>>;

/// Registry of event callbacks with stable-key replacement semantics:
/// registering twice under the same key swaps the callback in place instead
/// of adding a duplicate, so a remounted consumer never gets double
/// delivery.
#[derive(Clone)]
pub struct EventDispatcher {
    registry: Arc<Mutex<Registry>>,
    next_id: Arc<AtomicU64>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        EventDispatcher {
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register `callback` for `kind`. With a key, an existing registration
    /// under the same key is replaced (keeping its position in delivery
    /// order). The returned [`Subscription`] removes exactly this callback.
    pub fn subscribe(
        &self,
        kind: EventKind,
        key: Option<&str>,
        callback: impl Fn(&ChatEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            id,
            key: key.map(|k| k.to_string()),
            callback: Arc::new(callback),
        };

        let subscription = Subscription {
            kind,
            id,
            registry: Arc::downgrade(&self.registry),
        };

        let mut registry = self.registry.lock().unwrap();
        let entries = registry.entry(kind).or_default();
        match key.and_then(|k| entries.iter_mut().find(|e| e.key.as_deref() == Some(k))) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }

        subscription
    }

    /// Synchronous fan-out in registration order. A panicking callback is
    /// logged and delivery continues with the next one.
    pub fn emit(&self, event: &ChatEvent) {
        let callbacks: Vec<Callback> = {
            let registry = self.registry.lock().unwrap();
            registry
                .get(&event.kind())
                .map(|entries| entries.iter().map(|e| e.callback.clone()).collect())
                .unwrap_or_default()
        };

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| (*callback)(event))).is_err() {
                error!("Event callback panicked while handling {:?}", event.kind());
            }
        }
    }

    /// Drop every registration. Called on explicit disconnect/teardown.
    pub fn clear(&self) {
        self.registry.lock().unwrap().clear();
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registry
            .lock()
            .unwrap()
            .get(&kind)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        EventDispatcher::new()
    }
}

/// Handle returned from [`EventDispatcher::subscribe`]. Deregistration is
/// explicit; dropping the handle leaves the callback registered.
pub struct Subscription {
    kind: EventKind,
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Some(entries) = registry.lock().unwrap().get_mut(&self.kind) {
                entries.retain(|e| e.id != self.id);
            }
        }
    }
}
