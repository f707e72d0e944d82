// Conversation room membership. The server forgets room membership on every
// transport drop, so the client keeps the authoritative pending set and
// replays it after each successful (re)connection.

use crate::error::Result;
use crate::socket::wire::ClientEvent;
use crate::socket::ChatSocket;
use log::{debug, info, warn};
use std::collections::BTreeSet;

/// Client-side view of which conversation rooms we should be in.
#[derive(Debug, Default)]
pub struct RoomMembership {
    /// Rooms we want to be in; survives disconnects.
    pending: BTreeSet<String>,
    /// Rooms the server has acknowledged on the current transport.
    /// Diagnostic only.
    joined: BTreeSet<String>,
}

impl RoomMembership {
    pub fn new() -> Self {
        RoomMembership::default()
    }

    /// Merge ids into the pending set. Returns true when the set changed.
    pub fn request(&mut self, ids: &[String]) -> bool {
        let mut changed = false;
        for id in ids {
            changed |= self.pending.insert(id.clone());
        }
        changed
    }

    pub fn pending(&self) -> Vec<String> {
        self.pending.iter().cloned().collect()
    }

    pub fn confirm(&mut self, rooms: Vec<String>) {
        for room in rooms {
            self.joined.insert(room);
        }
    }

    pub fn joined(&self) -> Vec<String> {
        self.joined.iter().cloned().collect()
    }

    /// A new transport starts with nothing acknowledged.
    pub fn reset_joined(&mut self) {
        self.joined.clear();
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.joined.clear();
    }
}

impl ChatSocket {
    /// Ask to be in the given conversation rooms. Idempotent union into the
    /// pending set; if connected the full set is (re)submitted immediately,
    /// otherwise the merge alone suffices and a reconnect is kicked off —
    /// the replay-on-connect path submits it.
    pub async fn join_conversations(&self, conversation_ids: &[String]) -> Result<()> {
        {
            let mut rooms = self.inner.rooms.lock().unwrap();
            rooms.request(conversation_ids);
        }

        if self.is_connected() {
            self.replay_room_joins().await
        } else {
            debug!("Not connected; room join deferred until reconnect");
            self.reconnect_in_background();
            Ok(())
        }
    }

    /// Submit the full pending set as one join request. Called directly and
    /// from every successful (re)connection.
    pub(crate) async fn replay_room_joins(&self) -> Result<()> {
        let pending = {
            let rooms = self.inner.rooms.lock().unwrap();
            rooms.pending()
        };
        if pending.is_empty() {
            return Ok(());
        }

        info!("Joining {} conversation room(s)", pending.len());
        self.send_event(ClientEvent::JoinConversations {
            conversation_ids: pending,
        })
        .await
    }

    pub(crate) fn confirm_rooms(&self, rooms: Vec<String>) {
        debug!("Server acknowledged rooms: {:?}", rooms);
        self.inner.rooms.lock().unwrap().confirm(rooms);
    }

    pub(crate) fn note_room_join_error(&self, room: Option<String>, message: Option<String>) {
        // Join failures are logged but never block other operations.
        warn!(
            "Failed to join room {}: {}",
            room.unwrap_or_else(|| "<unknown>".to_string()),
            message.unwrap_or_else(|| "no detail".to_string())
        );
    }
}
