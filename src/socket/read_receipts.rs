// Read receipts: the outbound mark-read notification. The server answers
// with a messages-read event that flows back through the dispatcher for
// reconciliation in the conversation list and the open message log.

use crate::error::Result;
use crate::socket::connection::ACTION_WAIT;
use crate::socket::wire::ClientEvent;
use crate::socket::ChatSocket;
use log::debug;

impl ChatSocket {
    /// Tell the server the local user has read everything in the
    /// conversation. Waits (bounded) for a reconnect when the transport is
    /// down; the caller has already zeroed the unread count optimistically
    /// and reconciles on the echoed messages-read event.
    pub async fn mark_read(&self, conversation_id: &str) -> Result<()> {
        debug!("Marking conversation {} read", conversation_id);
        self.ensure_connected(ACTION_WAIT).await?;
        self.send_event(ClientEvent::MarkRead {
            conversation_id: conversation_id.to_string(),
        })
        .await
    }
}
