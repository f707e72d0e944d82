// Socket client for the marketplace messaging server.
// One ChatSocket is constructed per authenticated session and injected into
// whatever needs it; it owns the transport, the room set and the event
// dispatcher, and survives transport replacement across reconnects.

use crate::api::socket_url;
use crate::error::{ChatError, Result};
use crate::socket::dispatcher::{ChatEvent, EventDispatcher};
use crate::socket::rooms::RoomMembership;
use crate::socket::wire::{ClientEvent, ServerEvent};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

pub mod connection;
pub mod dispatcher;
pub mod read_receipts;
pub mod rooms;
pub mod typing;
pub mod wire;

pub use connection::ClientState;
pub use dispatcher::{EventKind, Subscription};
pub use typing::TypingTracker;

pub(crate) type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
pub(crate) type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[derive(Default)]
pub(crate) struct SocketTasks {
    pub(crate) reader: Option<JoinHandle<()>>,
    pub(crate) keepalive: Option<JoinHandle<()>>,
    pub(crate) reconnect: Option<JoinHandle<()>>,
}

pub(crate) struct SocketShared {
    pub(crate) api_origin: String,
    pub(crate) client_id: String,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) token: StdMutex<Option<String>>,
    pub(crate) state_tx: watch::Sender<ClientState>,
    pub(crate) writer: TokioMutex<Option<WsSink>>,
    pub(crate) rooms: StdMutex<RoomMembership>,
    pub(crate) reconnect_attempts: AtomicU32,
    pub(crate) connecting: AtomicBool,
    pub(crate) explicit_disconnect: AtomicBool,
    /// Bumped on every new transport so stale read loops can tell they have
    /// been replaced.
    pub(crate) generation: AtomicU64,
    pub(crate) last_pong: StdMutex<Option<Instant>>,
    pub(crate) tasks: StdMutex<SocketTasks>,
}

/// Handle to the persistent chat connection. Cheap to clone; all clones
/// share one transport.
#[derive(Clone)]
pub struct ChatSocket {
    pub(crate) inner: Arc<SocketShared>,
}

impl ChatSocket {
    /// `api_origin` is the configured REST origin (e.g.
    /// `https://market.example.com/api`); the socket endpoint is derived
    /// from it.
    pub fn new(api_origin: &str) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "client".to_string());
        let client_id = format!("{}-{}", host, &Uuid::new_v4().to_string()[..8]);

        let (state_tx, _state_rx) = watch::channel(ClientState::Disconnected);

        ChatSocket {
            inner: Arc::new(SocketShared {
                api_origin: api_origin.to_string(),
                client_id,
                dispatcher: EventDispatcher::new(),
                token: StdMutex::new(None),
                state_tx,
                writer: TokioMutex::new(None),
                rooms: StdMutex::new(RoomMembership::new()),
                reconnect_attempts: AtomicU32::new(0),
                connecting: AtomicBool::new(false),
                explicit_disconnect: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                last_pong: StdMutex::new(None),
                tasks: StdMutex::new(SocketTasks::default()),
            }),
        }
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    pub(crate) fn handshake_url(&self) -> Result<String> {
        let token = self
            .inner
            .token
            .lock()
            .unwrap()
            .clone()
            .ok_or(ChatError::SessionExpired)?;
        Ok(socket_url(&self.inner.api_origin, &token))
    }

    /// Serialize and push one event down the current transport.
    pub(crate) async fn send_event(&self, event: ClientEvent) -> Result<()> {
        let raw = event.encode()?;
        let mut writer = self.inner.writer.lock().await;
        match writer.as_mut() {
            Some(sink) => sink
                .send(WsMessage::Text(raw.into()))
                .await
                .map_err(|e| ChatError::Connection(format!("send failed: {}", e))),
            None => Err(ChatError::NotConnected),
        }
    }

    /// Emit a chat message into its conversation room. Callers should have
    /// already inserted the optimistic entry; if the transport is down this
    /// waits (bounded) for the reconnect before giving up.
    pub async fn send_message(&self, conversation_id: &str, content: &str) -> Result<()> {
        self.ensure_connected(connection::ACTION_WAIT).await?;
        self.send_event(ClientEvent::SendMessage {
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
        })
        .await
    }

    /// Read loop for one transport instance. Exits when the stream ends or
    /// errors; only the loop belonging to the current generation may
    /// trigger disconnect handling.
    pub(crate) fn spawn_reader(&self, mut source: WsSource, generation: u64) {
        let socket = self.clone();
        let handle = tokio::spawn(async move {
            let reason = loop {
                match source.next().await {
                    Some(Ok(WsMessage::Text(raw))) => match ServerEvent::decode(raw.as_str()) {
                        Ok(event) => socket.handle_server_event(event),
                        Err(e) => warn!("Skipping undecodable frame: {}", e),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        break match frame {
                            Some(f) => format!("server closed connection: {}", f.reason),
                            None => "server closed connection".to_string(),
                        };
                    }
                    Some(Ok(_)) => {
                        // Binary and control frames carry nothing for us.
                    }
                    Some(Err(e)) => break format!("transport error: {}", e),
                    None => break "transport stream ended".to_string(),
                }
            };

            if socket.current_generation() == generation {
                socket.handle_transport_drop(reason).await;
            } else {
                debug!("Stale read loop (generation {}) exiting quietly", generation);
            }
        });
        self.inner.tasks.lock().unwrap().reader = Some(handle);
    }

    /// Route one inbound event: connection bookkeeping is handled here,
    /// everything chat-shaped fans out through the dispatcher.
    pub(crate) fn handle_server_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::ConnectionConfirmed { user_id } => {
                debug!("Server confirmed connection (user {:?})", user_id);
            }
            ServerEvent::RoomsJoined { rooms } => self.confirm_rooms(rooms),
            ServerEvent::RoomJoinError { room, message } => {
                self.note_room_join_error(room, message)
            }
            ServerEvent::Pong { timestamp } => {
                debug!("Pong received (server time {:?})", timestamp);
                *self.inner.last_pong.lock().unwrap() = Some(Instant::now());
            }
            ServerEvent::Error { message } => {
                warn!("Server reported error: {}", message);
            }
            ServerEvent::NewMessage(message) => {
                info!(
                    "New message {} in conversation {}",
                    message.id, message.conversation_id
                );
                self.inner.dispatcher.emit(&ChatEvent::NewMessage(message));
            }
            ServerEvent::TypingStart {
                user_id,
                conversation_id,
            } => self.inner.dispatcher.emit(&ChatEvent::TypingStart {
                user_id,
                conversation_id,
            }),
            ServerEvent::TypingStop {
                user_id,
                conversation_id,
            } => self.inner.dispatcher.emit(&ChatEvent::TypingStop {
                user_id,
                conversation_id,
            }),
            ServerEvent::MessagesRead {
                conversation_id,
                user_id,
            } => self.inner.dispatcher.emit(&ChatEvent::MessagesRead {
                conversation_id,
                user_id,
            }),
            ServerEvent::ConversationUpdate(conversation) => self
                .inner
                .dispatcher
                .emit(&ChatEvent::ConversationUpdate(conversation)),
            ServerEvent::ConversationDelete { conversation_id } => self
                .inner
                .dispatcher
                .emit(&ChatEvent::ConversationDelete { conversation_id }),
            ServerEvent::ConversationArchive {
                conversation_id,
                archived,
            } => self.inner.dispatcher.emit(&ChatEvent::ConversationArchive {
                conversation_id,
                archived,
            }),
            ServerEvent::MessageDelete {
                conversation_id,
                message_id,
            } => self.inner.dispatcher.emit(&ChatEvent::MessageDelete {
                conversation_id,
                message_id,
            }),
        }
    }
}
