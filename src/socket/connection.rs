// Connection lifecycle for ChatSocket: handshake, keepalive, reconnection
// with exponential backoff, and the recovery hooks the embedding app calls
// on visibility/network transitions.

use crate::error::{ChatError, Result};
use crate::socket::dispatcher::ChatEvent;
use crate::socket::wire::ClientEvent;
use crate::socket::ChatSocket;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::connect_async;

/// Handshake must complete within this window or the attempt is torn down.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Keepalive ping cadence on a live connection.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// First retry delay; doubles per attempt up to the cap.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Automatic retries stop after this many consecutive failures; recovery
/// then needs a manual trigger (user action, visibility, network-online).
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// How long an outbound action will wait for a reconnection before it is
/// rejected back to the caller.
pub const ACTION_WAIT: Duration = Duration::from_secs(5);

/// Connection state, observable via [`ChatSocket::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

/// Backoff schedule for reconnect attempt `attempt` (1-based), before
/// jitter: base doubling per attempt, capped.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let exp = attempt.max(1).min(16) - 1;
    RECONNECT_BASE_DELAY
        .saturating_mul(1u32 << exp)
        .min(RECONNECT_MAX_DELAY)
}

impl ChatSocket {
    pub fn state(&self) -> ClientState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    pub(crate) fn set_state(&self, state: ClientState) {
        self.inner.state_tx.send_replace(state);
    }

    pub(crate) fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Time since the server last answered a keepalive ping, if it ever
    /// has on this transport.
    pub fn last_pong_age(&self) -> Option<Duration> {
        self.inner
            .last_pong
            .lock()
            .unwrap()
            .as_ref()
            .map(|at| at.elapsed())
    }

    /// Open the socket with `token` as the handshake credential. A no-op
    /// when already connected or when an attempt is in flight, so stray
    /// double-calls never produce a second transport.
    pub async fn connect(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Err(ChatError::SessionExpired);
        }
        if self.is_connected() {
            debug!("connect() ignored: already connected");
            return Ok(());
        }
        if self
            .inner
            .connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("connect() ignored: attempt already in progress");
            return Ok(());
        }

        *self.inner.token.lock().unwrap() = Some(token.to_string());
        self.inner.explicit_disconnect.store(false, Ordering::SeqCst);

        let result = self.establish().await;
        self.inner.connecting.store(false, Ordering::SeqCst);

        if let Err(e) = &result {
            warn!("Connection attempt failed: {}", e);
            self.schedule_reconnect();
        }
        result
    }

    /// Unconditionally tear down whatever transport exists and open a new
    /// one, bypassing the in-progress guard. The recovery path for a
    /// wedged transport, and the manual retry that resets the attempt
    /// counter after automatic retries gave up.
    pub async fn force_reconnect(&self) -> Result<()> {
        info!("Forcing a fresh socket connection");
        self.inner.explicit_disconnect.store(false, Ordering::SeqCst);
        self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
        self.teardown_transport().await;

        self.inner.connecting.store(true, Ordering::SeqCst);
        let result = self.establish().await;
        self.inner.connecting.store(false, Ordering::SeqCst);

        if let Err(e) = &result {
            warn!("Forced reconnect failed: {}", e);
            self.schedule_reconnect();
        }
        result
    }

    /// Cancel all timers, close the transport and clear all registered
    /// callbacks and room state. Idempotent; used on logout/teardown.
    pub async fn disconnect(&self) {
        info!("Disconnecting from chat server");
        self.inner.explicit_disconnect.store(true, Ordering::SeqCst);
        self.teardown_transport().await;
        self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
        self.inner.connecting.store(false, Ordering::SeqCst);
        self.inner.rooms.lock().unwrap().clear();
        self.inner.dispatcher.clear();
        *self.inner.last_pong.lock().unwrap() = None;
        self.set_state(ClientState::Disconnected);
    }

    /// The page/app became visible again: validate liveness with a ping if
    /// the connection looks healthy, otherwise rebuild it.
    pub async fn notify_visible(&self) {
        if self.is_connected() {
            debug!("Visibility check: connected, sending liveness ping");
            let ping = ClientEvent::Ping {
                timestamp: chrono::Utc::now().timestamp_millis(),
                client_id: self.inner.client_id.clone(),
            };
            if let Err(e) = self.send_event(ping).await {
                warn!("Liveness ping failed, reconnecting: {}", e);
                let _ = self.force_reconnect().await;
            }
        } else if self.inner.token.lock().unwrap().is_some() {
            info!("Visibility check: not connected, reconnecting");
            let _ = self.force_reconnect().await;
        }
    }

    /// The network came back: reconnect regardless of what the current
    /// state claims.
    pub async fn notify_online(&self) {
        if self.inner.token.lock().unwrap().is_some() {
            info!("Network online, reconnecting socket");
            let _ = self.force_reconnect().await;
        }
    }

    /// Bounded wait used by outbound actions taken while disconnected: a
    /// reconnect is kicked off and the action proceeds once the connection
    /// is up, or fails with a timeout the caller surfaces as retryable.
    pub async fn ensure_connected(&self, wait: Duration) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        if self.inner.token.lock().unwrap().is_none() {
            return Err(ChatError::SessionExpired);
        }

        self.reconnect_in_background();

        let mut state_rx = self.inner.state_tx.subscribe();
        let wait_for_connected = async {
            loop {
                if *state_rx.borrow_and_update() == ClientState::Connected {
                    return Ok(());
                }
                if state_rx.changed().await.is_err() {
                    return Err(ChatError::NotConnected);
                }
            }
        };

        match timeout(wait, wait_for_connected).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::Timeout(format!(
                "no connection within {:?}",
                wait
            ))),
        }
    }

    /// Fire off a connect with the stored token unless one is already
    /// running.
    pub(crate) fn reconnect_in_background(&self) {
        if self.is_connected() || self.inner.connecting.load(Ordering::SeqCst) {
            return;
        }
        let Some(token) = self.inner.token.lock().unwrap().clone() else {
            warn!("No stored token; cannot reconnect");
            return;
        };
        let socket = self.clone();
        tokio::spawn(async move {
            let _ = socket.connect(&token).await;
        });
    }

    /// One full connection attempt: handshake (bounded), transport
    /// installation, room replay, then reader + keepalive tasks.
    async fn establish(&self) -> Result<()> {
        let url = self.handshake_url()?;
        // At most one live transport: anything older goes first.
        self.teardown_transport().await;
        self.set_state(ClientState::Connecting);

        debug!("Opening socket to {}", self.inner.api_origin);
        let (stream, _response) = match timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await
        {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                self.set_state(ClientState::Disconnected);
                return Err(ChatError::Connection(format!("handshake failed: {}", e)));
            }
            Err(_) => {
                // Half-open attempt; make sure nothing lingers before the
                // retry path takes over.
                self.teardown_transport().await;
                self.set_state(ClientState::Disconnected);
                return Err(ChatError::Timeout(format!(
                    "handshake did not complete within {:?}",
                    CONNECT_TIMEOUT
                )));
            }
        };

        let (sink, source) = stream.split();
        *self.inner.writer.lock().await = Some(sink);
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.rooms.lock().unwrap().reset_joined();

        // Room membership does not survive a transport drop server-side.
        // Rejoin before the read loop starts so no inbound event on this
        // transport can precede membership.
        if let Err(e) = self.replay_room_joins().await {
            warn!("Room replay after connect failed: {}", e);
        }

        self.spawn_reader(source, generation);
        self.spawn_keepalive();

        let was_retry = self.inner.reconnect_attempts.swap(0, Ordering::SeqCst) > 0;
        self.set_state(ClientState::Connected);
        info!("Connected to chat server at {}", self.inner.api_origin);
        self.inner.dispatcher.emit(&ChatEvent::Connected);
        if was_retry {
            self.inner.dispatcher.emit(&ChatEvent::Reconnected);
        }
        Ok(())
    }

    /// The read loop saw the transport die underneath us. Not called for
    /// explicit client-initiated disconnects.
    pub(crate) async fn handle_transport_drop(&self, reason: String) {
        if self.inner.explicit_disconnect.load(Ordering::SeqCst) {
            debug!("Transport closed after explicit disconnect");
            return;
        }
        warn!("Socket dropped: {}", reason);

        if let Some(handle) = self.inner.tasks.lock().unwrap().keepalive.take() {
            handle.abort();
        }
        *self.inner.writer.lock().await = None;
        self.set_state(ClientState::Disconnected);
        self.inner
            .dispatcher
            .emit(&ChatEvent::Disconnected { reason });

        self.schedule_reconnect();
    }

    /// Arm the next automatic retry, or give up once past the ceiling.
    pub(crate) fn schedule_reconnect(&self) {
        if self.inner.explicit_disconnect.load(Ordering::SeqCst) {
            return;
        }

        let attempt = self.inner.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > MAX_RECONNECT_ATTEMPTS {
            warn!(
                "Giving up after {} reconnect attempts; manual recovery required",
                MAX_RECONNECT_ATTEMPTS
            );
            self.inner.dispatcher.emit(&ChatEvent::ReconnectFailed);
            return;
        }

        let base = reconnect_delay(attempt);
        // Jitter to avoid thundering herd
        let jitter = Duration::from_millis(rand::random::<u64>() % (base.as_millis() as u64 / 4 + 1));
        let delay = base + jitter;
        info!(
            "Reconnect attempt {}/{} in {:?}",
            attempt, MAX_RECONNECT_ATTEMPTS, delay
        );

        let socket = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if socket.is_connected() || socket.inner.explicit_disconnect.load(Ordering::SeqCst) {
                return;
            }
            // This task is done timing; drop its own handle so the
            // transport teardown inside connect() cannot abort it mid-dial.
            socket.inner.tasks.lock().unwrap().reconnect = None;
            let token = socket.inner.token.lock().unwrap().clone();
            match token {
                Some(token) => {
                    if let Err(e) = socket.connect(&token).await {
                        warn!("Reconnect attempt failed: {}", e);
                    }
                }
                None => warn!("No stored token; abandoning reconnect"),
            }
        });
        self.inner.tasks.lock().unwrap().reconnect = Some(handle);
    }

    fn spawn_keepalive(&self) {
        let socket = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(KEEPALIVE_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; the handshake already
            // proved liveness, so skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let ping = ClientEvent::Ping {
                    timestamp: chrono::Utc::now().timestamp_millis(),
                    client_id: socket.inner.client_id.clone(),
                };
                if let Err(e) = socket.send_event(ping).await {
                    debug!("Keepalive ping failed, stopping: {}", e);
                    break;
                }
            }
        });
        self.inner.tasks.lock().unwrap().keepalive = Some(handle);
    }

    /// Abort every background task and close the transport. Bumps the
    /// generation so a stale read loop cannot mistake itself for current.
    pub(crate) async fn teardown_transport(&self) {
        let (reader, keepalive, reconnect) = {
            let mut tasks = self.inner.tasks.lock().unwrap();
            (
                tasks.reader.take(),
                tasks.keepalive.take(),
                tasks.reconnect.take(),
            )
        };
        for handle in [reader, keepalive, reconnect].into_iter().flatten() {
            handle.abort();
        }

        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        let mut writer = self.inner.writer.lock().await;
        if let Some(mut sink) = writer.take() {
            let _ = sink.close().await;
        }
    }
}
