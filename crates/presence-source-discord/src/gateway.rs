//! Gateway connection
//!
//! One background task owns the websocket. It answers member requests
//! from [`GatewayHandle`], keeps the session alive with heartbeats and
//! broadcasts every presence update for the configured guild.
//!
//! ```text
//! connect ─▶ Hello ─▶ Identify ─▶ READY ─▶ run loop ─┬─▶ shutdown
//!               ▲                                    │
//!               └──────── reconnect after delay ◀────┘
//! ```

use futures::{SinkExt, StreamExt};
use presence_core::{Error, MemberPresence, PresenceChange, Result, TrackedStatus};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use crate::protocol::{
    GatewayPayload, GuildCreate, GuildMembersChunk, Hello, OpCode, PresenceUpdate, Ready,
    close_error,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Pending member request waiting for its chunk
type PendingReply = oneshot::Sender<Result<MemberPresence>>;

/// Connection parameters for the gateway task
#[derive(Clone)]
pub struct GatewaySettings {
    pub url: String,
    pub token: String,
    pub intents: u64,
    pub guild_id: String,
    pub handshake_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl std::fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .field("guild_id", &self.guild_id)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .finish()
    }
}

enum Command {
    FetchMember {
        user_id: String,
        reply: PendingReply,
    },
}

/// Which identify a handshake performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// The login at startup; any refusal is fatal
    Login,
    /// Identify after a lost connection
    Reidentify,
}

/// Why a session ended
enum SessionEnd {
    /// The handle was dropped
    Shutdown,
    /// Transport or protocol trouble; identify again
    Reconnect(String),
    /// The gateway will keep refusing us
    Fatal(Error),
}

/// An identified websocket session
struct Session {
    ws: WsStream,
    heartbeat_interval: Duration,
    sequence: Option<u64>,
}

/// Client side of the gateway task
///
/// Only the worker owns the broadcast sender, so subscriptions end when the
/// worker stops.
pub struct GatewayHandle {
    commands: mpsc::Sender<Command>,
    updates: broadcast::Receiver<PresenceChange>,
    /// Set once if the worker stopped on a fatal error
    fatal: Arc<OnceLock<Error>>,
}

impl GatewayHandle {
    /// Connect and identify, then hand the session to a background task
    ///
    /// A rejected login is returned as a fatal error instead of retried.
    pub async fn connect(settings: GatewaySettings) -> Result<Self> {
        let session = open_session(&settings, Attempt::Login).await?;

        let (commands, command_rx) = mpsc::channel(32);
        let (updates_tx, updates) = broadcast::channel(256);
        let fatal = Arc::new(OnceLock::new());

        let worker = GatewayWorker {
            settings,
            commands: command_rx,
            updates: updates_tx,
            fatal: Arc::clone(&fatal),
            presences: HashMap::new(),
            next_nonce: 0,
        };
        tokio::spawn(worker.run(session));

        Ok(Self {
            commands,
            updates,
            fatal,
        })
    }

    /// Ask the gateway for one member and its current presence
    pub async fn fetch_member(&self, user_id: &str) -> Result<MemberPresence> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::FetchMember {
                user_id: user_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| self.stopped_error("gateway task has stopped"))?;

        rx.await
            .map_err(|_| self.stopped_error("connection lost before the member arrived"))?
    }

    /// Receiver for presence updates in the configured guild
    ///
    /// Ends once the gateway task has stopped.
    pub fn updates(&self) -> broadcast::Receiver<PresenceChange> {
        self.updates.resubscribe()
    }

    /// The worker's fatal error if it stopped on one, else `fallback`
    fn stopped_error(&self, fallback: &str) -> Error {
        match self.fatal.get() {
            Some(Error::Authentication(reason)) => Error::auth(reason.clone()),
            Some(Error::Config(reason)) => Error::config(reason.clone()),
            Some(other) => Error::gateway(other.to_string()),
            None => Error::gateway(fallback),
        }
    }
}

/// Connect, read Hello, identify and wait for READY
async fn open_session(settings: &GatewaySettings, attempt: Attempt) -> Result<Session> {
    let timeout = settings.handshake_timeout;
    match tokio::time::timeout(timeout, handshake(settings, attempt)).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(timeout.as_millis() as u64, "gateway handshake")),
    }
}

async fn handshake(settings: &GatewaySettings, attempt: Attempt) -> Result<Session> {
    let (mut ws, _) = connect_async(settings.url.as_str())
        .await
        .map_err(|e| Error::gateway(format!("connect failed: {e}")))?;

    let hello = next_payload(&mut ws).await?;
    if hello.op != OpCode::Hello {
        return Err(Error::gateway(format!(
            "expected Hello, got op {}",
            hello.op.as_u8()
        )));
    }
    let hello: Hello = hello.data()?;

    send(&mut ws, &GatewayPayload::identify(&settings.token, settings.intents)).await?;

    let mut sequence = None;
    loop {
        let payload = next_payload(&mut ws).await?;
        if payload.s.is_some() {
            sequence = payload.s;
        }

        match payload.op {
            OpCode::Dispatch if payload.is_dispatch("READY") => {
                let ready: Ready = payload.data()?;
                let name = ready.user.username.as_deref().unwrap_or(&ready.user.id);
                info!("Logged in as {} (session {})", name, ready.session_id);
                break;
            }
            // On re-identify this is usually identify rate limiting
            OpCode::InvalidSession if attempt == Attempt::Reidentify => {
                return Err(Error::gateway("session invalidated while identifying again"));
            }
            OpCode::InvalidSession => {
                return Err(Error::auth("gateway invalidated the session during login"));
            }
            _ => debug!("Ignoring op {} during login", payload.op.as_u8()),
        }
    }

    Ok(Session {
        ws,
        heartbeat_interval: Duration::from_millis(hello.heartbeat_interval.max(1)),
        sequence,
    })
}

/// Next gateway frame, skipping pings and binary frames
async fn next_payload(ws: &mut WsStream) -> Result<GatewayPayload> {
    while let Some(message) = ws.next().await {
        match message.map_err(|e| Error::gateway(e.to_string()))? {
            Message::Text(text) => return GatewayPayload::from_json(&text),
            Message::Close(frame) => {
                let (code, reason) = frame
                    .map(|f| (u16::from(f.code), f.reason.to_string()))
                    .unwrap_or((1000, String::new()));
                return Err(close_error(code, &reason).unwrap_or_else(|| {
                    Error::gateway(format!("closed during login with {code} ({reason})"))
                }));
            }
            _ => continue,
        }
    }
    Err(Error::gateway("connection closed during login"))
}

async fn send(ws: &mut WsStream, payload: &GatewayPayload) -> Result<()> {
    ws.send(Message::Text(payload.to_json()?))
        .await
        .map_err(|e| Error::gateway(e.to_string()))
}

/// Delay before the first heartbeat: `interval * jitter`, jitter in [0, 1)
fn first_heartbeat(interval: Duration) -> Duration {
    interval.mul_f64(rand::random::<f64>())
}

struct GatewayWorker {
    settings: GatewaySettings,
    commands: mpsc::Receiver<Command>,
    updates: broadcast::Sender<PresenceChange>,
    fatal: Arc<OnceLock<Error>>,
    /// Last status seen per user, used to fill `previous`
    presences: HashMap<String, TrackedStatus>,
    next_nonce: u64,
}

impl GatewayWorker {
    async fn run(mut self, mut session: Session) {
        loop {
            match self.drive(session).await {
                SessionEnd::Shutdown => {
                    debug!("Gateway handle dropped, closing connection");
                    return;
                }
                SessionEnd::Fatal(e) => {
                    self.stop(e);
                    return;
                }
                SessionEnd::Reconnect(reason) => {
                    warn!("Gateway connection lost: {}", reason);
                }
            }

            session = match self.reconnect().await {
                Some(session) => session,
                None => return,
            };
        }
    }

    /// Record a fatal error; dropping the worker afterwards closes every subscription
    fn stop(&self, e: Error) {
        error!("Gateway stopped: {}", e);
        let _ = self.fatal.set(e);
    }

    /// Identify again until it works, a fatal error occurs, or the handle is dropped
    async fn reconnect(&mut self) -> Option<Session> {
        loop {
            tokio::time::sleep(self.settings.reconnect_delay).await;
            if self.commands.is_closed() {
                return None;
            }

            match open_session(&self.settings, Attempt::Reidentify).await {
                Ok(session) => {
                    info!("Gateway reconnected");
                    return Some(session);
                }
                Err(e) if e.is_fatal() => {
                    self.stop(e);
                    return None;
                }
                Err(e) => warn!("Gateway reconnect failed: {}", e),
            }
        }
    }

    async fn drive(&mut self, session: Session) -> SessionEnd {
        let Session {
            ws,
            heartbeat_interval,
            mut sequence,
        } = session;
        let (mut sink, mut stream) = ws.split();

        // Dropped with the session; requesters then see a lost connection
        let mut pending: HashMap<String, (String, PendingReply)> = HashMap::new();

        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + first_heartbeat(heartbeat_interval),
            heartbeat_interval,
        );
        let mut awaiting_ack = false;

        loop {
            let outbound = tokio::select! {
                _ = heartbeat.tick() => {
                    if awaiting_ack {
                        return SessionEnd::Reconnect("heartbeat was not acknowledged".into());
                    }
                    awaiting_ack = true;
                    pending.retain(|_, (_, reply)| !reply.is_closed());
                    Some(GatewayPayload::heartbeat(sequence))
                }

                command = self.commands.recv() => match command {
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                    Some(Command::FetchMember { user_id, reply }) => {
                        if reply.is_closed() {
                            None
                        } else {
                            self.next_nonce += 1;
                            let nonce = format!("m-{}", self.next_nonce);
                            let request = GatewayPayload::request_member(
                                &self.settings.guild_id,
                                &user_id,
                                &nonce,
                            );
                            pending.insert(nonce, (user_id, reply));
                            Some(request)
                        }
                    }
                },

                message = stream.next() => {
                    let text = match message {
                        None => return SessionEnd::Reconnect("connection closed".into()),
                        Some(Err(e)) => return SessionEnd::Reconnect(e.to_string()),
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.to_string()))
                                .unwrap_or((1000, String::new()));
                            return match close_error(code, &reason) {
                                Some(e) => SessionEnd::Fatal(e),
                                None => SessionEnd::Reconnect(format!("closed with {code} ({reason})")),
                            };
                        }
                        Some(Ok(_)) => continue,
                    };

                    let payload = match GatewayPayload::from_json(&text) {
                        Ok(payload) => payload,
                        Err(e) => {
                            debug!("Skipping unreadable gateway frame: {}", e);
                            continue;
                        }
                    };
                    if payload.s.is_some() {
                        sequence = payload.s;
                    }

                    match payload.op {
                        OpCode::HeartbeatAck => {
                            awaiting_ack = false;
                            None
                        }
                        OpCode::Heartbeat => Some(GatewayPayload::heartbeat(sequence)),
                        OpCode::Reconnect => {
                            return SessionEnd::Reconnect("server requested a reconnect".into());
                        }
                        OpCode::InvalidSession => {
                            return SessionEnd::Reconnect("session invalidated".into());
                        }
                        OpCode::Dispatch => {
                            self.dispatch(&payload, &mut pending);
                            None
                        }
                        _ => None,
                    }
                }
            };

            if let Some(payload) = outbound {
                let sent = match payload.to_json() {
                    Ok(json) => sink.send(Message::Text(json)).await,
                    Err(e) => {
                        warn!("Failed to encode gateway frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sent {
                    return SessionEnd::Reconnect(format!("send failed: {e}"));
                }
            }
        }
    }

    fn dispatch(
        &mut self,
        payload: &GatewayPayload,
        pending: &mut HashMap<String, (String, PendingReply)>,
    ) {
        match payload.t.as_deref() {
            Some("PRESENCE_UPDATE") => match payload.data::<PresenceUpdate>() {
                Ok(update) => self.presence_update(update),
                Err(e) => debug!("Malformed PRESENCE_UPDATE: {}", e),
            },
            Some("GUILD_MEMBERS_CHUNK") => match payload.data::<GuildMembersChunk>() {
                Ok(chunk) => {
                    for presence in &chunk.presences {
                        self.presences
                            .insert(presence.user.id.clone(), presence.tracked_status());
                    }
                    let waiting = chunk.nonce.as_ref().and_then(|n| pending.remove(n));
                    if let Some((user_id, reply)) = waiting {
                        let _ = reply.send(chunk.member_presence(&user_id));
                    }
                }
                Err(e) => debug!("Malformed GUILD_MEMBERS_CHUNK: {}", e),
            },
            Some("GUILD_CREATE") => match payload.data::<GuildCreate>() {
                Ok(guild) if guild.id == self.settings.guild_id => {
                    for presence in &guild.presences {
                        self.presences
                            .insert(presence.user.id.clone(), presence.tracked_status());
                    }
                    debug!("Guild {} available with {} presences", guild.id, guild.presences.len());
                }
                Ok(_) => {}
                Err(e) => debug!("Malformed GUILD_CREATE: {}", e),
            },
            _ => {}
        }
    }

    fn presence_update(&mut self, update: PresenceUpdate) {
        if update.guild_id.as_deref() != Some(self.settings.guild_id.as_str()) {
            return;
        }

        let current = update.tracked_status();
        let previous = self.presences.insert(update.user.id.clone(), current);
        let change = update.into_change(previous);

        // No subscribers is fine
        let _ = self.updates.send(change);
    }
}
