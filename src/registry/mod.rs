//! Shard supervision.
//!
//! The [`ShardRegistry`] owns every shard's transport and drives the
//! synchronous [`ShardConnection`] state machines: it dials, pumps bytes
//! both ways, fires heartbeats, and carries out the reconnects the state
//! machines schedule. A [`RegistryHandle`] is the thread-safe surface for
//! callers: queueing outbound messages, collecting media sessions, and
//! requesting shutdown.

mod connector;

use std::{collections::HashMap, sync::Arc, time::Instant};

use bytes::BytesMut;
use log::{info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::{mpsc, oneshot},
    time::{self, Duration},
};
use tokio_util::sync::CancellationToken;

pub use connector::{Connector, TcpConnector};

use crate::{
    config::GatewayConfig,
    envelope::Envelope,
    error::{GatewayError, Result},
    event::{CacheUpdate, EventRegistry, EventSink},
    shard::{
        ConnectionState, MediaSessionData, MediaSessionRequest, MediaWaiters, ReconnectRequest,
        ShardConnection, ShardId,
    },
};

/// Deadline for assembling a media session's state/server dispatch pair.
pub const MEDIA_COLLECT_TIMEOUT: Duration = Duration::from_millis(5_500);

/// Granularity of the supervisory loop's I/O polling.
const IO_POLL: Duration = Duration::from_millis(10);

/// Read buffer capacity per poll.
const READ_CHUNK: usize = 16 * 1024;

/// Deadline for writing one outbound buffer; a stalled transmit is
/// treated as connection loss.
const WRITE_BUDGET: Duration = Duration::from_secs(5);

enum Command {
    Send { shard: u32, envelope: Envelope },
    MediaSession { shard: u32, request: MediaSessionRequest },
}

struct ShardHandle<S> {
    conn: ShardConnection,
    stream: Option<S>,
}

/// Supervisory loop over a deployment's shards.
pub struct ShardRegistry<C: Connector> {
    config: Arc<GatewayConfig>,
    connector: C,
    shards: HashMap<u32, ShardHandle<C::Stream>>,
    commands: mpsc::Receiver<Command>,
    quit: CancellationToken,
}

impl<C: Connector> ShardRegistry<C> {
    /// Build a registry with one connection per configured shard, plus the
    /// handle callers use to talk to it.
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        connector: C,
        sink: Arc<dyn EventSink>,
        events: Arc<EventRegistry>,
        cache: Option<Arc<dyn CacheUpdate>>,
    ) -> (Self, RegistryHandle) {
        let config = Arc::new(config);
        let waiters = MediaWaiters::default();
        let quit = CancellationToken::new();
        let (tx, rx) = mpsc::channel(64);
        let shards = (0..config.shard_total)
            .map(|index| {
                let id = ShardId {
                    index,
                    total: config.shard_total,
                };
                let conn = ShardConnection::new(
                    id,
                    Arc::clone(&config),
                    Arc::clone(&sink),
                    Arc::clone(&events),
                    cache.clone(),
                    Arc::clone(&waiters),
                );
                (index, ShardHandle { conn, stream: None })
            })
            .collect();
        let handle = RegistryHandle {
            commands: tx,
            waiters,
            quit: quit.clone(),
        };
        (
            Self {
                config,
                connector,
                shards,
                commands: rx,
                quit,
            },
            handle,
        )
    }

    #[must_use]
    pub fn shard_count(&self) -> usize { self.shards.len() }

    /// Run the supervisory loop until shutdown or fatal failure.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ReconnectBudgetExhausted`] when a shard can
    /// no longer be kept connected; cooperative shutdown returns `Ok`.
    pub async fn run(&mut self) -> Result<()> {
        let initial: Vec<u32> = self.shards.keys().copied().collect();
        for index in initial {
            self.connect(ReconnectRequest {
                shard: index,
                attempt: 0,
                resuming: false,
                delay: None,
            })
            .await;
        }
        let mut tick = time::interval(IO_POLL);
        tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = self.quit.cancelled() => {
                    info!("registry shutting down");
                    return Ok(());
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            self.quit.cancel();
                            return Ok(());
                        }
                    }
                }
                _ = tick.tick() => {
                    self.service_shards().await;
                    if let Some(index) = self.fatal_shard() {
                        self.quit.cancel();
                        return Err(GatewayError::ReconnectBudgetExhausted(index));
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { shard, envelope } => {
                if let Some(handle) = self.shards.get_mut(&shard) {
                    handle.conn.queue_envelope(&envelope);
                } else {
                    warn!("dropping message for unknown shard {shard}");
                }
            }
            Command::MediaSession { shard, request } => {
                if let Some(handle) = self.shards.get_mut(&shard) {
                    handle.conn.request_media_session(&request);
                } else {
                    warn!("dropping media request for unknown shard {shard}");
                }
            }
        }
    }

    fn fatal_shard(&self) -> Option<u32> {
        self.shards
            .iter()
            .find(|(_, handle)| handle.conn.is_fatal())
            .map(|(index, _)| *index)
    }

    /// One pass over every shard: read, heartbeat, flush, and collect the
    /// reconnects scheduled by teardowns.
    async fn service_shards(&mut self) {
        let mut reconnects = Vec::new();
        for handle in self.shards.values_mut() {
            if handle.stream.is_some() {
                pump(handle).await;
            }
            if let Some(request) = handle.conn.take_reconnect_request() {
                handle.stream = None;
                reconnects.push(request);
            }
        }
        for request in reconnects {
            self.connect(request).await;
        }
    }

    /// Carry out one connect attempt: dial, upgrade, hello, authenticate,
    /// each phase under the configured deadline.
    async fn connect(&mut self, request: ReconnectRequest) {
        let Some(handle) = self.shards.get_mut(&request.shard) else {
            warn!("reconnect requested for unknown shard {}", request.shard);
            return;
        };
        if let Some(delay) = request.delay {
            time::sleep(delay).await;
        }
        handle.conn.note_connect_attempt(request.attempt);
        let host = if request.resuming {
            handle
                .conn
                .session()
                .resume_url
                .as_deref()
                .map_or_else(|| self.config.host.clone(), |url| host_of(url).to_owned())
        } else {
            self.config.host.clone()
        };
        let phase = self.config.connect_phase_timeout;
        info!(
            "shard {} connecting to {host} (attempt {})",
            handle.conn.id(),
            request.attempt + 1
        );

        let dialled = time::timeout(phase, self.connector.connect(&host, self.config.port)).await;
        let mut stream = match dialled {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                warn!("shard {} dial failed: {err}", handle.conn.id());
                handle.conn.on_closed();
                return;
            }
            Err(_) => {
                warn!("shard {} dial timed out", handle.conn.id());
                handle.conn.on_closed();
                return;
            }
        };

        handle.conn.begin_upgrade(&host);
        for target in [
            ConnectionState::CollectingHello,
            ConnectionState::SendingIdentify,
            ConnectionState::Authenticated,
        ] {
            if !drive_until(&mut handle.conn, &mut stream, target, phase).await {
                warn!(
                    "shard {} connect stalled before reaching {target}",
                    handle.conn.id()
                );
                handle.conn.on_closed();
                return;
            }
        }
        handle.stream = Some(stream);
    }
}

/// Read once with a short deadline, run heartbeats, and flush output.
async fn pump<S>(handle: &mut ShardHandle<S>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    let Some(stream) = handle.stream.as_mut() else {
        return;
    };
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    match time::timeout(IO_POLL, stream.read_buf(&mut buf)).await {
        Ok(Ok(0)) => {
            warn!("shard {} transport closed", handle.conn.id());
            handle.conn.on_closed();
            return;
        }
        Ok(Ok(_)) => {
            if handle.conn.feed(&buf, Instant::now()).is_err() {
                // Teardown already scheduled by the state machine.
                return;
            }
        }
        Ok(Err(err)) => {
            warn!("shard {} read failed: {err}", handle.conn.id());
            handle.conn.on_closed();
            return;
        }
        Err(_) => {}
    }
    handle.conn.check_heartbeat(Instant::now());
    flush(&mut handle.conn, stream).await;
}

/// Write every queued outbound buffer to the stream.
async fn flush<S>(conn: &mut ShardConnection, stream: &mut S)
where
    S: tokio::io::AsyncWrite + Unpin + Send,
{
    for bytes in conn.take_outbound() {
        match time::timeout(WRITE_BUDGET, stream.write_all(&bytes)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!("shard {} write failed: {err}", conn.id());
                conn.on_closed();
                return;
            }
            Err(_) => {
                warn!("shard {} write stalled past its budget", conn.id());
                conn.on_closed();
                return;
            }
        }
    }
    if let Err(err) = stream.flush().await {
        warn!("shard {} flush failed: {err}", conn.id());
        conn.on_closed();
    }
}

/// Pump the connection until it reaches or passes `target`, under one
/// deadline. A single read may carry pipelined input that advances the
/// state machine through several phases at once.
///
/// Returns `false` on timeout or if the connection tore down first.
async fn drive_until<S>(
    conn: &mut ShardConnection,
    stream: &mut S,
    target: ConnectionState,
    deadline: Duration,
) -> bool
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    let phase = async {
        loop {
            flush(conn, stream).await;
            if conn.state() >= target {
                return true;
            }
            if conn.state() == ConnectionState::Disconnected {
                return false;
            }
            let mut buf = BytesMut::with_capacity(READ_CHUNK);
            match stream.read_buf(&mut buf).await {
                Ok(0) => {
                    conn.on_closed();
                    return false;
                }
                Ok(_) => {
                    if conn.feed(&buf, Instant::now()).is_err() {
                        return false;
                    }
                }
                Err(err) => {
                    warn!("shard {} read failed during connect: {err}", conn.id());
                    conn.on_closed();
                    return false;
                }
            }
        }
    };
    matches!(time::timeout(deadline, phase).await, Ok(true))
}

/// Strip the scheme and path from a READY-supplied resume URL.
fn host_of(url: &str) -> &str {
    let without_scheme = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest);
    without_scheme
        .split_once('/')
        .map_or(without_scheme, |(host, _)| host)
}

/// Caller-facing surface of a running [`ShardRegistry`].
#[derive(Clone)]
pub struct RegistryHandle {
    commands: mpsc::Sender<Command>,
    waiters: MediaWaiters,
    quit: CancellationToken,
}

impl RegistryHandle {
    /// Queue an application envelope on the given shard.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RegistryClosed`] once the loop has exited.
    pub async fn send(&self, shard: u32, envelope: Envelope) -> Result<()> {
        self.commands
            .send(Command::Send { shard, envelope })
            .await
            .map_err(|_| GatewayError::RegistryClosed)
    }

    /// Join a voice channel and collect its media-session data.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MediaSessionTimeout`] when the state/server
    /// dispatch pair does not arrive within [`MEDIA_COLLECT_TIMEOUT`], or
    /// [`GatewayError::RegistryClosed`] once the loop has exited.
    pub async fn media_session(
        &self,
        shard: u32,
        request: MediaSessionRequest,
    ) -> Result<MediaSessionData> {
        let guild_id = request.guild_id.clone();
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(guild_id.clone(), tx);
        if self
            .commands
            .send(Command::MediaSession { shard, request })
            .await
            .is_err()
        {
            self.waiters.remove(&guild_id);
            return Err(GatewayError::RegistryClosed);
        }
        match time::timeout(MEDIA_COLLECT_TIMEOUT, rx).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(_)) => Err(GatewayError::RegistryClosed),
            Err(_) => {
                self.waiters.remove(&guild_id);
                Err(GatewayError::MediaSessionTimeout)
            }
        }
    }

    /// Request cooperative shutdown of the supervisory loop.
    pub fn shutdown(&self) { self.quit.cancel(); }

    /// Token cancelled when the registry stops.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken { self.quit.clone() }
}
