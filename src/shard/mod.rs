//! Per-shard connection lifecycle.
//!
//! A [`ShardConnection`] is a synchronous state machine: transport bytes
//! go in through [`ShardConnection::feed`], decoded events come out
//! through the configured [`EventSink`], and bytes to write come out of
//! the outbound queue. It performs no I/O and takes the current time as a
//! parameter, so the full lifecycle is drivable from tests; the
//! [`crate::registry::ShardRegistry`] owns the sockets and the clock.

mod close;
mod heartbeat;
mod media;
mod session;
mod state;

use std::{collections::VecDeque, fmt, sync::Arc, time::{Duration, Instant}};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use log::{debug, error, info, warn};
use rand::Rng;
use serde_json::{Value, json};

pub use close::CloseReason;
pub use heartbeat::HeartbeatTimer;
pub use media::{MediaSessionData, MediaSessionRequest, MediaWaiters};
pub use session::SessionContext;
pub use state::ConnectionState;

use crate::{
    assembler::{ExtractedFrame, MessageAssembler},
    config::GatewayConfig,
    envelope::{Envelope, op},
    error::Result,
    event::{CacheUpdate, EventError, EventRegistry, EventSink, GatewayEvent},
    frame::{Opcode, encode_frame, read_close_code},
};
use media::MediaCollector;

/// Bounds, in milliseconds, of the random delay applied before
/// reconnecting after an invalid-session notice.
const INVALID_SESSION_JITTER_MS: std::ops::Range<u64> = 1_000..5_000;

/// Identity of one shard within a deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShardId {
    pub index: u32,
    pub total: u32,
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.index, self.total)
    }
}

/// A reconnect the supervisor should carry out for a shard.
///
/// The delay, when present, is the invalid-session jitter; the supervisor
/// sleeps it before dialling so the state machine itself stays untimed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectRequest {
    pub shard: u32,
    /// Attempts already made against the current budget.
    pub attempt: u32,
    /// Whether the next connect should resume the previous session.
    pub resuming: bool,
    pub delay: Option<Duration>,
}

/// State machine for one shard's gateway connection.
pub struct ShardConnection {
    id: ShardId,
    config: Arc<GatewayConfig>,
    state: ConnectionState,
    assembler: MessageAssembler,
    session: SessionContext,
    heartbeat: Option<HeartbeatTimer>,
    outbound: VecDeque<Bytes>,
    sink: Arc<dyn EventSink>,
    registry: Arc<EventRegistry>,
    cache: Option<Arc<dyn CacheUpdate>>,
    media: MediaCollector,
    pending_reconnect: Option<ReconnectRequest>,
    fatal: bool,
    close_code: u16,
}

impl ShardConnection {
    #[must_use]
    pub fn new(
        id: ShardId,
        config: Arc<GatewayConfig>,
        sink: Arc<dyn EventSink>,
        registry: Arc<EventRegistry>,
        cache: Option<Arc<dyn CacheUpdate>>,
        waiters: MediaWaiters,
    ) -> Self {
        Self {
            id,
            config,
            state: ConnectionState::Disconnected,
            assembler: MessageAssembler::new(),
            session: SessionContext::default(),
            heartbeat: None,
            outbound: VecDeque::new(),
            sink,
            registry,
            cache,
            media: MediaCollector::new(waiters),
            pending_reconnect: None,
            fatal: false,
            close_code: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> ShardId { self.id }

    #[must_use]
    pub fn state(&self) -> ConnectionState { self.state }

    #[must_use]
    pub fn session(&self) -> &SessionContext { &self.session }

    /// Status code from the most recent close frame, zero if none.
    #[must_use]
    pub fn close_code(&self) -> u16 { self.close_code }

    /// Whether the reconnect budget is exhausted or the close was
    /// unrecoverable.
    #[must_use]
    pub fn is_fatal(&self) -> bool { self.fatal }

    /// Drain the bytes queued for the transport.
    pub fn take_outbound(&mut self) -> Vec<Bytes> {
        self.outbound.drain(..).collect()
    }

    /// Take the pending reconnect, if a teardown scheduled one.
    pub fn take_reconnect_request(&mut self) -> Option<ReconnectRequest> {
        self.pending_reconnect.take()
    }

    /// Record that the supervisor is spending a reconnect attempt.
    pub fn note_connect_attempt(&mut self, attempt: u32) {
        self.session.reconnect_tries = attempt + 1;
    }

    /// Queue the upgrade request and start waiting for its response.
    ///
    /// `host` is the endpoint actually being dialled, which differs from
    /// the configured host when resuming against a READY-supplied URL.
    pub fn begin_upgrade(&mut self, host: &str) {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill(&mut nonce[..]);
        let request = format!(
            "GET {path} HTTP/1.1\r\nHost: {host}\r\nPragma: no-cache\r\nUser-Agent: wiregate/1.0\r\nUpgrade: WebSocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: {key}\r\nSec-WebSocket-Version: 13\r\n\r\n",
            path = self.config.request_path(),
            key = BASE64.encode(nonce),
        );
        self.assembler.reset();
        self.close_code = 0;
        self.state = ConnectionState::Upgrading;
        self.outbound.push_back(Bytes::from(request));
        debug!("shard {} sending upgrade request to {host}", self.id);
    }

    /// Feed transport bytes through the assembler and state machine.
    ///
    /// # Errors
    ///
    /// Returns the underlying error after a malformed frame tears the
    /// connection down; the caller should drop the transport and act on
    /// the queued reconnect.
    pub fn feed(&mut self, bytes: &[u8], now: Instant) -> Result<()> {
        self.assembler.feed(bytes);
        if self.state == ConnectionState::Upgrading {
            if !self.assembler.complete_handshake() {
                return Ok(());
            }
            self.state = ConnectionState::CollectingHello;
            debug!("shard {} upgraded, awaiting hello", self.id);
        }
        loop {
            if self.state == ConnectionState::Disconnected {
                return Ok(());
            }
            match self.assembler.try_extract() {
                Ok(Some(frame)) => self.handle_frame(&frame, now),
                Ok(None) => return Ok(()),
                Err(err) => {
                    warn!("shard {} stream desynchronized: {err}", self.id);
                    self.assembler.clear();
                    self.on_closed();
                    return Err(err.into());
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: &ExtractedFrame, now: Instant) {
        if frame.opcode.is_data() {
            self.handle_payload(&frame.payload, now);
        } else if frame.opcode == Opcode::Close {
            match read_close_code(&frame.payload) {
                Ok(code) => self.handle_close(code),
                Err(err) => {
                    warn!("shard {} malformed close frame: {err}", self.id);
                    self.handle_close(0);
                }
            }
        } else {
            debug!("shard {} ignoring {:?} frame", self.id, frame.opcode);
        }
    }

    fn handle_close(&mut self, code: u16) {
        let reason = CloseReason::from_code(code);
        self.close_code = code;
        info!("shard {} closed by remote: {reason} ({code})", self.id);
        if code != 0 {
            self.session.resuming = true;
        }
        if !reason.can_reconnect() {
            error!("shard {} close is unrecoverable, giving up", self.id);
            self.session.reconnect_tries = self.config.max_reconnect_tries;
        }
        self.on_closed();
    }

    fn handle_payload(&mut self, payload: &[u8], now: Instant) {
        if !self.state.accepts_payloads() {
            warn!(
                "shard {} dropping payload received while {}",
                self.id, self.state
            );
            return;
        }
        let envelope = match self.config.format.decode(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                // Unparseable envelopes leave nothing to resynchronize on.
                warn!("shard {} discarding undecodable message: {err}", self.id);
                self.assembler.clear();
                return;
            }
        };
        if let Some(sequence) = envelope.s {
            self.session.last_sequence = sequence;
        }
        match envelope.op {
            op::DISPATCH => self.handle_dispatch(envelope),
            op::HEARTBEAT => {
                // Remote demands an immediate beat regardless of timing.
                self.send_heartbeat(now);
            }
            op::RECONNECT => {
                info!("shard {} told to reconnect and resume", self.id);
                self.session.resuming = true;
                self.on_closed();
            }
            op::INVALID_SESSION => {
                let resumable = envelope.d.as_bool().unwrap_or(false);
                let delay = invalid_session_jitter();
                info!(
                    "shard {} session invalidated (resumable: {resumable}), \
                     reconnecting in {delay:?}",
                    self.id
                );
                self.session.resuming = resumable;
                self.close_with_delay(Some(delay));
            }
            op::HELLO => self.handle_hello(&envelope.d, now),
            op::HEARTBEAT_ACK => {
                if let Some(heartbeat) = &mut self.heartbeat {
                    heartbeat.acknowledged();
                }
            }
            other => debug!("shard {} ignoring unknown op {other}", self.id),
        }
    }

    fn handle_hello(&mut self, data: &Value, now: Instant) {
        let interval_ms = data
            .get("heartbeat_interval")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        if interval_ms == 0 {
            warn!("shard {} hello carried no heartbeat interval", self.id);
            self.on_closed();
            return;
        }
        self.heartbeat = Some(HeartbeatTimer::new(Duration::from_millis(interval_ms), now));
        let envelope = if self.session.can_resume() {
            info!("shard {} resuming session", self.id);
            Envelope::new(
                op::RESUME,
                json!({
                    "token": self.config.token,
                    "session_id": self.session.session_id,
                    "seq": self.session.last_sequence,
                }),
            )
        } else {
            info!("shard {} identifying", self.id);
            Envelope::new(
                op::IDENTIFY,
                json!({
                    "token": self.config.token,
                    "intents": self.config.intents,
                    "shard": [self.id.index, self.id.total],
                    "properties": {
                        "os": std::env::consts::OS,
                        "browser": "wiregate",
                        "device": "wiregate",
                    },
                    "presence": self.config.presence,
                }),
            )
        };
        self.queue_envelope(&envelope);
        self.state = ConnectionState::SendingIdentify;
    }

    fn handle_dispatch(&mut self, envelope: Envelope) {
        let Some(name) = envelope.t else {
            debug!("shard {} dispatch without an event name", self.id);
            return;
        };
        let event = match self.registry.decode(&name, envelope.d) {
            Ok(event) => event,
            Err(err @ EventError::Unknown(_)) => {
                debug!("shard {} {err}", self.id);
                return;
            }
            Err(err) => {
                warn!("shard {} dropping dispatch: {err}", self.id);
                return;
            }
        };
        match &event {
            GatewayEvent::Ready(ready) => {
                self.session
                    .established(ready.session_id.clone(), ready.resume_gateway_url.clone());
                if let Some(user_id) = ready.user.get("id").and_then(Value::as_str) {
                    self.media.set_user_id(user_id.to_owned());
                }
                self.state = ConnectionState::Authenticated;
                info!("shard {} authenticated", self.id);
            }
            GatewayEvent::Resumed => {
                self.session.reconnect_tries = 0;
                self.session.resuming = false;
                self.state = ConnectionState::Authenticated;
                info!("shard {} resumed", self.id);
            }
            _ => {
                if self.state != ConnectionState::Authenticated {
                    warn!(
                        "shard {} dropping {name} received before authentication",
                        self.id
                    );
                    return;
                }
            }
        }
        self.media.observe(&event);
        if let Some(cache) = &self.cache {
            cache.apply(&event);
        }
        self.sink.on_event(event);
    }

    /// Send a heartbeat if one is due and the previous was acknowledged.
    ///
    /// Returns whether a beat was queued. Beats only run while
    /// authenticated; the remote forcing one via the heartbeat op bypasses
    /// both gates.
    pub fn check_heartbeat(&mut self, now: Instant) -> bool {
        let due = self.state == ConnectionState::Authenticated
            && self
                .heartbeat
                .as_ref()
                .is_some_and(|heartbeat| heartbeat.may_send(now));
        if due {
            self.send_heartbeat(now);
        }
        due
    }

    fn send_heartbeat(&mut self, now: Instant) {
        if self.heartbeat.is_none() {
            return;
        }
        let envelope = Envelope::new(op::HEARTBEAT, json!(self.session.last_sequence));
        self.queue_envelope(&envelope);
        if let Some(heartbeat) = &mut self.heartbeat {
            heartbeat.sent(now);
            self.sink.on_heartbeat(heartbeat.time_to_next(now));
        }
    }

    /// Queue an application envelope for sending.
    pub fn queue_envelope(&mut self, envelope: &Envelope) {
        match self.config.format.encode(envelope) {
            Ok(bytes) => {
                let frame = encode_frame(self.config.format.data_opcode(), &bytes);
                self.outbound.push_back(frame.freeze());
            }
            Err(err) => error!("shard {} failed to encode op {}: {err}", self.id, envelope.op),
        }
    }

    /// Queue the voice-state updates that begin media-session collection.
    ///
    /// The previous allocation is released first so the remote always
    /// emits a fresh state/server pair for the target channel.
    pub fn request_media_session(&mut self, request: &MediaSessionRequest) {
        let leave = Envelope::new(
            op::UPDATE_VOICE_STATE,
            json!({
                "guild_id": request.guild_id,
                "channel_id": Value::Null,
                "self_mute": request.self_mute,
                "self_deaf": request.self_deaf,
            }),
        );
        self.queue_envelope(&leave);
        if let Some(channel_id) = &request.channel_id {
            let join = Envelope::new(
                op::UPDATE_VOICE_STATE,
                json!({
                    "guild_id": request.guild_id,
                    "channel_id": channel_id,
                    "self_mute": request.self_mute,
                    "self_deaf": request.self_deaf,
                }),
            );
            self.queue_envelope(&join);
        }
    }

    /// Tear the connection down once, scheduling a reconnect while budget
    /// remains.
    pub fn on_closed(&mut self) { self.close_with_delay(None); }

    fn close_with_delay(&mut self, delay: Option<Duration>) {
        if self.fatal || self.pending_reconnect.is_some() {
            return;
        }
        let attempt = self.session.reconnect_tries;
        self.disconnect();
        if attempt < self.config.max_reconnect_tries {
            self.pending_reconnect = Some(ReconnectRequest {
                shard: self.id.index,
                attempt,
                resuming: self.session.resuming,
                delay,
            });
        } else {
            error!(
                "shard {} exhausted its reconnect budget of {}",
                self.id, self.config.max_reconnect_tries
            );
            self.fatal = true;
        }
    }

    fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.assembler.reset();
        self.outbound.clear();
        self.heartbeat = None;
        self.media.reset();
    }
}

fn invalid_session_jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(INVALID_SESSION_JITTER_MS))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::{envelope::WireFormat, event::EventSink, frame::encode_header};

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<GatewayEvent>>,
    }

    impl EventSink for RecordingSink {
        fn on_event(&self, event: GatewayEvent) {
            self.events.lock().expect("sink lock").push(event);
        }
    }

    fn connection(sink: Arc<RecordingSink>, config: GatewayConfig) -> ShardConnection {
        ShardConnection::new(
            ShardId { index: 0, total: 1 },
            Arc::new(config),
            sink,
            Arc::new(EventRegistry::standard()),
            None,
            MediaWaiters::default(),
        )
    }

    fn server_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
        let mut frame = encode_header(payload.len() as u64, opcode, None).to_vec();
        frame.extend_from_slice(payload);
        frame
    }

    fn server_envelope(envelope: &Envelope) -> Vec<u8> {
        let bytes = WireFormat::Json.encode(envelope).expect("encode");
        server_frame(Opcode::Text, &bytes)
    }

    fn close_frame(code: u16) -> Vec<u8> {
        server_frame(Opcode::Close, &code.to_be_bytes())
    }

    fn upgrade(conn: &mut ShardConnection, now: Instant) {
        conn.begin_upgrade("gateway.test");
        conn.take_outbound();
        conn.feed(b"HTTP/1.1 101 Switching Protocols\r\n\r\n", now)
            .expect("handshake");
    }

    fn hello(conn: &mut ShardConnection, now: Instant) {
        let envelope = Envelope::new(op::HELLO, json!({"heartbeat_interval": 45_000}));
        conn.feed(&server_envelope(&envelope), now).expect("hello");
    }

    fn ready(conn: &mut ShardConnection, now: Instant) {
        let mut envelope = Envelope::new(
            op::DISPATCH,
            json!({
                "session_id": "sess-1",
                "resume_gateway_url": "resume.test",
                "user": {"id": "42"},
            }),
        );
        envelope.s = Some(1);
        envelope.t = Some("READY".to_owned());
        conn.feed(&server_envelope(&envelope), now).expect("ready");
    }

    #[test]
    fn hello_triggers_identify_and_ready_authenticates() {
        let sink = Arc::new(RecordingSink::default());
        let mut conn = connection(sink.clone(), GatewayConfig::new("tok", "gateway.test"));
        let now = Instant::now();
        upgrade(&mut conn, now);
        assert_eq!(conn.state(), ConnectionState::CollectingHello);

        hello(&mut conn, now);
        assert_eq!(conn.state(), ConnectionState::SendingIdentify);
        let sent = conn.take_outbound();
        assert_eq!(sent.len(), 1);

        ready(&mut conn, now);
        assert_eq!(conn.state(), ConnectionState::Authenticated);
        assert_eq!(conn.session().session_id.as_deref(), Some("sess-1"));
        assert_eq!(conn.session().resume_url.as_deref(), Some("resume.test"));
        assert_eq!(sink.events.lock().expect("lock").len(), 1);
    }

    #[test]
    fn dispatches_before_authentication_are_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let mut conn = connection(sink.clone(), GatewayConfig::new("tok", "gateway.test"));
        let now = Instant::now();
        upgrade(&mut conn, now);
        hello(&mut conn, now);

        let mut envelope = Envelope::new(op::DISPATCH, json!({"id": "m1", "channel_id": "c1"}));
        envelope.t = Some("MESSAGE_DELETE".to_owned());
        conn.feed(&server_envelope(&envelope), now).expect("feed");
        assert!(sink.events.lock().expect("lock").is_empty());
    }

    #[test]
    fn heartbeat_waits_for_interval_and_ack() {
        let sink = Arc::new(RecordingSink::default());
        let mut conn = connection(sink, GatewayConfig::new("tok", "gateway.test"));
        let start = Instant::now();
        upgrade(&mut conn, start);
        hello(&mut conn, start);
        ready(&mut conn, start);
        conn.take_outbound();

        assert!(!conn.check_heartbeat(start));
        let due = start + Duration::from_millis(45_000);
        assert!(conn.check_heartbeat(due));
        assert_eq!(conn.take_outbound().len(), 1);
        // Unacknowledged: the next interval does not fire.
        assert!(!conn.check_heartbeat(due + Duration::from_millis(45_000)));

        let ack = Envelope::new(op::HEARTBEAT_ACK, Value::Null);
        conn.feed(&server_envelope(&ack), due).expect("ack");
        assert!(conn.check_heartbeat(due + Duration::from_millis(45_000)));
    }

    #[test]
    fn remote_heartbeat_request_forces_an_immediate_beat() {
        let sink = Arc::new(RecordingSink::default());
        let mut conn = connection(sink, GatewayConfig::new("tok", "gateway.test"));
        let now = Instant::now();
        upgrade(&mut conn, now);
        hello(&mut conn, now);
        conn.take_outbound();

        let demand = Envelope::new(op::HEARTBEAT, Value::Null);
        conn.feed(&server_envelope(&demand), now).expect("demand");
        assert_eq!(conn.take_outbound().len(), 1);
    }

    #[test]
    fn nonzero_close_schedules_a_resuming_reconnect() {
        let sink = Arc::new(RecordingSink::default());
        let mut conn = connection(sink, GatewayConfig::new("tok", "gateway.test"));
        let now = Instant::now();
        upgrade(&mut conn, now);
        hello(&mut conn, now);
        ready(&mut conn, now);

        conn.feed(&close_frame(4000), now).expect("close");
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.close_code(), 4000);
        let request = conn.take_reconnect_request().expect("reconnect scheduled");
        assert!(request.resuming);
        assert_eq!(request.delay, None);
        assert!(!conn.is_fatal());
    }

    #[test]
    fn fatal_close_code_exhausts_the_budget() {
        let sink = Arc::new(RecordingSink::default());
        let mut conn = connection(sink, GatewayConfig::new("bad-token", "gateway.test"));
        let now = Instant::now();
        upgrade(&mut conn, now);
        conn.feed(&close_frame(4004), now).expect("close");
        assert!(conn.is_fatal());
        assert_eq!(conn.take_reconnect_request(), None);
    }

    #[test]
    fn invalid_session_jitters_within_bounds() {
        let sink = Arc::new(RecordingSink::default());
        let mut conn = connection(sink, GatewayConfig::new("tok", "gateway.test"));
        let now = Instant::now();
        upgrade(&mut conn, now);
        hello(&mut conn, now);

        let notice = Envelope::new(op::INVALID_SESSION, json!(false));
        conn.feed(&server_envelope(&notice), now).expect("notice");
        let request = conn.take_reconnect_request().expect("reconnect scheduled");
        assert!(!request.resuming);
        let delay = request.delay.expect("jitter applied");
        assert!(delay >= Duration::from_millis(1_000));
        assert!(delay < Duration::from_millis(5_000));
    }

    #[test]
    fn reconnect_op_resumes_on_next_hello() {
        let sink = Arc::new(RecordingSink::default());
        let mut conn = connection(sink, GatewayConfig::new("tok", "gateway.test"));
        let now = Instant::now();
        upgrade(&mut conn, now);
        hello(&mut conn, now);
        ready(&mut conn, now);

        let reconnect = Envelope::new(op::RECONNECT, Value::Null);
        conn.feed(&server_envelope(&reconnect), now).expect("reconnect");
        let request = conn.take_reconnect_request().expect("reconnect scheduled");
        assert!(request.resuming);
        conn.note_connect_attempt(request.attempt);

        upgrade(&mut conn, now);
        hello(&mut conn, now);
        let sent = conn.take_outbound();
        let resume: Envelope =
            serde_json::from_slice(&unmask(&sent[0])).expect("resume envelope");
        assert_eq!(resume.op, op::RESUME);
        assert_eq!(resume.d["session_id"], json!("sess-1"));
        assert_eq!(resume.d["seq"], json!(1));
    }

    #[test]
    fn teardown_happens_once_per_close() {
        let sink = Arc::new(RecordingSink::default());
        let mut conn = connection(sink, GatewayConfig::new("tok", "gateway.test"));
        let now = Instant::now();
        upgrade(&mut conn, now);
        hello(&mut conn, now);

        let mut wire = close_frame(4000);
        wire.extend_from_slice(&close_frame(4000));
        conn.feed(&wire, now).expect("close");
        assert!(conn.take_reconnect_request().is_some());
        assert_eq!(conn.take_reconnect_request(), None);
    }

    #[test]
    fn media_request_releases_before_joining() {
        let sink = Arc::new(RecordingSink::default());
        let mut conn = connection(sink, GatewayConfig::new("tok", "gateway.test"));
        let now = Instant::now();
        upgrade(&mut conn, now);
        hello(&mut conn, now);
        ready(&mut conn, now);
        conn.take_outbound();

        conn.request_media_session(&MediaSessionRequest {
            guild_id: "g1".to_owned(),
            channel_id: Some("c1".to_owned()),
            self_mute: false,
            self_deaf: true,
        });
        let sent = conn.take_outbound();
        assert_eq!(sent.len(), 2);
        let leave: Envelope = serde_json::from_slice(&unmask(&sent[0])).expect("leave");
        let join: Envelope = serde_json::from_slice(&unmask(&sent[1])).expect("join");
        assert!(leave.d["channel_id"].is_null());
        assert_eq!(join.d["channel_id"], json!("c1"));
    }

    #[test]
    fn voice_dispatch_pair_completes_the_waiting_caller() {
        let waiters = MediaWaiters::default();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        waiters.insert("g1".to_owned(), tx);
        let sink = Arc::new(RecordingSink::default());
        let mut conn = ShardConnection::new(
            ShardId { index: 0, total: 1 },
            Arc::new(GatewayConfig::new("tok", "gateway.test")),
            sink,
            Arc::new(EventRegistry::standard()),
            None,
            Arc::clone(&waiters),
        );
        let now = Instant::now();
        upgrade(&mut conn, now);
        hello(&mut conn, now);
        ready(&mut conn, now);

        let dispatch = |name: &str, d: Value| {
            let mut envelope = Envelope::new(op::DISPATCH, d);
            envelope.t = Some(name.to_owned());
            envelope
        };

        // Another member's state update must not claim the session slot.
        let other = dispatch(
            "VOICE_STATE_UPDATE",
            json!({
                "user_id": "99",
                "guild_id": "g1",
                "channel_id": "c1",
                "session_id": "not-ours",
            }),
        );
        conn.feed(&server_envelope(&other), now).expect("other state");
        let server_update = dispatch(
            "VOICE_SERVER_UPDATE",
            json!({"token": "tkn", "guild_id": "g1", "endpoint": "voice.test:443"}),
        );
        conn.feed(&server_envelope(&server_update), now)
            .expect("server update");
        assert!(rx.try_recv().is_err());
        assert!(waiters.contains_key("g1"));

        // Our own state update pairs with the next server update.
        let own = dispatch(
            "VOICE_STATE_UPDATE",
            json!({
                "user_id": "42",
                "guild_id": "g1",
                "channel_id": "c1",
                "session_id": "media-sess",
            }),
        );
        conn.feed(&server_envelope(&own), now).expect("own state");
        conn.feed(&server_envelope(&server_update), now)
            .expect("paired server update");
        let data = rx.try_recv().expect("caller completed");
        assert_eq!(
            data,
            MediaSessionData {
                guild_id: "g1".to_owned(),
                session_id: "media-sess".to_owned(),
                token: "tkn".to_owned(),
                endpoint: "voice.test:443".to_owned(),
            }
        );
        assert!(waiters.is_empty());
    }

    /// Undo client masking on an outbound frame to inspect its payload.
    fn unmask(frame: &Bytes) -> Vec<u8> {
        let decoded = crate::frame::decode_header(frame)
            .expect("well-formed")
            .expect("complete");
        let key = decoded.mask.expect("client frames are masked");
        let mut payload = frame[decoded.header_len..].to_vec();
        crate::frame::apply_mask(key, &mut payload);
        payload
    }
}
