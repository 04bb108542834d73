//! Media-session collection.
//!
//! Joining a voice channel requires pairing two dispatches: the state
//! update carrying our session id and the server update carrying the
//! token and endpoint. The collector watches the dispatch stream for the
//! pair and completes the waiting caller once both halves arrive; the
//! caller bounds the wait with [`crate::registry::MEDIA_COLLECT_TIMEOUT`].

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;
use log::debug;
use tokio::sync::oneshot;

use crate::event::GatewayEvent;

/// Parameters for joining (or leaving) a voice channel.
#[derive(Clone, Debug)]
pub struct MediaSessionRequest {
    pub guild_id: String,
    /// Channel to join; `None` disconnects.
    pub channel_id: Option<String>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

/// Connection data collected from the paired dispatches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaSessionData {
    pub guild_id: String,
    pub session_id: String,
    pub token: String,
    pub endpoint: String,
}

/// Map of callers waiting on media-session data, keyed by guild id.
pub type MediaWaiters = Arc<DashMap<String, oneshot::Sender<MediaSessionData>>>;

/// Watches dispatches for the state/server update pair.
#[derive(Debug, Default)]
pub(crate) struct MediaCollector {
    /// Our own user id, learned at READY; state updates for other users
    /// are ignored.
    user_id: Option<String>,
    /// Session ids observed per guild, waiting for their server half.
    sessions: HashMap<String, String>,
    waiters: MediaWaiters,
}

impl MediaCollector {
    pub(crate) fn new(waiters: MediaWaiters) -> Self {
        Self {
            user_id: None,
            sessions: HashMap::new(),
            waiters,
        }
    }

    pub(crate) fn set_user_id(&mut self, user_id: String) { self.user_id = Some(user_id); }

    /// Observe a decoded dispatch, completing a waiter when the pair for
    /// its guild is assembled.
    pub(crate) fn observe(&mut self, event: &GatewayEvent) {
        match event {
            GatewayEvent::VoiceStateUpdate(state) => {
                if self.user_id.as_deref() != Some(state.user_id.as_str()) {
                    return;
                }
                if let Some(guild_id) = &state.guild_id {
                    self.sessions
                        .insert(guild_id.clone(), state.session_id.clone());
                }
            }
            GatewayEvent::VoiceServerUpdate(server) => {
                let Some(session_id) = self.sessions.remove(&server.guild_id) else {
                    debug!(
                        "server update for guild {} without a collected state update",
                        server.guild_id
                    );
                    return;
                };
                let Some(endpoint) = server.endpoint.clone() else {
                    // Endpoint withdrawal; the allocation is not usable yet.
                    return;
                };
                if let Some((_, waiter)) = self.waiters.remove(&server.guild_id) {
                    let _ = waiter.send(MediaSessionData {
                        guild_id: server.guild_id.clone(),
                        session_id,
                        token: server.token.clone(),
                        endpoint,
                    });
                }
            }
            _ => {}
        }
    }

    /// Drop partially-collected state, e.g. on disconnect.
    pub(crate) fn reset(&mut self) { self.sessions.clear(); }
}
