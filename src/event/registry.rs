//! Name-keyed registry of event decoders.
//!
//! Replaces a monolithic per-event branch with a map populated at
//! startup, so each decoder can be registered, replaced, and tested
//! independently.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::types::{
    GatewayEvent, MessageDeleteBulkData, MessageDeleteData, ReadyData, ScheduledEventData,
    ScheduledEventUserData, StageInstanceData, VoiceServerData, VoiceStateData,
};

/// Decode function for one event type.
pub type EventDecoder = fn(Value) -> Result<GatewayEvent, serde_json::Error>;

/// Errors raised while decoding a dispatch payload.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EventError {
    /// No decoder is registered for the event name.
    #[error("unknown event {0:?}")]
    Unknown(String),
    /// The registered decoder rejected the payload.
    #[error("failed to decode {name} payload")]
    Decode {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Registry mapping event names to decoders.
pub struct EventRegistry {
    decoders: HashMap<&'static str, EventDecoder>,
}

fn typed<T: DeserializeOwned>(value: Value, wrap: fn(T) -> GatewayEvent) -> Result<GatewayEvent, serde_json::Error> {
    serde_json::from_value(value).map(wrap)
}

impl EventRegistry {
    /// Empty registry; useful for narrowly-scoped tests.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registry with decoders for the full standard event set.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("READY", |d| typed::<ReadyData>(d, GatewayEvent::Ready));
        registry.register("RESUMED", |_| Ok(GatewayEvent::Resumed));
        registry.register("APPLICATION_COMMAND_PERMISSIONS_UPDATE", |d| {
            Ok(GatewayEvent::ApplicationCommandPermissionsUpdate(d))
        });
        registry.register("AUTO_MODERATION_RULE_CREATE", |d| {
            Ok(GatewayEvent::AutoModerationRuleCreate(d))
        });
        registry.register("AUTO_MODERATION_RULE_UPDATE", |d| {
            Ok(GatewayEvent::AutoModerationRuleUpdate(d))
        });
        registry.register("AUTO_MODERATION_RULE_DELETE", |d| {
            Ok(GatewayEvent::AutoModerationRuleDelete(d))
        });
        registry.register("AUTO_MODERATION_ACTION_EXECUTION", |d| {
            Ok(GatewayEvent::AutoModerationActionExecution(d))
        });
        registry.register("CHANNEL_CREATE", |d| typed(d, GatewayEvent::ChannelCreate));
        registry.register("CHANNEL_UPDATE", |d| typed(d, GatewayEvent::ChannelUpdate));
        registry.register("CHANNEL_DELETE", |d| typed(d, GatewayEvent::ChannelDelete));
        registry.register("CHANNEL_PINS_UPDATE", |d| Ok(GatewayEvent::ChannelPinsUpdate(d)));
        registry.register("THREAD_CREATE", |d| typed(d, GatewayEvent::ThreadCreate));
        registry.register("THREAD_UPDATE", |d| typed(d, GatewayEvent::ThreadUpdate));
        registry.register("THREAD_DELETE", |d| typed(d, GatewayEvent::ThreadDelete));
        registry.register("THREAD_LIST_SYNC", |d| Ok(GatewayEvent::ThreadListSync(d)));
        registry.register("THREAD_MEMBER_UPDATE", |d| Ok(GatewayEvent::ThreadMemberUpdate(d)));
        registry.register("THREAD_MEMBERS_UPDATE", |d| {
            Ok(GatewayEvent::ThreadMembersUpdate(d))
        });
        registry.register("GUILD_CREATE", |d| typed(d, GatewayEvent::GuildCreate));
        registry.register("GUILD_UPDATE", |d| typed(d, GatewayEvent::GuildUpdate));
        registry.register("GUILD_DELETE", |d| typed(d, GatewayEvent::GuildDelete));
        registry.register("GUILD_BAN_ADD", |d| Ok(GatewayEvent::GuildBanAdd(d)));
        registry.register("GUILD_BAN_REMOVE", |d| Ok(GatewayEvent::GuildBanRemove(d)));
        registry.register("GUILD_EMOJIS_UPDATE", |d| Ok(GatewayEvent::GuildEmojisUpdate(d)));
        registry.register("GUILD_STICKERS_UPDATE", |d| {
            Ok(GatewayEvent::GuildStickersUpdate(d))
        });
        registry.register("GUILD_INTEGRATIONS_UPDATE", |d| {
            Ok(GatewayEvent::GuildIntegrationsUpdate(d))
        });
        registry.register("GUILD_MEMBER_ADD", |d| Ok(GatewayEvent::GuildMemberAdd(d)));
        registry.register("GUILD_MEMBER_REMOVE", |d| Ok(GatewayEvent::GuildMemberRemove(d)));
        registry.register("GUILD_MEMBER_UPDATE", |d| Ok(GatewayEvent::GuildMemberUpdate(d)));
        registry.register("GUILD_MEMBERS_CHUNK", |d| Ok(GatewayEvent::GuildMembersChunk(d)));
        registry.register("GUILD_ROLE_CREATE", |d| Ok(GatewayEvent::RoleCreate(d)));
        registry.register("GUILD_ROLE_UPDATE", |d| Ok(GatewayEvent::RoleUpdate(d)));
        registry.register("GUILD_ROLE_DELETE", |d| Ok(GatewayEvent::RoleDelete(d)));
        registry.register("GUILD_SCHEDULED_EVENT_CREATE", |d| {
            typed::<ScheduledEventData>(d, GatewayEvent::ScheduledEventCreate)
        });
        registry.register("GUILD_SCHEDULED_EVENT_UPDATE", |d| {
            typed::<ScheduledEventData>(d, GatewayEvent::ScheduledEventUpdate)
        });
        registry.register("GUILD_SCHEDULED_EVENT_DELETE", |d| {
            typed::<ScheduledEventData>(d, GatewayEvent::ScheduledEventDelete)
        });
        registry.register("GUILD_SCHEDULED_EVENT_USER_ADD", |d| {
            typed::<ScheduledEventUserData>(d, GatewayEvent::ScheduledEventUserAdd)
        });
        registry.register("GUILD_SCHEDULED_EVENT_USER_REMOVE", |d| {
            typed::<ScheduledEventUserData>(d, GatewayEvent::ScheduledEventUserRemove)
        });
        registry.register("INTEGRATION_CREATE", |d| Ok(GatewayEvent::IntegrationCreate(d)));
        registry.register("INTEGRATION_UPDATE", |d| Ok(GatewayEvent::IntegrationUpdate(d)));
        registry.register("INTEGRATION_DELETE", |d| Ok(GatewayEvent::IntegrationDelete(d)));
        registry.register("INTERACTION_CREATE", |d| Ok(GatewayEvent::InteractionCreate(d)));
        registry.register("INVITE_CREATE", |d| Ok(GatewayEvent::InviteCreate(d)));
        registry.register("INVITE_DELETE", |d| Ok(GatewayEvent::InviteDelete(d)));
        registry.register("MESSAGE_CREATE", |d| Ok(GatewayEvent::MessageCreate(d)));
        registry.register("MESSAGE_UPDATE", |d| Ok(GatewayEvent::MessageUpdate(d)));
        registry.register("MESSAGE_DELETE", |d| {
            typed::<MessageDeleteData>(d, GatewayEvent::MessageDelete)
        });
        registry.register("MESSAGE_DELETE_BULK", |d| {
            typed::<MessageDeleteBulkData>(d, GatewayEvent::MessageDeleteBulk)
        });
        registry.register("MESSAGE_REACTION_ADD", |d| Ok(GatewayEvent::ReactionAdd(d)));
        registry.register("MESSAGE_REACTION_REMOVE", |d| Ok(GatewayEvent::ReactionRemove(d)));
        registry.register("MESSAGE_REACTION_REMOVE_ALL", |d| {
            Ok(GatewayEvent::ReactionRemoveAll(d))
        });
        registry.register("MESSAGE_REACTION_REMOVE_EMOJI", |d| {
            Ok(GatewayEvent::ReactionRemoveEmoji(d))
        });
        registry.register("PRESENCE_UPDATE", |d| Ok(GatewayEvent::PresenceUpdate(d)));
        registry.register("STAGE_INSTANCE_CREATE", |d| {
            typed::<StageInstanceData>(d, GatewayEvent::StageInstanceCreate)
        });
        registry.register("STAGE_INSTANCE_UPDATE", |d| {
            typed::<StageInstanceData>(d, GatewayEvent::StageInstanceUpdate)
        });
        registry.register("STAGE_INSTANCE_DELETE", |d| {
            typed::<StageInstanceData>(d, GatewayEvent::StageInstanceDelete)
        });
        registry.register("TYPING_START", |d| Ok(GatewayEvent::TypingStart(d)));
        registry.register("USER_UPDATE", |d| Ok(GatewayEvent::UserUpdate(d)));
        registry.register("VOICE_STATE_UPDATE", |d| {
            typed::<VoiceStateData>(d, GatewayEvent::VoiceStateUpdate)
        });
        registry.register("VOICE_SERVER_UPDATE", |d| {
            typed::<VoiceServerData>(d, GatewayEvent::VoiceServerUpdate)
        });
        registry.register("WEBHOOKS_UPDATE", |d| Ok(GatewayEvent::WebhooksUpdate(d)));
        registry
    }

    /// Register (or replace) the decoder for `name`.
    pub fn register(&mut self, name: &'static str, decoder: EventDecoder) {
        self.decoders.insert(name, decoder);
    }

    /// Number of registered event types.
    #[must_use]
    pub fn len(&self) -> usize { self.decoders.len() }

    /// Whether no decoders are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.decoders.is_empty() }

    /// Decode a dispatch payload by event name.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Unknown`] for unregistered names and
    /// [`EventError::Decode`] when the payload does not match the event's
    /// shape.
    pub fn decode(&self, name: &str, payload: Value) -> Result<GatewayEvent, EventError> {
        let Some((registered, decoder)) = self.decoders.get_key_value(name) else {
            return Err(EventError::Unknown(name.to_owned()));
        };
        decoder(payload).map_err(|source| EventError::Decode {
            name: registered,
            source,
        })
    }
}

impl Default for EventRegistry {
    fn default() -> Self { Self::standard() }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn standard_registry_covers_the_event_set() {
        let registry = EventRegistry::standard();
        assert_eq!(registry.len(), 60);
    }

    #[test]
    fn ready_decodes_session_fields() {
        let registry = EventRegistry::standard();
        let event = registry
            .decode(
                "READY",
                json!({"session_id": "s-1", "resume_gateway_url": "wss://resume.example"}),
            )
            .expect("decode READY");
        let GatewayEvent::Ready(data) = event else {
            panic!("expected READY event");
        };
        assert_eq!(data.session_id, "s-1");
        assert_eq!(data.resume_gateway_url, "wss://resume.example");
    }

    #[test]
    fn unknown_names_are_reported() {
        let registry = EventRegistry::standard();
        assert!(matches!(
            registry.decode("NOT_A_REAL_EVENT", json!({})),
            Err(EventError::Unknown(_))
        ));
    }

    #[test]
    fn malformed_payloads_name_the_event() {
        let registry = EventRegistry::standard();
        let err = registry
            .decode("GUILD_SCHEDULED_EVENT_DELETE", json!({"id": 3}))
            .expect_err("payload shape mismatch");
        assert!(matches!(
            err,
            EventError::Decode {
                name: "GUILD_SCHEDULED_EVENT_DELETE",
                ..
            }
        ));
    }

    #[test]
    fn decoders_can_be_replaced() {
        let mut registry = EventRegistry::empty();
        registry.register("RESUMED", |_| Ok(GatewayEvent::Resumed));
        assert_eq!(registry.len(), 1);
        assert!(registry.decode("RESUMED", json!(null)).is_ok());
    }
}
