//! Cache synchronization at the dispatcher boundary.
//!
//! The original decode path mutated shared caches as a side effect; here
//! the dispatcher hands each decoded event to a [`CacheUpdate`]
//! implementation instead, keeping decoding side-effect-free and the
//! cache independently testable.

use std::collections::HashMap;

use dashmap::DashMap;

use super::types::GatewayEvent;

/// Applies decoded events to cached aggregate state.
pub trait CacheUpdate: Send + Sync {
    /// Called once per decoded event, before the event sink.
    fn apply(&self, event: &GatewayEvent);
}

/// Aggregate state cached per guild.
#[derive(Clone, Debug, Default)]
pub struct CachedGuild {
    /// Identifiers of the guild's scheduled sub-resources.
    pub scheduled_event_ids: Vec<String>,
    /// Identifiers of the guild's live stage instances.
    pub stage_instance_ids: Vec<String>,
    /// Voice channel occupancy, keyed by user id.
    pub voice_channels: HashMap<String, String>,
}

/// Concurrent in-memory cache of guild aggregates.
#[derive(Debug, Default)]
pub struct AggregateCache {
    guilds: DashMap<String, CachedGuild>,
}

impl AggregateCache {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Snapshot of one guild's cached aggregate, if present.
    #[must_use]
    pub fn guild(&self, guild_id: &str) -> Option<CachedGuild> {
        self.guilds.get(guild_id).map(|entry| entry.clone())
    }

    /// Number of cached guilds.
    #[must_use]
    pub fn len(&self) -> usize { self.guilds.len() }

    /// Whether the cache holds no guilds.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.guilds.is_empty() }
}

impl CacheUpdate for AggregateCache {
    fn apply(&self, event: &GatewayEvent) {
        match event {
            GatewayEvent::GuildCreate(guild) => {
                self.guilds.entry(guild.id.clone()).or_default();
            }
            GatewayEvent::GuildDelete(guild) => {
                self.guilds.remove(&guild.id);
            }
            GatewayEvent::ScheduledEventCreate(data) => {
                self.guilds
                    .entry(data.guild_id.clone())
                    .or_default()
                    .scheduled_event_ids
                    .push(data.id.clone());
            }
            GatewayEvent::ScheduledEventDelete(data) => {
                if let Some(mut guild) = self.guilds.get_mut(&data.guild_id) {
                    guild.scheduled_event_ids.retain(|id| id != &data.id);
                }
            }
            GatewayEvent::StageInstanceCreate(data) => {
                self.guilds
                    .entry(data.guild_id.clone())
                    .or_default()
                    .stage_instance_ids
                    .push(data.id.clone());
            }
            GatewayEvent::StageInstanceDelete(data) => {
                if let Some(mut guild) = self.guilds.get_mut(&data.guild_id) {
                    guild.stage_instance_ids.retain(|id| id != &data.id);
                }
            }
            GatewayEvent::VoiceStateUpdate(state) => {
                let Some(guild_id) = &state.guild_id else {
                    return;
                };
                let mut guild = self.guilds.entry(guild_id.clone()).or_default();
                match &state.channel_id {
                    Some(channel) => {
                        guild
                            .voice_channels
                            .insert(state.user_id.clone(), channel.clone());
                    }
                    None => {
                        guild.voice_channels.remove(&state.user_id);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::types::{GuildData, ScheduledEventData, StageInstanceData, VoiceStateData};

    fn scheduled(guild_id: &str, id: &str) -> ScheduledEventData {
        ScheduledEventData {
            id: id.to_owned(),
            guild_id: guild_id.to_owned(),
            ..ScheduledEventData::default()
        }
    }

    #[test]
    fn scheduled_event_ids_track_create_and_delete() {
        let cache = AggregateCache::new();
        cache.apply(&GatewayEvent::ScheduledEventCreate(scheduled("g1", "e1")));
        cache.apply(&GatewayEvent::ScheduledEventCreate(scheduled("g1", "e2")));
        cache.apply(&GatewayEvent::ScheduledEventDelete(scheduled("g1", "e1")));
        let guild = cache.guild("g1").expect("guild cached");
        assert_eq!(guild.scheduled_event_ids, vec!["e2".to_owned()]);
    }

    #[test]
    fn stage_instances_follow_the_same_pattern() {
        let cache = AggregateCache::new();
        let stage = StageInstanceData {
            id: "s1".to_owned(),
            guild_id: "g1".to_owned(),
            ..StageInstanceData::default()
        };
        cache.apply(&GatewayEvent::StageInstanceCreate(stage.clone()));
        cache.apply(&GatewayEvent::StageInstanceDelete(stage));
        assert!(cache.guild("g1").expect("guild cached").stage_instance_ids.is_empty());
    }

    #[test]
    fn guild_delete_drops_the_aggregate() {
        let cache = AggregateCache::new();
        let guild = GuildData {
            id: "g1".to_owned(),
            ..GuildData::default()
        };
        cache.apply(&GatewayEvent::GuildCreate(guild.clone()));
        assert_eq!(cache.len(), 1);
        cache.apply(&GatewayEvent::GuildDelete(guild));
        assert!(cache.is_empty());
    }

    #[test]
    fn voice_state_updates_move_users_between_channels() {
        let cache = AggregateCache::new();
        let mut state = VoiceStateData {
            guild_id: Some("g1".to_owned()),
            channel_id: Some("c1".to_owned()),
            user_id: "u1".to_owned(),
            session_id: "sess".to_owned(),
        };
        cache.apply(&GatewayEvent::VoiceStateUpdate(state.clone()));
        assert_eq!(
            cache.guild("g1").expect("cached").voice_channels.get("u1"),
            Some(&"c1".to_owned())
        );
        state.channel_id = None;
        cache.apply(&GatewayEvent::VoiceStateUpdate(state));
        assert!(cache.guild("g1").expect("cached").voice_channels.is_empty());
    }
}
