//! Event payload shapes.
//!
//! Events the client itself reacts to (session establishment, cache
//! bookkeeping, media-session collection) decode into dedicated structs;
//! the long tail keeps its payload as raw JSON for subscribers to
//! interpret.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of the READY dispatch that completes authentication.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadyData {
    pub session_id: String,
    #[serde(default)]
    pub resume_gateway_url: String,
    #[serde(default)]
    pub user: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    pub id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub rest: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unavailable: bool,
    #[serde(flatten)]
    pub rest: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEventData {
    pub id: String,
    pub guild_id: String,
    #[serde(flatten)]
    pub rest: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEventUserData {
    pub guild_id: String,
    pub user_id: String,
    pub guild_scheduled_event_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageInstanceData {
    pub id: String,
    pub guild_id: String,
    #[serde(flatten)]
    pub rest: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDeleteData {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDeleteBulkData {
    pub ids: Vec<String>,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceStateData {
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub user_id: String,
    pub session_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceServerData {
    pub token: String,
    pub guild_id: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// One decoded gateway dispatch.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum GatewayEvent {
    Ready(ReadyData),
    Resumed,
    ApplicationCommandPermissionsUpdate(Value),
    AutoModerationRuleCreate(Value),
    AutoModerationRuleUpdate(Value),
    AutoModerationRuleDelete(Value),
    AutoModerationActionExecution(Value),
    ChannelCreate(ChannelData),
    ChannelUpdate(ChannelData),
    ChannelDelete(ChannelData),
    ChannelPinsUpdate(Value),
    ThreadCreate(ChannelData),
    ThreadUpdate(ChannelData),
    ThreadDelete(ChannelData),
    ThreadListSync(Value),
    ThreadMemberUpdate(Value),
    ThreadMembersUpdate(Value),
    GuildCreate(GuildData),
    GuildUpdate(GuildData),
    GuildDelete(GuildData),
    GuildBanAdd(Value),
    GuildBanRemove(Value),
    GuildEmojisUpdate(Value),
    GuildStickersUpdate(Value),
    GuildIntegrationsUpdate(Value),
    GuildMemberAdd(Value),
    GuildMemberRemove(Value),
    GuildMemberUpdate(Value),
    GuildMembersChunk(Value),
    RoleCreate(Value),
    RoleUpdate(Value),
    RoleDelete(Value),
    ScheduledEventCreate(ScheduledEventData),
    ScheduledEventUpdate(ScheduledEventData),
    ScheduledEventDelete(ScheduledEventData),
    ScheduledEventUserAdd(ScheduledEventUserData),
    ScheduledEventUserRemove(ScheduledEventUserData),
    IntegrationCreate(Value),
    IntegrationUpdate(Value),
    IntegrationDelete(Value),
    InteractionCreate(Value),
    InviteCreate(Value),
    InviteDelete(Value),
    MessageCreate(Value),
    MessageUpdate(Value),
    MessageDelete(MessageDeleteData),
    MessageDeleteBulk(MessageDeleteBulkData),
    ReactionAdd(Value),
    ReactionRemove(Value),
    ReactionRemoveAll(Value),
    ReactionRemoveEmoji(Value),
    PresenceUpdate(Value),
    StageInstanceCreate(StageInstanceData),
    StageInstanceUpdate(StageInstanceData),
    StageInstanceDelete(StageInstanceData),
    TypingStart(Value),
    UserUpdate(Value),
    VoiceStateUpdate(VoiceStateData),
    VoiceServerUpdate(VoiceServerData),
    WebhooksUpdate(Value),
}

impl GatewayEvent {
    /// Wire name of this event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            GatewayEvent::Ready(_) => "READY",
            GatewayEvent::Resumed => "RESUMED",
            GatewayEvent::ApplicationCommandPermissionsUpdate(_) => {
                "APPLICATION_COMMAND_PERMISSIONS_UPDATE"
            }
            GatewayEvent::AutoModerationRuleCreate(_) => "AUTO_MODERATION_RULE_CREATE",
            GatewayEvent::AutoModerationRuleUpdate(_) => "AUTO_MODERATION_RULE_UPDATE",
            GatewayEvent::AutoModerationRuleDelete(_) => "AUTO_MODERATION_RULE_DELETE",
            GatewayEvent::AutoModerationActionExecution(_) => "AUTO_MODERATION_ACTION_EXECUTION",
            GatewayEvent::ChannelCreate(_) => "CHANNEL_CREATE",
            GatewayEvent::ChannelUpdate(_) => "CHANNEL_UPDATE",
            GatewayEvent::ChannelDelete(_) => "CHANNEL_DELETE",
            GatewayEvent::ChannelPinsUpdate(_) => "CHANNEL_PINS_UPDATE",
            GatewayEvent::ThreadCreate(_) => "THREAD_CREATE",
            GatewayEvent::ThreadUpdate(_) => "THREAD_UPDATE",
            GatewayEvent::ThreadDelete(_) => "THREAD_DELETE",
            GatewayEvent::ThreadListSync(_) => "THREAD_LIST_SYNC",
            GatewayEvent::ThreadMemberUpdate(_) => "THREAD_MEMBER_UPDATE",
            GatewayEvent::ThreadMembersUpdate(_) => "THREAD_MEMBERS_UPDATE",
            GatewayEvent::GuildCreate(_) => "GUILD_CREATE",
            GatewayEvent::GuildUpdate(_) => "GUILD_UPDATE",
            GatewayEvent::GuildDelete(_) => "GUILD_DELETE",
            GatewayEvent::GuildBanAdd(_) => "GUILD_BAN_ADD",
            GatewayEvent::GuildBanRemove(_) => "GUILD_BAN_REMOVE",
            GatewayEvent::GuildEmojisUpdate(_) => "GUILD_EMOJIS_UPDATE",
            GatewayEvent::GuildStickersUpdate(_) => "GUILD_STICKERS_UPDATE",
            GatewayEvent::GuildIntegrationsUpdate(_) => "GUILD_INTEGRATIONS_UPDATE",
            GatewayEvent::GuildMemberAdd(_) => "GUILD_MEMBER_ADD",
            GatewayEvent::GuildMemberRemove(_) => "GUILD_MEMBER_REMOVE",
            GatewayEvent::GuildMemberUpdate(_) => "GUILD_MEMBER_UPDATE",
            GatewayEvent::GuildMembersChunk(_) => "GUILD_MEMBERS_CHUNK",
            GatewayEvent::RoleCreate(_) => "GUILD_ROLE_CREATE",
            GatewayEvent::RoleUpdate(_) => "GUILD_ROLE_UPDATE",
            GatewayEvent::RoleDelete(_) => "GUILD_ROLE_DELETE",
            GatewayEvent::ScheduledEventCreate(_) => "GUILD_SCHEDULED_EVENT_CREATE",
            GatewayEvent::ScheduledEventUpdate(_) => "GUILD_SCHEDULED_EVENT_UPDATE",
            GatewayEvent::ScheduledEventDelete(_) => "GUILD_SCHEDULED_EVENT_DELETE",
            GatewayEvent::ScheduledEventUserAdd(_) => "GUILD_SCHEDULED_EVENT_USER_ADD",
            GatewayEvent::ScheduledEventUserRemove(_) => "GUILD_SCHEDULED_EVENT_USER_REMOVE",
            GatewayEvent::IntegrationCreate(_) => "INTEGRATION_CREATE",
            GatewayEvent::IntegrationUpdate(_) => "INTEGRATION_UPDATE",
            GatewayEvent::IntegrationDelete(_) => "INTEGRATION_DELETE",
            GatewayEvent::InteractionCreate(_) => "INTERACTION_CREATE",
            GatewayEvent::InviteCreate(_) => "INVITE_CREATE",
            GatewayEvent::InviteDelete(_) => "INVITE_DELETE",
            GatewayEvent::MessageCreate(_) => "MESSAGE_CREATE",
            GatewayEvent::MessageUpdate(_) => "MESSAGE_UPDATE",
            GatewayEvent::MessageDelete(_) => "MESSAGE_DELETE",
            GatewayEvent::MessageDeleteBulk(_) => "MESSAGE_DELETE_BULK",
            GatewayEvent::ReactionAdd(_) => "MESSAGE_REACTION_ADD",
            GatewayEvent::ReactionRemove(_) => "MESSAGE_REACTION_REMOVE",
            GatewayEvent::ReactionRemoveAll(_) => "MESSAGE_REACTION_REMOVE_ALL",
            GatewayEvent::ReactionRemoveEmoji(_) => "MESSAGE_REACTION_REMOVE_EMOJI",
            GatewayEvent::PresenceUpdate(_) => "PRESENCE_UPDATE",
            GatewayEvent::StageInstanceCreate(_) => "STAGE_INSTANCE_CREATE",
            GatewayEvent::StageInstanceUpdate(_) => "STAGE_INSTANCE_UPDATE",
            GatewayEvent::StageInstanceDelete(_) => "STAGE_INSTANCE_DELETE",
            GatewayEvent::TypingStart(_) => "TYPING_START",
            GatewayEvent::UserUpdate(_) => "USER_UPDATE",
            GatewayEvent::VoiceStateUpdate(_) => "VOICE_STATE_UPDATE",
            GatewayEvent::VoiceServerUpdate(_) => "VOICE_SERVER_UPDATE",
            GatewayEvent::WebhooksUpdate(_) => "WEBHOOKS_UPDATE",
        }
    }
}
