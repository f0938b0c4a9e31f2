use anyhow::{Context, Result};
use poise::serenity_prelude::{
    async_trait, Cache, ChannelId, CreateMessage, GuildId, Http, UserId, VoiceState,
};
use std::sync::Arc;

/// Mute and deafen flags of a voice connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceFlags {
    pub self_mute: bool,
    pub self_deaf: bool,
    pub mute: bool,
    pub deaf: bool,
}

impl From<&VoiceState> for VoiceFlags {
    fn from(state: &VoiceState) -> Self {
        Self {
            self_mute: state.self_mute,
            self_deaf: state.self_deaf,
            mute: state.mute,
            deaf: state.deaf,
        }
    }
}

/// A member connected to a voice channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePresence {
    pub user: UserId,
    pub channel: ChannelId,
    pub bot: bool,
    /// `None` if no voice state could be found for the member.
    pub flags: Option<VoiceFlags>,
}

impl VoicePresence {
    /// Silent members don't accrue.
    pub fn effectively_muted(&self) -> bool {
        match self.flags {
            Some(flags) => flags.self_mute || flags.self_deaf || flags.mute || flags.deaf,
            None => true,
        }
    }
}

/// What the voice engine needs from the chat platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Guilds the bot is currently a member of.
    fn guilds(&self) -> Vec<GuildId>;

    /// Everyone currently connected to a voice channel of the guild.
    async fn voice_roster(&self, guild: GuildId) -> Result<Vec<VoicePresence>>;

    /// Sends a direct message. May fail if the member closed their DMs.
    async fn notify(&self, user: UserId, message: String) -> Result<()>;
}

/// Reads voice states from serenity's cache and sends DMs over http.
pub struct DiscordGateway {
    cache: Arc<Cache>,
    http: Arc<Http>,
}

impl DiscordGateway {
    pub fn new(cache: Arc<Cache>, http: Arc<Http>) -> Self {
        Self { cache, http }
    }
}

#[async_trait]
impl Gateway for DiscordGateway {
    fn guilds(&self) -> Vec<GuildId> {
        self.cache.guilds()
    }

    async fn voice_roster(&self, guild_id: GuildId) -> Result<Vec<VoicePresence>> {
        let guild = self
            .cache
            .guild(guild_id)
            .with_context(|| format!("Guild {} is not cached.", guild_id))?;

        let roster = guild
            .voice_states
            .values()
            .filter_map(|state| {
                let channel = state.channel_id?;
                let bot = guild
                    .members
                    .get(&state.user_id)
                    .or(state.member.as_ref())
                    .map(|member| member.user.bot)
                    .unwrap_or(false);

                Some(VoicePresence {
                    user: state.user_id,
                    channel,
                    bot,
                    flags: Some(VoiceFlags::from(state)),
                })
            })
            .collect();

        Ok(roster)
    }

    async fn notify(&self, user: UserId, message: String) -> Result<()> {
        user.direct_message(&self.http, CreateMessage::new().content(message))
            .await
            .with_context(|| format!("Failed to message {}", user))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence(flags: Option<VoiceFlags>) -> VoicePresence {
        VoicePresence {
            user: UserId::new(1),
            channel: ChannelId::new(2),
            bot: false,
            flags,
        }
    }

    #[test]
    fn any_flag_mutes() {
        assert!(!presence(Some(VoiceFlags::default())).effectively_muted());

        for flags in [
            VoiceFlags { self_mute: true, ..Default::default() },
            VoiceFlags { self_deaf: true, ..Default::default() },
            VoiceFlags { mute: true, ..Default::default() },
            VoiceFlags { deaf: true, ..Default::default() },
        ] {
            assert!(presence(Some(flags)).effectively_muted(), "{:?}", flags);
        }
    }

    #[test]
    fn missing_voice_state_counts_as_muted() {
        assert!(presence(None).effectively_muted());
    }
}
