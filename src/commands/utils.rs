use crate::{
    discord::{Context, Error},
    store::Store,
    utils::parse_setting,
};
use poise::serenity_prelude::{ChannelId, GuildId, Http};

/// Upper bound of any point amount an admin can enter.
pub const MAX_POINTS: i64 = 1_000_000_000;

/// Guild the command was invoked in.
pub fn guild(ctx: Context<'_>) -> Result<GuildId, Error> {
    ctx.guild_id()
        .ok_or_else(|| "This command only works inside a server.".into())
}

/// Posts `text` to the log channel stored under `key`, if one is configured.
///
/// Failures are logged and otherwise ignored.
pub async fn post_log(http: &Http, store: &dyn Store, guild: GuildId, key: &str, text: String) {
    let channel = match store.setting(guild, key).await {
        Ok(raw) => parse_setting::<u64>(key, raw.as_deref())
            .filter(|id| *id != 0)
            .map(ChannelId::new),
        Err(e) => {
            log::warn!("Failed to read {} of guild {}: {}", key, guild, e);
            return;
        }
    };

    if let Some(channel) = channel {
        if let Err(e) = channel.say(http, text).await {
            log::warn!("Failed to post to log channel {}: {}", channel, e);
        }
    }
}
