//! Admin commands of the voice reward.
use super::utils::{guild, MAX_POINTS};
use crate::{
    discord::{Context, Error},
    store::keys,
};
use poise::serenity_prelude::{self as serenity, Mentionable};

/// Starts rewarding time spent in a voice channel.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn addvoicechannel(
    ctx: Context<'_>,
    #[description = "Voice channel to track"]
    #[channel_types("Voice", "Stage")]
    channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild = guild(ctx)?;
    let data = ctx.data();

    let added = data.store.add_tracked_channel(guild, channel.id).await?;
    data.voice_config.invalidate(guild);

    if added {
        log::info!("Tracking voice channel {} in guild {}", channel.id, guild);
        ctx.say(format!("Now tracking {} 🎧", channel.id.mention()))
            .await?;
    } else {
        ctx.say(format!("{} is already tracked.", channel.id.mention()))
            .await?;
    }
    Ok(())
}

/// Stops rewarding time spent in a voice channel.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn removevoicechannel(
    ctx: Context<'_>,
    #[description = "Voice channel to stop tracking"]
    #[channel_types("Voice", "Stage")]
    channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild = guild(ctx)?;
    let data = ctx.data();

    let removed = data.store.remove_tracked_channel(guild, channel.id).await?;
    data.voice_config.invalidate(guild);

    if removed {
        log::info!("Untracked voice channel {} in guild {}", channel.id, guild);
        ctx.say(format!("Stopped tracking {}.", channel.id.mention()))
            .await?;
    } else {
        ctx.say(format!("{} wasn't tracked.", channel.id.mention()))
            .await?;
    }
    Ok(())
}

/// Sets how many points are paid per block of voice minutes.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn setvoicereward(
    ctx: Context<'_>,
    #[description = "Minutes per reward"]
    #[min = 1]
    minutes: u32,
    #[description = "Points per reward"]
    #[min = 1]
    #[max = 1_000_000_000]
    points: i64,
) -> Result<(), Error> {
    if minutes == 0 || !(1..=MAX_POINTS).contains(&points) {
        ctx.say(format!(
            "Minutes must be above zero and points between 1 and {}.",
            MAX_POINTS
        ))
        .await?;
        return Ok(());
    }

    let guild = guild(ctx)?;
    let data = ctx.data();
    data.store
        .set_setting(guild, keys::VOICE_REWARD_MINUTES, &minutes.to_string())
        .await?;
    data.store
        .set_setting(guild, keys::VOICE_REWARD_POINTS, &points.to_string())
        .await?;
    data.voice_config.invalidate(guild);

    ctx.say(format!(
        "Voice now pays **+{}** points every **{}** minutes ✅",
        points, minutes
    ))
    .await?;
    Ok(())
}

/// Sets after how many muted minutes unrewarded voice time is lost.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn setmutelimit(
    ctx: Context<'_>,
    #[description = "Muted minutes allowed"]
    #[min = 1]
    minutes: u32,
) -> Result<(), Error> {
    if minutes == 0 {
        ctx.say("The mute limit must be above zero.").await?;
        return Ok(());
    }

    let guild = guild(ctx)?;
    let data = ctx.data();
    data.store
        .set_setting(guild, keys::VOICE_MUTE_LIMIT, &minutes.to_string())
        .await?;
    data.voice_config.invalidate(guild);

    ctx.say(format!(
        "Voice progress now resets after **{}** muted minutes ✅",
        minutes
    ))
    .await?;
    Ok(())
}

/// Shows the voice reward settings of this server.
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn voicesettings(ctx: Context<'_>) -> Result<(), Error> {
    let guild = guild(ctx)?;
    let data = ctx.data();
    let config = data.voice_config.load(data.store.as_ref(), guild).await?;
    let tunables = config.tunables;

    let mut channels = serenity::MessageBuilder::new();
    if config.channels.is_empty() {
        channels.push("None, voice time isn't rewarded yet.");
    }
    for channel in &config.channels {
        channels.mention(channel).push_line("");
    }

    let embed = serenity::CreateEmbed::new()
        .title("🎧 Voice rewards")
        .field(
            "Reward",
            format!(
                "+{} points every {} minutes",
                tunables.reward_points, tunables.reward_minutes
            ),
            true,
        )
        .field(
            "Mute limit",
            format!("{} minutes", tunables.mute_limit_minutes),
            true,
        )
        .field("Tracked channels", channels.build(), false);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
