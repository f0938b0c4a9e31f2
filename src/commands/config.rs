use super::utils::{guild, MAX_POINTS};
use crate::{
    discord::{Context, Error},
    store::keys,
};
use poise::serenity_prelude::{self as serenity, Mentionable};

/// Sets how many points the daily claim pays.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn setdailyamount(
    ctx: Context<'_>,
    #[description = "Points per daily claim"]
    #[min = 0]
    #[max = 1_000_000_000]
    amount: i64,
) -> Result<(), Error> {
    if !(0..=MAX_POINTS).contains(&amount) {
        ctx.say(format!("The daily amount must be between 0 and {}.", MAX_POINTS))
            .await?;
        return Ok(());
    }

    let guild = guild(ctx)?;
    ctx.data()
        .store
        .set_setting(guild, keys::DAILY_AMOUNT, &amount.to_string())
        .await?;
    ctx.say(format!("Daily claim now pays **{}** points ✅", amount))
        .await?;
    Ok(())
}

/// Sets how many points a gacha roll costs.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn setrollcost(
    ctx: Context<'_>,
    #[description = "Points per roll"]
    #[min = 0]
    #[max = 1_000_000_000]
    cost: i64,
) -> Result<(), Error> {
    if !(0..=MAX_POINTS).contains(&cost) {
        ctx.say(format!("The roll cost must be between 0 and {}.", MAX_POINTS))
            .await?;
        return Ok(());
    }

    let guild = guild(ctx)?;
    ctx.data()
        .store
        .set_setting(guild, keys::ROLL_COST, &cost.to_string())
        .await?;
    ctx.say(format!("A roll now costs **{}** points ✅", cost))
        .await?;
    Ok(())
}

/// Restricts the roll button to one channel. Leave the channel out to allow any.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn setrollchannel(
    ctx: Context<'_>,
    #[description = "Channel where rolling is allowed"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    set_channel(ctx, keys::ROLL_CHANNEL, "Rolling", channel).await
}

/// Sets where daily claims are logged. Leave the channel out to stop logging.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn setdailylogchannel(
    ctx: Context<'_>,
    #[description = "Log channel"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    set_channel(ctx, keys::DAILY_LOG_CHANNEL, "Daily claim logs", channel).await
}

/// Sets where gacha results are logged. Leave the channel out to stop logging.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn setgachalogchannel(
    ctx: Context<'_>,
    #[description = "Log channel"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    set_channel(ctx, keys::GACHA_LOG_CHANNEL, "Gacha logs", channel).await
}

/// Stores a channel setting, `0` stands for unset.
async fn set_channel(
    ctx: Context<'_>,
    key: &str,
    what: &str,
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild = guild(ctx)?;
    let value = channel.as_ref().map(|c| c.id.get()).unwrap_or(0);
    ctx.data()
        .store
        .set_setting(guild, key, &value.to_string())
        .await?;

    match channel {
        Some(channel) => {
            ctx.say(format!("{} go to {} ✅", what, channel.id.mention()))
                .await?
        }
        None => ctx.say(format!("{} are unrestricted now.", what)).await?,
    };
    Ok(())
}
