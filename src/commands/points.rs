use super::utils::{guild, MAX_POINTS};
use crate::{
    discord::{Context, Error},
    economy::Adjustment,
};
use poise::serenity_prelude::{self as serenity, Mentionable};

/// Shows how many points you have.
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn points(ctx: Context<'_>) -> Result<(), Error> {
    let guild = guild(ctx)?;
    let points = ctx.data().economy.balance(guild, ctx.author().id).await?;

    ctx.say(format!(
        "{} has **{}** points ✅",
        ctx.author().mention(),
        points
    ))
    .await?;
    Ok(())
}

/// Adds points to a member, a negative amount takes them away.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn givepoint(
    ctx: Context<'_>,
    #[description = "Member receiving the points"] member: serenity::User,
    #[description = "Points to add"]
    #[max = 1_000_000_000]
    amount: i64,
) -> Result<(), Error> {
    if !(-MAX_POINTS..=MAX_POINTS).contains(&amount) {
        ctx.say(format!("Give at most {} points at once.", MAX_POINTS))
            .await?;
        return Ok(());
    }

    let guild = guild(ctx)?;
    let outcome = ctx
        .data()
        .economy
        .give_points(guild, member.id, amount)
        .await?;

    let text = match outcome {
        Adjustment::Applied(change) => {
            log::info!(
                "{} gave {} points to {} in guild {}",
                ctx.author().name,
                amount,
                member.name,
                guild
            );
            format!(
                "Gave **{:+}** points to {}\nPoints: **{} → {}**",
                amount,
                member.mention(),
                change.before,
                change.after
            )
        }
        Adjustment::WouldBeNegative { balance } => format!(
            "{} only has **{}** points, that would go below zero.",
            member.mention(),
            balance
        ),
        Adjustment::WouldOverflow { balance } => format!(
            "{} already has **{}** points, that's too many to add to.",
            member.mention(),
            balance
        ),
    };
    ctx.say(text).await?;
    Ok(())
}

/// Sets the points of a member.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn setpoint(
    ctx: Context<'_>,
    #[description = "Member to update"] member: serenity::User,
    #[description = "New point total"]
    #[min = 0]
    #[max = 1_000_000_000]
    points: i64,
) -> Result<(), Error> {
    if points > MAX_POINTS {
        ctx.say(format!("Points can't exceed {}.", MAX_POINTS)).await?;
        return Ok(());
    }

    let guild = guild(ctx)?;
    let outcome = ctx
        .data()
        .economy
        .set_points(guild, member.id, points)
        .await?;

    let text = match outcome {
        Adjustment::Applied(change) => format!(
            "Set points of {}\nPoints: **{} → {}**",
            member.mention(),
            change.before,
            change.after
        ),
        Adjustment::WouldBeNegative { .. } => "Points can't be negative.".to_string(),
        Adjustment::WouldOverflow { .. } => "That's too many points.".to_string(),
    };
    ctx.say(text).await?;
    Ok(())
}
