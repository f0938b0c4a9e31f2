use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Explains what this bot is about.
#[poise::command(slash_command, prefix_command)]
pub async fn about(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let voice = data
        .voice_config
        .tunables(data.store.as_ref(), ctx.guild_id())
        .await?;

    let embed = serenity::CreateEmbed::new()
        .title(format!("Aura Bot v{}", VERSION))
        .description(
            serenity::MessageBuilder::new()
                .push("Earn points by hanging out in voice, claiming daily and trying your luck at the gacha.")
                .build(),
        )
        .field(
            "Voice",
            format!(
                "+{} points every {} minutes unmuted",
                voice.reward_points, voice.reward_minutes
            ),
            true,
        )
        .field(
            "Gacha",
            format!("{} possible rewards", data.economy.catalog().rewards().len()),
            true,
        )
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Copyright © {}",
            chrono::Utc::now().format("%Y")
        )));

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
