//! Daily and gacha panels and their persistent buttons.
use super::utils::{guild, post_log};
use crate::{
    discord::{Context, Data, Error},
    economy::{DailyOutcome, RollOutcome},
    store::keys,
};
use poise::serenity_prelude::{self as serenity, Mentionable};

const DAILY_BUTTON: &str = "aura:daily";
const ROLL_BUTTON: &str = "aura:roll";
const POINTS_BUTTON: &str = "aura:checkpoints";

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum Panel {
    Daily,
    Gacha,
}

impl Panel {
    fn label(self) -> &'static str {
        match self {
            Panel::Daily => "daily",
            Panel::Gacha => "gacha",
        }
    }

    fn image_key(self) -> &'static str {
        match self {
            Panel::Daily => keys::DAILY_IMAGE,
            Panel::Gacha => keys::GACHA_IMAGE,
        }
    }
}

/// Posts the daily claim panel in this channel.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn setupdaily(ctx: Context<'_>) -> Result<(), Error> {
    let guild = guild(ctx)?;
    let data = ctx.data();
    let amount = data.economy.daily_amount(guild).await?;

    let mut embed = serenity::CreateEmbed::new()
        .title("🟩 DAILY CLAIM")
        .description(format!(
            "Press the button once a day to receive **+{}** points.",
            amount
        ))
        .colour(serenity::Colour::DARK_GREEN);
    if let Some(url) = panel_image(data, guild, Panel::Daily).await? {
        embed = embed.image(url);
    }

    let buttons = serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(DAILY_BUTTON)
            .label("Claim daily")
            .emoji('✅')
            .style(serenity::ButtonStyle::Success),
        points_button(),
    ]);

    ctx.send(
        poise::CreateReply::default()
            .embed(embed)
            .components(vec![buttons]),
    )
    .await?;
    Ok(())
}

/// Posts the gacha panel in this channel.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn setupgacha(ctx: Context<'_>) -> Result<(), Error> {
    let guild = guild(ctx)?;
    let data = ctx.data();
    let cost = data.economy.roll_cost(guild).await?;

    let mut rates = serenity::MessageBuilder::new();
    for reward in data.economy.catalog().rewards() {
        rates.push_bold_safe(reward.name.as_str()).push_line(format!(" {}%", reward.rate));
    }

    let mut embed = serenity::CreateEmbed::new()
        .title("🎲 AURA GACHA")
        .description(format!("Each roll costs **{}** points.", cost))
        .field("Rates", rates.build(), false)
        .colour(serenity::Colour::PURPLE);
    if let Some(url) = panel_image(data, guild, Panel::Gacha).await? {
        embed = embed.image(url);
    }

    let buttons = serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(ROLL_BUTTON)
            .label("Roll")
            .emoji('🎲')
            .style(serenity::ButtonStyle::Primary),
        points_button(),
    ]);

    ctx.send(
        poise::CreateReply::default()
            .embed(embed)
            .components(vec![buttons]),
    )
    .await?;
    Ok(())
}

/// Sets the image shown on a panel. Leave the url out to remove it.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    check = "crate::checks::is_admin"
)]
pub async fn setimage(
    ctx: Context<'_>,
    #[description = "Panel to change"] panel: Panel,
    #[description = "Image url"] url: Option<String>,
) -> Result<(), Error> {
    let guild = guild(ctx)?;
    let url = url.unwrap_or_default();

    if !url.is_empty() && !url.starts_with("https://") && !url.starts_with("http://") {
        ctx.say("That doesn't look like an image url.").await?;
        return Ok(());
    }

    ctx.data()
        .store
        .set_setting(guild, panel.image_key(), &url)
        .await?;

    if url.is_empty() {
        ctx.say(format!("Removed the {} panel image.", panel.label())).await?;
    } else {
        ctx.say(format!(
            "Updated the {} panel image. Post the panel again to show it.",
            panel.label()
        ))
        .await?;
    }
    Ok(())
}

fn points_button() -> serenity::CreateButton {
    serenity::CreateButton::new(POINTS_BUTTON)
        .label("My points")
        .emoji('💰')
        .style(serenity::ButtonStyle::Secondary)
}

async fn panel_image(data: &Data, guild: serenity::GuildId, panel: Panel) -> Result<Option<String>, Error> {
    Ok(data
        .store
        .setting(guild, panel.image_key())
        .await?
        .filter(|url| !url.is_empty()))
}

/// Answers presses of the panel buttons.
///
/// Buttons outlive restarts, so they are matched by custom id instead of
/// being collected by the command that posted them.
pub async fn handle_component(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let Some(guild) = component.guild_id else {
        return Ok(());
    };
    let user = component.user.id;

    let (reply, log) = match component.data.custom_id.as_str() {
        DAILY_BUTTON => daily(data, guild, user).await?,
        ROLL_BUTTON => roll(data, guild, user, component.channel_id).await?,
        POINTS_BUTTON => {
            let balance = data.economy.balance(guild, user).await?;
            (format!("You have **{}** points ✅", balance), None)
        }
        _ => return Ok(()),
    };

    component
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content(reply)
                    .ephemeral(true),
            ),
        )
        .await?;

    if let Some((key, text)) = log {
        post_log(&ctx.http, data.store.as_ref(), guild, key, text).await;
    }
    Ok(())
}

type Reply = (String, Option<(&'static str, String)>);

async fn daily(data: &Data, guild: serenity::GuildId, user: serenity::UserId) -> Result<Reply, Error> {
    Ok(match data.economy.claim_daily(guild, user).await? {
        DailyOutcome::Claimed { amount, change } => (
            format!(
                "Daily claimed ✅ +{} points\nPoints: **{} → {}**",
                amount, change.before, change.after
            ),
            Some((
                keys::DAILY_LOG_CHANNEL,
                format!(
                    "🟩 **DAILY CLAIM**\n👤 Player: {}\n➕ Received: +{} points\n📊 Points: {} → {}",
                    user.mention(),
                    amount,
                    change.before,
                    change.after
                ),
            )),
        ),
        DailyOutcome::AlreadyClaimed { balance } => (
            format!(
                "You already claimed today 😆 Come back tomorrow.\nPoints: **{}**",
                balance
            ),
            None,
        ),
    })
}

async fn roll(
    data: &Data,
    guild: serenity::GuildId,
    user: serenity::UserId,
    channel: serenity::ChannelId,
) -> Result<Reply, Error> {
    Ok(match data.economy.roll_gacha(guild, user, channel).await? {
        RollOutcome::Rolled {
            reward,
            cost,
            change,
        } => (
            format!(
                "🎉 You won: **{}**\n💰 Points left: **{}**\n\n📸 Take a screenshot of this result as proof to claim your reward.",
                reward.name, change.after
            ),
            Some((
                keys::GACHA_LOG_CHANNEL,
                format!(
                    "🎲 **AURA GACHA**\n👤 Player: {}\n🎁 Reward: **{}**\n💸 Spent: -{} points\n📊 Points: {} → {}",
                    user.mention(),
                    reward.name,
                    cost,
                    change.before,
                    change.after
                ),
            )),
        ),
        RollOutcome::Insufficient { balance, cost } => (
            format!(
                "Not enough points 😅 A roll costs **{}** points.\nYou have: **{}**",
                cost, balance
            ),
            None,
        ),
        RollOutcome::WrongChannel { expected } => (
            format!("Rolling only works in {} 💜", expected.mention()),
            None,
        ),
    })
}
