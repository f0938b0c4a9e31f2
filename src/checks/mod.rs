use crate::discord::Context;
use crate::discord::Error;

/// Checks whether the user administrates the guild or owns the bot.
pub async fn is_admin(ctx: Context<'_>) -> Result<bool, Error> {
    if ctx.data().settings.owner == ctx.author().id.get() {
        return Ok(true);
    }

    let administrator = match ctx.author_member().await {
        // Interaction members carry their resolved permissions, prefix commands need the cache.
        Some(member) => member
            .permissions
            .or_else(|| ctx.guild().map(|guild| guild.member_permissions(&member)))
            .map(|permissions| permissions.administrator())
            .unwrap_or(false),
        None => false,
    };

    if administrator {
        Ok(true)
    } else {
        ctx.send(
            poise::CreateReply::default()
                .content("You need to be an Admin to execute this command.")
                .ephemeral(true),
        )
        .await?;
        Ok(false)
    }
}
