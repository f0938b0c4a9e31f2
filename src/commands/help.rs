use crate::discord::{Context, Error};

/// Shows the available commands.
#[poise::command(slash_command, prefix_command, track_edits)]
pub async fn help(
    ctx: Context<'_>,
    #[description = "Command to explain"]
    #[autocomplete = "poise::builtins::autocomplete_command"]
    command: Option<String>,
) -> Result<(), Error> {
    poise::builtins::help(
        ctx,
        command.as_deref(),
        poise::builtins::HelpConfiguration {
            extra_text_at_bottom: "Voice time, daily claims and the gacha all pay out in points.",
            ephemeral: true,
            ..Default::default()
        },
    )
    .await?;
    Ok(())
}
