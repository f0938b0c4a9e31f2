use crate::{
    commands,
    economy::Economy,
    gacha::Catalog,
    settings::Settings,
    store::Store,
    voice::{ConfigCache, DiscordGateway, Tunables, VoiceEngine, VoiceTracker},
    Result,
};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Shared state of all commands, buttons and the voice tick.
pub struct Data {
    pub settings: Settings,
    pub store: Arc<dyn Store>,
    pub economy: Economy,
    /// Guild voice configs, invalidated by admin commands.
    pub voice_config: Arc<ConfigCache>,
    pub tracker: Mutex<VoiceTracker>,
}

impl Data {
    pub fn new(settings: Settings, store: Arc<dyn Store>, catalog: Catalog) -> Self {
        let economy = Economy::new(
            store.clone(),
            catalog,
            settings.economy.clone(),
            settings.utc_offset(),
        );
        let voice_config = Arc::new(ConfigCache::new(
            settings.voice.cache_ttl(),
            Tunables::from(&settings.voice),
        ));
        let tracker = Mutex::new(VoiceTracker::new(settings.voice.tick_period()));

        Self {
            settings,
            store,
            economy,
            voice_config,
            tracker,
        }
    }
}

pub async fn run(settings: Settings, store: Arc<dyn Store>, catalog: Catalog) -> Result<()> {
    let token = settings.token.clone();
    let prefix = settings.prefix.clone();
    let data = Data::new(settings, store, catalog);

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_VOICE_STATES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(prefix),
                case_insensitive_commands: true,
                ..Default::default()
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    log::info!(
                        "Got command '{}' by user '{}'",
                        ctx.command().qualified_name,
                        ctx.author().name
                    );
                })
            },
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                log::info!("Connected as {}", ready.user.name);
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                start_voice_tracking(ctx, &data).await;
                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await?;

    Ok(client.start().await?)
}

/// Starts the voice tick unless it is already running.
async fn start_voice_tracking(ctx: &serenity::Context, data: &Data) {
    let engine = VoiceEngine::new(
        data.store.clone(),
        Arc::new(DiscordGateway::new(ctx.cache.clone(), ctx.http.clone())),
        data.voice_config.clone(),
        &data.settings.voice,
    );

    if data.tracker.lock().await.start(engine) {
        log::info!(
            "Voice tracking started, ticking every {:?}.",
            data.settings.voice.tick_period()
        );
    }
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { .. } => {
            ctx.set_activity(Some(serenity::ActivityData::listening("voice chat")));
            // Restarts the tick loop if it died, no-op otherwise.
            start_voice_tracking(ctx, data).await;
        }
        serenity::FullEvent::Resume { .. } => {
            log::info!("Connection to discord resumed.");
        }
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => {
            commands::panels::handle_component(ctx, component, data).await?;
        }
        _ => {}
    }

    Ok(())
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            log::error!("Failed to setup the bot: {:?}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            log::error!(
                "Command '{}' failed: {}",
                ctx.command().qualified_name,
                error
            );
            let _ = ctx
                .send(
                    poise::CreateReply::default()
                        .content("Something went wrong. Please try again later.")
                        .ephemeral(true),
                )
                .await;
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                log::error!("Failed to handle error: {}", e);
            }
        }
    }
}
