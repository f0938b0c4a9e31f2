/// checks for permission to execute a specific command
mod checks;
/// All available discord commands
mod commands;
/// discord setup
mod discord;
/// Daily claims, gacha rolls and point adjustments
mod economy;
mod gacha;
mod logger;
/// Bot Settings
mod settings;
/// Persistence of points, settings and voice progress
mod store;
mod utils;
/// Voice presence rewards
mod voice;

use anyhow::{Context, Result};
use gacha::Catalog;
use settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = match Settings::new() {
        Ok(settings) => settings,
        Err(e) if Settings::path().exists() => {
            return Err(e).context("Failed to load settings.");
        }
        Err(_) => {
            Settings::default()
                .save()
                .await
                .context("Failed to save default config.")?;
            println!("Created default settings. Please fill out. Exiting...");
            std::process::exit(0);
        }
    };

    logger::init(settings.log_level())?;

    let catalog = Catalog::new(settings.gacha.clone()).context("Invalid gacha rewards.")?;
    let store = store::open(&settings.database_url)
        .await
        .context("Failed to open the database.")?;

    discord::run(settings, store, catalog)
        .await
        .context("Failed to start discord.")
}
