use crate::{
    gacha::{default_rewards, Reward},
    utils::RetryPolicy,
};
use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

const FILENAME: &str = "settings.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Discord's bot token
    pub token: String,
    /// Discord account id which owns the bot
    pub owner: u64,
    /// Command prefix
    pub prefix: String,
    /// Where points are stored. `memory` keeps them in process.
    pub database_url: String,
    /// Minimum level written to the logs.
    pub log_level: String,
    /// Daily claims reset at midnight of this UTC offset.
    pub timezone_offset_hours: i32,
    pub voice: VoiceSettings,
    pub economy: EconomySettings,
    /// Gacha prizes and their rates.
    pub gacha: Vec<Reward>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Minutes between voice ticks, each tick accounts this many minutes.
    pub check_every_minutes: u32,
    pub reward_minutes: u32,
    pub reward_points: i64,
    pub mute_limit_minutes: u32,
    /// How long guild voice settings are cached.
    pub cache_ttl_seconds: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomySettings {
    pub daily_amount: i64,
    pub roll_cost: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token: String::from("DISCORD_BOT_TOKEN_HERE"),
            owner: 999999999,
            prefix: String::from("!"),
            database_url: String::from("sqlite://aura.db"),
            log_level: String::from("info"),
            timezone_offset_hours: 7,
            voice: VoiceSettings::default(),
            economy: EconomySettings::default(),
            gacha: default_rewards(),
        }
    }
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            check_every_minutes: 1,
            reward_minutes: 60,
            reward_points: 10,
            mute_limit_minutes: 30,
            cache_ttl_seconds: 30,
            retry_attempts: 3,
            retry_backoff_ms: 250,
        }
    }
}

impl Default for EconomySettings {
    fn default() -> Self {
        Self {
            daily_amount: 10,
            roll_cost: 10,
        }
    }
}

impl VoiceSettings {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.check_every_minutes.max(1)) * 60)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

impl Settings {
    pub fn path() -> PathBuf {
        PathBuf::from(std::env::var("BOT_SETTINGS").unwrap_or_else(|_| FILENAME.to_string()))
    }

    pub fn new() -> Result<Self, ConfigError> {
        let settings_path = Self::path();

        Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name(&settings_path.to_string_lossy()))
            // Add in settings from the environment (with a prefix of BOT)
            // Eg.. `BOT_TOKEN=abc` sets `token`, `BOT_VOICE__REWARD_POINTS=5` sets `voice.reward_points`
            .add_source(
                Environment::with_prefix("BOT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            // Deserialize entire configuration
            .try_deserialize()
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.timezone_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    pub async fn save(&self) -> Result<()> {
        self.save_to(&Self::path()).await
    }

    async fn save_to(&self, settings_path: &Path) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        if let Some(parent) = settings_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = tokio::fs::File::create(settings_path)
            .await
            .with_context(|| format!("Failed to create {}", settings_path.display()))?;
        file.write_all(
            serde_yaml::to_string(&self)
                .context("Failed to serialize settings")?
                .as_bytes(),
        )
        .await?;
        file.sync_all().await?;
        Ok(())
    }
}
