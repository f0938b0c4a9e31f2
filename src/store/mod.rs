//! Persistence backends for points, guild settings and voice progress.
mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, NaiveDate, Utc};
use linked_hash_set::LinkedHashSet;
use poise::serenity_prelude::{async_trait, ChannelId, GuildId, UserId};
use std::sync::Arc;
use thiserror::Error;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Names of the per guild settings.
pub mod keys {
    pub const VOICE_REWARD_MINUTES: &str = "voice_reward_minutes";
    pub const VOICE_REWARD_POINTS: &str = "voice_reward_points";
    pub const VOICE_MUTE_LIMIT: &str = "voice_mute_limit_min";
    pub const DAILY_AMOUNT: &str = "daily_amount";
    pub const ROLL_COST: &str = "roll_cost";
    pub const ROLL_CHANNEL: &str = "roll_channel_id";
    pub const DAILY_LOG_CHANNEL: &str = "daily_log_channel_id";
    pub const GACHA_LOG_CHANNEL: &str = "gacha_log_channel_id";
    pub const DAILY_IMAGE: &str = "daily_image_url";
    pub const GACHA_IMAGE: &str = "gacha_image_url";
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection level failure which is worth retrying.
    #[error("storage unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
    #[error("storage query failed: {0}")]
    Backend(#[source] sqlx::Error),
    #[error("corrupt {what} in storage: {value}")]
    Corrupt { what: &'static str, value: String },
    /// Sent, but whether it was applied is unknown. Never retried.
    #[error("commit outcome unknown: {0}")]
    Unconfirmed(#[source] sqlx::Error),
    #[error("{what} out of range")]
    Overflow { what: &'static str },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e),
            // SQLITE_BUSY / SQLITE_LOCKED
            sqlx::Error::Database(db) if matches!(db.code().as_deref(), Some("5") | Some("6")) => {
                StoreError::Unavailable(e)
            }
            _ => StoreError::Backend(e),
        }
    }
}

/// Voice accrual of a single member in a single guild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceProgress {
    /// Qualifying minutes since the last payout or reset.
    pub active_units: u32,
    /// Consecutive minutes spent muted or deafened.
    pub muted_streak_units: u32,
    /// Tracked channel the member was last seen in.
    pub channel: Option<ChannelId>,
    /// Last write, diagnostic only.
    pub last_update: Option<DateTime<Utc>>,
}

impl VoiceProgress {
    pub fn is_idle(&self) -> bool {
        self.active_units == 0 && self.muted_streak_units == 0 && self.channel.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub before: i64,
    pub after: i64,
}

impl BalanceChange {
    pub fn unchanged(points: i64) -> Self {
        Self {
            before: points,
            after: points,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn setting(&self, guild: GuildId, key: &str) -> Result<Option<String>>;

    async fn set_setting(&self, guild: GuildId, key: &str, value: &str) -> Result<()>;

    /// Every stored setting of a guild.
    async fn settings(&self, guild: GuildId) -> Result<Vec<(String, String)>>;

    async fn tracked_channels(&self, guild: GuildId) -> Result<LinkedHashSet<ChannelId>>;

    /// Returns false if the channel was already tracked.
    async fn add_tracked_channel(&self, guild: GuildId, channel: ChannelId) -> Result<bool>;

    /// Returns false if the channel wasn't tracked.
    async fn remove_tracked_channel(&self, guild: GuildId, channel: ChannelId) -> Result<bool>;

    /// Voice progress of a member, created with zeroes on first access.
    async fn progress(&self, guild: GuildId, user: UserId) -> Result<VoiceProgress>;

    /// Members whose stored progress is not idle.
    async fn accruing_members(&self, guild: GuildId) -> Result<Vec<(UserId, VoiceProgress)>>;

    /// Writes the progress and credits `grant` points as one unit.
    async fn commit_progress(
        &self,
        guild: GuildId,
        user: UserId,
        progress: &VoiceProgress,
        grant: i64,
    ) -> Result<BalanceChange>;

    async fn balance(&self, guild: GuildId, user: UserId) -> Result<i64>;

    async fn set_balance(&self, guild: GuildId, user: UserId, points: i64) -> Result<BalanceChange>;

    /// Adds `delta` points. Returns `None` without writing if the balance would drop below zero.
    async fn adjust_balance(
        &self,
        guild: GuildId,
        user: UserId,
        delta: i64,
    ) -> Result<Option<BalanceChange>>;

    /// Credits the daily reward unless it was already claimed on `day`.
    async fn claim_daily(
        &self,
        guild: GuildId,
        user: UserId,
        day: NaiveDate,
        amount: i64,
    ) -> Result<Option<BalanceChange>>;
}

/// Opens the backend named by `database_url`. `memory` keeps everything in process.
pub async fn open(database_url: &str) -> anyhow::Result<Arc<dyn Store>> {
    if database_url == "memory" {
        log::warn!("Using in-memory storage. Points will be lost on restart!");
        return Ok(Arc::new(MemoryStore::default()));
    }

    Ok(Arc::new(SqliteStore::connect(database_url).await?))
}

/// Adds `delta` points to `balance`.
fn credit(balance: i64, delta: i64) -> Result<i64> {
    balance
        .checked_add(delta)
        .ok_or(StoreError::Overflow { what: "balance" })
}

fn to_id(raw: i64, what: &'static str) -> Result<u64> {
    u64::try_from(raw)
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| StoreError::Corrupt {
            what,
            value: raw.to_string(),
        })
}
