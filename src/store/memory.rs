use super::{credit, BalanceChange, Result, Store, StoreError, VoiceProgress};
use chrono::{NaiveDate, Utc};
use linked_hash_set::LinkedHashSet;
use poise::serenity_prelude::{async_trait, ChannelId, GuildId, UserId};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Account {
    points: i64,
    last_daily: Option<NaiveDate>,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<(GuildId, UserId), Account>,
    settings: HashMap<GuildId, Vec<(String, String)>>,
    channels: HashMap<GuildId, LinkedHashSet<ChannelId>>,
    progress: HashMap<(GuildId, UserId), VoiceProgress>,
    faulty: HashSet<UserId>,
}

/// Keeps everything in process. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Makes every progress write of `user` fail as if the backend was unreachable.
    #[cfg(test)]
    pub async fn break_writes_for(&self, user: UserId) {
        self.inner.lock().await.faulty.insert(user);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn setting(&self, guild: GuildId, key: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .settings
            .get(&guild)
            .and_then(|settings| settings.iter().find(|(k, _)| k == key))
            .map(|(_, value)| value.clone()))
    }

    async fn set_setting(&self, guild: GuildId, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let settings = inner.settings.entry(guild).or_default();
        match settings.iter_mut().find(|(k, _)| k == key) {
            Some((_, old)) => *old = value.to_string(),
            None => settings.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }

    async fn settings(&self, guild: GuildId) -> Result<Vec<(String, String)>> {
        let inner = self.inner.lock().await;
        Ok(inner.settings.get(&guild).cloned().unwrap_or_default())
    }

    async fn tracked_channels(&self, guild: GuildId) -> Result<LinkedHashSet<ChannelId>> {
        let inner = self.inner.lock().await;
        Ok(inner.channels.get(&guild).cloned().unwrap_or_default())
    }

    async fn add_tracked_channel(&self, guild: GuildId, channel: ChannelId) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        Ok(inner.channels.entry(guild).or_default().insert(channel))
    }

    async fn remove_tracked_channel(&self, guild: GuildId, channel: ChannelId) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .channels
            .get_mut(&guild)
            .map(|channels| channels.remove(&channel))
            .unwrap_or(false))
    }

    async fn progress(&self, guild: GuildId, user: UserId) -> Result<VoiceProgress> {
        let mut inner = self.inner.lock().await;
        Ok(inner.progress.entry((guild, user)).or_default().clone())
    }

    async fn accruing_members(&self, guild: GuildId) -> Result<Vec<(UserId, VoiceProgress)>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .progress
            .iter()
            .filter(|((g, _), progress)| *g == guild && !progress.is_idle())
            .map(|((_, user), progress)| (*user, progress.clone()))
            .collect())
    }

    async fn commit_progress(
        &self,
        guild: GuildId,
        user: UserId,
        progress: &VoiceProgress,
        grant: i64,
    ) -> Result<BalanceChange> {
        let mut inner = self.inner.lock().await;
        if inner.faulty.contains(&user) {
            return Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut));
        }

        let before = inner
            .accounts
            .get(&(guild, user))
            .map(|account| account.points)
            .unwrap_or(0);
        let after = credit(before, grant)?;

        let mut progress = progress.clone();
        progress.last_update = Some(Utc::now());
        inner.progress.insert((guild, user), progress);
        inner.accounts.entry((guild, user)).or_default().points = after;

        Ok(BalanceChange { before, after })
    }

    async fn balance(&self, guild: GuildId, user: UserId) -> Result<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .accounts
            .get(&(guild, user))
            .map(|account| account.points)
            .unwrap_or(0))
    }

    async fn set_balance(&self, guild: GuildId, user: UserId, points: i64) -> Result<BalanceChange> {
        let mut inner = self.inner.lock().await;
        let account = inner.accounts.entry((guild, user)).or_default();
        let before = account.points;
        account.points = points;
        Ok(BalanceChange {
            before,
            after: points,
        })
    }

    async fn adjust_balance(
        &self,
        guild: GuildId,
        user: UserId,
        delta: i64,
    ) -> Result<Option<BalanceChange>> {
        let mut inner = self.inner.lock().await;
        let account = inner.accounts.entry((guild, user)).or_default();
        let before = account.points;
        let after = credit(before, delta)?;
        if after < 0 {
            return Ok(None);
        }
        account.points = after;
        Ok(Some(BalanceChange { before, after }))
    }

    async fn claim_daily(
        &self,
        guild: GuildId,
        user: UserId,
        day: NaiveDate,
        amount: i64,
    ) -> Result<Option<BalanceChange>> {
        let mut inner = self.inner.lock().await;
        let account = inner.accounts.entry((guild, user)).or_default();
        if account.last_daily == Some(day) {
            return Ok(None);
        }
        let before = account.points;
        let after = credit(before, amount)?;
        account.points = after;
        account.last_daily = Some(day);
        Ok(Some(BalanceChange { before, after }))
    }
}
