use super::{credit, to_id, BalanceChange, Result, Store, StoreError, VoiceProgress};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use linked_hash_set::LinkedHashSet;
use poise::serenity_prelude::{async_trait, ChannelId, GuildId, UserId};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, SqliteConnection, SqlitePool,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// File backed storage on top of SQLite.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = url
            .parse::<SqliteConnectOptions>()
            .with_context(|| format!("Invalid database url '{}'", url))?
            .create_if_missing(true);

        // Every connection to an in-memory database sees its own database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to open database.")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to migrate database.")?;

        log::info!("Connected to database at {}", url);

        Ok(Self { pool })
    }
}

fn key(id: u64) -> i64 {
    id as i64
}

fn units(raw: i64, what: &'static str) -> Result<u32> {
    u32::try_from(raw).map_err(|_| StoreError::Corrupt {
        what,
        value: raw.to_string(),
    })
}

fn progress_from_row(row: &SqliteRow) -> Result<VoiceProgress> {
    let channel: Option<i64> = row.try_get("channel_id")?;
    let last_tick: Option<String> = row.try_get("last_tick_utc")?;

    Ok(VoiceProgress {
        active_units: units(row.try_get("active_minutes")?, "active minutes")?,
        muted_streak_units: units(row.try_get("muted_streak_minutes")?, "muted streak")?,
        channel: channel
            .map(|raw| to_id(raw, "channel id").map(ChannelId::new))
            .transpose()?,
        last_update: last_tick
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|time| time.with_timezone(&Utc)),
    })
}

/// Points and last daily claim of an account, if it exists.
async fn account(
    conn: &mut SqliteConnection,
    guild: GuildId,
    user: UserId,
) -> Result<Option<(i64, Option<NaiveDate>)>> {
    let row = sqlx::query("SELECT points, last_daily FROM users WHERE guild_id = ? AND user_id = ?")
        .bind(key(guild.get()))
        .bind(key(user.get()))
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let last_daily: Option<String> = row.try_get("last_daily")?;
            let last_daily = last_daily.and_then(|raw| {
                NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                    .map_err(|e| log::warn!("Ignoring unreadable daily date '{}': {}", raw, e))
                    .ok()
            });
            Ok(Some((row.try_get("points")?, last_daily)))
        }
        None => Ok(None),
    }
}

async fn write_points(
    conn: &mut SqliteConnection,
    guild: GuildId,
    user: UserId,
    points: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (guild_id, user_id, points) VALUES (?, ?, ?)
         ON CONFLICT(guild_id, user_id) DO UPDATE SET points = excluded.points",
    )
    .bind(key(guild.get()))
    .bind(key(user.get()))
    .bind(points)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn setting(&self, guild: GuildId, name: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM settings WHERE guild_id = ? AND key = ?")
            .bind(key(guild.get()))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_setting(&self, guild: GuildId, name: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (guild_id, key, value) VALUES (?, ?, ?)
             ON CONFLICT(guild_id, key) DO UPDATE SET value = excluded.value",
        )
        .bind(key(guild.get()))
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn settings(&self, guild: GuildId) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query_as("SELECT key, value FROM settings WHERE guild_id = ? ORDER BY key")
            .bind(key(guild.get()))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn tracked_channels(&self, guild: GuildId) -> Result<LinkedHashSet<ChannelId>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT channel_id FROM voice_channels WHERE guild_id = ? ORDER BY rowid")
                .bind(key(guild.get()))
                .fetch_all(&self.pool)
                .await?;

        ids.into_iter()
            .map(|raw| to_id(raw, "channel id").map(ChannelId::new))
            .collect()
    }

    async fn add_tracked_channel(&self, guild: GuildId, channel: ChannelId) -> Result<bool> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO voice_channels (guild_id, channel_id) VALUES (?, ?)")
                .bind(key(guild.get()))
                .bind(key(channel.get()))
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_tracked_channel(&self, guild: GuildId, channel: ChannelId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM voice_channels WHERE guild_id = ? AND channel_id = ?")
            .bind(key(guild.get()))
            .bind(key(channel.get()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn progress(&self, guild: GuildId, user: UserId) -> Result<VoiceProgress> {
        sqlx::query("INSERT OR IGNORE INTO voice_progress (guild_id, user_id) VALUES (?, ?)")
            .bind(key(guild.get()))
            .bind(key(user.get()))
            .execute(&self.pool)
            .await?;

        let row = sqlx::query(
            "SELECT channel_id, active_minutes, muted_streak_minutes, last_tick_utc
             FROM voice_progress WHERE guild_id = ? AND user_id = ?",
        )
        .bind(key(guild.get()))
        .bind(key(user.get()))
        .fetch_one(&self.pool)
        .await?;

        progress_from_row(&row)
    }

    async fn accruing_members(&self, guild: GuildId) -> Result<Vec<(UserId, VoiceProgress)>> {
        let rows = sqlx::query(
            "SELECT user_id, channel_id, active_minutes, muted_streak_minutes, last_tick_utc
             FROM voice_progress
             WHERE guild_id = ?
               AND (active_minutes != 0 OR muted_streak_minutes != 0 OR channel_id IS NOT NULL)",
        )
        .bind(key(guild.get()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let user = to_id(row.try_get("user_id")?, "user id")?;
                Ok((UserId::new(user), progress_from_row(row)?))
            })
            .collect()
    }

    async fn commit_progress(
        &self,
        guild: GuildId,
        user: UserId,
        progress: &VoiceProgress,
        grant: i64,
    ) -> Result<BalanceChange> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO voice_progress
                (guild_id, user_id, channel_id, active_minutes, muted_streak_minutes, last_tick_utc)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(guild_id, user_id) DO UPDATE SET
                channel_id = excluded.channel_id,
                active_minutes = excluded.active_minutes,
                muted_streak_minutes = excluded.muted_streak_minutes,
                last_tick_utc = excluded.last_tick_utc",
        )
        .bind(key(guild.get()))
        .bind(key(user.get()))
        .bind(progress.channel.map(|channel| key(channel.get())))
        .bind(i64::from(progress.active_units))
        .bind(i64::from(progress.muted_streak_units))
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let before = account(&mut tx, guild, user)
            .await?
            .map(|(points, _)| points)
            .unwrap_or(0);
        let change = if grant != 0 {
            let after = credit(before, grant)?;
            write_points(&mut tx, guild, user, after).await?;
            BalanceChange { before, after }
        } else {
            BalanceChange::unchanged(before)
        };

        // The grant may have landed even if this fails, a retry could pay it twice.
        tx.commit().await.map_err(StoreError::Unconfirmed)?;
        Ok(change)
    }

    async fn balance(&self, guild: GuildId, user: UserId) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Ok(account(&mut conn, guild, user)
            .await?
            .map(|(points, _)| points)
            .unwrap_or(0))
    }

    async fn set_balance(&self, guild: GuildId, user: UserId, points: i64) -> Result<BalanceChange> {
        let mut tx = self.pool.begin().await?;
        let before = account(&mut tx, guild, user)
            .await?
            .map(|(points, _)| points)
            .unwrap_or(0);
        write_points(&mut tx, guild, user, points).await?;
        tx.commit().await?;

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
        let mut tx = self.pool.begin().await?;
        let before = account(&mut tx, guild, user)
            .await?
            .map(|(points, _)| points)
            .unwrap_or(0);
        let after = credit(before, delta)?;
        if after < 0 {
            return Ok(None);
        }
        write_points(&mut tx, guild, user, after).await?;
        tx.commit().await?;

        Ok(Some(BalanceChange { before, after }))
    }

    async fn claim_daily(
        &self,
        guild: GuildId,
        user: UserId,
        day: NaiveDate,
        amount: i64,
    ) -> Result<Option<BalanceChange>> {
        let mut tx = self.pool.begin().await?;
        let (before, last_daily) = account(&mut tx, guild, user).await?.unwrap_or((0, None));
        if last_daily == Some(day) {
            return Ok(None);
        }
        let after = credit(before, amount)?;

        sqlx::query(
            "INSERT INTO users (guild_id, user_id, points, last_daily) VALUES (?, ?, ?, ?)
             ON CONFLICT(guild_id, user_id) DO UPDATE SET
                points = excluded.points,
                last_daily = excluded.last_daily",
        )
        .bind(key(guild.get()))
        .bind(key(user.get()))
        .bind(after)
        .bind(day.format(DATE_FORMAT).to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(BalanceChange { before, after }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: GuildId = GuildId::new(10);
    const USER: UserId = UserId::new(20);

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn progress_is_created_with_zeroes() {
        let store = store().await;

        let progress = store.progress(GUILD, USER).await.unwrap();

        assert_eq!(progress.active_units, 0);
        assert_eq!(progress.muted_streak_units, 0);
        assert_eq!(progress.channel, None);
        assert!(store.accruing_members(GUILD).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn committed_grant_updates_progress_and_points_together() {
        let store = store().await;
        store.set_balance(GUILD, USER, 5).await.unwrap();

        let progress = VoiceProgress {
            active_units: 3,
            channel: Some(ChannelId::new(30)),
            ..Default::default()
        };
        let change = store.commit_progress(GUILD, USER, &progress, 10).await.unwrap();

        assert_eq!(change, BalanceChange { before: 5, after: 15 });
        assert_eq!(store.balance(GUILD, USER).await.unwrap(), 15);

        let stored = store.progress(GUILD, USER).await.unwrap();
        assert_eq!(stored.active_units, 3);
        assert_eq!(stored.channel, Some(ChannelId::new(30)));
        assert!(stored.last_update.is_some());

        let accruing = store.accruing_members(GUILD).await.unwrap();
        assert_eq!(accruing.len(), 1);
        assert_eq!(accruing[0].0, USER);
    }

    #[tokio::test]
    async fn debit_below_zero_is_rejected() {
        let store = store().await;
        store.set_balance(GUILD, USER, 4).await.unwrap();

        assert_eq!(store.adjust_balance(GUILD, USER, -10).await.unwrap(), None);
        assert_eq!(store.balance(GUILD, USER).await.unwrap(), 4);

        let change = store.adjust_balance(GUILD, USER, -4).await.unwrap();
        assert_eq!(change, Some(BalanceChange { before: 4, after: 0 }));
    }

    #[tokio::test]
    async fn overflowing_grant_rolls_back_progress() {
        let store = store().await;
        store.set_balance(GUILD, USER, i64::MAX - 5).await.unwrap();

        let progress = VoiceProgress {
            active_units: 3,
            channel: Some(ChannelId::new(30)),
            ..Default::default()
        };
        let err = store
            .commit_progress(GUILD, USER, &progress, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Overflow { .. }));
        assert_eq!(store.balance(GUILD, USER).await.unwrap(), i64::MAX - 5);
        assert_eq!(store.progress(GUILD, USER).await.unwrap().active_units, 0);
    }

    #[tokio::test]
    async fn daily_is_claimed_once_per_day() {
        let store = store().await;
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

        let first = store.claim_daily(GUILD, USER, day, 10).await.unwrap();
        let second = store.claim_daily(GUILD, USER, day, 10).await.unwrap();
        let next_day = store
            .claim_daily(GUILD, USER, day.succ_opt().unwrap(), 10)
            .await
            .unwrap();

        assert_eq!(first, Some(BalanceChange { before: 0, after: 10 }));
        assert_eq!(second, None);
        assert_eq!(next_day, Some(BalanceChange { before: 10, after: 20 }));
        assert_eq!(
            store
                .claim_daily(GUILD, USER, day.succ_opt().unwrap(), 10)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn tracked_channels_keep_insertion_order() {
        let store = store().await;

        assert!(store.add_tracked_channel(GUILD, ChannelId::new(3)).await.unwrap());
        assert!(store.add_tracked_channel(GUILD, ChannelId::new(1)).await.unwrap());
        assert!(!store.add_tracked_channel(GUILD, ChannelId::new(3)).await.unwrap());

        let channels: Vec<_> = store
            .tracked_channels(GUILD)
            .await
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(channels, vec![ChannelId::new(3), ChannelId::new(1)]);

        assert!(store.remove_tracked_channel(GUILD, ChannelId::new(3)).await.unwrap());
        assert!(!store.remove_tracked_channel(GUILD, ChannelId::new(3)).await.unwrap());
    }

    #[tokio::test]
    async fn settings_are_scoped_per_guild() {
        let store = store().await;
        store.set_setting(GUILD, "roll_cost", "15").await.unwrap();
        store.set_setting(GUILD, "roll_cost", "20").await.unwrap();

        assert_eq!(
            store.setting(GUILD, "roll_cost").await.unwrap().as_deref(),
            Some("20")
        );
        assert_eq!(store.setting(GuildId::new(11), "roll_cost").await.unwrap(), None);
    }
}
