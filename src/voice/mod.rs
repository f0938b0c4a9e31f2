//! Voice presence accounting.
//!
//! Once per tick every tracked voice channel of every guild is reconciled
//! against the stored [`crate::store::VoiceProgress`] of its members. Unmuted minutes accrue
//! towards a reward, sustained muting forfeits the accrual and leaving a
//! tracked channel resets it.
mod cache;
mod gateway;
mod progress;
mod task;

pub use cache::{ConfigCache, GuildConfig};
pub use gateway::{DiscordGateway, Gateway, VoiceFlags, VoicePresence};
pub use progress::Tunables;

use crate::{
    settings::VoiceSettings,
    store::{Store, StoreError},
    utils::{retry, RetryPolicy},
};
use futures::FutureExt;
use poise::serenity_prelude::GuildId;
use std::{collections::HashSet, panic::AssertUnwindSafe, sync::Arc, time::Duration};
use task::Task;
use tokio::time::MissedTickBehavior;
use tokio_stream::{wrappers::IntervalStream, StreamExt};

/// Counters of a single tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub guilds: usize,
    pub failed_guilds: usize,
    /// Members found in tracked channels.
    pub members: usize,
    pub rewards: u32,
    /// Progress records reset because their member left.
    pub resets: usize,
    /// Member updates dropped after storage faults.
    pub skipped: usize,
}

impl TickReport {
    fn absorb(&mut self, other: TickReport) {
        self.members += other.members;
        self.rewards += other.rewards;
        self.resets += other.resets;
        self.skipped += other.skipped;
    }
}

pub struct VoiceEngine {
    store: Arc<dyn Store>,
    gateway: Arc<dyn Gateway>,
    cache: Arc<ConfigCache>,
    /// Minutes accounted per tick.
    units: u32,
    retry: RetryPolicy,
}

impl VoiceEngine {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn Gateway>,
        cache: Arc<ConfigCache>,
        settings: &VoiceSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            cache,
            units: settings.check_every_minutes.max(1),
            retry: settings.retry_policy(),
        }
    }

    /// Processes every guild once. Faults are contained per guild and per member.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        for guild in self.gateway.guilds() {
            report.guilds += 1;
            match AssertUnwindSafe(self.tick_guild(guild)).catch_unwind().await {
                Ok(Ok(guild_report)) => {
                    log::debug!("Voice tick for guild {}: {:?}", guild, guild_report);
                    report.absorb(guild_report);
                }
                Ok(Err(e)) => {
                    log::error!("Voice tick failed for guild {}: {:#}", guild, e);
                    report.failed_guilds += 1;
                }
                Err(_) => {
                    log::error!("Voice tick panicked for guild {}", guild);
                    report.failed_guilds += 1;
                }
            }
        }

        report
    }

    async fn tick_guild(&self, guild: GuildId) -> anyhow::Result<TickReport> {
        let mut report = TickReport::default();

        let config = retry(&self.retry, "load voice config", || {
            self.cache.get(self.store.as_ref(), guild)
        })
        .await?;
        if config.channels.is_empty() {
            return Ok(report);
        }

        let roster = self.gateway.voice_roster(guild).await?;

        let mut present = HashSet::new();
        for presence in roster
            .iter()
            .filter(|presence| !presence.bot && config.channels.contains(&presence.channel))
        {
            present.insert(presence.user);
            report.members += 1;

            match self.process_member(guild, &config.tunables, presence).await {
                Ok(rewards) => report.rewards += rewards,
                Err(e) => {
                    log::warn!(
                        "Skipping voice update of {} in guild {}: {}",
                        presence.user,
                        guild,
                        e
                    );
                    report.skipped += 1;
                }
            }
        }

        let accruing = retry(&self.retry, "list voice progress", || {
            self.store.accruing_members(guild)
        })
        .await?;

        for (user, mut progress) in accruing
            .into_iter()
            .filter(|(user, _)| !present.contains(user))
        {
            progress.reset();
            match retry(&self.retry, "reset voice progress", || {
                self.store.commit_progress(guild, user, &progress, 0)
            })
            .await
            {
                Ok(_) => report.resets += 1,
                Err(e) => {
                    log::warn!("Failed to reset voice progress of {} in guild {}: {}", user, guild, e);
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }

    /// Advances a single member and pays out earned rewards. Returns the reward count.
    async fn process_member(
        &self,
        guild: GuildId,
        tunables: &Tunables,
        presence: &VoicePresence,
    ) -> Result<u32, StoreError> {
        let mut progress = retry(&self.retry, "read voice progress", || {
            self.store.progress(guild, presence.user)
        })
        .await?;

        // Time spent in another channel doesn't count.
        if progress.channel != Some(presence.channel) {
            progress.reset();
        }
        progress.channel = Some(presence.channel);

        let rewards = progress.advance(presence.effectively_muted(), self.units, tunables);
        let grant = i64::from(rewards)
            .checked_mul(tunables.reward_points)
            .ok_or(StoreError::Overflow {
                what: "voice reward",
            })?;

        let change = retry(&self.retry, "save voice progress", || {
            self.store
                .commit_progress(guild, presence.user, &progress, grant)
        })
        .await?;

        if rewards > 0 {
            log::info!(
                "Granted {} voice points to {} in guild {} ({} -> {})",
                grant,
                presence.user,
                guild,
                change.before,
                change.after
            );

            let message = format!(
                "🎧 You spent {} minutes in voice!\nYou received +{} points ✅\nPoints: {} → {}",
                tunables.reward_minutes.saturating_mul(rewards),
                grant,
                change.before,
                change.after
            );
            if let Err(e) = self.gateway.notify(presence.user, message).await {
                log::debug!("Could not notify {} about voice reward: {:#}", presence.user, e);
            }
        }

        Ok(rewards)
    }
}

/// Owns the periodic voice tick.
pub struct VoiceTracker {
    period: Duration,
    task: Option<Task>,
}

impl VoiceTracker {
    pub fn new(period: Duration) -> Self {
        Self { period, task: None }
    }

    /// Starts ticking `engine`. Returns false if a tick loop is already running.
    pub fn start(&mut self, engine: VoiceEngine) -> bool {
        if self.running() {
            return false;
        }

        let period = self.period;
        self.task = Some(Task::new(async move {
            let mut interval = tokio::time::interval(period);
            // An overrunning tick delays the next one instead of stacking them up.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks = IntervalStream::new(interval);

            while ticks.next().await.is_some() {
                let report = engine.tick().await;
                if report.failed_guilds > 0 || report.skipped > 0 {
                    log::warn!("Voice tick finished with faults: {:?}", report);
                } else {
                    log::debug!("Voice tick finished: {:?}", report);
                }
            }
        }));

        true
    }

    pub fn running(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.has_finished())
            .unwrap_or(false)
    }

    /// Stops the tick loop. Returns false if it wasn't running.
    pub async fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.cancel().await;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::gateway::MockGateway;
    use super::*;
    use crate::store::{MemoryStore, VoiceProgress};
    use mockall::predicate::eq;
    use poise::serenity_prelude::{ChannelId, UserId};
    use std::collections::HashMap;

    const GUILD: GuildId = GuildId::new(100);
    const OTHER_GUILD: GuildId = GuildId::new(200);
    const TRACKED: ChannelId = ChannelId::new(10);
    const SECOND_TRACKED: ChannelId = ChannelId::new(11);
    const UNTRACKED: ChannelId = ChannelId::new(12);
    const ALICE: UserId = UserId::new(1);
    const BOB: UserId = UserId::new(2);
    const CAROL: UserId = UserId::new(3);

    fn settings() -> VoiceSettings {
        VoiceSettings {
            retry_backoff_ms: 0,
            ..Default::default()
        }
    }

    fn speaking(user: UserId, channel: ChannelId) -> VoicePresence {
        VoicePresence {
            user,
            channel,
            bot: false,
            flags: Some(VoiceFlags::default()),
        }
    }

    fn muted(user: UserId, channel: ChannelId) -> VoicePresence {
        VoicePresence {
            flags: Some(VoiceFlags {
                self_mute: true,
                ..Default::default()
            }),
            ..speaking(user, channel)
        }
    }

    fn gateway(rosters: HashMap<GuildId, Vec<VoicePresence>>) -> MockGateway {
        let mut gateway = MockGateway::new();
        let mut guilds: Vec<_> = rosters.keys().copied().collect();
        guilds.sort();
        gateway.expect_guilds().return_const(guilds);
        gateway
            .expect_voice_roster()
            .returning(move |guild| Ok(rosters.get(&guild).cloned().unwrap_or_default()));
        gateway
    }

    fn engine(store: &Arc<MemoryStore>, gateway: MockGateway) -> VoiceEngine {
        VoiceEngine::new(
            store.clone(),
            Arc::new(gateway),
            Arc::new(ConfigCache::new(Duration::ZERO, Tunables::default())),
            &settings(),
        )
    }

    async fn tick(store: &Arc<MemoryStore>, roster: Vec<VoicePresence>) -> TickReport {
        let mut gateway = gateway(HashMap::from([(GUILD, roster)]));
        gateway.expect_notify().returning(|_, _| Ok(()));
        engine(store, gateway).tick().await
    }

    async fn tracked_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.add_tracked_channel(GUILD, TRACKED).await.unwrap();
        store.add_tracked_channel(GUILD, SECOND_TRACKED).await.unwrap();
        store.add_tracked_channel(OTHER_GUILD, TRACKED).await.unwrap();
        store
    }

    async fn seed(store: &MemoryStore, user: UserId, active: u32, muted_streak: u32) {
        let progress = VoiceProgress {
            active_units: active,
            muted_streak_units: muted_streak,
            channel: Some(TRACKED),
            last_update: None,
        };
        store.commit_progress(GUILD, user, &progress, 0).await.unwrap();
    }

    #[tokio::test]
    async fn present_unmuted_member_accrues_every_tick() {
        let store = tracked_store().await;

        for _ in 0..5 {
            tick(&store, vec![speaking(ALICE, TRACKED)]).await;
        }

        let progress = store.progress(GUILD, ALICE).await.unwrap();
        assert_eq!(progress.active_units, 5);
        assert_eq!(progress.muted_streak_units, 0);
        assert_eq!(progress.channel, Some(TRACKED));
    }

    #[tokio::test]
    async fn crossing_the_threshold_pays_once_and_notifies() {
        let store = tracked_store().await;
        seed(&store, ALICE, 59, 0).await;

        let mut gateway = gateway(HashMap::from([(GUILD, vec![speaking(ALICE, TRACKED)])]));
        gateway
            .expect_notify()
            .withf(|user, message| *user == ALICE && message.contains("+10 points"))
            .times(1)
            .returning(|_, _| Ok(()));
        let report = engine(&store, gateway).tick().await;

        assert_eq!(report.rewards, 1);
        assert_eq!(store.balance(GUILD, ALICE).await.unwrap(), 10);
        assert_eq!(store.progress(GUILD, ALICE).await.unwrap().active_units, 0);

        // The next tick keeps accruing without paying again.
        tick(&store, vec![speaking(ALICE, TRACKED)]).await;
        assert_eq!(store.balance(GUILD, ALICE).await.unwrap(), 10);
        assert_eq!(store.progress(GUILD, ALICE).await.unwrap().active_units, 1);
    }

    #[tokio::test]
    async fn failed_notification_keeps_the_reward() {
        let store = tracked_store().await;
        seed(&store, ALICE, 59, 0).await;

        let mut gateway = gateway(HashMap::from([(GUILD, vec![speaking(ALICE, TRACKED)])]));
        gateway
            .expect_notify()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("Cannot send messages to this user")));
        let report = engine(&store, gateway).tick().await;

        assert_eq!(report.failed_guilds, 0);
        assert_eq!(store.balance(GUILD, ALICE).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn sustained_mute_resets_accrual_on_the_limit_tick() {
        let store = tracked_store().await;
        seed(&store, ALICE, 45, 0).await;

        for _ in 0..29 {
            tick(&store, vec![muted(ALICE, TRACKED)]).await;
        }
        let progress = store.progress(GUILD, ALICE).await.unwrap();
        assert_eq!(progress.active_units, 45);
        assert_eq!(progress.muted_streak_units, 29);

        tick(&store, vec![muted(ALICE, TRACKED)]).await;
        let progress = store.progress(GUILD, ALICE).await.unwrap();
        assert_eq!(progress.active_units, 0);
        assert_eq!(progress.muted_streak_units, 30);
    }

    #[tokio::test]
    async fn unmuting_clears_streak_and_accrues() {
        let store = tracked_store().await;
        seed(&store, ALICE, 4, 10).await;

        tick(&store, vec![speaking(ALICE, TRACKED)]).await;

        let progress = store.progress(GUILD, ALICE).await.unwrap();
        assert_eq!(progress.muted_streak_units, 0);
        assert_eq!(progress.active_units, 5);
    }

    #[tokio::test]
    async fn leaving_resets_progress_exactly_once() {
        let store = tracked_store().await;
        seed(&store, ALICE, 20, 0).await;

        let first = tick(&store, vec![]).await;
        assert_eq!(first.resets, 1);
        assert!(store.progress(GUILD, ALICE).await.unwrap().is_idle());

        let second = tick(&store, vec![]).await;
        assert_eq!(second.resets, 0);
        assert!(store.progress(GUILD, ALICE).await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn untracked_channel_counts_as_leaving() {
        let store = tracked_store().await;
        seed(&store, ALICE, 20, 0).await;

        let report = tick(&store, vec![speaking(ALICE, UNTRACKED)]).await;

        assert_eq!(report.members, 0);
        assert_eq!(report.resets, 1);
        assert!(store.progress(GUILD, ALICE).await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn switching_tracked_channels_restarts_accrual() {
        let store = tracked_store().await;
        seed(&store, ALICE, 20, 3).await;

        tick(&store, vec![speaking(ALICE, SECOND_TRACKED)]).await;

        let progress = store.progress(GUILD, ALICE).await.unwrap();
        assert_eq!(progress.active_units, 1);
        assert_eq!(progress.muted_streak_units, 0);
        assert_eq!(progress.channel, Some(SECOND_TRACKED));
    }

    #[tokio::test]
    async fn bots_are_ignored() {
        let store = tracked_store().await;
        let bot = VoicePresence {
            bot: true,
            ..speaking(BOB, TRACKED)
        };

        let report = tick(&store, vec![bot]).await;

        assert_eq!(report.members, 0);
        assert!(store.accruing_members(GUILD).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn guild_without_tracked_channels_is_skipped() {
        let store = Arc::new(MemoryStore::default());
        let mut gateway = MockGateway::new();
        gateway.expect_guilds().return_const(vec![GUILD]);
        gateway.expect_voice_roster().never();

        let report = engine(&store, gateway).tick().await;

        assert_eq!(report.guilds, 1);
        assert_eq!(report.failed_guilds, 0);
    }

    #[tokio::test]
    async fn storage_fault_only_skips_the_affected_member() {
        let store = tracked_store().await;
        store.break_writes_for(ALICE).await;

        let report = tick(
            &store,
            vec![speaking(ALICE, TRACKED), speaking(BOB, TRACKED)],
        )
        .await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed_guilds, 0);
        assert_eq!(store.progress(GUILD, BOB).await.unwrap().active_units, 1);

        let mut gateway = gateway(HashMap::from([
            (GUILD, vec![speaking(ALICE, TRACKED)]),
            (OTHER_GUILD, vec![speaking(CAROL, TRACKED)]),
        ]));
        gateway.expect_notify().returning(|_, _| Ok(()));
        let report = engine(&store, gateway).tick().await;

        assert_eq!(report.skipped, 1);
        assert_eq!(store.progress(OTHER_GUILD, CAROL).await.unwrap().active_units, 1);
    }

    #[tokio::test]
    async fn overflowing_balance_only_skips_that_member() {
        let store = tracked_store().await;
        store.set_balance(GUILD, ALICE, i64::MAX - 5).await.unwrap();
        seed(&store, ALICE, 59, 0).await;

        let mut gateway = gateway(HashMap::from([(
            GUILD,
            vec![speaking(ALICE, TRACKED), speaking(BOB, TRACKED)],
        )]));
        gateway.expect_notify().never();
        let report = engine(&store, gateway).tick().await;

        assert_eq!(report.failed_guilds, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(store.balance(GUILD, ALICE).await.unwrap(), i64::MAX - 5);
        assert_eq!(store.progress(GUILD, ALICE).await.unwrap().active_units, 59);
        assert_eq!(store.progress(GUILD, BOB).await.unwrap().active_units, 1);
    }

    #[tokio::test]
    async fn oversized_reward_setting_only_skips_the_earner() {
        let store = tracked_store().await;
        store
            .set_setting(GUILD, crate::store::keys::VOICE_REWARD_POINTS, &i64::MAX.to_string())
            .await
            .unwrap();
        store.set_balance(GUILD, ALICE, 1).await.unwrap();
        seed(&store, ALICE, 59, 0).await;

        let mut gateway = gateway(HashMap::from([(
            GUILD,
            vec![speaking(ALICE, TRACKED), speaking(BOB, TRACKED)],
        )]));
        gateway.expect_notify().never();
        let report = engine(&store, gateway).tick().await;

        assert_eq!(report.failed_guilds, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(store.balance(GUILD, ALICE).await.unwrap(), 1);
        assert_eq!(store.progress(GUILD, BOB).await.unwrap().active_units, 1);
    }

    #[tokio::test]
    async fn roster_failure_aborts_only_that_guild() {
        let store = tracked_store().await;
        let mut gateway = MockGateway::new();
        gateway
            .expect_guilds()
            .return_const(vec![GUILD, OTHER_GUILD]);
        gateway
            .expect_voice_roster()
            .with(eq(GUILD))
            .returning(|_| Err(anyhow::anyhow!("Guild is not cached.")));
        gateway
            .expect_voice_roster()
            .with(eq(OTHER_GUILD))
            .returning(|_| Ok(vec![speaking(CAROL, TRACKED)]));

        let report = engine(&store, gateway).tick().await;

        assert_eq!(report.guilds, 2);
        assert_eq!(report.failed_guilds, 1);
        assert_eq!(store.progress(OTHER_GUILD, CAROL).await.unwrap().active_units, 1);
    }

    #[tokio::test]
    async fn tracker_runs_a_single_loop() {
        let store = Arc::new(MemoryStore::default());
        let mut gateway = MockGateway::new();
        gateway.expect_guilds().returning(Vec::new);

        let mut tracker = VoiceTracker::new(Duration::from_millis(10));
        assert!(tracker.start(engine(&store, gateway)));
        assert!(tracker.running());

        let mut second = MockGateway::new();
        second.expect_guilds().never();
        assert!(!tracker.start(engine(&store, second)));

        assert!(tracker.stop().await);
        assert!(!tracker.running());
        assert!(!tracker.stop().await);
    }
}
