//! Point economy shared by commands and buttons.
use crate::{
    gacha::{Catalog, Reward},
    settings::EconomySettings,
    store::{keys, BalanceChange, Result, Store, StoreError},
    utils::{self, parse_setting},
};
use chrono::{FixedOffset, NaiveDate};
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum DailyOutcome {
    Claimed { amount: i64, change: BalanceChange },
    AlreadyClaimed { balance: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RollOutcome {
    Rolled {
        reward: Reward,
        cost: i64,
        change: BalanceChange,
    },
    Insufficient { balance: i64, cost: i64 },
    /// Rolling is restricted to another channel.
    WrongChannel { expected: ChannelId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Applied(BalanceChange),
    /// Rejected, the balance would have dropped below zero.
    WouldBeNegative { balance: i64 },
    /// Rejected, the balance can't hold that many points.
    WouldOverflow { balance: i64 },
}

pub struct Economy {
    store: Arc<dyn Store>,
    catalog: Catalog,
    defaults: EconomySettings,
    offset: FixedOffset,
}

impl Economy {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Catalog,
        defaults: EconomySettings,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            catalog,
            defaults,
            offset,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn daily_amount(&self, guild: GuildId) -> Result<i64> {
        let raw = self.store.setting(guild, keys::DAILY_AMOUNT).await?;
        Ok(parse_setting(keys::DAILY_AMOUNT, raw.as_deref())
            .filter(|amount: &i64| *amount >= 0)
            .unwrap_or(self.defaults.daily_amount))
    }

    pub async fn roll_cost(&self, guild: GuildId) -> Result<i64> {
        let raw = self.store.setting(guild, keys::ROLL_COST).await?;
        Ok(parse_setting(keys::ROLL_COST, raw.as_deref())
            .filter(|cost: &i64| *cost >= 0)
            .unwrap_or(self.defaults.roll_cost))
    }

    pub async fn balance(&self, guild: GuildId, user: UserId) -> Result<i64> {
        self.store.balance(guild, user).await
    }

    pub async fn claim_daily(&self, guild: GuildId, user: UserId) -> Result<DailyOutcome> {
        self.claim_daily_on(guild, user, utils::today(self.offset))
            .await
    }

    async fn claim_daily_on(
        &self,
        guild: GuildId,
        user: UserId,
        day: NaiveDate,
    ) -> Result<DailyOutcome> {
        let amount = self.daily_amount(guild).await?;

        match self.store.claim_daily(guild, user, day, amount).await? {
            Some(change) => Ok(DailyOutcome::Claimed { amount, change }),
            None => Ok(DailyOutcome::AlreadyClaimed {
                balance: self.store.balance(guild, user).await?,
            }),
        }
    }

    /// Pays the roll cost and draws a reward. Nothing is drawn or debited if
    /// the member can't afford it.
    pub async fn roll_gacha(
        &self,
        guild: GuildId,
        user: UserId,
        channel: ChannelId,
    ) -> Result<RollOutcome> {
        let roll_channel = self.store.setting(guild, keys::ROLL_CHANNEL).await?;
        if let Some(expected) = parse_setting::<u64>(keys::ROLL_CHANNEL, roll_channel.as_deref())
            .filter(|id| *id != 0)
            .map(ChannelId::new)
        {
            if expected != channel {
                return Ok(RollOutcome::WrongChannel { expected });
            }
        }

        let cost = self.roll_cost(guild).await?;
        let balance = self.store.balance(guild, user).await?;
        if balance < cost {
            return Ok(RollOutcome::Insufficient { balance, cost });
        }

        let change = match self.store.adjust_balance(guild, user, -cost).await? {
            Some(change) => change,
            None => {
                return Ok(RollOutcome::Insufficient {
                    balance: self.store.balance(guild, user).await?,
                    cost,
                })
            }
        };

        let reward = self.catalog.draw(&mut rand::rng()).clone();
        log::info!(
            "{} rolled '{}' in guild {} ({} -> {})",
            user,
            reward.name,
            guild,
            change.before,
            change.after
        );

        Ok(RollOutcome::Rolled {
            reward,
            cost,
            change,
        })
    }

    pub async fn give_points(&self, guild: GuildId, user: UserId, amount: i64) -> Result<Adjustment> {
        match self.store.adjust_balance(guild, user, amount).await {
            Ok(Some(change)) => Ok(Adjustment::Applied(change)),
            Ok(None) => Ok(Adjustment::WouldBeNegative {
                balance: self.store.balance(guild, user).await?,
            }),
            Err(StoreError::Overflow { .. }) => Ok(Adjustment::WouldOverflow {
                balance: self.store.balance(guild, user).await?,
            }),
            Err(e) => Err(e),
        }
    }

    pub async fn set_points(&self, guild: GuildId, user: UserId, points: i64) -> Result<Adjustment> {
        if points < 0 {
            return Ok(Adjustment::WouldBeNegative {
                balance: self.store.balance(guild, user).await?,
            });
        }
        Ok(Adjustment::Applied(
            self.store.set_balance(guild, user, points).await?,
        ))
    }
}
