use super::progress::Tunables;
use crate::store::{Result, Store};
use dashmap::DashMap;
use linked_hash_set::LinkedHashSet;
use poise::serenity_prelude::{ChannelId, GuildId};
use std::time::{Duration, Instant};

/// Everything the engine reads about a guild before a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildConfig {
    pub channels: LinkedHashSet<ChannelId>,
    pub tunables: Tunables,
}

#[derive(Debug)]
struct Entry {
    fetched: Instant,
    config: GuildConfig,
}

/// Read-through cache of guild configs. Entries older than `ttl` are refetched.
#[derive(Debug)]
pub struct ConfigCache {
    ttl: Duration,
    defaults: Tunables,
    entries: DashMap<GuildId, Entry>,
}

impl ConfigCache {
    pub fn new(ttl: Duration, defaults: Tunables) -> Self {
        Self {
            ttl,
            defaults,
            entries: DashMap::new(),
        }
    }

    /// Tunables in effect for `guild`, the configured defaults outside of one.
    pub async fn tunables(&self, store: &dyn Store, guild: Option<GuildId>) -> Result<Tunables> {
        match guild {
            Some(guild) => Ok(self.get(store, guild).await?.tunables),
            None => Ok(self.defaults),
        }
    }

    pub async fn get(&self, store: &dyn Store, guild: GuildId) -> Result<GuildConfig> {
        let cached = self
            .entries
            .get(&guild)
            .filter(|entry| entry.fetched.elapsed() < self.ttl)
            .map(|entry| entry.config.clone());
        if let Some(config) = cached {
            return Ok(config);
        }

        let config = self.load(store, guild).await?;
        self.entries.insert(
            guild,
            Entry {
                fetched: Instant::now(),
                config: config.clone(),
            },
        );
        Ok(config)
    }

    /// Reads the config straight from storage, bypassing the cache.
    pub async fn load(&self, store: &dyn Store, guild: GuildId) -> Result<GuildConfig> {
        let channels = store.tracked_channels(guild).await?;
        let settings = store.settings(guild).await?;

        Ok(GuildConfig {
            channels,
            tunables: self.defaults.with_overrides(&settings),
        })
    }

    /// Forgets the cached config so the next read sees admin changes.
    pub fn invalidate(&self, guild: GuildId) {
        self.entries.remove(&guild);
    }
}
