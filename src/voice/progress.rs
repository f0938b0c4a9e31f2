use crate::{
    settings::VoiceSettings,
    store::{keys, VoiceProgress},
    utils::parse_setting,
};

/// Per guild knobs of the voice reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    /// Qualifying minutes needed for one payout.
    pub reward_minutes: u32,
    pub reward_points: i64,
    /// Muted minutes after which unrewarded accrual is forfeited.
    pub mute_limit_minutes: u32,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            reward_minutes: 60,
            reward_points: 10,
            mute_limit_minutes: 30,
        }
    }
}

impl From<&VoiceSettings> for Tunables {
    fn from(settings: &VoiceSettings) -> Self {
        Self {
            reward_minutes: settings.reward_minutes.max(1),
            reward_points: settings.reward_points.max(0),
            mute_limit_minutes: settings.mute_limit_minutes.max(1),
        }
    }
}

impl Tunables {
    /// Applies the stored guild settings on top of `self`.
    pub fn with_overrides(self, stored: &[(String, String)]) -> Self {
        let lookup = |key: &str| {
            stored
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, value)| value.as_str())
        };

        Self {
            reward_minutes: parse_setting::<u32>(
                keys::VOICE_REWARD_MINUTES,
                lookup(keys::VOICE_REWARD_MINUTES),
            )
            .filter(|minutes| *minutes > 0)
            .unwrap_or(self.reward_minutes),
            reward_points: parse_setting::<i64>(
                keys::VOICE_REWARD_POINTS,
                lookup(keys::VOICE_REWARD_POINTS),
            )
            .filter(|points| *points >= 0)
            .unwrap_or(self.reward_points),
            mute_limit_minutes: parse_setting::<u32>(
                keys::VOICE_MUTE_LIMIT,
                lookup(keys::VOICE_MUTE_LIMIT),
            )
            .filter(|minutes| *minutes > 0)
            .unwrap_or(self.mute_limit_minutes),
        }
    }
}

impl VoiceProgress {
    /// Advances the progress by one tick worth `units` minutes and returns
    /// how many rewards were earned.
    ///
    /// Muted ticks grow the streak and wipe the accrual once the streak hits
    /// the limit. Unmuted ticks clear the streak and accrue, paying out every
    /// full threshold while keeping the remainder.
    pub fn advance(&mut self, muted: bool, units: u32, tunables: &Tunables) -> u32 {
        if muted {
            self.muted_streak_units = self.muted_streak_units.saturating_add(units);
            if self.muted_streak_units >= tunables.mute_limit_minutes {
                self.active_units = 0;
            }
            return 0;
        }

        self.muted_streak_units = 0;
        self.active_units = self.active_units.saturating_add(units);

        let threshold = tunables.reward_minutes.max(1);
        let mut rewards = 0;
        while self.active_units >= threshold {
            self.active_units -= threshold;
            rewards += 1;
        }
        rewards
    }

    /// Drops all accrual, used once a member leaves tracked channels.
    pub fn reset(&mut self) {
        self.active_units = 0;
        self.muted_streak_units = 0;
        self.channel = None;
    }
}
