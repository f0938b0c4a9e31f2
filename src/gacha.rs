use anyhow::{bail, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Single prize of the gacha with its relative weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub name: String,
    pub rate: f64,
}

impl Reward {
    fn new(name: &str, rate: f64) -> Self {
        Self {
            name: name.to_string(),
            rate,
        }
    }
}

/// Prizes shipped in the default settings.
pub fn default_rewards() -> Vec<Reward> {
    vec![
        Reward::new("Ultra rare Tom & Jerry skin", 0.2),
        Reward::new("Ultra rare Cheese skin", 0.2),
        Reward::new("6h grilled pork buffet voucher", 3.0),
        Reward::new("10,000 green cash", 3.0),
        Reward::new("8,000 green cash", 5.0),
        Reward::new("4,000 green cash", 8.8),
        Reward::new("1 online coin", 5.0),
        Reward::new("No prize this time, better luck tomorrow", 74.8),
    ]
}

/// Validated, immutable list of prizes.
#[derive(Debug, Clone)]
pub struct Catalog {
    rewards: Vec<Reward>,
    total: f64,
}

impl Catalog {
    pub fn new(rewards: Vec<Reward>) -> Result<Self> {
        if rewards.is_empty() {
            bail!("The gacha needs at least one reward.");
        }
        if let Some(reward) = rewards
            .iter()
            .find(|reward| !reward.rate.is_finite() || reward.rate < 0.0)
        {
            bail!("Reward '{}' has an invalid rate {}.", reward.name, reward.rate);
        }

        let total = rewards.iter().map(|reward| reward.rate).sum();
        Ok(Self { rewards, total })
    }

    pub fn rewards(&self) -> &[Reward] {
        &self.rewards
    }

    /// Picks a reward with probability proportional to its rate.
    ///
    /// The last reward is returned whenever the draw falls past every
    /// cumulative rate, e.g. through floating point rounding.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> &Reward {
        let fallback = &self.rewards[self.rewards.len() - 1];
        if self.total <= 0.0 {
            return fallback;
        }

        let pick = rng.random_range(0.0..=self.total);
        let mut cumulative = 0.0;
        for reward in &self.rewards {
            cumulative += reward.rate;
            if pick <= cumulative {
                return reward;
            }
        }
        fallback
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let rewards = default_rewards();
        let total = rewards.iter().map(|reward| reward.rate).sum();
        Self { rewards, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn draws_follow_the_rates() {
        let catalog = Catalog::default();
        let mut rng = StdRng::seed_from_u64(0xA0_2A);
        let trials = 200_000;

        let mut counts = vec![0usize; catalog.rewards().len()];
        for _ in 0..trials {
            let reward = catalog.draw(&mut rng);
            let index = catalog
                .rewards()
                .iter()
                .position(|r| r.name == reward.name)
                .unwrap();
            counts[index] += 1;
        }

        for (reward, count) in catalog.rewards().iter().zip(counts) {
            let expected = reward.rate / 100.0;
            let observed = count as f64 / trials as f64;
            assert!(
                (observed - expected).abs() < 0.005,
                "{}: expected {:.4}, observed {:.4}",
                reward.name,
                expected,
                observed
            );
        }
    }

    #[test]
    fn zero_weight_rewards_are_never_drawn_before_the_last() {
        let catalog = Catalog::new(vec![
            Reward::new("never", 0.0),
            Reward::new("always", 1.0),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..1_000 {
            assert_eq!(catalog.draw(&mut rng).name, "always");
        }
    }

    #[test]
    fn all_zero_rates_fall_back_to_the_last_reward() {
        let catalog = Catalog::new(vec![Reward::new("a", 0.0), Reward::new("b", 0.0)]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(catalog.draw(&mut rng).name, "b");
    }

    #[test]
    fn invalid_catalogs_are_rejected() {
        assert!(Catalog::new(Vec::new()).is_err());
        assert!(Catalog::new(vec![Reward::new("a", -1.0)]).is_err());
        assert!(Catalog::new(vec![Reward::new("a", f64::NAN)]).is_err());
    }
}
