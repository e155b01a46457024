//! Fixed catalog of mini-games and their per-round configuration.
//!
//! Each entry carries a strongly typed configuration variant and the scoring
//! rule applied when its round resolves. Configuration is generated through a
//! per-entry function pointer so adding a game means adding one table row.

use std::fmt;

use rand::{Rng, RngCore, seq::index};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Catalog key selecting mini-game behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum GameKey {
    /// Pass the token before the hidden timer runs out.
    HotPotato,
    /// Tap numbers in descending order as fast as possible.
    NumbersInOrder,
}

impl GameKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameKey::HotPotato => "hot-potato",
            GameKey::NumbersInOrder => "numbers-in-order",
        }
    }
}

impl fmt::Display for GameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-round parameters, tagged by the catalog key they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GameConfig {
    HotPotato {
        #[serde(rename = "durationSecs")]
        duration_secs: u32,
    },
    NumbersInOrder {
        numbers: Vec<u32>,
        #[serde(rename = "timeLimitSecs")]
        time_limit_secs: u32,
    },
}

impl GameConfig {
    pub fn key(&self) -> GameKey {
        match self {
            GameConfig::HotPotato { .. } => GameKey::HotPotato,
            GameConfig::NumbersInOrder { .. } => GameKey::NumbersInOrder,
        }
    }

    /// Nominal round length every observer counts down from.
    pub fn duration_secs(&self) -> u32 {
        match self {
            GameConfig::HotPotato { duration_secs } => *duration_secs,
            GameConfig::NumbersInOrder {
                time_limit_secs, ..
            } => *time_limit_secs,
        }
    }
}

/// How a resolved round turns into points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringRule {
    /// Results sorted ascending (lower is better); first place earns the most.
    RankAscending,
    /// Everyone except the player holding the token at expiry earns a fixed bonus.
    FlatBonus,
}

/// Bounds used when generating fresh round configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSettings {
    pub min_duration_secs: u32,
    pub max_duration_secs: u32,
    pub numbers_count: usize,
    pub numbers_time_limit_secs: u32,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            min_duration_secs: 20,
            max_duration_secs: 40,
            numbers_count: 9,
            numbers_time_limit_secs: 60,
        }
    }
}

type ConfigGenerator = fn(&RoundSettings, &mut dyn RngCore) -> GameConfig;

/// Static description of one catalog game.
#[derive(Clone)]
pub struct CatalogEntry {
    pub key: GameKey,
    pub name: &'static str,
    pub emoji: &'static str,
    pub description: &'static str,
    pub scoring: ScoringRule,
    generate: ConfigGenerator,
}

impl fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("key", &self.key)
            .field("scoring", &self.scoring)
            .finish_non_exhaustive()
    }
}

impl CatalogEntry {
    /// Generate a fresh configuration for one round of this game.
    pub fn generate_config(&self, settings: &RoundSettings, rng: &mut dyn RngCore) -> GameConfig {
        (self.generate)(settings, rng)
    }
}

/// Ordered set of games a session rotates through.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl Catalog {
    /// Catalog shipped with the server.
    pub fn standard() -> Self {
        Self::new(vec![hot_potato(), numbers_in_order()])
    }

    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    pub fn entry(&self, key: GameKey) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }
}

/// Hot potato catalog entry.
pub fn hot_potato() -> CatalogEntry {
    CatalogEntry {
        key: GameKey::HotPotato,
        name: "Hot Potato",
        emoji: "🥔",
        description: "Tap the potato to pass it on. Whoever holds it when it explodes scores nothing.",
        scoring: ScoringRule::FlatBonus,
        generate: |settings, rng| {
            let low = settings.min_duration_secs.min(settings.max_duration_secs);
            let high = settings.min_duration_secs.max(settings.max_duration_secs);
            GameConfig::HotPotato {
                duration_secs: rng.random_range(low..=high),
            }
        },
    }
}

/// Numbers-in-order catalog entry.
pub fn numbers_in_order() -> CatalogEntry {
    CatalogEntry {
        key: GameKey::NumbersInOrder,
        name: "Numbers in Order",
        emoji: "🔢",
        description: "Sort the numbers from highest to lowest. Fastest player wins.",
        scoring: ScoringRule::RankAscending,
        generate: |settings, rng| {
            let amount = settings.numbers_count.min(100);
            let numbers = index::sample(rng, 100, amount)
                .into_iter()
                .map(|n| n as u32 + 1)
                .collect();
            GameConfig::NumbersInOrder {
                numbers,
                time_limit_secs: settings.numbers_time_limit_secs,
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn hot_potato_duration_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let settings = RoundSettings::default();
        for _ in 0..200 {
            let config = hot_potato().generate_config(&settings, &mut rng);
            let secs = config.duration_secs();
            assert!((20..=40).contains(&secs), "{secs} out of range");
        }
    }

    #[test]
    fn numbers_are_unique_and_in_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let config = numbers_in_order().generate_config(&RoundSettings::default(), &mut rng);
        let GameConfig::NumbersInOrder { numbers, .. } = config else {
            panic!("wrong variant");
        };
        assert_eq!(numbers.len(), 9);
        assert_eq!(numbers.iter().collect::<HashSet<_>>().len(), 9);
        assert!(numbers.iter().all(|n| (1..=100).contains(n)));
    }

    #[test]
    fn config_is_tagged_by_catalog_key() {
        let value = serde_json::to_value(GameConfig::HotPotato { duration_secs: 25 }).unwrap();
        assert_eq!(value, json!({"kind": "hot-potato", "durationSecs": 25}));

        let parsed: GameConfig = serde_json::from_value(json!({
            "kind": "numbers-in-order",
            "numbers": [3, 1],
            "timeLimitSecs": 30
        }))
        .unwrap();
        assert_eq!(parsed.key(), GameKey::NumbersInOrder);
        assert_eq!(parsed.duration_secs(), 30);
    }

    #[test]
    fn standard_catalog_lookup() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.entry(GameKey::HotPotato).map(|e| e.scoring),
            Some(ScoringRule::FlatBonus)
        );
        assert_eq!(
            catalog.entry(GameKey::NumbersInOrder).map(|e| e.scoring),
            Some(ScoringRule::RankAscending)
        );
    }
}
