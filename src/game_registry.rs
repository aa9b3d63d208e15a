//! Closed registry of the games the orchestrator knows how to build.
//!
//! Every game has a canonical key (e.g. `colonel_blotto`) and may be reached through
//! legacy aliases (e.g. `ColonelBlotto-v0`). Resolution happens once, in
//! [`GameManager::setup`](crate::game_manager::GameManager::setup).

use std::fmt::Display;
use std::str::FromStr;

use crate::error::{ArenaError, Result};
use crate::game_interface::{EnvConfig, Environment};
use crate::games::{
    codenames::CodenamesEnv, colonel_blotto::ColonelBlottoEnv, secret_mafia::SecretMafiaEnv,
    three_player_ipd::ThreePlayerIpdEnv,
};

/// Number of players a game accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCountRule {
    /// Exactly this many players.
    Exact(usize),
    /// Any count in `min..=max`.
    Range {
        /// Smallest accepted roster.
        min: usize,
        /// Largest accepted roster.
        max: usize,
    },
}

impl PlayerCountRule {
    /// True if a roster of `count` players satisfies the rule.
    pub fn allows(&self, count: usize) -> bool {
        match *self {
            PlayerCountRule::Exact(n) => count == n,
            PlayerCountRule::Range { min, max } => (min..=max).contains(&count),
        }
    }
}

impl Display for PlayerCountRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerCountRule::Exact(n) => write!(f, "exactly {n}"),
            PlayerCountRule::Range { min, max } => write!(f, "between {min} and {max}"),
        }
    }
}

/// Every supported game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GameKind {
    /// Hidden-role social deduction game.
    SecretMafia,
    /// Iterated prisoner's dilemma with three players.
    ThreePlayerIpd,
    /// Two commanders allocating soldiers over battlefields.
    ColonelBlotto,
    /// Word association game between two teams of two.
    Codenames,
}

const ALIASES: [(&str, GameKind); 4] = [
    ("SecretMafia-v0", GameKind::SecretMafia),
    ("ThreePlayerIPD-v0", GameKind::ThreePlayerIpd),
    ("ColonelBlotto-v0", GameKind::ColonelBlotto),
    ("Codenames-v0", GameKind::Codenames),
];

impl GameKind {
    /// All games, in declaration order.
    pub const ALL: [GameKind; 4] = [
        GameKind::SecretMafia,
        GameKind::ThreePlayerIpd,
        GameKind::ColonelBlotto,
        GameKind::Codenames,
    ];

    /// Canonical internal key.
    pub fn key(self) -> &'static str {
        match self {
            GameKind::SecretMafia => "secret_mafia",
            GameKind::ThreePlayerIpd => "three_player_ipd",
            GameKind::ColonelBlotto => "colonel_blotto",
            GameKind::Codenames => "codenames",
        }
    }

    /// Sorted canonical keys.
    pub fn supported_keys() -> Vec<&'static str> {
        let mut keys = Self::ALL.iter().map(|g| g.key()).collect::<Vec<_>>();
        keys.sort_unstable();
        keys
    }

    /// Legacy names accepted for this game.
    pub fn aliases(self) -> impl Iterator<Item = &'static str> {
        ALIASES
            .iter()
            .filter(move |(_, kind)| *kind == self)
            .map(|(alias, _)| *alias)
    }

    /// Resolve a canonical key or an alias.
    pub fn resolve(name: &str) -> Result<GameKind> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == name)
            .or_else(|| {
                ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == name)
                    .map(|(_, kind)| *kind)
            })
            .ok_or_else(|| ArenaError::UnknownGame {
                name: name.to_owned(),
                supported: Self::supported_keys(),
            })
    }

    /// Roster size accepted by this game.
    pub fn player_count(self) -> PlayerCountRule {
        match self {
            GameKind::SecretMafia => PlayerCountRule::Range { min: 6, max: 15 },
            GameKind::ThreePlayerIpd => PlayerCountRule::Exact(3),
            GameKind::ColonelBlotto => PlayerCountRule::Exact(2),
            GameKind::Codenames => PlayerCountRule::Exact(4),
        }
    }

    /// Build a fresh environment from keyword configuration.
    ///
    /// Unknown keys and ill-typed values are reported as
    /// [`ArenaError::InvalidEnvConfig`].
    pub fn create_environment(self, config: &EnvConfig) -> Result<Box<dyn Environment>> {
        fn boxed<E: Environment + 'static>(env: E) -> Box<dyn Environment> {
            Box::new(env)
        }

        let env = match self {
            GameKind::SecretMafia => SecretMafiaEnv::from_config(config).map(boxed),
            GameKind::ThreePlayerIpd => ThreePlayerIpdEnv::from_config(config).map(boxed),
            GameKind::ColonelBlotto => ColonelBlottoEnv::from_config(config).map(boxed),
            GameKind::Codenames => CodenamesEnv::from_config(config).map(boxed),
        };
        env.map_err(|e| ArenaError::InvalidEnvConfig {
            game: self.key(),
            reason: format!("{e:#}"),
        })
    }
}

impl FromStr for GameKind {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}

impl Display for GameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_to_canonical_keys() {
        assert_eq!(
            GameKind::resolve("ColonelBlotto-v0").unwrap(),
            GameKind::ColonelBlotto
        );
        assert_eq!(
            GameKind::resolve("colonel_blotto").unwrap(),
            GameKind::ColonelBlotto
        );
        assert_eq!(
            "ThreePlayerIPD-v0".parse::<GameKind>().unwrap(),
            GameKind::ThreePlayerIpd
        );
        for kind in GameKind::ALL {
            assert_eq!(GameKind::resolve(kind.key()).unwrap(), kind);
            for alias in kind.aliases() {
                assert_eq!(GameKind::resolve(alias).unwrap(), kind);
            }
        }
    }

    #[test]
    fn unknown_game_enumerates_supported_set() {
        match GameKind::resolve("NoSuchGame-v9") {
            Err(ArenaError::UnknownGame { name, supported }) => {
                assert_eq!(name, "NoSuchGame-v9");
                assert_eq!(
                    supported,
                    vec!["codenames", "colonel_blotto", "secret_mafia", "three_player_ipd"]
                );
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn resolution_is_case_sensitive() {
        assert!(GameKind::resolve("Colonel_Blotto").is_err());
    }

    #[test]
    fn player_count_rules() {
        let exact = PlayerCountRule::Exact(2);
        assert!(exact.allows(2));
        assert!(!exact.allows(1));
        assert!(!exact.allows(3));

        let range = GameKind::SecretMafia.player_count();
        assert!(!range.allows(5));
        assert!(range.allows(6));
        assert!(range.allows(15));
        assert!(!range.allows(16));
        assert_eq!(range.to_string(), "between 6 and 15");
        assert_eq!(exact.to_string(), "exactly 2");
    }

    #[test]
    fn invalid_config_is_a_configuration_error() {
        let mut config = EnvConfig::new();
        config.insert("num_rouds".to_string(), serde_json::json!(3));
        let err = GameKind::ColonelBlotto.create_environment(&config).err().unwrap();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("num_rouds"));

        let mut config = EnvConfig::new();
        config.insert("num_rounds".to_string(), serde_json::json!("three"));
        assert!(matches!(
            GameKind::ColonelBlotto.create_environment(&config),
            Err(ArenaError::InvalidEnvConfig { game: "colonel_blotto", .. })
        ));
    }

    #[test]
    fn every_game_builds_with_default_config() {
        for kind in GameKind::ALL {
            assert!(kind.create_environment(&EnvConfig::new()).is_ok(), "{kind}");
        }
    }
}
