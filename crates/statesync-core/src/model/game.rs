// ── Game state documents ──

use serde::{Deserialize, Serialize};

use super::AccountId;

/// One entry of a game's player collection, keyed by [`AccountId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub account: AccountId,
    pub name: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub ready: bool,
}

impl Player {
    pub fn new(account: AccountId, name: impl Into<String>) -> Self {
        Self {
            account,
            name: name.into(),
            score: 0,
            ready: false,
        }
    }

    pub fn with_score(mut self, score: i64) -> Self {
        self.score = score;
        self
    }
}

/// The singleton settings document of a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    pub title: String,
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    #[serde(default = "default_round_seconds")]
    pub round_seconds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<AccountId>,
}

fn default_max_players() -> u32 {
    8
}

fn default_round_seconds() -> u32 {
    90
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            title: String::new(),
            max_players: default_max_players(),
            round_seconds: default_round_seconds(),
            host: None,
        }
    }
}
