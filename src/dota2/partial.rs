// response definition of GetMatchHistory, only the newest entry drives the watcher

use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Player {
    // anonymous players are reported as 4294967295, bots have no account at all
    #[serde(default)]
    pub account_id: u64,
    pub player_slot: u8,
    #[serde(default)]
    pub team_number: u8,
    #[serde(default)]
    pub team_slot: u8,
    #[serde(default)]
    pub hero_id: u16,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Match {
    pub match_id: u64,
    pub match_seq_num: u64,
    pub start_time: u64,
    pub lobby_type: i8,
    #[serde(default)]
    pub radiant_team_id: u64,
    #[serde(default)]
    pub dire_team_id: u64,
    #[serde(default)]
    pub players: Vec<Player>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct MatchHistory {
    pub status: u8,
    #[serde(default, rename = "statusDetail")]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub num_results: u16,
    #[serde(default)]
    pub total_results: u16,
    #[serde(default)]
    pub results_remaining: u16,
    #[serde(default)]
    pub matches: Vec<Match>,
}

impl MatchHistory {
    pub const STATUS_OK: u8 = 1;

    /// The most recent match, history is returned newest first.
    pub fn newest(&self) -> Option<&Match> {
        self.matches.first()
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct MatchHistoryResponse {
    pub result: MatchHistory,
}
