// response definition of GetMatchDetails
// unknown fields are accepted: a schema change upstream must not wedge the watcher on one match

use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Copy, Clone, Debug, Default)]
pub struct AbilityUpgrade {
    pub ability: u16,
    pub time: u16,
    pub level: u16,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Player {
    #[serde(default)]
    pub account_id: u64,
    pub player_slot: u8,
    #[serde(default)]
    pub team_number: u8,
    #[serde(default)]
    pub team_slot: u8,
    #[serde(default)]
    pub hero_id: u16,
    #[serde(default)]
    pub item_0: u16,
    #[serde(default)]
    pub item_1: u16,
    #[serde(default)]
    pub item_2: u16,
    #[serde(default)]
    pub item_3: u16,
    #[serde(default)]
    pub item_4: u16,
    #[serde(default)]
    pub item_5: u16,
    #[serde(default)]
    pub item_neutral: u16,
    #[serde(default)]
    pub kills: u8,
    #[serde(default)]
    pub deaths: u8,
    #[serde(default)]
    pub assists: u8,
    #[serde(default)]
    pub leaver_status: u8,
    #[serde(default)]
    pub last_hits: u16,
    #[serde(default)]
    pub denies: u16,
    #[serde(default)]
    pub gold_per_min: u16,
    #[serde(default)]
    pub xp_per_min: u16,
    #[serde(default)]
    pub level: u8,
    #[serde(default)]
    pub net_worth: u32,
    #[serde(default)]
    pub hero_damage: u32,
    #[serde(default)]
    pub tower_damage: u32,
    #[serde(default)]
    pub hero_healing: u32,
    #[serde(default)]
    pub ability_upgrades: Vec<AbilityUpgrade>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct HeroSelection {
    pub is_pick: bool,
    pub hero_id: u16,
    pub team: u8,
    pub order: u8,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Match {
    pub match_id: u64,
    pub match_seq_num: u64,
    pub start_time: u64,
    pub lobby_type: i8,
    pub players: Vec<Player>,
    #[serde(default)]
    pub radiant_win: bool,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub pre_game_duration: u16,
    #[serde(default)]
    pub tower_status_radiant: u32,
    #[serde(default)]
    pub tower_status_dire: u32,
    #[serde(default)]
    pub barracks_status_radiant: u32,
    #[serde(default)]
    pub barracks_status_dire: u32,
    #[serde(default)]
    pub cluster: u32,
    #[serde(default)]
    pub first_blood_time: u32,
    #[serde(default)]
    pub human_players: u8,
    #[serde(default)]
    pub leagueid: u32,
    #[serde(default)]
    pub game_mode: u8,
    #[serde(default)]
    pub flags: u8,
    #[serde(default)]
    pub engine: u8,
    #[serde(default)]
    pub radiant_score: u16,
    #[serde(default)]
    pub dire_score: u16,
    #[serde(default)]
    pub radiant_team_id: u64,
    #[serde(default)]
    pub radiant_name: String,
    #[serde(default)]
    pub dire_team_id: u64,
    #[serde(default)]
    pub dire_name: String,
    #[serde(default)]
    pub picks_bans: Vec<HeroSelection>,
}

impl Match {
    pub fn player(&self, account_id: u64) -> Option<&Player> {
        self.players.iter().find(|p| p.account_id == account_id)
    }
}

// the API answers unknown ids with 200 and {"result": {"error": "..."}}
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(untagged)]
pub enum MatchDetailsResult {
    Error { error: String },
    Match(Box<Match>),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MatchDetailsResponse {
    pub result: MatchDetailsResult,
}
