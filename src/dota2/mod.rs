use std::fmt::Display;

pub mod full;
pub mod partial;

#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum Side {
    Radiant,
    Dire,
}

impl Side {
    pub fn won(self, radiant_win: bool) -> bool {
        match self {
            Side::Radiant => radiant_win,
            Side::Dire => !radiant_win,
        }
    }
}

impl From<u8> for Side {
    fn from(value: u8) -> Self {
        if value & 0x80u8 != 0 {
            Self::Dire
        } else {
            Self::Radiant
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Side::Radiant => "radiant",
            Side::Dire => "dire",
        };
        f.write_str(name)
    }
}

pub fn lobby_name(lobby_type: i8) -> &'static str {
    match lobby_type {
        -1 => "invalid",
        0 => "public matchmaking",
        1 => "practice",
        2 => "tournament",
        3 => "tutorial",
        4 => "co-op with bots",
        5 => "team match",
        6 => "solo queue",
        7 => "ranked",
        8 => "1v1 mid",
        9 => "battle cup",
        _ => "unknown",
    }
}
