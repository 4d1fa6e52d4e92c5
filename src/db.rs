//! Model structs corresponding to database tables. Must be kept in sync with migrations.

use serde_with::serde_as;
use web_time::SystemTime;

use crate::with::WebSystemTime;

/// A tracked Riot Games account.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Player {
    /// PK ID.
    pub id: u64,
    /// Riot PUUID (player universally unique ID).
    pub puuid: String,
    /// Riot ID game username (`game_name#tag_line`). Filled lazily.
    pub game_name: Option<String>,
    /// Riot ID tag line (`game_name#tag_line`). Filled lazily.
    pub tag_line: Option<String>,
    /// Sync watermark (unix epoch milliseconds). `None` if never synced.
    #[serde_as(as = "Option<WebSystemTime<serde_with::TimestampMilliSeconds<i64>>>")]
    pub last_update: Option<SystemTime>,
}

/// A single League of Legends game.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Match {
    /// PK ID.
    pub id: u64,
    /// Riot match ID, e.g. `NA1_5012345678`.
    pub match_id: String,
    /// Queue type ID.
    pub queue_id: i32,
    /// Game start time (unix epoch milliseconds).
    #[serde_as(as = "WebSystemTime<serde_with::TimestampMilliSeconds<i64>>")]
    pub start_timestamp: SystemTime,
}

/// One player's stats within one [`Match`].
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Participant {
    /// PK ID.
    pub id: u64,
    /// FK [`Match::id`].
    pub match_id: u64,
    /// FK [`Player::id`].
    pub player_id: u64,
    /// `100` for blue side, `200` for red side.
    pub team_id: i32,
    /// Champion played, e.g. `"Ahri"`.
    pub champion_name: String,
    /// If this player's team won.
    #[serde_as(as = "serde_with::BoolFromInt")]
    pub win: bool,
    /// Riot's role string, e.g. `"SOLO"`, `"CARRY"`.
    pub role: String,
    /// Kills.
    pub kills: i32,
    /// Deaths.
    pub deaths: i32,
    /// Assists.
    pub assists: i32,
    /// Gold earned.
    pub gold_earned: i32,
    /// Total damage dealt to champions.
    pub damage_dealt: i32,
}
