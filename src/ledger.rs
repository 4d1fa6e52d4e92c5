//! The match ledger: players (with their sync watermarks), matches, and participation.

use web_time::SystemTime;

use crate::db::Player;
use crate::error::CmError;

/// Persistent store of players, matches and participation rows.
///
/// Writes are staged in a [`WriteBatch`] and applied by [`Ledger::commit`], which must be atomic:
/// either every write in the batch is durable or none is. Match inserts are insert-or-skip on
/// the match ID, so two committers racing on the same match leave exactly one copy.
#[allow(async_fn_in_trait)]
pub trait Ledger {
    /// All players, in insertion order.
    async fn list_players(&self) -> Result<Vec<Player>, CmError>;

    /// Player by PUUID.
    async fn find_player(&self, puuid: &str) -> Result<Option<Player>, CmError>;

    /// Inserts a player, or returns the existing one unchanged.
    async fn get_or_insert_player(
        &self,
        puuid: &str,
        game_name: Option<&str>,
        tag_line: Option<&str>,
    ) -> Result<Player, CmError>;

    /// If a match with this Riot match ID is stored.
    async fn match_exists(&self, match_id: &str) -> Result<bool, CmError>;

    /// Atomically applies all writes in the batch, in order.
    async fn commit(&self, batch: WriteBatch) -> Result<(), CmError>;
}

/// A match to insert, along with its participants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMatch {
    /// Riot match ID.
    pub match_id: String,
    /// Queue type ID.
    pub queue_id: i32,
    /// Game start time.
    pub start_timestamp: SystemTime,
    /// One entry per player in the game.
    pub participants: Vec<NewParticipant>,
}

/// A participation row to insert. Unknown players are created from `puuid` and the names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewParticipant {
    /// Riot PUUID, resolved to the player's PK ID on commit.
    pub puuid: String,
    /// Riot ID game name, used to backfill a blank [`Player::game_name`].
    pub game_name: Option<String>,
    /// Riot ID tag line, used to backfill a blank [`Player::tag_line`].
    pub tag_line: Option<String>,
    /// `100` or `200`.
    pub team_id: i32,
    /// Champion name.
    pub champion_name: String,
    /// Win or loss.
    pub win: bool,
    /// Role string.
    pub role: String,
    /// Kills.
    pub kills: i32,
    /// Deaths.
    pub deaths: i32,
    /// Assists.
    pub assists: i32,
    /// Gold earned.
    pub gold_earned: i32,
    /// Damage to champions.
    pub damage_dealt: i32,
}

/// A single staged write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Write {
    /// Upsert the participants' players, then insert-or-skip the match and its participation.
    Match(NewMatch),
    /// Move a player's watermark forward to `last_update` (never backward).
    Watermark {
        /// Player to update.
        puuid: String,
        /// New watermark.
        last_update: SystemTime,
    },
}

/// Writes staged for one [`Ledger::commit`].
#[derive(Debug, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}
impl WriteBatch {
    /// Stages a match insert.
    pub fn push_match(&mut self, new_match: NewMatch) {
        self.writes.push(Write::Match(new_match));
    }

    /// Stages a watermark advance.
    pub fn advance_watermark(&mut self, puuid: &str, last_update: SystemTime) {
        self.writes.push(Write::Watermark {
            puuid: puuid.to_owned(),
            last_update,
        });
    }

    /// If a match with this ID is staged.
    pub fn contains_match(&self, match_id: &str) -> bool {
        self.writes
            .iter()
            .any(|write| matches!(write, Write::Match(m) if m.match_id == match_id))
    }

    /// Number of staged match inserts.
    pub fn match_count(&self) -> usize {
        self.writes
            .iter()
            .filter(|write| matches!(write, Write::Match(_)))
            .count()
    }

    /// If nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// The staged writes, in order.
    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// Name backfill rule: a stored name is only replaced while it is blank, and only by a
/// non-blank learned name.
pub fn backfill_name(stored: Option<&str>, learned: Option<&str>) -> Option<String> {
    fn non_blank(name: Option<&str>) -> Option<&str> {
        name.filter(|name| !name.trim().is_empty())
    }
    non_blank(stored)
        .or(non_blank(learned))
        .or(stored)
        .map(str::to_owned)
}
