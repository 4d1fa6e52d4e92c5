//! [`Ledger`] over Cloudflare D1. Schema in `migrations/`.

use serde_with::{serde_as, BoolFromInt};
use worker::{query, D1Database, D1PreparedStatement};

use crate::db::Player;
use crate::error::CmError;
use crate::ledger::{Ledger, NewMatch, Write, WriteBatch};
use crate::util::epoch_millis;

const PLAYER_COLUMNS: &str = "id, puuid, game_name, tag_line, last_update";

/// `SELECT EXISTS(...) AS found` row.
#[serde_as]
#[derive(serde::Deserialize)]
struct Exists {
    #[serde_as(as = "BoolFromInt")]
    found: bool,
}

/// D1 ledger. Each [`Ledger::commit`] is a single D1 batch, which runs as one transaction.
pub struct D1Ledger {
    db: D1Database,
}
impl D1Ledger {
    /// Wraps the database binding.
    pub fn new(db: D1Database) -> Self {
        Self { db }
    }

    fn match_statements(&self, new_match: &NewMatch) -> worker::Result<Vec<D1PreparedStatement>> {
        let mut statements = Vec::with_capacity(1 + 2 * new_match.participants.len());
        // Players first, so participation rows can reference them.
        for p in new_match.participants.iter() {
            statements.push(query!(
                &self.db,
                "INSERT INTO player(puuid, game_name, tag_line) VALUES (?1, ?2, ?3)
                ON CONFLICT(puuid) DO UPDATE SET
                    game_name = CASE
                        WHEN TRIM(COALESCE(player.game_name, '')) = ''
                            AND TRIM(COALESCE(excluded.game_name, '')) <> ''
                        THEN excluded.game_name ELSE player.game_name END,
                    tag_line = CASE
                        WHEN TRIM(COALESCE(player.tag_line, '')) = ''
                            AND TRIM(COALESCE(excluded.tag_line, '')) <> ''
                        THEN excluded.tag_line ELSE player.tag_line END",
                p.puuid,
                p.game_name,
                p.tag_line,
            )?);
        }
        statements.push(query!(
            &self.db,
            "INSERT INTO lol_match(match_id, queue_id, start_timestamp) VALUES (?1, ?2, ?3)
            ON CONFLICT(match_id) DO NOTHING",
            new_match.match_id,
            new_match.queue_id,
            epoch_millis(new_match.start_timestamp),
        )?);
        for p in new_match.participants.iter() {
            statements.push(query!(
                &self.db,
                "INSERT OR IGNORE INTO participant(match_id, player_id, team_id, champion_name,
                    win, role, kills, deaths, assists, gold_earned, damage_dealt)
                SELECT m.id, p.id, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11
                FROM lol_match m, player p
                WHERE m.match_id = ?1 AND p.puuid = ?2",
                new_match.match_id,
                p.puuid,
                p.team_id,
                p.champion_name,
                i32::from(p.win),
                p.role,
                p.kills,
                p.deaths,
                p.assists,
                p.gold_earned,
                p.damage_dealt,
            )?);
        }
        Ok(statements)
    }
}
impl Ledger for D1Ledger {
    async fn list_players(&self) -> Result<Vec<Player>, CmError> {
        let query = self
            .db
            .prepare(format!("SELECT {} FROM player ORDER BY id", PLAYER_COLUMNS));
        Ok(query.all().await?.results()?)
    }

    async fn find_player(&self, puuid: &str) -> Result<Option<Player>, CmError> {
        let query = query!(
            &self.db,
            &format!("SELECT {} FROM player WHERE puuid = ?1", PLAYER_COLUMNS),
            puuid,
        )?;
        Ok(query.first(None).await?)
    }

    async fn get_or_insert_player(
        &self,
        puuid: &str,
        game_name: Option<&str>,
        tag_line: Option<&str>,
    ) -> Result<Player, CmError> {
        let query = query!(
            &self.db,
            &format!(
                "INSERT INTO player(puuid, game_name, tag_line) VALUES (?1, ?2, ?3)
                ON CONFLICT(puuid) DO UPDATE SET id=id RETURNING {}",
                PLAYER_COLUMNS
            ),
            puuid,
            game_name,
            tag_line,
        )?;
        query.first(None).await?.ok_or_else(|| {
            CmError::InternalServerError(format!("Failed to get or insert player `{}`.", puuid))
        })
    }

    async fn match_exists(&self, match_id: &str) -> Result<bool, CmError> {
        let query = query!(
            &self.db,
            "SELECT EXISTS(SELECT 1 FROM lol_match WHERE match_id = ?1) AS found",
            match_id
        )?;
        let row: Option<Exists> = query.first(None).await?;
        Ok(row.is_some_and(|row| row.found))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), CmError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut statements = Vec::new();
        for write in batch.into_writes() {
            match write {
                Write::Match(new_match) => {
                    statements.extend(self.match_statements(&new_match)?);
                }
                Write::Watermark { puuid, last_update } => {
                    statements.push(query!(
                        &self.db,
                        "UPDATE player SET last_update = MAX(COALESCE(last_update, 0), ?2)
                        WHERE puuid = ?1",
                        puuid,
                        epoch_millis(last_update),
                    )?);
                }
            }
        }
        log::debug!("Committing {} statements.", statements.len());
        self.db.batch(statements).await?;
        Ok(())
    }
}
