//! Incremental match sync for one player.
//!
//! Lists the player's match IDs since their watermark (minus a small overlap), inserts every
//! match not yet in the ledger, committing every [`COMMIT_EVERY`] new matches, and finally
//! advances the watermark. A failed detail fetch aborts the sync: batches already committed
//! stay, the watermark does not move, and the next sync picks up the rest.

use std::mem;

use futures::StreamExt;
use riven::consts::RegionalRoute;
use serde_with::serde_as;
use web_time::{Duration, SystemTime};

use crate::error::CmError;
use crate::ledger::{Ledger, NewMatch, WriteBatch};
use crate::riot::{MatchClient, Upstream};
use crate::util::start_of_year;
use crate::with::WebSystemTime;

/// How far before the watermark each sync starts listing. Catches matches recorded after the
/// previous sync that started at or before its watermark.
pub const OVERLAP: Duration = Duration::from_secs(60);
/// New matches per commit.
pub const COMMIT_EVERY: usize = 10;

/// Result of [`sync_player`].
#[serde_as]
#[derive(Debug, PartialEq, Eq, serde::Serialize)]
pub struct SyncSummary {
    /// Player synced.
    pub puuid: String,
    /// Start of the listed window (unix epoch seconds).
    #[serde(rename = "from")]
    #[serde_as(as = "WebSystemTime<serde_with::TimestampSeconds<i64>>")]
    pub start: SystemTime,
    /// End of the listed window (unix epoch seconds).
    #[serde(rename = "to")]
    #[serde_as(as = "WebSystemTime<serde_with::TimestampSeconds<i64>>")]
    pub end: SystemTime,
    /// Watermark after the sync: `end`, or the stored watermark if that was already later.
    #[serde_as(as = "WebSystemTime<serde_with::TimestampSeconds<i64>>")]
    pub processed_until: SystemTime,
    /// Matches newly inserted by this sync.
    pub processed_count: usize,
}

/// Start of the listing window: the year floor for never-synced players, otherwise the
/// watermark minus [`OVERLAP`], but never before the year floor.
pub fn window_start(watermark: Option<SystemTime>, year_floor: i32) -> SystemTime {
    let floor = start_of_year(year_floor);
    match watermark {
        None => floor,
        Some(watermark) => watermark
            .checked_sub(OVERLAP)
            .map_or(floor, |start| start.max(floor)),
    }
}

/// Syncs new matches for the player with the given PUUID, who must already be in the ledger.
pub async fn sync_player<U, L>(
    client: &MatchClient<U>,
    ledger: &L,
    puuid: &str,
    year_floor: i32,
    region: RegionalRoute,
) -> Result<SyncSummary, CmError>
where
    U: Upstream,
    L: Ledger,
{
    let player = ledger
        .find_player(puuid)
        .await?
        .ok_or_else(|| CmError::NotFound(format!("Player not found: `{}`.", puuid)))?;

    let start = window_start(player.last_update, year_floor);
    let end = SystemTime::now();
    log::info!(
        "Syncing matches for player `{}`, last update: {:?}, window: {:?} to {:?}.",
        puuid,
        player.last_update,
        start,
        end
    );

    let mut batch = WriteBatch::default();
    let mut processed_count = 0;
    let match_ids = client.match_ids(region, puuid, start, end);
    futures::pin_mut!(match_ids);
    while let Some(match_id) = match_ids.next().await {
        if batch.contains_match(&match_id) || ledger.match_exists(&match_id).await? {
            log::debug!("Skipping known match `{}`.", match_id);
            continue;
        }
        let new_match = client.match_detail(region, &match_id).await?;
        batch.push_match(blank_names_unknown(new_match));
        processed_count += 1;

        if COMMIT_EVERY <= batch.match_count() {
            ledger.commit(mem::take(&mut batch)).await?;
            log::info!("Committed {} matches so far...", processed_count);
        }
    }

    batch.advance_watermark(puuid, end);
    ledger.commit(batch).await?;
    log::info!(
        "Synced player `{}`: {} new matches.",
        puuid,
        processed_count
    );

    Ok(SyncSummary {
        puuid: puuid.to_owned(),
        start,
        end,
        processed_until: player.last_update.map_or(end, |watermark| watermark.max(end)),
        processed_count,
    })
}

/// Blank Riot ID parts count as unknown.
fn blank_names_unknown(mut new_match: NewMatch) -> NewMatch {
    let non_blank = |name: Option<String>| name.filter(|name| !name.trim().is_empty());
    for p in new_match.participants.iter_mut() {
        p.game_name = non_blank(p.game_name.take());
        p.tag_line = non_blank(p.tag_line.take());
    }
    new_match
}
