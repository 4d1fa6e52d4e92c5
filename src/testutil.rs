//! In-memory [`Ledger`] and scripted [`Upstream`] for tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use riven::consts::RegionalRoute;
use web_time::{Duration, SystemTime};

use crate::db::{Match, Participant, Player};
use crate::error::CmError;
use crate::ledger::{backfill_name, Ledger, NewMatch, NewParticipant, Write, WriteBatch};
use crate::riot::{Upstream, UpstreamError};
use crate::util::epoch_secs;

/// Mirrors the D1 SQL: insert-or-skip matches, insert-or-ignore participation on
/// `(match_id, player_id)`, name backfill, and `MAX` watermarks.
#[derive(Default)]
pub struct MemoryLedger {
    players: RefCell<Vec<Player>>,
    matches: RefCell<Vec<Match>>,
    participants: RefCell<Vec<Participant>>,
    commits: Cell<usize>,
}
impl MemoryLedger {
    pub fn add_player(
        &self,
        puuid: &str,
        game_name: Option<&str>,
        tag_line: Option<&str>,
        last_update: Option<SystemTime>,
    ) -> Player {
        let mut players = self.players.borrow_mut();
        let player = Player {
            id: players.len() as u64 + 1,
            puuid: puuid.to_owned(),
            game_name: game_name.map(str::to_owned),
            tag_line: tag_line.map(str::to_owned),
            last_update,
        };
        players.push(player.clone());
        player
    }

    pub fn player(&self, puuid: &str) -> Option<Player> {
        self.players
            .borrow()
            .iter()
            .find(|p| p.puuid == puuid)
            .cloned()
    }

    pub fn players(&self) -> Vec<Player> {
        self.players.borrow().clone()
    }

    pub fn matches(&self) -> Vec<Match> {
        self.matches.borrow().clone()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.participants.borrow().clone()
    }

    /// Number of [`Ledger::commit`] calls.
    pub fn commits(&self) -> usize {
        self.commits.get()
    }

    fn upsert_player(&self, puuid: &str, game_name: Option<&str>, tag_line: Option<&str>) -> u64 {
        let mut players = self.players.borrow_mut();
        if let Some(player) = players.iter_mut().find(|p| p.puuid == puuid) {
            player.game_name = backfill_name(player.game_name.as_deref(), game_name);
            player.tag_line = backfill_name(player.tag_line.as_deref(), tag_line);
            return player.id;
        }
        let id = players.len() as u64 + 1;
        players.push(Player {
            id,
            puuid: puuid.to_owned(),
            game_name: game_name.map(str::to_owned),
            tag_line: tag_line.map(str::to_owned),
            last_update: None,
        });
        id
    }

    fn apply_match(&self, new_match: NewMatch) {
        let player_ids = new_match
            .participants
            .iter()
            .map(|p| self.upsert_player(&p.puuid, p.game_name.as_deref(), p.tag_line.as_deref()))
            .collect::<Vec<_>>();

        let match_pk = {
            let mut matches = self.matches.borrow_mut();
            match matches.iter().find(|m| m.match_id == new_match.match_id) {
                Some(existing) => existing.id,
                None => {
                    let id = matches.len() as u64 + 1;
                    matches.push(Match {
                        id,
                        match_id: new_match.match_id.clone(),
                        queue_id: new_match.queue_id,
                        start_timestamp: new_match.start_timestamp,
                    });
                    id
                }
            }
        };

        let mut participants = self.participants.borrow_mut();
        for (p, player_id) in new_match.participants.into_iter().zip(player_ids) {
            if participants
                .iter()
                .any(|row| row.match_id == match_pk && row.player_id == player_id)
            {
                continue;
            }
            let id = participants.len() as u64 + 1;
            participants.push(Participant {
                id,
                match_id: match_pk,
                player_id,
                team_id: p.team_id,
                champion_name: p.champion_name,
                win: p.win,
                role: p.role,
                kills: p.kills,
                deaths: p.deaths,
                assists: p.assists,
                gold_earned: p.gold_earned,
                damage_dealt: p.damage_dealt,
            });
        }
    }
}
impl Ledger for MemoryLedger {
    async fn list_players(&self) -> Result<Vec<Player>, CmError> {
        Ok(self.players())
    }

    async fn find_player(&self, puuid: &str) -> Result<Option<Player>, CmError> {
        Ok(self.player(puuid))
    }

    async fn get_or_insert_player(
        &self,
        puuid: &str,
        game_name: Option<&str>,
        tag_line: Option<&str>,
    ) -> Result<Player, CmError> {
        Ok(match self.player(puuid) {
            Some(player) => player,
            None => self.add_player(puuid, game_name, tag_line, None),
        })
    }

    async fn match_exists(&self, match_id: &str) -> Result<bool, CmError> {
        Ok(self
            .matches
            .borrow()
            .iter()
            .any(|m| m.match_id == match_id))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), CmError> {
        self.commits.set(self.commits.get() + 1);
        for write in batch.into_writes() {
            match write {
                Write::Match(new_match) => self.apply_match(new_match),
                Write::Watermark { puuid, last_update } => {
                    let mut players = self.players.borrow_mut();
                    if let Some(player) = players.iter_mut().find(|p| p.puuid == puuid) {
                        player.last_update = player.last_update.max(Some(last_update));
                    }
                }
            }
        }
        Ok(())
    }
}

/// One call made to a [`FakeUpstream`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    /// A listing page.
    MatchIds {
        puuid: String,
        start_secs: u64,
        end_secs: u64,
        offset: usize,
    },
    /// A match detail.
    Match { match_id: String },
}

/// Scripted Riot API. Listing pages are keyed by `(puuid, offset)` and matches by match ID;
/// both are served repeatedly. Unscripted pages are empty, unscripted matches are 404.
/// Interrupts are served first, once each, to whatever call comes next.
#[derive(Default)]
pub struct FakeUpstream {
    pages: RefCell<HashMap<(String, usize), Result<Vec<String>, UpstreamError>>>,
    details: RefCell<HashMap<String, Result<NewMatch, UpstreamError>>>,
    interrupts: RefCell<VecDeque<UpstreamError>>,
    calls: RefCell<Vec<Call>>,
    sleeps: RefCell<Vec<Duration>>,
}
impl FakeUpstream {
    pub fn set_page(&self, puuid: &str, offset: usize, match_ids: &[String]) {
        self.pages
            .borrow_mut()
            .insert((puuid.to_owned(), offset), Ok(match_ids.to_vec()));
    }

    pub fn set_page_error(&self, puuid: &str, offset: usize, status: u16, body: &str) {
        self.pages
            .borrow_mut()
            .insert((puuid.to_owned(), offset), Err(status_error(status, None, body)));
    }

    pub fn set_detail(&self, new_match: NewMatch) {
        self.details
            .borrow_mut()
            .insert(new_match.match_id.clone(), Ok(new_match));
    }

    pub fn set_detail_error(&self, match_id: &str, status: u16, body: &str) {
        self.details
            .borrow_mut()
            .insert(match_id.to_owned(), Err(status_error(status, None, body)));
    }

    /// Queues a one-shot error status, e.g. a 429 with an optional `Retry-After` in seconds.
    pub fn interrupt(&self, status: u16, retry_after_secs: Option<u64>) {
        self.interrupts.borrow_mut().push_back(status_error(
            status,
            retry_after_secs.map(Duration::from_secs),
            "{}",
        ));
    }

    /// Queues a one-shot failure without a response.
    pub fn interrupt_transport(&self, msg: &str) {
        self.interrupts
            .borrow_mut()
            .push_back(UpstreamError::Transport(msg.to_owned()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Number of match detail calls (including retries).
    pub fn detail_requests(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| matches!(call, Call::Match { .. }))
            .count()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    async fn record(&self, call: Call) -> Option<UpstreamError> {
        self.calls.borrow_mut().push(call);
        // Let concurrent syncs interleave.
        YieldOnce(false).await;
        self.interrupts.borrow_mut().pop_front()
    }
}
impl Upstream for FakeUpstream {
    async fn match_ids(
        &self,
        _region: RegionalRoute,
        puuid: &str,
        start: SystemTime,
        end: SystemTime,
        offset: usize,
    ) -> Result<Vec<String>, UpstreamError> {
        let call = Call::MatchIds {
            puuid: puuid.to_owned(),
            start_secs: epoch_secs(start),
            end_secs: epoch_secs(end),
            offset,
        };
        if let Some(e) = self.record(call).await {
            return Err(e);
        }
        self.pages
            .borrow()
            .get(&(puuid.to_owned(), offset))
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn get_match(
        &self,
        _region: RegionalRoute,
        match_id: &str,
    ) -> Result<NewMatch, UpstreamError> {
        let call = Call::Match {
            match_id: match_id.to_owned(),
        };
        if let Some(e) = self.record(call).await {
            return Err(e);
        }
        self.details
            .borrow()
            .get(match_id)
            .cloned()
            .unwrap_or_else(|| Err(status_error(404, None, "Data not found")))
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

fn status_error(status: u16, retry_after: Option<Duration>, body: &str) -> UpstreamError {
    UpstreamError::Status {
        status,
        retry_after,
        body: body.to_owned(),
    }
}

struct YieldOnce(bool);
impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            return Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// A ranked solo game as the upstream reports it, names as given. The first five participants
/// are on the winning blue side. Participants are `(puuid, game_name, tag_line)`.
pub fn fake_match(
    match_id: &str,
    game_start_millis: u64,
    participants: &[(&str, Option<&str>, Option<&str>)],
) -> NewMatch {
    let participants = participants
        .iter()
        .enumerate()
        .map(|(i, (puuid, game_name, tag_line))| NewParticipant {
            puuid: puuid.to_string(),
            game_name: game_name.map(str::to_owned),
            tag_line: tag_line.map(str::to_owned),
            team_id: if i < 5 { 100 } else { 200 },
            champion_name: "Ahri".to_owned(),
            win: i < 5,
            role: "SOLO".to_owned(),
            kills: 7,
            deaths: 2,
            assists: 9,
            gold_earned: 12_345,
            damage_dealt: 23_456,
        })
        .collect();
    NewMatch {
        match_id: match_id.to_owned(),
        queue_id: 420,
        start_timestamp: SystemTime::UNIX_EPOCH + Duration::from_millis(game_start_millis),
        participants,
    }
}
