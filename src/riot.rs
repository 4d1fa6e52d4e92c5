//! Riot API access: match-v5 listing and detail, with rate-limit backoff.
//!
//! Match-v5 calls go through an [`Upstream`] and handle 429s themselves, so [`RiotUpstream`]
//! runs riven with retries off. Account lookups use [`RiotApi`] directly.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::{self, Either};
use futures::stream::{self, Stream, StreamExt};
use riven::consts::RegionalRoute;
use riven::models::match_v5;
use riven::reqwest::header::RETRY_AFTER;
use riven::{RiotApi, RiotApiError};
use web_time::{Duration, SystemTime};
use worker::Delay;

use crate::error::CmError;
use crate::ledger::{NewMatch, NewParticipant};
use crate::util::epoch_secs;

/// Match IDs requested per listing page (Riot's maximum).
pub const PAGE_SIZE: usize = 100;
/// Pause before each listing page after the first.
pub const PAGE_PACING: Duration = Duration::from_millis(100);
/// Ceiling for the exponential backoff used when a 429 has no `Retry-After`.
pub const MAX_BACKOFF_SECS: u64 = 16;

/// Failed Riot API call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpstreamError {
    /// Non-success response.
    Status {
        /// HTTP status code.
        status: u16,
        /// Parsed `Retry-After` header, if any.
        retry_after: Option<Duration>,
        /// Response body text.
        body: String,
    },
    /// No usable response: connection failure, timeout, or unparsable body.
    Transport(String),
}
impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, body, .. } => write!(f, "status {}: {}", status, body),
            Self::Transport(msg) => f.write_str(msg),
        }
    }
}

/// Match-v5 endpoints, one request per call.
#[allow(async_fn_in_trait)]
pub trait Upstream {
    /// `GET /lol/match/v5/matches/by-puuid/{puuid}/ids`, one page of the `[start, end]` window.
    async fn match_ids(
        &self,
        region: RegionalRoute,
        puuid: &str,
        start: SystemTime,
        end: SystemTime,
        offset: usize,
    ) -> Result<Vec<String>, UpstreamError>;

    /// `GET /lol/match/v5/matches/{matchId}`.
    async fn get_match(
        &self,
        region: RegionalRoute,
        match_id: &str,
    ) -> Result<NewMatch, UpstreamError>;

    /// Wait before retrying.
    async fn sleep(&self, duration: Duration);
}

/// [`Upstream`] over riven's typed match-v5 endpoints. The [`RiotApi`] should have retries
/// disabled; riven still applies its key-wide rate limits.
pub struct RiotUpstream {
    riot_api: Rc<RiotApi>,
    timeout: Duration,
}
impl RiotUpstream {
    /// Each request is abandoned after `timeout`.
    pub fn new(riot_api: Rc<RiotApi>, timeout: Duration) -> Self {
        Self { riot_api, timeout }
    }

    async fn with_timeout<T, F>(&self, what: &str, request: F) -> Result<T, UpstreamError>
    where
        F: Future<Output = riven::Result<T>>,
    {
        let timeout = Delay::from(self.timeout);
        futures::pin_mut!(request, timeout);
        match future::select(request, timeout).await {
            Either::Left((Ok(value), _)) => Ok(value),
            Either::Left((Err(e), _)) => Err(upstream_error(what, e).await),
            Either::Right(_) => Err(UpstreamError::Transport(format!(
                "{}: timed out after {:?}",
                what, self.timeout
            ))),
        }
    }
}
impl Upstream for RiotUpstream {
    async fn match_ids(
        &self,
        region: RegionalRoute,
        puuid: &str,
        start: SystemTime,
        end: SystemTime,
        offset: usize,
    ) -> Result<Vec<String>, UpstreamError> {
        let request = self.riot_api.match_v5().get_match_ids_by_puuid(
            region,
            puuid,
            Some(PAGE_SIZE as i32),
            Some(epoch_secs(end) as i64),
            None,
            Some(epoch_secs(start) as i64),
            Some(offset as i32),
            None,
        );
        self.with_timeout("match ids", request).await
    }

    async fn get_match(
        &self,
        region: RegionalRoute,
        match_id: &str,
    ) -> Result<NewMatch, UpstreamError> {
        let request = self.riot_api.match_v5().get_match(region, match_id);
        match self.with_timeout(match_id, request).await? {
            Some(riot_match) => Ok(new_match(riot_match)),
            None => Err(UpstreamError::Status {
                status: 404,
                retry_after: None,
                body: "Match not found".to_owned(),
            }),
        }
    }

    async fn sleep(&self, duration: Duration) {
        Delay::from(duration).await
    }
}

/// Pulls the status, `Retry-After` and body out of a failed riven request.
async fn upstream_error(what: &str, mut e: RiotApiError) -> UpstreamError {
    let status = match e.status_code() {
        Some(status) if !status.is_success() => status,
        _ => return UpstreamError::Transport(format!("{}: {}", what, e)),
    };
    let retry_after = e
        .response()
        .and_then(|response| response.headers().get(RETRY_AFTER))
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after);
    let body = match e.take_response() {
        Some(response) => response.text().await.unwrap_or_default(),
        None => e.to_string(),
    };
    UpstreamError::Status {
        status: status.as_u16(),
        retry_after,
        body,
    }
}

/// The fields we store from a riven match-v5 [`match_v5::Match`].
fn new_match(riot_match: match_v5::Match) -> NewMatch {
    let info = riot_match.info;
    let start_millis = u64::try_from(info.game_start_timestamp).unwrap_or(0);
    let participants = info
        .participants
        .into_iter()
        .map(|p| NewParticipant {
            puuid: p.puuid,
            game_name: p.riot_id_game_name,
            tag_line: p.riot_id_tagline,
            team_id: i32::from(p.team_id as u16),
            champion_name: p.champion_name,
            win: p.win,
            role: p.role,
            kills: p.kills,
            deaths: p.deaths,
            assists: p.assists,
            gold_earned: p.gold_earned,
            damage_dealt: p.total_damage_dealt_to_champions,
        })
        .collect();
    NewMatch {
        match_id: riot_match.metadata.match_id,
        queue_id: i32::from(info.queue_id.0),
        start_timestamp: SystemTime::UNIX_EPOCH + Duration::from_millis(start_millis),
        participants,
    }
}

/// Parses a `Retry-After` header given in whole seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse().ok().map(Duration::from_secs)
}

/// Delay before retry number `attempt` (zero-based) when no `Retry-After` was given.
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
}

/// Match-v5 client, generic over the [`Upstream`].
pub struct MatchClient<U> {
    upstream: U,
}
impl<U> MatchClient<U>
where
    U: Upstream,
{
    /// Wraps the upstream.
    pub fn new(upstream: U) -> Self {
        Self { upstream }
    }

    /// The underlying upstream.
    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Runs `call`, repeating it for as long as it is rate limited.
    async fn with_backoff<T, F, Fut>(&self, what: &str, call: F) -> Result<T, UpstreamError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempt = 0;
        loop {
            let delay = match call().await {
                Err(UpstreamError::Status {
                    status: 429,
                    retry_after,
                    ..
                }) => retry_after.unwrap_or_else(|| backoff_delay(attempt)),
                result => return result,
            };
            log::warn!(
                "Rate limited on {} (attempt {}), retrying in {:?}.",
                what,
                attempt,
                delay
            );
            self.upstream.sleep(delay).await;
            attempt += 1;
        }
    }

    /// Fetches one page of match IDs. `None` on any non-rate-limit failure, which ends the
    /// listing early.
    pub async fn match_ids_page(
        &self,
        region: RegionalRoute,
        puuid: &str,
        start: SystemTime,
        end: SystemTime,
        offset: usize,
    ) -> Option<Vec<String>> {
        let upstream = &self.upstream;
        self.with_backoff("match ids", move || {
            upstream.match_ids(region, puuid, start, end, offset)
        })
        .await
        .map_err(|e| log::warn!("Match ids error for `{}` at {}: {}", puuid, offset, e))
        .ok()
    }

    /// Lazily lists all match IDs for the player within `[start, end]`, newest first, one page
    /// at a time. Ends at the first empty (or failed) page.
    pub fn match_ids<'a>(
        &'a self,
        region: RegionalRoute,
        puuid: &'a str,
        start: SystemTime,
        end: SystemTime,
    ) -> impl Stream<Item = String> + 'a {
        stream::unfold(0, move |offset| async move {
            if 0 < offset {
                self.upstream.sleep(PAGE_PACING).await;
            }
            match self.match_ids_page(region, puuid, start, end, offset).await {
                Some(ids) if !ids.is_empty() => Some((stream::iter(ids), offset + PAGE_SIZE)),
                _ => None,
            }
        })
        .flatten()
    }

    /// Fetches a match. Any non-rate-limit failure is an error.
    pub async fn match_detail(
        &self,
        region: RegionalRoute,
        match_id: &str,
    ) -> Result<NewMatch, CmError> {
        let upstream = &self.upstream;
        self.with_backoff(match_id, move || upstream.get_match(region, match_id))
            .await
            .map_err(|e| match e {
                UpstreamError::Status { status, body, .. } => CmError::Upstream {
                    match_id: match_id.to_owned(),
                    status,
                    body,
                },
                UpstreamError::Transport(msg) => CmError::Transport(msg),
            })
    }
}

/// Looks up the PUUID for a Riot ID (`game_name#tag_line`).
pub async fn resolve_puuid(
    riot_api: &RiotApi,
    region: RegionalRoute,
    game_name: &str,
    tag_line: &str,
) -> Result<String, CmError> {
    let account = riot_api
        .account_v1()
        .get_by_riot_id(region, game_name, tag_line)
        .await
        .map_err(|e| {
            CmError::Transport(format!(
                "Failed to get account {}#{}: {}",
                game_name, tag_line, e
            ))
        })?
        .ok_or_else(|| {
            CmError::NotFound(format!("No account for Riot ID {}#{}.", game_name, tag_line))
        })?;
    Ok(account.puuid)
}

/// Parses a regional route name, case-insensitive, e.g. `"americas"`.
pub fn parse_region(name: &str) -> Result<RegionalRoute, CmError> {
    name.trim()
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| CmError::BadRequest(format!("Unknown region `{}`.", name)))
}
