//! Player registration and lookup.

use riven::consts::RegionalRoute;
use riven::RiotApi;

use crate::db::Player;
use crate::error::CmError;
use crate::ledger::Ledger;
use crate::riot::{parse_region, resolve_puuid};

/// `POST /api/v1/players/puuid` body.
#[derive(Debug, Default, serde::Deserialize)]
pub struct ResolvePuuid {
    /// Riot ID game name.
    pub game_name: Option<String>,
    /// Riot ID tag line.
    pub tag_line: Option<String>,
    /// Regional route name, e.g. `"americas"`.
    pub region: Option<String>,
}

/// `POST /api/v1/players` body. Either `puuid`, or both `game_name` and `tag_line`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct CreatePlayer {
    /// Riot PUUID, if known.
    pub puuid: Option<String>,
    /// Riot ID game name.
    pub game_name: Option<String>,
    /// Riot ID tag line.
    pub tag_line: Option<String>,
    /// Regional route name for the PUUID lookup. Defaults to the configured region.
    pub region: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Looks up the PUUID for a Riot ID. All fields are required.
pub async fn resolve(riot_api: &RiotApi, body: ResolvePuuid) -> Result<String, CmError> {
    let (Some(game_name), Some(tag_line), Some(region)) = (
        non_blank(body.game_name),
        non_blank(body.tag_line),
        non_blank(body.region),
    ) else {
        return Err(CmError::BadRequest(
            "`game_name`, `tag_line` and `region` are required.".to_owned(),
        ));
    };
    resolve_puuid(riot_api, parse_region(&region)?, &game_name, &tag_line).await
}

/// Registers a player, resolving the PUUID from the Riot ID if not given. Returns the existing
/// player, unchanged, if already registered.
pub async fn create<L>(
    ledger: &L,
    riot_api: &RiotApi,
    default_region: RegionalRoute,
    body: CreatePlayer,
) -> Result<Player, CmError>
where
    L: Ledger,
{
    let game_name = non_blank(body.game_name);
    let tag_line = non_blank(body.tag_line);
    let puuid = match non_blank(body.puuid) {
        Some(puuid) => puuid,
        None => {
            let (Some(game_name), Some(tag_line)) = (&game_name, &tag_line) else {
                return Err(CmError::BadRequest(
                    "Either `puuid` or both `game_name` and `tag_line` must be provided."
                        .to_owned(),
                ));
            };
            let region = match non_blank(body.region) {
                Some(region) => parse_region(&region)?,
                None => default_region,
            };
            resolve_puuid(riot_api, region, game_name, tag_line).await?
        }
    };

    let player = ledger
        .get_or_insert_player(&puuid, game_name.as_deref(), tag_line.as_deref())
        .await?;
    log::info!("Registered player `{}` (PK ID {}).", player.puuid, player.id);
    Ok(player)
}

/// Player by PUUID, or [`CmError::NotFound`].
pub async fn get<L>(ledger: &L, puuid: &str) -> Result<Player, CmError>
where
    L: Ledger,
{
    ledger
        .find_player(puuid)
        .await?
        .ok_or_else(|| CmError::NotFound("Player not found".to_owned()))
}
