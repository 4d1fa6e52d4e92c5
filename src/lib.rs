#![warn(missing_docs)]

//! Cloudflare worker keeping a ledger of League of Legends players and their matches in sync
//! with the Riot API.

use std::rc::Rc;

use futures::future::join_all;
use serde::Serialize;
use worker::{
    event, Context, Env, Error, MessageBatch, MessageExt, Request, Response, Result,
    RouteContext, Router,
};

use crate::error::CmError;
use crate::ledger::Ledger;
use crate::player::{CreatePlayer, ResolvePuuid};
use crate::util::AppState;

pub mod d1;
pub mod db;
pub mod error;
pub mod ledger;
pub mod player;
pub mod riot;
pub mod sync;
pub mod util;
pub mod webjob;
pub mod with;

#[cfg(test)]
mod testutil;

/// Queue binding for [`webjob::Task`]s.
pub const QUEUE_WEBJOB: &str = "BINDING_QUEUE_WEBJOB";

type Ctx = RouteContext<Rc<AppState>>;

/// Cloudflare queue handler.
#[event(queue)]
pub async fn queue(
    message_batch: MessageBatch<webjob::Task>,
    env: Env,
    _ctx: Context,
) -> Result<()> {
    util::init_logging(util::log_level(&env));
    let state = AppState::from_env(&env)?;

    let futures = message_batch.messages()?.into_iter().map(|msg| {
        log::info!("Handling webjob task: `{:?}`.", msg.body());
        let state = &state;
        async move {
            let result =
                webjob::handle(&state.matches, &state.ledger, &state.config, msg.body()).await;
            result.map(|()| msg)
        }
    });
    let results = join_all(futures).await;
    let errors = results
        .into_iter()
        .filter_map(|result| result.map(|msg| msg.ack()).err())
        .map(|e| e.to_string())
        .collect::<Vec<_>>();

    log::info!("Handling webjob task complete. Errors: {:?}", errors);
    errors
        .is_empty()
        .then_some(())
        .ok_or(Error::RustError(format!("{:?}", errors)))
}

/// Cloudflare fetch request handler.
#[event(fetch, respond_with_errors)]
pub async fn fetch(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    util::init_logging(util::log_level(&env));
    let state = Rc::new(AppState::from_env(&env)?);

    Router::with_data(state)
        .get_async("/api/v1/players", players_get)
        .post_async("/api/v1/players", players_post)
        .post_async("/api/v1/players/puuid", puuid_post)
        .get_async("/api/v1/players/:puuid", player_get)
        .post_async("/api/v1/players/:puuid/sync", sync_post)
        .post_async("/api/v1/players/:puuid/sync/enqueue", sync_enqueue_post)
        .options_async("/api/v1/*path", preflight)
        .run(req, env)
        .await
}

/// JSON response, with CORS headers.
fn respond<T: Serialize>(
    ctx: &Ctx,
    result: std::result::Result<T, CmError>,
    status: u16,
) -> Result<Response> {
    let response = match result {
        Ok(body) => Response::from_json(&body)?.with_status(status),
        Err(e) => e.into_response()?,
    };
    response.with_cors(&ctx.data.cors)
}

fn puuid_param(ctx: &Ctx) -> std::result::Result<String, CmError> {
    ctx.param("puuid")
        .cloned()
        .ok_or_else(|| CmError::BadRequest("Missing `puuid`.".to_owned()))
}

async fn json_body<T: serde::de::DeserializeOwned>(
    req: &mut Request,
) -> std::result::Result<T, CmError> {
    req.json()
        .await
        .map_err(|e| CmError::BadRequest(format!("Invalid JSON body: {}", e)))
}

/// `OPTIONS /api/v1/*` CORS preflight.
pub async fn preflight(_req: Request, ctx: Ctx) -> Result<Response> {
    Response::empty()?.with_status(204).with_cors(&ctx.data.cors)
}

/// `GET /api/v1/players`
pub async fn players_get(_req: Request, ctx: Ctx) -> Result<Response> {
    let result = ctx.data.ledger.list_players().await;
    respond(&ctx, result, 200)
}

/// `GET /api/v1/players/:puuid`
pub async fn player_get(_req: Request, ctx: Ctx) -> Result<Response> {
    let result = async {
        let puuid = puuid_param(&ctx)?;
        player::get(&ctx.data.ledger, &puuid).await
    };
    let result = result.await;
    respond(&ctx, result, 200)
}

/// `POST /api/v1/players/puuid`
pub async fn puuid_post(mut req: Request, ctx: Ctx) -> Result<Response> {
    let result = async {
        let body: ResolvePuuid = json_body(&mut req).await?;
        let puuid = player::resolve(&ctx.data.riot_api, body).await?;
        Ok::<_, CmError>(serde_json::json!({ "puuid": puuid }))
    };
    let result = result.await;
    respond(&ctx, result, 200)
}

/// `POST /api/v1/players`
pub async fn players_post(mut req: Request, ctx: Ctx) -> Result<Response> {
    let result = async {
        let body: CreatePlayer = json_body(&mut req).await?;
        let state = &ctx.data;
        player::create(&state.ledger, &state.riot_api, state.config.region, body).await
    };
    let result = result.await;
    respond(&ctx, result, 201)
}

/// `POST /api/v1/players/:puuid/sync`
pub async fn sync_post(_req: Request, ctx: Ctx) -> Result<Response> {
    let result = async {
        let puuid = puuid_param(&ctx)?;
        let state = &ctx.data;
        sync::sync_player(
            &state.matches,
            &state.ledger,
            &puuid,
            state.config.year_floor(),
            state.config.region,
        )
        .await
    };
    let result = result.await;
    respond(&ctx, result, 200)
}

/// `POST /api/v1/players/:puuid/sync/enqueue`
pub async fn sync_enqueue_post(_req: Request, ctx: Ctx) -> Result<Response> {
    let result = async {
        let puuid = puuid_param(&ctx)?;
        let player = player::get(&ctx.data.ledger, &puuid).await?;
        ctx.env
            .queue(QUEUE_WEBJOB)?
            .send(webjob::Task::SyncPlayer {
                puuid: player.puuid.clone(),
            })
            .await?;
        Ok::<_, CmError>(serde_json::json!({ "queued": player.puuid }))
    };
    let result = result.await;
    respond(&ctx, result, 202)
}
