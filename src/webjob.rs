//! Background "webjob" task handling.

use crate::error::CmError;
use crate::ledger::Ledger;
use crate::riot::{MatchClient, Upstream};
use crate::sync::sync_player;
use crate::util::AppConfig;

/// Enum of the possible tasks for the webjob queue.
#[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Task {
    /// Sync new matches for the player with the given PUUID.
    SyncPlayer {
        /// Riot PUUID.
        puuid: String,
    },
}

/// Handle a `Task`. An `Err` is retried by the queue; tasks that can never succeed are logged
/// and dropped instead.
pub async fn handle<U, L>(
    client: &MatchClient<U>,
    ledger: &L,
    config: &AppConfig,
    task: &Task,
) -> Result<(), CmError>
where
    U: Upstream,
    L: Ledger,
{
    match task {
        Task::SyncPlayer { puuid } => {
            match sync_player(client, ledger, puuid, config.year_floor(), config.region).await {
                Ok(summary) => log::info!(
                    "Webjob synced `{}`: {} new matches.",
                    summary.puuid,
                    summary.processed_count
                ),
                // Player was removed after the task was queued.
                Err(CmError::NotFound(msg)) => {
                    log::warn!("Dropping webjob task {:?}: {}", task, msg)
                }
                Err(e) => return Err(e),
            }
            Ok(())
        }
    }
}
