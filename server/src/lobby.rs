//! Lobby service: answers session requests arriving on the lobby segment.
//!
//! Each request is either `0` (start a new game) or the id of a game the
//! client wants to rejoin. The answer written back before the acknowledge
//! is the id the client should attach to, or `0` when there is none.

use crate::config::ServerConfig;
use crate::launcher::WorkerLauncher;
use crate::worker_manager::{WorkerManager, WorkerProcess};
use log::{debug, error, info, warn};
use shared::session::{GameHandle, LobbyHandle, Teardown};
use shared::{GameId, IpcError, Namespace, NEW_GAME};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error(transparent)]
    Ipc(#[from] IpcError),
    #[error("failed to spawn game worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("worker for game {0} did not report ready")]
    WorkerNotReady(GameId),
    #[error("no free game id left")]
    NoFreeId,
}

/// Outcome of one lobby request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Started(GameId),
    Rejoined(GameId),
    Refused { requested: GameId },
}

impl Handshake {
    /// Value written back to the requesting client.
    pub fn answer(self) -> GameId {
        match self {
            Handshake::Started(id) | Handshake::Rejoined(id) => id,
            Handshake::Refused { .. } => NEW_GAME,
        }
    }
}

/// Next id after `current` that is non-zero and not `taken`, wrapping
/// from `u16::MAX` back to 1.
pub fn next_game_id(current: GameId, taken: impl Fn(GameId) -> bool) -> Option<GameId> {
    let mut candidate = current;
    for _ in 0..GameId::MAX {
        candidate = match candidate.checked_add(1) {
            Some(next) => next,
            None => 1,
        };
        if candidate != NEW_GAME && !taken(candidate) {
            return Some(candidate);
        }
    }
    None
}

pub type SharedWorkers<W> = Arc<RwLock<WorkerManager<W>>>;

pub struct Lobby<L: WorkerLauncher> {
    handle: LobbyHandle,
    namespace: Namespace,
    launcher: L,
    workers: SharedWorkers<L::Worker>,
}

impl<L: WorkerLauncher> Lobby<L> {
    /// Creates the lobby resources. Fails if they cannot be created.
    pub fn create(config: &ServerConfig, launcher: L) -> Result<Self, LobbyError> {
        let handle = LobbyHandle::create(&config.namespace)?;
        info!(
            "Lobby open in namespace '{}' (max {} games)",
            config.namespace.as_str(),
            config.max_games
        );

        Ok(Self {
            handle,
            namespace: config.namespace.clone(),
            launcher,
            workers: Arc::new(RwLock::new(WorkerManager::new(config.max_games))),
        })
    }

    pub fn workers(&self) -> SharedWorkers<L::Worker> {
        Arc::clone(&self.workers)
    }

    pub fn teardown(&self) -> Option<Arc<Teardown>> {
        self.handle.teardown()
    }

    /// Serves requests until the lobby resources fail.
    ///
    /// Blocks on the request semaphore, so it must run on a blocking thread.
    pub fn run(&mut self) -> Result<(), LobbyError> {
        loop {
            match self.serve_one()? {
                Handshake::Started(id) => info!("Started game {}", id),
                Handshake::Rejoined(id) => info!("Client rejoined game {}", id),
                Handshake::Refused { requested } if requested == NEW_GAME => {
                    warn!("Refused new game request")
                }
                Handshake::Refused { requested } => {
                    warn!("Refused rejoin of game {}", requested)
                }
            }
        }
    }

    /// Waits for one request, answers it and acknowledges the client.
    pub fn serve_one(&mut self) -> Result<Handshake, LobbyError> {
        let requested = self.handle.await_request()?;
        debug!("Session request for {}", requested);

        let handshake = if requested == NEW_GAME {
            match self.start_game() {
                Ok(handshake) => handshake,
                Err(LobbyError::Ipc(e)) => return Err(LobbyError::Ipc(e)),
                Err(e) => {
                    error!("Failed to start game: {}", e);
                    Handshake::Refused { requested }
                }
            }
        } else {
            self.route_rejoin(requested)
        };

        self.handle.acknowledge(handshake.answer())?;
        Ok(handshake)
    }

    fn start_game(&mut self) -> Result<Handshake, LobbyError> {
        let mut workers = self.workers.blocking_write();
        workers.reap_finished();
        if workers.is_full() {
            warn!("Game limit of {} reached", workers.len());
            return Ok(Handshake::Refused {
                requested: NEW_GAME,
            });
        }

        let game_id = next_game_id(self.handle.client_sequence(), |id| workers.contains(id))
            .ok_or(LobbyError::NoFreeId)?;
        self.handle.set_client_sequence(game_id);

        let worker = self.launcher.launch(game_id)?;
        if let Err(mut worker) = workers.add_worker(game_id, worker) {
            worker.terminate();
            return Err(LobbyError::NoFreeId);
        }
        Ok(Handshake::Started(game_id))
    }

    /// A rejoin is only granted for a live game that is paused and not
    /// already handed to another client.
    fn route_rejoin(&mut self, game_id: GameId) -> Handshake {
        let refused = Handshake::Refused { requested: game_id };
        if !self.workers.blocking_write().is_running(game_id) {
            return refused;
        }

        match self.claim_paused(game_id) {
            Ok(true) => Handshake::Rejoined(game_id),
            Ok(false) => {
                debug!("Game {} is in play", game_id);
                refused
            }
            Err(e) => {
                warn!("Failed to inspect game {}: {}", game_id, e);
                refused
            }
        }
    }

    fn claim_paused(&self, game_id: GameId) -> Result<bool, IpcError> {
        let game = GameHandle::attach(&self.namespace, game_id)?;
        game.claim_paused()
    }
}

/// Periodically drops finished workers from the registry.
pub async fn reap_workers<W: WorkerProcess>(workers: SharedWorkers<W>, period: Duration) {
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;

        let finished = {
            let mut workers_guard = workers.write().await;
            workers_guard.reap_finished()
        };

        for game_id in finished {
            debug!("Reaped worker of game {}", game_id);
        }
    }
}
