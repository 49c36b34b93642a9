//! Registry of running game workers
//!
//! This module tracks the worker behind every live game id:
//! - Registration of freshly launched workers
//! - Liveness checks used when a client asks to rejoin a game
//! - Reaping of workers whose game has ended
//! - Capacity enforcement and shutdown of everything still running
//!
//! The manager is generic over the worker handle so the lobby can run
//! against real processes as well as in-process workers.

use log::{info, warn};
use shared::GameId;
use std::collections::HashMap;
use std::time::Instant;

/// A launched worker whose lifetime the lobby observes.
pub trait WorkerProcess: Send + Sync {
    /// Returns true once the worker has finished and released its game.
    fn has_exited(&mut self) -> bool;

    /// Stops the worker and waits for it to go away.
    fn terminate(&mut self);
}

/// A running game and the worker serving it
#[derive(Debug)]
pub struct WorkerEntry<W> {
    pub game_id: GameId,
    pub started: Instant,
    pub worker: W,
}

impl<W: WorkerProcess> WorkerEntry<W> {
    pub fn new(game_id: GameId, worker: W) -> Self {
        Self {
            game_id,
            started: Instant::now(),
            worker,
        }
    }
}

/// Manages all running game workers
///
/// Game ids double as keys for the game's kernel objects, so an id is
/// only handed out again after its worker has been removed from here.
pub struct WorkerManager<W> {
    workers: HashMap<GameId, WorkerEntry<W>>,
    max_workers: usize,
}

impl<W: WorkerProcess> WorkerManager<W> {
    pub fn new(max_workers: usize) -> Self {
        Self {
            workers: HashMap::new(),
            max_workers,
        }
    }

    /// Registers a worker for `game_id`.
    ///
    /// Hands the worker back when the manager is full or the id is taken.
    pub fn add_worker(&mut self, game_id: GameId, worker: W) -> Result<(), W> {
        if self.is_full() || self.workers.contains_key(&game_id) {
            return Err(worker);
        }

        info!("Game {} registered", game_id);
        self.workers
            .insert(game_id, WorkerEntry::new(game_id, worker));
        Ok(())
    }

    /// Forgets a worker without stopping it.
    pub fn remove_worker(&mut self, game_id: GameId) -> Option<W> {
        self.workers.remove(&game_id).map(|entry| {
            info!(
                "Game {} removed after {:.1}s",
                game_id,
                entry.started.elapsed().as_secs_f32()
            );
            entry.worker
        })
    }

    /// Whether a game id is registered, regardless of liveness.
    pub fn contains(&self, game_id: GameId) -> bool {
        self.workers.contains_key(&game_id)
    }

    /// Whether a client may join `game_id` right now.
    ///
    /// A worker found to have exited is dropped from the registry.
    pub fn is_running(&mut self, game_id: GameId) -> bool {
        let exited = match self.workers.get_mut(&game_id) {
            Some(entry) => entry.worker.has_exited(),
            None => return false,
        };

        if exited {
            self.remove_worker(game_id);
        }
        !exited
    }

    /// Removes every worker that has finished and returns their ids.
    pub fn reap_finished(&mut self) -> Vec<GameId> {
        let finished: Vec<GameId> = self
            .workers
            .iter_mut()
            .filter_map(|(id, entry)| entry.worker.has_exited().then_some(*id))
            .collect();

        for game_id in &finished {
            self.remove_worker(*game_id);
        }

        finished
    }

    /// Stops every remaining worker.
    pub fn terminate_all(&mut self) -> usize {
        let count = self.workers.len();
        for (game_id, mut entry) in self.workers.drain() {
            if !entry.worker.has_exited() {
                warn!("Stopping game {}", game_id);
                entry.worker.terminate();
            }
        }
        count
    }

    pub fn game_ids(&self) -> Vec<GameId> {
        let mut ids: Vec<GameId> = self.workers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.workers.len() >= self.max_workers
    }
}
