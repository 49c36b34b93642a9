//! Game worker: owns one game's segment and semaphores and answers its
//! client's commands, one turn at a time.

use crate::game::{self, Rules};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::session::{GameHandle, Teardown};
use shared::{Field, GameId, GameStatus, IpcError, Namespace};
use std::sync::Arc;

pub struct GameWorker {
    handle: GameHandle,
    field: Field,
    rules: Rules,
    rng: StdRng,
    turns: u64,
}

impl GameWorker {
    /// Creates the game's resources with a fresh starting field.
    pub fn start(namespace: &Namespace, game_id: GameId, rules: Rules) -> Result<Self, IpcError> {
        Self::with_rng(namespace, game_id, rules, StdRng::from_entropy())
    }

    pub fn with_rng(
        namespace: &Namespace,
        game_id: GameId,
        rules: Rules,
        mut rng: StdRng,
    ) -> Result<Self, IpcError> {
        let field = game::new_field(&rules.spawn, &mut rng);
        let handle = GameHandle::create(namespace, game_id, &field)?;
        info!(
            "Game {} created (win at {})",
            game_id,
            1u32 << u32::from(rules.win_power).min(31)
        );

        Ok(Self {
            handle,
            field,
            rules,
            rng,
            turns: 0,
        })
    }

    pub fn game_id(&self) -> GameId {
        self.handle.game_id()
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Removal of this game's resources, for signal and error paths.
    pub fn teardown(&self) -> Option<Arc<Teardown>> {
        self.handle.teardown()
    }

    /// Runs one full turn of the protocol and returns the published status.
    pub fn play_turn(&mut self) -> Result<GameStatus, IpcError> {
        let command = self.handle.await_command()?;
        let (field, status) = game::resolve(&self.field, command, &self.rules, &mut self.rng);
        self.handle.release_command_slot()?;

        self.handle.publish(status, &field)?;
        self.field = field;
        self.turns += 1;
        debug!(
            "Game {} turn {}: {:?} -> {:?}",
            self.game_id(),
            self.turns,
            command,
            status
        );
        Ok(status)
    }

    /// Plays turns until the game reaches a terminal status, then removes
    /// its resources. A halted game keeps waiting for a rejoining client.
    pub fn run(mut self) -> Result<GameStatus, IpcError> {
        loop {
            let status = self.play_turn()?;
            if status.is_terminal() {
                info!(
                    "Game {} ended with {:?} after {} turns",
                    self.game_id(),
                    status,
                    self.turns
                );
                if let Some(teardown) = self.teardown() {
                    teardown.release();
                }
                return Ok(status);
            }
            if status == GameStatus::Halted {
                info!(
                    "Game {} paused, waiting for a client to rejoin",
                    self.game_id()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Command;
    use std::thread;

    fn test_namespace(tag: &str) -> Namespace {
        Namespace::new(format!("worker-test-{}-{}", std::process::id(), tag)).unwrap()
    }

    #[test]
    fn test_worker_publishes_each_turn() {
        let ns = test_namespace("turns");
        let worker =
            GameWorker::with_rng(&ns, 1, Rules::default(), StdRng::seed_from_u64(1)).unwrap();
        let start = *worker.field();

        let client = GameHandle::attach(&ns, 1).unwrap();
        assert_eq!(client.field(), start);

        let handle = thread::spawn(move || worker.run());

        let paused = client.submit(Command::Disconnect).unwrap();
        assert_eq!(paused.status, GameStatus::Halted);
        assert_eq!(paused.field, start);

        let deleted = client.submit(Command::Delete).unwrap();
        assert_eq!(deleted.status, GameStatus::Deleted);

        let result = handle.join().unwrap().unwrap();
        assert_eq!(result, GameStatus::Deleted);
        assert!(GameHandle::attach(&ns, 1).is_err());
    }
}
