//! Client-side view of a game: the last published field and what the
//! latest status means for the player.

use shared::session::Turn;
use shared::{Field, GameId, GameStatus};

/// How a client session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Won,
    Lost,
    Deleted,
    /// The game was left running and can be rejoined with this id.
    Paused(GameId),
}

impl Outcome {
    pub fn message(self) -> &'static str {
        match self {
            Outcome::Won => "GAME WON!",
            Outcome::Lost => "GAME OVER!",
            Outcome::Deleted => "GAME DELETED!",
            Outcome::Paused(_) => "GAME PAUSED!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Continue,
    Finished(Outcome),
}

#[derive(Debug, Clone)]
pub struct ClientGameState {
    pub game_id: GameId,
    pub field: Field,
    pub last_status: GameStatus,
    pub turns: u32,
    pub rejected_moves: u32,
}

impl ClientGameState {
    pub fn new(game_id: GameId, field: Field) -> Self {
        Self {
            game_id,
            field,
            last_status: GameStatus::On,
            turns: 0,
            rejected_moves: 0,
        }
    }

    /// Records the result of one turn.
    pub fn apply(&mut self, turn: Turn) -> Progress {
        self.field = turn.field;
        self.last_status = turn.status;
        self.turns += 1;

        match turn.status {
            GameStatus::On => Progress::Continue,
            GameStatus::NoMove => {
                self.rejected_moves += 1;
                Progress::Continue
            }
            GameStatus::Won => Progress::Finished(Outcome::Won),
            GameStatus::Lost => Progress::Finished(Outcome::Lost),
            GameStatus::Deleted => Progress::Finished(Outcome::Deleted),
            GameStatus::Halted => Progress::Finished(Outcome::Paused(self.game_id)),
        }
    }

    /// Message shown above the field after the latest turn.
    pub fn status_message(&self) -> Option<&'static str> {
        match self.last_status {
            GameStatus::On => None,
            GameStatus::NoMove => Some("NO MOVE"),
            GameStatus::Won => Some(Outcome::Won.message()),
            GameStatus::Lost => Some(Outcome::Lost.message()),
            GameStatus::Deleted => Some(Outcome::Deleted.message()),
            GameStatus::Halted => Some(Outcome::Paused(self.game_id).message()),
        }
    }

    /// Whether the field should still be drawn after the latest turn.
    pub fn shows_field(&self) -> bool {
        !matches!(self.last_status, GameStatus::Deleted | GameStatus::Halted)
    }
}
