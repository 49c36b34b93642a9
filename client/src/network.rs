//! Connection to the server: the lobby handshake and the per-turn exchange
//! with the game worker.

use crate::game::{ClientGameState, Outcome, Progress};
use crate::input::InputManager;
use crate::rendering::Renderer;
use log::{debug, info};
use shared::session::{GameHandle, LobbyHandle};
use shared::{Command, GameId, IpcError, Namespace, NEW_GAME};
use std::io::{BufRead, Write};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("server is not running ({0})")]
    ServerOffline(#[source] IpcError),
    #[error("game {0} does not exist or is not paused")]
    NoSuchGame(GameId),
    #[error("server could not start a game")]
    GameNotStarted,
    #[error(transparent)]
    Ipc(#[from] IpcError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Which game the client asks the lobby for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    New,
    Join(GameId),
}

impl Mode {
    fn requested_id(self) -> GameId {
        match self {
            Mode::New => NEW_GAME,
            Mode::Join(id) => id,
        }
    }
}

pub struct Client {
    game: GameHandle,
    state: ClientGameState,
}

impl Client {
    /// Performs the lobby handshake and attaches to the assigned game.
    pub fn connect(namespace: &Namespace, mode: Mode) -> Result<Self, ClientError> {
        let lobby = LobbyHandle::attach(namespace).map_err(|e| {
            if e.is_not_found() {
                ClientError::ServerOffline(e)
            } else {
                ClientError::Ipc(e)
            }
        })?;

        let game_id = lobby.request_session(mode.requested_id())?;
        if game_id == NEW_GAME {
            return Err(match mode {
                Mode::New => ClientError::GameNotStarted,
                Mode::Join(id) => ClientError::NoSuchGame(id),
            });
        }

        let game = GameHandle::attach(namespace, game_id)?;
        let state = ClientGameState::new(game_id, game.field());
        info!("Attached to game {}", game_id);

        Ok(Self { game, state })
    }

    pub fn game_id(&self) -> GameId {
        self.state.game_id
    }

    pub fn state(&self) -> &ClientGameState {
        &self.state
    }

    /// Sends one command and waits for the worker's answer.
    pub fn play(&mut self, command: Command) -> Result<Progress, ClientError> {
        let turn = self.game.submit(command)?;
        debug!("{:?} -> {:?}", command, turn.status);
        Ok(self.state.apply(turn))
    }

    /// Plays commands read from `input` until the game ends.
    ///
    /// Running out of input disconnects, leaving the game to be rejoined.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputManager<R>,
        renderer: &mut Renderer<W>,
    ) -> Result<Outcome, ClientError> {
        renderer.render(&self.state.field, None)?;

        loop {
            let mut invalid = Vec::new();
            let command = input.next_command(|c| invalid.push(c))?;
            for c in invalid {
                renderer.message(&format!("'{}' is not a valid command", c))?;
            }

            let command = command.unwrap_or_else(|| {
                info!("End of input, leaving game {}", self.state.game_id);
                Command::Disconnect
            });

            let progress = self.play(command)?;
            let message = self.state.status_message();
            if self.state.shows_field() {
                renderer.render(&self.state.field, message)?;
            } else if let Some(message) = message {
                renderer.message(message)?;
            }

            if let Progress::Finished(outcome) = progress {
                return Ok(outcome);
            }
        }
    }
}
