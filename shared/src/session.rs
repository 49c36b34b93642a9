//! Segment layouts, key derivation and the two protocol endpoints
//!
//! A [`LobbyHandle`] drives the session handshake on the server-wide lobby
//! segment; a [`GameHandle`] drives the per-game turn protocol. Each handle is
//! either the *owner* of its kernel objects (the lobby service, a game worker)
//! or merely *attached* (a client). Only owners ever remove anything, through
//! their one-shot [`Teardown`].

use crate::ipc::{unlink_segment, IpcError, Namespace, Semaphore, SharedLayout, SharedSegment};
use crate::{Command, Field, GameId, GameStatus, NEW_GAME};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const SHM_KEY: u32 = 112_233;
pub const SEM_KEY: u32 = 0x1234;

pub fn lobby_segment_key() -> u32 {
    SHM_KEY
}

/// Request, acknowledge and gate semaphore keys of the lobby.
pub fn lobby_semaphore_keys() -> [u32; 3] {
    [SEM_KEY, SEM_KEY + 1, SEM_KEY + 2]
}

pub fn game_segment_key(game_id: GameId) -> u32 {
    SHM_KEY + u32::from(game_id)
}

/// CommandReady, Mutex, StatusReady and TurnToken keys of one game.
pub fn game_semaphore_keys(game_id: GameId) -> [u32; 4] {
    let base = SEM_KEY + 5 * u32::from(game_id);
    [base + 1, base + 2, base + 3, base + 4]
}

/// Server-wide lobby segment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LobbySession {
    pub requested_id: u16,
    pub client_sequence: u16,
}

unsafe impl SharedLayout for LobbySession {}

/// Per-game segment. `status` and `command` hold wire codes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GameSession {
    pub field: Field,
    pub status: u32,
    pub command: u32,
}

unsafe impl SharedLayout for GameSession {}

/// Removes a fixed set of named objects, at most once per process.
///
/// Another process removing the same names concurrently is not guarded
/// against; owners are the only processes that hold a `Teardown`.
#[derive(Debug)]
pub struct Teardown {
    label: String,
    released: AtomicBool,
    segments: Vec<String>,
    semaphores: Vec<String>,
}

impl Teardown {
    pub fn new(label: impl Into<String>, segments: Vec<String>, semaphores: Vec<String>) -> Self {
        Self {
            label: label.into(),
            released: AtomicBool::new(false),
            segments,
            semaphores,
        }
    }

    /// Unlinks every object. Returns false if this already ran.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }

        info!("Releasing resources of {}", self.label);
        for name in &self.semaphores {
            if let Err(e) = Semaphore::unlink(name) {
                warn!("{}", e);
            }
        }
        for name in &self.segments {
            if let Err(e) = unlink_segment(name) {
                warn!("{}", e);
            }
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Endpoint of the lobby handshake.
pub struct LobbyHandle {
    segment: SharedSegment<LobbySession>,
    request: Semaphore,
    acknowledge: Semaphore,
    gate: Semaphore,
    teardown: Option<Arc<Teardown>>,
}

impl LobbyHandle {
    /// Creates the lobby segment and semaphores (lobby service only).
    pub fn create(namespace: &Namespace) -> Result<Self, IpcError> {
        let segment_name = namespace.segment_name(lobby_segment_key());
        let [request_key, ack_key, gate_key] = lobby_semaphore_keys();
        let semaphore_names: Vec<String> = [request_key, ack_key, gate_key]
            .iter()
            .map(|key| namespace.semaphore_name(*key))
            .collect();
        let teardown = Arc::new(Teardown::new(
            "lobby",
            vec![segment_name.clone()],
            semaphore_names.clone(),
        ));

        let handle = (|| -> Result<Self, IpcError> {
            let segment = SharedSegment::create(&segment_name, LobbySession::default())?;
            let request = Semaphore::create(&semaphore_names[0], 0)?;
            let acknowledge = Semaphore::create(&semaphore_names[1], 0)?;
            let gate = Semaphore::create(&semaphore_names[2], 1)?;
            Ok(Self {
                segment,
                request,
                acknowledge,
                gate,
                teardown: Some(Arc::clone(&teardown)),
            })
        })();

        if handle.is_err() {
            teardown.release();
        }
        handle
    }

    /// Opens the lobby of a running server (clients).
    pub fn attach(namespace: &Namespace) -> Result<Self, IpcError> {
        let [request_key, ack_key, gate_key] = lobby_semaphore_keys();
        Ok(Self {
            segment: SharedSegment::attach(&namespace.segment_name(lobby_segment_key()))?,
            request: Semaphore::open(&namespace.semaphore_name(request_key))?,
            acknowledge: Semaphore::open(&namespace.semaphore_name(ack_key))?,
            gate: Semaphore::open(&namespace.semaphore_name(gate_key))?,
            teardown: None,
        })
    }

    /// Client side of the handshake: posts `requested` (0 for a new game)
    /// and blocks for the lobby's answer. Returns the game id to attach to,
    /// or [`NEW_GAME`] when the lobby refused.
    pub fn request_session(&self, requested: GameId) -> Result<GameId, IpcError> {
        self.gate.wait()?;
        self.segment.update(|s| s.requested_id = requested);
        let answer = self
            .request
            .post()
            .and_then(|_| self.acknowledge.wait())
            .map(|_| self.segment.read().requested_id);
        self.gate.post()?;
        answer
    }

    /// Lobby side: blocks until a client posts a request.
    pub fn await_request(&self) -> Result<GameId, IpcError> {
        self.request.wait()?;
        Ok(self.segment.read().requested_id)
    }

    /// Lobby side: publishes the answer and wakes the requesting client.
    pub fn acknowledge(&self, answer: GameId) -> Result<(), IpcError> {
        self.segment.update(|s| s.requested_id = answer);
        self.acknowledge.post()
    }

    pub fn client_sequence(&self) -> u16 {
        self.segment.read().client_sequence
    }

    pub fn set_client_sequence(&self, sequence: u16) {
        self.segment.update(|s| s.client_sequence = sequence);
    }

    /// The owner's teardown; `None` on attached handles.
    pub fn teardown(&self) -> Option<Arc<Teardown>> {
        self.teardown.clone()
    }
}

impl Drop for LobbyHandle {
    fn drop(&mut self) {
        if let Some(teardown) = &self.teardown {
            teardown.release();
        }
    }
}

/// Result of one completed turn, as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Turn {
    pub status: GameStatus,
    pub field: Field,
}

/// Endpoint of one game's turn protocol.
pub struct GameHandle {
    game_id: GameId,
    segment: SharedSegment<GameSession>,
    command_ready: Semaphore,
    mutex: Semaphore,
    status_ready: Semaphore,
    turn_token: Semaphore,
    teardown: Option<Arc<Teardown>>,
}

impl GameHandle {
    /// Creates the game's segment (holding `field`, status ON, command
    /// UNSET) and its four semaphores at their initial counts.
    pub fn create(namespace: &Namespace, game_id: GameId, field: &Field) -> Result<Self, IpcError> {
        debug_assert_ne!(game_id, NEW_GAME);
        let segment_name = namespace.segment_name(game_segment_key(game_id));
        let semaphore_names: Vec<String> = game_semaphore_keys(game_id)
            .iter()
            .map(|key| namespace.semaphore_name(*key))
            .collect();
        let teardown = Arc::new(Teardown::new(
            format!("game {}", game_id),
            vec![segment_name.clone()],
            semaphore_names.clone(),
        ));

        let initial = GameSession {
            field: *field,
            status: GameStatus::On.code(),
            command: Command::Unset.code(),
        };

        let handle = (|| -> Result<Self, IpcError> {
            let segment = SharedSegment::create(&segment_name, initial)?;
            Ok(Self {
                game_id,
                segment,
                command_ready: Semaphore::create(&semaphore_names[0], 0)?,
                mutex: Semaphore::create(&semaphore_names[1], 1)?,
                status_ready: Semaphore::create(&semaphore_names[2], 0)?,
                turn_token: Semaphore::create(&semaphore_names[3], 1)?,
                teardown: Some(Arc::clone(&teardown)),
            })
        })();

        match &handle {
            Ok(_) => debug!("Game {} resources created", game_id),
            Err(_) => {
                teardown.release();
            }
        }
        handle
    }

    /// Opens an existing game; every identifier is derived from `game_id`.
    pub fn attach(namespace: &Namespace, game_id: GameId) -> Result<Self, IpcError> {
        let [command_ready, mutex, status_ready, turn_token] = game_semaphore_keys(game_id);
        Ok(Self {
            game_id,
            segment: SharedSegment::attach(&namespace.segment_name(game_segment_key(game_id)))?,
            command_ready: Semaphore::open(&namespace.semaphore_name(command_ready))?,
            mutex: Semaphore::open(&namespace.semaphore_name(mutex))?,
            status_ready: Semaphore::open(&namespace.semaphore_name(status_ready))?,
            turn_token: Semaphore::open(&namespace.semaphore_name(turn_token))?,
            teardown: None,
        })
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Field as last published by the worker.
    pub fn field(&self) -> Field {
        self.segment.read().field
    }

    pub fn status(&self) -> Result<GameStatus, IpcError> {
        let code = self.segment.read().status;
        GameStatus::from_code(code).ok_or(IpcError::CorruptStatus(code))
    }

    /// Hands a paused game to a rejoining client.
    ///
    /// Succeeds only while the published status is HALTED and that status
    /// has been consumed, i.e. no client holds the game. The status is set
    /// back to ON so a second rejoin of the same game is refused.
    pub fn claim_paused(&self) -> Result<bool, IpcError> {
        if self.status()? != GameStatus::Halted || self.turn_token.value()? != 1 {
            return Ok(false);
        }
        self.segment.update(|s| s.status = GameStatus::On.code());
        Ok(true)
    }

    /// Client turn: post `command`, block for the worker's answer, hand the
    /// turn token back.
    pub fn submit(&self, command: Command) -> Result<Turn, IpcError> {
        self.mutex.wait()?;
        self.segment.update(|s| s.command = command.code());
        self.command_ready.post()?;

        self.status_ready.wait()?;
        let session = self.segment.read();
        self.turn_token.post()?;

        let status =
            GameStatus::from_code(session.status).ok_or(IpcError::CorruptStatus(session.status))?;
        Ok(Turn {
            status,
            field: session.field,
        })
    }

    /// Worker step 1: blocks until a command is posted.
    pub fn await_command(&self) -> Result<Command, IpcError> {
        self.command_ready.wait()?;
        let code = self.segment.read().command;
        Command::from_code(code).ok_or(IpcError::CorruptCommand(code))
    }

    /// Worker step 3: lets the client post its next command.
    pub fn release_command_slot(&self) -> Result<(), IpcError> {
        self.mutex.post()
    }

    /// Worker steps 4 to 6: waits until the previous status was consumed,
    /// writes the new one and notifies the client.
    pub fn publish(&self, status: GameStatus, field: &Field) -> Result<(), IpcError> {
        self.turn_token.wait()?;
        self.segment.update(|s| {
            s.status = status.code();
            s.field = *field;
        });
        self.status_ready.post()
    }

    /// Current counts of CommandReady, Mutex, StatusReady and TurnToken.
    pub fn semaphore_values(&self) -> Result<[i32; 4], IpcError> {
        Ok([
            self.command_ready.value()?,
            self.mutex.value()?,
            self.status_ready.value()?,
            self.turn_token.value()?,
        ])
    }

    pub fn teardown(&self) -> Option<Arc<Teardown>> {
        self.teardown.clone()
    }
}

impl Drop for GameHandle {
    fn drop(&mut self) {
        if let Some(teardown) = &self.teardown {
            teardown.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_namespace(tag: &str) -> Namespace {
        Namespace::new(format!("session-test-{}-{}", std::process::id(), tag)).unwrap()
    }

    #[test]
    fn test_game_keys_are_disjoint() {
        let lobby = lobby_semaphore_keys();
        let first = game_semaphore_keys(1);
        let second = game_semaphore_keys(2);

        assert_eq!(first, [SEM_KEY + 6, SEM_KEY + 7, SEM_KEY + 8, SEM_KEY + 9]);
        assert!(first.iter().all(|k| !lobby.contains(k)));
        assert!(first.iter().all(|k| !second.contains(k)));
        assert_ne!(game_segment_key(1), lobby_segment_key());
        assert_eq!(game_segment_key(65535), SHM_KEY + 65535);
    }

    #[test]
    fn test_game_created_with_initial_values() {
        let ns = test_namespace("init");
        let field = Field::from_values([[0, 0, 1, 0], [0; 4], [0; 4], [0; 4]]);
        let worker = GameHandle::create(&ns, 3, &field).unwrap();
        let client = GameHandle::attach(&ns, 3).unwrap();

        assert_eq!(client.semaphore_values().unwrap(), [0, 1, 0, 1]);
        assert_eq!(client.status().unwrap(), GameStatus::On);
        assert_eq!(client.field(), field);
        assert!(client.teardown().is_none());
        drop(client);
        drop(worker);
        assert!(GameHandle::attach(&ns, 3).is_err());
    }

    #[test]
    fn test_teardown_runs_once() {
        let ns = test_namespace("once");
        let worker = GameHandle::create(&ns, 1, &Field::new()).unwrap();
        let teardown = worker.teardown().unwrap();

        assert!(teardown.release());
        assert!(!teardown.release());
        assert!(teardown.is_released());
        // Names are gone but the owner's own mappings stay usable.
        assert_eq!(worker.semaphore_values().unwrap(), [0, 1, 0, 1]);
        assert!(GameHandle::attach(&ns, 1).is_err());
    }

    #[test]
    fn test_only_a_paused_game_is_claimed_once() {
        let ns = test_namespace("claim");
        let worker = GameHandle::create(&ns, 2, &Field::new()).unwrap();
        let client = GameHandle::attach(&ns, 2).unwrap();
        assert!(!client.claim_paused().unwrap());

        // Paused, but the client has not read the status yet.
        worker.publish(GameStatus::Halted, &Field::new()).unwrap();
        assert!(!client.claim_paused().unwrap());

        client.status_ready.wait().unwrap();
        client.turn_token.post().unwrap();
        assert!(client.claim_paused().unwrap());
        assert_eq!(client.status().unwrap(), GameStatus::On);
        assert!(!client.claim_paused().unwrap());
    }

    #[test]
    fn test_attach_missing_lobby() {
        let ns = test_namespace("nolobby");
        let err = LobbyHandle::attach(&ns).err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_client_sequence_roundtrip_through_segment() {
        let ns = test_namespace("seq");
        let lobby = LobbyHandle::create(&ns).unwrap();
        assert_eq!(lobby.client_sequence(), 0);
        lobby.set_client_sequence(41);

        let peer = LobbyHandle::attach(&ns).unwrap();
        assert_eq!(peer.client_sequence(), 41);
    }
}
