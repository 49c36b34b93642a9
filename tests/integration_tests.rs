//! Integration tests for the lobby, game workers and clients
//!
//! These tests use real named semaphores and shared memory. Each test runs in
//! its own namespace and deletes every game it starts so no kernel objects
//! outlive the test run.

use client::game::{Outcome, Progress};
use client::network::{Client, ClientError, Mode};
use server::config::ServerConfig;
use server::game::Rules;
use server::launcher::WorkerLauncher;
use server::lobby::{Lobby, LobbyError};
use server::worker::GameWorker;
use server::worker_manager::WorkerProcess;
use shared::session::{GameHandle, LobbyHandle};
use shared::{Command, Field, GameId, GameStatus, Namespace};
use std::collections::HashSet;
use std::thread::{self, JoinHandle};

fn test_namespace(tag: &str) -> Namespace {
    Namespace::new(format!("it-{}-{}", std::process::id(), tag)).unwrap()
}

/// Runs each game worker on a thread of the test process.
struct ThreadLauncher {
    namespace: Namespace,
    rules: Rules,
}

struct ThreadWorker {
    handle: Option<JoinHandle<()>>,
}

impl WorkerLauncher for ThreadLauncher {
    type Worker = ThreadWorker;

    fn launch(&mut self, game_id: GameId) -> Result<ThreadWorker, LobbyError> {
        let worker = GameWorker::start(&self.namespace, game_id, self.rules)?;
        let handle = thread::spawn(move || {
            worker.run().unwrap();
        });
        Ok(ThreadWorker {
            handle: Some(handle),
        })
    }
}

impl WorkerProcess for ThreadWorker {
    fn has_exited(&mut self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    // Every test deletes the games it starts, so stopping a worker only
    // has to wait for its thread.
    fn terminate(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Opens a lobby and serves `requests` requests on a background thread.
fn serve_lobby(
    namespace: &Namespace,
    max_games: usize,
    requests: usize,
) -> JoinHandle<Lobby<ThreadLauncher>> {
    let config = ServerConfig::new(namespace.clone(), Rules::default(), max_games);
    let launcher = ThreadLauncher {
        namespace: namespace.clone(),
        rules: config.rules,
    };
    let mut lobby = Lobby::create(&config, launcher).unwrap();

    thread::spawn(move || {
        for _ in 0..requests {
            lobby.serve_one().unwrap();
        }
        lobby
    })
}

fn finish_lobby(handle: JoinHandle<Lobby<ThreadLauncher>>) {
    let lobby = handle.join().unwrap();
    lobby.workers().blocking_write().terminate_all();
}

/// LOBBY HANDSHAKE TESTS
mod lobby_tests {
    use super::*;

    #[test]
    fn new_game_handshake_initializes_game() {
        let ns = test_namespace("new-game");
        let lobby = serve_lobby(&ns, 4, 1);

        let mut client = Client::connect(&ns, Mode::New).unwrap();
        let game_id = client.game_id();
        assert_eq!(game_id, 1);

        let observer = GameHandle::attach(&ns, game_id).unwrap();
        assert_eq!(observer.semaphore_values().unwrap(), [0, 1, 0, 1]);
        assert_eq!(observer.status().unwrap(), GameStatus::On);
        assert_eq!(observer.field().empty_cells().len(), 15);
        assert_eq!(client.state().field, observer.field());

        let progress = client.play(Command::Delete).unwrap();
        assert_eq!(progress, Progress::Finished(Outcome::Deleted));

        finish_lobby(lobby);
        assert!(GameHandle::attach(&ns, game_id).is_err());
    }

    #[test]
    fn rejoin_unknown_game_is_refused() {
        let ns = test_namespace("unknown");
        let lobby = serve_lobby(&ns, 4, 1);

        let result = Client::connect(&ns, Mode::Join(42));
        assert!(matches!(result, Err(ClientError::NoSuchGame(42))));

        finish_lobby(lobby);
    }

    #[test]
    fn halted_game_can_be_rejoined() {
        let ns = test_namespace("rejoin");
        let lobby = serve_lobby(&ns, 4, 2);

        let mut client = Client::connect(&ns, Mode::New).unwrap();
        let game_id = client.game_id();
        for command in [Command::Left, Command::Up, Command::Right, Command::Down] {
            client.play(command).unwrap();
        }
        let field = client.state().field;

        let progress = client.play(Command::Disconnect).unwrap();
        assert_eq!(progress, Progress::Finished(Outcome::Paused(game_id)));
        assert_eq!(client.state().field, field);
        drop(client);

        let mut client = Client::connect(&ns, Mode::Join(game_id)).unwrap();
        assert_eq!(client.game_id(), game_id);
        assert_eq!(client.state().field, field);

        let progress = client.play(Command::Delete).unwrap();
        assert_eq!(progress, Progress::Finished(Outcome::Deleted));

        finish_lobby(lobby);
    }

    #[test]
    fn game_in_play_cannot_be_joined() {
        let ns = test_namespace("in-play");
        let lobby = serve_lobby(&ns, 4, 2);

        let mut owner = Client::connect(&ns, Mode::New).unwrap();
        let game_id = owner.game_id();
        owner.play(Command::Left).unwrap();

        let intruder = Client::connect(&ns, Mode::Join(game_id));
        assert!(matches!(intruder, Err(ClientError::NoSuchGame(id)) if id == game_id));

        let progress = owner.play(Command::Delete).unwrap();
        assert_eq!(progress, Progress::Finished(Outcome::Deleted));
        finish_lobby(lobby);
    }

    #[test]
    fn paused_game_is_handed_to_one_client() {
        let ns = test_namespace("rejoin-once");
        let lobby = serve_lobby(&ns, 4, 3);

        let mut client = Client::connect(&ns, Mode::New).unwrap();
        let game_id = client.game_id();
        client.play(Command::Disconnect).unwrap();
        drop(client);

        let mut first = Client::connect(&ns, Mode::Join(game_id)).unwrap();
        let second = Client::connect(&ns, Mode::Join(game_id));
        assert!(matches!(second, Err(ClientError::NoSuchGame(id)) if id == game_id));

        let progress = first.play(Command::Delete).unwrap();
        assert_eq!(progress, Progress::Finished(Outcome::Deleted));
        finish_lobby(lobby);
    }

    #[test]
    fn finished_game_cannot_be_rejoined() {
        let ns = test_namespace("finished");
        let lobby = serve_lobby(&ns, 4, 2);

        let mut client = Client::connect(&ns, Mode::New).unwrap();
        let game_id = client.game_id();
        client.play(Command::Delete).unwrap();
        drop(client);

        // The worker thread exits right after publishing the last status.
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while GameHandle::attach(&ns, game_id).is_ok() && std::time::Instant::now() < deadline {
            thread::sleep(std::time::Duration::from_millis(10));
        }
        thread::sleep(std::time::Duration::from_millis(50));

        let result = Client::connect(&ns, Mode::Join(game_id));
        assert!(matches!(result, Err(ClientError::NoSuchGame(id)) if id == game_id));

        finish_lobby(lobby);
    }

    #[test]
    fn game_limit_refuses_new_games() {
        let ns = test_namespace("limit");
        let lobby = serve_lobby(&ns, 1, 2);

        let mut first = Client::connect(&ns, Mode::New).unwrap();
        let second = Client::connect(&ns, Mode::New);
        assert!(matches!(second, Err(ClientError::GameNotStarted)));

        first.play(Command::Delete).unwrap();
        finish_lobby(lobby);
    }

    #[test]
    fn concurrent_clients_get_distinct_games() {
        let ns = test_namespace("concurrent");
        let clients = 8;
        let lobby = serve_lobby(&ns, 16, clients);

        let handles: Vec<_> = (0..clients)
            .map(|_| {
                let ns = ns.clone();
                thread::spawn(move || {
                    let mut client = Client::connect(&ns, Mode::New).unwrap();
                    let game_id = client.game_id();
                    client.play(Command::Left).unwrap();
                    client.play(Command::Delete).unwrap();
                    game_id
                })
            })
            .collect();

        let ids: HashSet<GameId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), clients);
        assert!(!ids.contains(&0));

        finish_lobby(lobby);
    }

    #[test]
    fn client_without_server_reports_offline() {
        let ns = test_namespace("offline");
        let result = Client::connect(&ns, Mode::New);
        assert!(matches!(result, Err(ClientError::ServerOffline(_))));
    }
}

/// TURN PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    fn encode(turn: usize) -> Field {
        let mut values = [[0u8; 4]; 4];
        values[0][0] = (turn % 256) as u8;
        values[0][1] = (turn / 256) as u8;
        Field::from_values(values)
    }

    fn decode(field: &Field) -> usize {
        let values = field.values();
        values[0][0] as usize + values[0][1] as usize * 256
    }

    /// Every command is seen by the worker exactly once and every published
    /// status is consumed exactly once, even with several clients racing.
    #[test]
    fn every_command_is_delivered_once() {
        let ns = test_namespace("exactly-once");
        let clients = 4;
        let turns_per_client = 125;
        let total = clients * turns_per_client;

        let owner = GameHandle::create(&ns, 7, &Field::new()).unwrap();

        let worker = thread::spawn(move || {
            let mut seen = [0usize; 4];
            for turn in 0..total {
                let command = owner.await_command().unwrap();
                owner.release_command_slot().unwrap();
                seen[command.code() as usize] += 1;
                owner.publish(GameStatus::On, &encode(turn)).unwrap();
            }
            seen
        });

        let handles: Vec<_> = (0..clients)
            .map(|client| {
                let ns = ns.clone();
                thread::spawn(move || {
                    let game = GameHandle::attach(&ns, 7).unwrap();
                    let command = Command::DIRECTIONS[client % 4];
                    (0..turns_per_client)
                        .map(|_| decode(&game.submit(command).unwrap().field))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut received: Vec<usize> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        received.sort_unstable();
        assert_eq!(received, (0..total).collect::<Vec<_>>());

        let seen = worker.join().unwrap();
        for client in 0..clients {
            let code = Command::DIRECTIONS[client % 4].code() as usize;
            assert_eq!(seen[code], turns_per_client);
        }
    }

    #[test]
    fn semaphores_return_to_initial_values_between_turns() {
        let ns = test_namespace("rest-state");
        let owner = GameHandle::create(&ns, 3, &Field::new()).unwrap();
        let client = GameHandle::attach(&ns, 3).unwrap();

        let worker = thread::spawn(move || {
            for turn in 0..3 {
                owner.await_command().unwrap();
                owner.release_command_slot().unwrap();
                owner.publish(GameStatus::On, &encode(turn)).unwrap();
            }
            owner
        });

        for turn in 0..3 {
            let result = client.submit(Command::Up).unwrap();
            assert_eq!(decode(&result.field), turn);
        }

        let owner = worker.join().unwrap();
        assert_eq!(owner.semaphore_values().unwrap(), [0, 1, 0, 1]);
    }
}

/// TEARDOWN TESTS
mod teardown_tests {
    use super::*;

    #[test]
    fn dropping_the_lobby_removes_its_resources() {
        let ns = test_namespace("lobby-drop");
        let lobby = LobbyHandle::create(&ns).unwrap();
        assert!(LobbyHandle::attach(&ns).is_ok());

        drop(lobby);
        let err = LobbyHandle::attach(&ns).err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn client_handles_never_remove_the_game() {
        let ns = test_namespace("client-drop");
        let owner = GameHandle::create(&ns, 5, &Field::new()).unwrap();

        let client = GameHandle::attach(&ns, 5).unwrap();
        assert!(client.teardown().is_none());
        drop(client);

        assert!(GameHandle::attach(&ns, 5).is_ok());
        drop(owner);
        assert!(GameHandle::attach(&ns, 5).is_err());
    }

    #[test]
    fn teardown_after_explicit_release_is_a_no_op() {
        let ns = test_namespace("release-twice");
        let owner = GameHandle::create(&ns, 9, &Field::new()).unwrap();
        let teardown = owner.teardown().unwrap();

        assert!(teardown.release());
        assert!(!teardown.release());
        assert!(teardown.is_released());
        drop(owner);
    }
}
