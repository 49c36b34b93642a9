use clap::{Parser, Subcommand};
use log::{error, info};
use server::config::ServerConfig;
use server::game::{Rules, SpawnPolicy, DEFAULT_DOUBLE_TILE_CHANCE};
use server::launcher::{ProcessLauncher, READY_LINE};
use server::lobby::{reap_workers, Lobby};
use server::worker::GameWorker;
use shared::signals::ShutdownSignals;
use shared::{GameId, Namespace, POWER_DEFAULT, POWER_MAX, POWER_MIN};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Exponent of the winning tile (11 wins at 2048)
    #[clap(
        short,
        long,
        default_value_t = POWER_DEFAULT,
        value_parser = clap::value_parser!(u8).range(i64::from(POWER_MIN)..=i64::from(POWER_MAX))
    )]
    power: u8,
    /// Probability that a spawned tile is a 4 instead of a 2
    #[clap(long, default_value_t = DEFAULT_DOUBLE_TILE_CHANCE, value_parser = parse_probability)]
    double_tile_chance: f64,
    /// Maximum number of games running at once
    #[clap(long, default_value_t = 1024)]
    max_games: usize,
    /// Prefix for the names of shared memory segments and semaphores
    #[clap(long, env = "TILES2048_NAMESPACE", default_value = Namespace::DEFAULT)]
    namespace: String,
    #[clap(subcommand)]
    role: Option<Role>,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Serve a single game (started by the lobby)
    #[clap(hide = true)]
    Worker {
        #[clap(value_parser = clap::value_parser!(u16).range(1..))]
        game_id: GameId,
    },
}

fn parse_probability(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{} is not between 0 and 1", value))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let namespace = Namespace::new(args.namespace)?;
    let spawn = SpawnPolicy::new(args.double_tile_chance).ok_or("invalid double tile chance")?;
    let config = ServerConfig::new(namespace, Rules::new(args.power, spawn), args.max_games);

    match args.role {
        Some(Role::Worker { game_id }) => run_worker(config, game_id).await,
        None => run_lobby(config).await,
    }
}

/// Serves lobby requests until a termination signal arrives.
async fn run_lobby(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut signals = ShutdownSignals::register()?;
    let launcher = ProcessLauncher::current_exe(config.clone())?;
    let mut lobby = Lobby::create(&config, launcher)?;
    let teardown = lobby.teardown();
    let workers = lobby.workers();

    let reaper = tokio::spawn(reap_workers(Arc::clone(&workers), Duration::from_secs(1)));
    let lobby_handle = tokio::task::spawn_blocking(move || lobby.run());

    info!("Server started, waiting for clients");

    let code = tokio::select! {
        result = lobby_handle => {
            match result {
                Ok(Ok(())) => 0,
                Ok(Err(e)) => {
                    error!("Lobby failed: {}", e);
                    1
                }
                Err(e) => {
                    error!("Lobby task panicked: {}", e);
                    1
                }
            }
        }
        _ = signals.recv() => 0,
    };

    reaper.abort();
    let stopped = workers.write().await.terminate_all();
    info!("Stopped {} running games", stopped);

    if let Some(teardown) = teardown {
        teardown.release();
    }
    // The lobby thread may still be parked in a semaphore wait.
    std::process::exit(code);
}

/// Runs one game until it ends or the process is signalled.
async fn run_worker(
    config: ServerConfig,
    game_id: GameId,
) -> Result<(), Box<dyn std::error::Error>> {
    // Installed before the game's resources exist so an early SIGTERM still
    // reaches the teardown below.
    let mut signals = ShutdownSignals::register()?;
    let worker = GameWorker::start(&config.namespace, game_id, config.rules)?;
    let teardown = worker.teardown();

    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", READY_LINE)?;
        stdout.flush()?;
    }

    let worker_handle = tokio::task::spawn_blocking(move || worker.run());

    let code = tokio::select! {
        result = worker_handle => {
            match result {
                Ok(Ok(status)) => {
                    info!("Game {} finished: {:?}", game_id, status);
                    0
                }
                Ok(Err(e)) => {
                    error!("Game {} failed: {}", game_id, e);
                    1
                }
                Err(e) => {
                    error!("Game {} task panicked: {}", game_id, e);
                    1
                }
            }
        }
        _ = signals.recv() => 0,
    };

    if let Some(teardown) = teardown {
        teardown.release();
    }
    std::process::exit(code);
}
