use clap::Parser;
use client::game::Outcome;
use client::input::InputManager;
use client::network::{Client, ClientError, Mode};
use client::rendering::Renderer;
use log::info;
use shared::signals::ShutdownSignals;
use shared::{GameId, Namespace};

const PROGRAM: &str = "tiles-client";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Start a new game (the default)
    #[arg(short = 'n', long = "new", conflicts_with = "id")]
    new_game: bool,

    /// Rejoin the game with this id
    #[arg(short = 'i', long, value_parser = clap::value_parser!(u16).range(1..))]
    id: Option<GameId>,

    /// Prefix for the names of shared memory segments and semaphores
    #[arg(long, env = "TILES2048_NAMESPACE", default_value = Namespace::DEFAULT)]
    namespace: String,
}

fn play(namespace: Namespace, mode: Mode) -> Result<Outcome, ClientError> {
    let mut client = Client::connect(&namespace, mode)?;
    let mut input = InputManager::new(std::io::stdin().lock());
    let mut renderer = Renderer::new(std::io::stdout(), PROGRAM);
    client.run(&mut input, &mut renderer)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let mut signals = ShutdownSignals::register()?;

    let args = Args::parse();
    let namespace = Namespace::new(args.namespace)?;
    let mode = match (args.new_game, args.id) {
        (false, Some(id)) => Mode::Join(id),
        _ => Mode::New,
    };

    info!("Controls: w/a/s/d to move, e to leave, x to delete the game");

    let client_handle = tokio::task::spawn_blocking(move || play(namespace, mode));

    tokio::select! {
        result = client_handle => {
            match result? {
                Ok(Outcome::Paused(id)) => {
                    println!("{}\tRejoin with --id {}", PROGRAM, id);
                    Ok(())
                }
                Ok(_) => Ok(()),
                Err(e) => {
                    eprintln!("{}: {}", PROGRAM, e);
                    std::process::exit(1);
                }
            }
        }
        _ = signals.recv() => {
            // The input thread may still be blocked reading stdin.
            std::process::exit(0);
        }
    }
}
