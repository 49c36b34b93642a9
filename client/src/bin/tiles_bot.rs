use clap::{Parser, ValueEnum};
use client::game::{Outcome, Progress};
use client::network::{Client, Mode};
use client::rendering::render_field;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared::{Command, GameId, Namespace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Finish {
    /// Delete the game when done
    Delete,
    /// Leave the game running so it can be rejoined
    Disconnect,
}

/// Plays random moves against a running server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Rejoin this game instead of starting a new one
    #[arg(short = 'i', long, value_parser = clap::value_parser!(u16).range(1..))]
    id: Option<GameId>,

    /// Number of moves to play before finishing
    #[arg(short = 'm', long, default_value_t = 100)]
    moves: u32,

    /// Seed for the move sequence
    #[arg(long)]
    seed: Option<u64>,

    /// What to do once all moves are played
    #[arg(long, value_enum, default_value_t = Finish::Delete)]
    finish: Finish,

    /// Prefix for the names of shared memory segments and semaphores
    #[arg(long, env = "TILES2048_NAMESPACE", default_value = Namespace::DEFAULT)]
    namespace: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let namespace = Namespace::new(args.namespace)?;
    let mode = args.id.map_or(Mode::New, Mode::Join);
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut client = Client::connect(&namespace, mode)?;
    println!("Playing game {}", client.game_id());

    let mut outcome = None;
    for _ in 0..args.moves {
        let command = *Command::DIRECTIONS
            .choose(&mut rng)
            .ok_or("no directions to choose from")?;
        if let Progress::Finished(finished) = client.play(command)? {
            outcome = Some(finished);
            break;
        }
    }

    let outcome = match outcome {
        Some(outcome) => outcome,
        None => {
            let command = match args.finish {
                Finish::Delete => Command::Delete,
                Finish::Disconnect => Command::Disconnect,
            };
            match client.play(command)? {
                Progress::Finished(outcome) => outcome,
                Progress::Continue => return Err("game did not finish".into()),
            }
        }
    };

    let state = client.state();
    print!("{}", render_field(&state.field));
    println!(
        "{} after {} turns ({} rejected moves)",
        outcome.message(),
        state.turns,
        state.rejected_moves
    );
    if let Outcome::Paused(id) = outcome {
        println!("Rejoin with --id {}", id);
    }

    Ok(())
}
