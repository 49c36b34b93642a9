//! # Game Client Library
//!
//! This library provides the client side of the shared-memory 2048 game. A
//! client asks the server's lobby for a game, attaches to that game's
//! segment and then plays one command per turn.
//!
//! ## Architecture Overview
//!
//! The client holds no authoritative state. Every command is handed to the
//! game worker through the turn protocol and the client waits for the
//! published status before it reads the field. What is drawn is always the
//! worker's field after the latest completed turn.
//!
//! ### Sessions
//! A session either starts a new game or rejoins one that was left with
//! the disconnect command. Leaving a game never removes it; only deleting
//! it or finishing it does.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Maps keys to commands: `w`/`a`/`s`/`d` move, `e` disconnects, `x`
//! deletes the game.
//!
//! ### Game Module (`game`)
//! The last published field and the meaning of each status for the player.
//!
//! ### Network Module (`network`)
//! Lobby handshake and turn exchange with the game worker.
//!
//! ### Rendering Module (`rendering`)
//! Bordered text rendering of the field and status messages.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::input::InputManager;
//! use client::network::{Client, Mode};
//! use client::rendering::Renderer;
//! use shared::Namespace;
//!
//! let mut client = Client::connect(&Namespace::default(), Mode::New)?;
//! let mut input = InputManager::new(std::io::stdin().lock());
//! let mut renderer = Renderer::new(std::io::stdout(), "tiles-client");
//! let outcome = client.run(&mut input, &mut renderer)?;
//! println!("{}", outcome.message());
//! # Ok::<(), client::network::ClientError>(())
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
