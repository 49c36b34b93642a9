//! # Game Server Library
//!
//! This library provides the server side of the shared-memory 2048 game:
//! a lobby that hands out game ids and one worker per game that owns the
//! authoritative field.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Game Logic
//! Every move is resolved by the worker of its game. Clients only ever see
//! the field the worker published after the last turn.
//!
//! ### Session Management
//! The lobby answers one request at a time:
//! - `0` starts a new game and returns its fresh id
//! - a non-zero id rejoins that game if its worker is still alive
//! - any refusal is answered with `0`
//!
//! ### Resource Lifetime
//! Each process removes the kernel objects it created exactly once, whether
//! it stops because its game ended, because it was signalled or because a
//! setup step failed.
//!
//! ## Architecture Design
//!
//! ### Process per Game
//! A worker is the server binary re-executed with a hidden `worker`
//! subcommand. Games are isolated from each other and from the lobby, and a
//! crashed game never takes the lobby down with it.
//!
//! ### Blocking Protocol, Async Shell
//! The turn protocol is a sequence of semaphore waits, so the lobby and
//! worker loops run on tokio's blocking pool. The async side only watches
//! for termination signals and reaps finished workers.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Slide and merge engine, win and loss detection, tile spawning.
//!
//! ### Worker Module (`worker`)
//! Runs the turn loop of a single game.
//!
//! ### Lobby Module (`lobby`)
//! Request handling, id allocation and rejoin validation.
//!
//! ### Launcher and Worker Manager (`launcher`, `worker_manager`)
//! Spawning worker processes and tracking which games are still alive.
//!
//! ### Config Module (`config`)
//! Settings passed from the command line to the lobby and on to workers.

pub mod config;
pub mod game;
pub mod launcher;
pub mod lobby;
pub mod worker;
pub mod worker_manager;
