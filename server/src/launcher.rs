//! Starting game workers as separate processes.
//!
//! A worker is the server binary re-executed with the hidden `worker`
//! subcommand. It creates its game resources and then writes
//! [`READY_LINE`] to stdout; the lobby only acknowledges the client after
//! reading that line.

use crate::config::ServerConfig;
use crate::lobby::LobbyError;
use crate::worker_manager::WorkerProcess;
use log::{debug, warn};
use shared::GameId;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

/// Line a worker prints once its game can be attached to.
pub const READY_LINE: &str = "ready";

/// Something that can bring up the worker for a new game.
pub trait WorkerLauncher: Send {
    type Worker: WorkerProcess;

    /// Starts the worker for `game_id` and returns once its game exists.
    fn launch(&mut self, game_id: GameId) -> Result<Self::Worker, LobbyError>;
}

pub struct ProcessLauncher {
    program: PathBuf,
    config: ServerConfig,
}

impl ProcessLauncher {
    pub fn new(program: PathBuf, config: ServerConfig) -> Self {
        Self { program, config }
    }

    /// Launches workers from the binary that is currently running.
    pub fn current_exe(config: ServerConfig) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, config))
    }
}

impl WorkerLauncher for ProcessLauncher {
    type Worker = ChildWorker;

    fn launch(&mut self, game_id: GameId) -> Result<ChildWorker, LobbyError> {
        let mut child = Command::new(&self.program)
            .args(self.config.worker_args(game_id))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(LobbyError::Spawn)?;
        debug!("Spawned worker {} for game {}", child.id(), game_id);

        let ready = match child.stdout.take() {
            Some(stdout) => {
                let mut line = String::new();
                match BufReader::new(stdout).read_line(&mut line) {
                    Ok(_) => line.trim() == READY_LINE,
                    Err(e) => {
                        warn!("Failed to read from worker of game {}: {}", game_id, e);
                        false
                    }
                }
            }
            None => false,
        };

        if !ready {
            let _ = child.kill();
            let _ = child.wait();
            return Err(LobbyError::WorkerNotReady(game_id));
        }

        Ok(ChildWorker { child })
    }
}

/// Worker running in a child process.
#[derive(Debug)]
pub struct ChildWorker {
    child: Child,
}

impl WorkerProcess for ChildWorker {
    fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("Worker {} exited with {}", self.child.id(), status);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to poll worker {}: {}", self.child.id(), e);
                true
            }
        }
    }

    fn terminate(&mut self) {
        let pid = self.child.id() as libc::pid_t;
        // SIGTERM lets the worker unlink its game before exiting.
        if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
            warn!(
                "Failed to signal worker {}: {}",
                pid,
                std::io::Error::last_os_error()
            );
            let _ = self.child.kill();
        }
        if let Err(e) = self.child.wait() {
            warn!("Failed to wait for worker {}: {}", pid, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Rules;
    use shared::Namespace;

    fn launcher(program: &str) -> ProcessLauncher {
        let config = ServerConfig::new(Namespace::default(), Rules::default(), 4);
        ProcessLauncher::new(PathBuf::from(program), config)
    }

    #[test]
    fn test_missing_program_fails_to_spawn() {
        let result = launcher("/nonexistent/tiles-server").launch(1);
        assert!(matches!(result, Err(LobbyError::Spawn(_))));
    }

    #[test]
    fn test_silent_worker_is_not_ready() {
        // `true` ignores its arguments and exits without printing.
        let result = launcher("true").launch(1);
        assert!(matches!(result, Err(LobbyError::WorkerNotReady(1))));
    }
}
