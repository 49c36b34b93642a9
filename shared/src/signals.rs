//! Termination signals shared by the server, its workers and the client.

use log::info;
use std::io;
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Handlers for SIGINT, SIGQUIT and SIGTERM.
///
/// The handlers are installed by [`ShutdownSignals::register`], so a signal
/// that arrives before [`ShutdownSignals::recv`] is first polled is kept
/// rather than killing the process. Register before creating anything that
/// must be torn down.
pub struct ShutdownSignals {
    sigint: Signal,
    sigquit: Signal,
    sigterm: Signal,
}

impl ShutdownSignals {
    /// Must be called from within a tokio runtime.
    pub fn register() -> io::Result<Self> {
        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigquit: signal(SignalKind::quit())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    /// Resolves with the signal's name once one of them arrives.
    pub async fn recv(&mut self) -> &'static str {
        let name = tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sigquit.recv() => "SIGQUIT",
            _ = self.sigterm.recv() => "SIGTERM",
        };
        info!("Received {}", name);
        name
    }
}
