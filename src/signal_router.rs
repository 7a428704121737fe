//! Installs handlers for INT, HUP and TERM and forwards each receipt onto
//! the engine's event channel. The actual signal handler (installed by
//! `signal_hook`) only ever writes to a self-pipe; all policy — what a
//! signal *means* for the set of children — is decided back on the engine's
//! state-owning loop, never here.

use std::io;
use std::thread;

use crossbeam::channel::Sender;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::debug;

use crate::engine::EngineEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Int,
    Hup,
    Term,
}

/// Spawns the background thread that blocks on `signal_hook::iterator::Signals`
/// and forwards each one as an [`EngineEvent::Signal`].
pub fn install(tx: Sender<EngineEvent>) -> io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGHUP, SIGTERM])?;
    thread::spawn(move || {
        for raw in signals.forever() {
            let kind = match raw {
                SIGINT => SignalKind::Int,
                SIGHUP => SignalKind::Hup,
                SIGTERM => SignalKind::Term,
                other => {
                    debug!(signal = other, "ignoring unexpected signal");
                    continue;
                }
            };
            if tx.send(EngineEvent::Signal(kind)).is_err() {
                // engine loop has exited; nothing left to forward to.
                break;
            }
        }
    });
    Ok(())
}
