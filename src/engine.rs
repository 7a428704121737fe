//! The top-level coordinator: builds children from configuration, starts
//! them, hosts the signal router and control server, and owns the single
//! state-owning loop that is the sole mutator of `Child` state.

use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::thread;

use crossbeam::channel::{unbounded, Receiver, Sender};
use nix::sys::signal::Signal;
use nix::sys::stat::{umask, Mode};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::child::{Child, StatusLine};
use crate::clock::Clock;
use crate::config::child::parse_octal_umask;
use crate::config::listen::{parse_listen, ListenAddr};
use crate::config::Config;
use crate::control::{self, Command, ControlRequest, OpKind};
use crate::signal_router::{self, SignalKind};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid global umask: {0}")]
    Config(#[from] crate::config::error::ConfigError),
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
    #[error("failed to bind control listener: {0}")]
    Listener(#[source] std::io::Error),
}

/// One event on the central channel: every thread other than the engine
/// loop only ever sends one of these and goes back to blocking.
pub enum EngineEvent {
    Exited {
        name: String,
        generation: u64,
        raw_status: i32,
    },
    RestartTimer {
        name: String,
        generation: u64,
    },
    Signal(SignalKind),
    Control(ControlRequest),
}

pub struct Engine {
    children: HashMap<String, Child>,
    clock: Clock,
    listen_addr: Option<ListenAddr>,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    shutdown: bool,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self, EngineError> {
        if let Some(raw) = &config.global.umask {
            let bits = parse_octal_umask(raw)?;
            umask(Mode::from_bits_truncate(bits));
        }

        let listen_addr = match &config.global.listen {
            Some(raw) => Some(parse_listen(raw)?),
            None => None,
        };

        let children = config
            .children
            .into_iter()
            .map(|(name, cfg)| (name, Child::new(cfg)))
            .collect();

        let (events_tx, events_rx) = unbounded();

        Ok(Engine {
            children,
            clock: Clock::new(),
            listen_addr,
            events_tx,
            events_rx,
            shutdown: false,
        })
    }

    /// Installs signal handlers, binds the control listener (if configured),
    /// starts every child, then blocks processing events until a TERM, or an
    /// INT with no live children, ends the run.
    pub fn run(mut self) -> Result<(), EngineError> {
        signal_router::install(self.events_tx.clone()).map_err(EngineError::Signals)?;

        if let Some(addr) = self.listen_addr.clone() {
            control::serve(addr, self.events_tx.clone()).map_err(EngineError::Listener)?;
        }

        let names: Vec<String> = self.children.keys().cloned().collect();
        for name in names {
            self.do_start(&name);
        }

        while !self.shutdown {
            match self.events_rx.recv() {
                Ok(event) => self.handle_event(event),
                Err(_) => break,
            }
        }

        control::cleanup(&self.listen_addr);
        info!("engine shutdown complete");
        Ok(())
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Exited {
                name,
                generation,
                raw_status,
            } => self.on_exit(&name, generation, raw_status),
            EngineEvent::RestartTimer { name, generation } => {
                self.on_restart_timer(&name, generation)
            }
            EngineEvent::Signal(kind) => self.on_signal(kind),
            EngineEvent::Control(request) => self.on_control(request),
        }
    }

    fn do_start(&mut self, name: &str) {
        let events = self.events_tx.clone();
        let Some(child) = self.children.get_mut(name) else {
            return;
        };
        let (started, _generation) = child.start(events);
        if started {
            return;
        }
        // a failed spawn counts against the retries cap the same way a
        // too-quick exit does.
        if let Some(gen) = child.restart_decision() {
            let delay = child.start_delay();
            self.schedule_restart(name.to_string(), gen, delay);
        }
    }

    fn schedule_restart(&mut self, name: String, generation: u64, delay: std::time::Duration) {
        let tx = self.events_tx.clone();
        self.clock.schedule(delay, move || {
            let _ = tx.send(EngineEvent::RestartTimer { name, generation });
        });
    }

    fn on_exit(&mut self, name: &str, generation: u64, raw_status: i32) {
        let Some(child) = self.children.get_mut(name) else {
            return;
        };
        if !child.record_exit(generation, raw_status) {
            return;
        }
        if self.shutdown {
            return;
        }
        match child.restart_decision() {
            Some(gen) => {
                let delay = child.start_delay();
                self.schedule_restart(name.to_string(), gen, delay);
            }
            None => {}
        }
    }

    fn on_restart_timer(&mut self, name: &str, generation: u64) {
        if self.shutdown {
            return;
        }
        let still_current = self
            .children
            .get(name)
            .map(|c| c.generation() == generation && c.pid().is_none() && !c.is_broken())
            .unwrap_or(false);
        if still_current {
            self.do_start(name);
        }
    }

    fn on_signal(&mut self, kind: SignalKind) {
        match kind {
            SignalKind::Int => {
                let live: Vec<&String> = self
                    .children
                    .iter()
                    .filter(|(_, c)| c.pid().is_some())
                    .map(|(name, _)| name)
                    .collect();
                if live.is_empty() {
                    info!("second INT with no live children, shutting down");
                    self.shutdown = true;
                } else {
                    info!(count = live.len(), "broadcasting INT");
                    for child in self.children.values() {
                        child.signal(Signal::SIGINT);
                    }
                }
            }
            SignalKind::Hup => {
                info!("broadcasting HUP");
                for child in self.children.values() {
                    child.signal(Signal::SIGHUP);
                }
            }
            SignalKind::Term => {
                info!("broadcasting TERM, shutting down");
                for child in self.children.values() {
                    child.signal(Signal::SIGTERM);
                }
                self.shutdown = true;
            }
        }
    }

    fn on_control(&mut self, request: ControlRequest) {
        let lines = match request.command {
            Command::Status => {
                let mut names: Vec<&String> = self.children.keys().collect();
                names.sort();
                names
                    .into_iter()
                    .map(|name| format_status_line(name, self.children[name].status()))
                    .collect()
            }
            Command::Op(op, name) => vec![self.apply_op(op, &name)],
            Command::Unknown(line) => vec![format!("{} unknown", line)],
        };
        if request.reply.send(lines).is_err() {
            warn!("control connection dropped before reply could be sent");
        }
    }

    fn apply_op(&mut self, op: OpKind, name: &str) -> String {
        let Some(child) = self.children.get_mut(name) else {
            return format!("{} {} unknown", op.as_str(), name);
        };
        let events = self.events_tx.clone();
        let success = match op {
            OpKind::Start => child.op_start(events).0,
            OpKind::Stop => child.op_stop(),
            OpKind::Reload => child.op_reload(),
            OpKind::Restart => child.op_restart(),
        };
        let result = if success { "1".to_string() } else { "fail".to_string() };
        format!("{} {} {}", op.as_str(), name, result)
    }
}

fn format_status_line(name: &str, status: StatusLine) -> String {
    match status {
        StatusLine::Up { uptime_secs, pid } => format!("{} up {} {}", name, uptime_secs, pid),
        StatusLine::Down => format!("{} down", name),
        StatusLine::Broken { start_count } => format!("{} fail {}", name, start_count),
    }
}

/// Converts a raw `waitpid`-style status (as returned by
/// `std::process::ExitStatus` reinterpreted through `into_raw`) into the
/// 8-bit code the Child Supervisor records.
fn raw_exit_code(status: ExitStatus) -> i32 {
    status.into_raw()
}

/// Spawns the background thread that waits on an already-started child's
/// OS process and reports its exit back onto the engine's event channel.
/// Lives here (rather than in `process` or `child`) because it is the only
/// piece of code that needs both a `std::process::Child` handle and the
/// engine's event sender.
pub(crate) fn spawn_exit_watcher(
    name: String,
    generation: u64,
    mut child: std::process::Child,
    tx: Sender<EngineEvent>,
) {
    thread::spawn(move || {
        let status = child.wait();
        let raw_status = match status {
            Ok(status) => raw_exit_code(status),
            Err(err) => {
                error!(child = %name, error = %err, "failed to wait on child");
                0
            }
        };
        let _ = tx.send(EngineEvent::Exited {
            name,
            generation,
            raw_status,
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_formatting() {
        assert_eq!(
            format_status_line("w", StatusLine::Up { uptime_secs: 5, pid: 123 }),
            "w up 5 123"
        );
        assert_eq!(format_status_line("w", StatusLine::Down), "w down");
        assert_eq!(
            format_status_line("w", StatusLine::Broken { start_count: 3 }),
            "w fail 3"
        );
    }

    #[test]
    fn engine_builds_from_minimal_config() {
        let config = Config::from_yaml("run:\n  w: \"true\"\n").unwrap();
        let engine = Engine::new(config).unwrap();
        assert_eq!(engine.children.len(), 1);
    }
}
