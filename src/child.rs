//! The per-child lifecycle state machine. A [`Child`] is the single
//! authoritative owner of everything about one supervised process; it is
//! only ever touched from the engine's state-owning loop (see
//! [`crate::engine`]), so none of its fields are behind a lock.

use std::time::{Duration, Instant};

use crossbeam::channel::Sender;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, error, info};

use crate::config::child::ChildConfig;
use crate::engine::{spawn_exit_watcher, EngineEvent};
use crate::process::{self, SpawnSpec};

/// What a `status` query reports for one child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    Up { uptime_secs: u64, pid: u32 },
    Down,
    Broken { start_count: u32 },
}

/// One supervised child process and its dynamic state.
pub struct Child {
    pub config: ChildConfig,
    pid: Option<u32>,
    start_count: u32,
    start_ts: Option<Instant>,
    last_status: Option<i32>,
    broken: bool,
    /// Bumped on every operator-visible transition (`start`, `stop`) so that
    /// in-flight restart timers and exit-wait threads can recognize that
    /// they no longer describe the current attempt.
    generation: u64,
}

impl Child {
    pub fn new(config: ChildConfig) -> Self {
        Child {
            config,
            pid: None,
            start_count: 0,
            start_ts: None,
            last_status: None,
            broken: false,
            generation: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_secs(self.config.start_delay_secs)
    }

    fn spawn_spec(&self) -> SpawnSpec {
        SpawnSpec {
            argv: self.config.argv.clone(),
            env: self.config.env.clone(),
            umask: self.config.umask,
            uid: self.config.uid,
            gid: self.config.gid,
        }
    }

    /// Attempts to launch the process and, on success, spawns the thread
    /// that waits on it and reports its exit back on `events`. Returns
    /// `(success, generation)`: the generation is the value minted for this
    /// attempt, which the caller uses to tag a restart timer on failure so
    /// that a later `stop`/`start` invalidates it.
    pub fn start(&mut self, events: Sender<EngineEvent>) -> (bool, u64) {
        if self.pid.is_some() {
            return (false, self.generation);
        }

        self.generation += 1;
        let generation = self.generation;
        self.start_count += 1;
        self.broken = false;

        match process::spawn(&self.spawn_spec()) {
            Ok(spawned) => {
                self.pid = Some(spawned.pid);
                self.start_ts = Some(Instant::now());
                info!(child = self.name(), pid = spawned.pid, "started child");
                spawn_exit_watcher(self.name().to_string(), generation, spawned.child, events);
                (true, generation)
            }
            Err(err) => {
                error!(child = self.name(), error = %err, "failed to spawn child");
                (false, generation)
            }
        }
    }

    /// Records a child's exit if `generation` still matches the current
    /// attempt (a stale exit from a superseded attempt is ignored). Returns
    /// `true` if the restart policy should now be evaluated by the caller.
    pub fn record_exit(&mut self, generation: u64, raw_status: i32) -> bool {
        if generation != self.generation {
            debug!(
                child = self.name(),
                "ignoring exit from superseded generation"
            );
            return false;
        }

        let stable = self
            .start_ts
            .map(|ts| ts.elapsed().as_secs() > self.config.start_delay_secs)
            .unwrap_or(false);

        self.pid = None;
        self.last_status = Some(raw_status >> 8);
        if stable {
            self.start_count = 0;
        }
        true
    }

    /// Applies the restart policy after an exit or failed start. Returns
    /// `Some(generation)` (the generation to tag the restart timer with) if
    /// a restart should be scheduled, or `None` if the child is now
    /// `broken`.
    pub fn restart_decision(&mut self) -> Option<u64> {
        let retries = self.config.start_retries;
        if retries > 0 && self.start_count >= retries {
            self.broken = true;
            info!(
                child = self.name(),
                start_count = self.start_count,
                "retries exhausted, child is broken"
            );
            return None;
        }
        Some(self.generation)
    }

    /// Operator `start`: a no-op (failure) if already running. Delegates the
    /// actual spawn to [`Child::start`].
    pub fn op_start(&mut self, events: Sender<EngineEvent>) -> (bool, u64) {
        self.start(events)
    }

    /// Operator `stop`: sends `stop_signal`, and on success clears all
    /// state immediately so the eventual exit notification (tagged with the
    /// now-stale generation) is ignored.
    pub fn op_stop(&mut self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        match kill(Pid::from_raw(pid as i32), self.config.stop_signal) {
            Ok(()) => {
                self.generation += 1;
                self.pid = None;
                self.start_count = 0;
                self.broken = false;
                info!(child = self.name(), pid, "stopped child");
                true
            }
            Err(err) => {
                debug!(child = self.name(), pid, error = %err, "stop signal failed");
                false
            }
        }
    }

    /// Operator `reload`: sends `reload_signal`. Never changes state.
    pub fn op_reload(&self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        match kill(Pid::from_raw(pid as i32), self.config.reload_signal) {
            Ok(()) => true,
            Err(err) => {
                debug!(child = self.name(), pid, error = %err, "reload signal failed");
                false
            }
        }
    }

    /// Operator `restart`: sends `stop_signal` without clearing state, so
    /// the ordinary exit callback (same generation) schedules a restart.
    pub fn op_restart(&self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        match kill(Pid::from_raw(pid as i32), self.config.stop_signal) {
            Ok(()) => true,
            Err(err) => {
                debug!(child = self.name(), pid, error = %err, "restart signal failed");
                false
            }
        }
    }

    /// Sends an arbitrary signal, e.g. as part of a broadcast.
    pub fn signal(&self, sig: Signal) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        kill(Pid::from_raw(pid as i32), sig).is_ok()
    }

    pub fn status(&self) -> StatusLine {
        if self.broken {
            return StatusLine::Broken {
                start_count: self.start_count,
            };
        }
        match (self.pid, self.start_ts) {
            (Some(pid), Some(ts)) => StatusLine::Up {
                uptime_secs: ts.elapsed().as_secs(),
                pid,
            },
            _ => StatusLine::Down,
        }
    }

    #[cfg(test)]
    pub fn last_status(&self) -> Option<i32> {
        self.last_status
    }

    #[cfg(test)]
    pub fn start_count(&self) -> u32 {
        self.start_count
    }
}
