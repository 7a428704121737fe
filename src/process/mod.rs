//! The process primitive: turns a resolved command line into a running child
//! process, applying the privilege-drop and umask steps before exec.

use std::collections::HashMap;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};

use nix::sys::stat::{umask, Mode};
use nix::unistd::{setgid, setuid, Gid, Uid};
use thiserror::Error;

/// A fully resolved description of a command to spawn, after config lookups
/// (user/group names to ids, shell-vs-argv) have already happened.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub argv: Vec<String>,
    pub env: HashMap<String, String>,
    pub umask: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("command has no program to execute")]
    EmptyCommand,
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A spawned child: its pid for signalling, and the std handle used to reap
/// it on a dedicated thread.
pub struct Spawned {
    pub pid: u32,
    pub child: Child,
}

/// Forks and execs `spec`, applying group, then user, then umask in the
/// child before exec. Order matters: dropping the group after the user would
/// fail once we no longer have permission to call setgid.
pub fn spawn(spec: &SpawnSpec) -> Result<Spawned, ProcessError> {
    let mut argv = spec.argv.iter();
    let program = argv.next().ok_or(ProcessError::EmptyCommand)?;

    let mut cmd = Command::new(program);
    cmd.args(argv);
    cmd.envs(&spec.env);
    cmd.stdin(Stdio::null());

    let gid = spec.gid;
    let uid = spec.uid;
    let umask_bits = spec.umask;

    // Safety: the closure only calls async-signal-safe libc wrappers
    // (setgid/setuid/umask) between fork and exec, as required by
    // `pre_exec`.
    unsafe {
        cmd.pre_exec(move || {
            if let Some(gid) = gid {
                setgid(Gid::from_raw(gid)).map_err(nix_to_io)?;
            }
            if let Some(uid) = uid {
                setuid(Uid::from_raw(uid)).map_err(nix_to_io)?;
            }
            if let Some(bits) = umask_bits {
                umask(Mode::from_bits_truncate(bits));
            }
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(ProcessError::Spawn)?;
    let pid = child.id();
    Ok(Spawned { pid, child })
}

fn nix_to_io(err: nix::Error) -> std::io::Error {
    std::io::Error::from_raw_os_error(err as i32)
}
