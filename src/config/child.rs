use std::collections::HashMap;

use nix::sys::signal::Signal;
use nix::unistd::{Group, User};
use serde::Deserialize;

use super::error::ConfigError;
use super::signal::parse_signal;

const DEFAULT_START_DELAY_SECS: u64 = 1;
const DEFAULT_START_RETRIES: u32 = 10;
const DEFAULT_STOP_SIGNAL: &str = "TERM";
const DEFAULT_RELOAD_SIGNAL: &str = "HUP";

/// How a child's command line is written in config: a single shell-style
/// string handed to `/bin/sh -c`, or an argv sequence executed directly.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Argv(Vec<String>),
    Shell(String),
}

impl CommandSpec {
    pub fn to_argv(&self) -> Vec<String> {
        match self {
            CommandSpec::Argv(argv) => argv.clone(),
            CommandSpec::Shell(s) => vec!["/bin/sh".to_string(), "-c".to_string(), s.clone()],
        }
    }
}

/// The full per-child options record, as it appears under `run.<name>` when
/// the author needs more than just a command.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChildOptions {
    pub cmd: CommandSpec,
    #[serde(default = "default_start_delay")]
    pub start_delay: u64,
    #[serde(default = "default_start_retries")]
    pub start_retries: u32,
    #[serde(default = "default_stop_signal")]
    pub stop_signal: String,
    #[serde(default = "default_reload_signal")]
    pub reload_signal: String,
    pub umask: Option<String>,
    pub user: Option<String>,
    pub group: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_start_delay() -> u64 {
    DEFAULT_START_DELAY_SECS
}

fn default_start_retries() -> u32 {
    DEFAULT_START_RETRIES
}

fn default_stop_signal() -> String {
    DEFAULT_STOP_SIGNAL.to_string()
}

fn default_reload_signal() -> String {
    DEFAULT_RELOAD_SIGNAL.to_string()
}

/// A `run.<name>` value: either the bare shorthand (just a command) or the
/// full options record.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChildEntry {
    Shorthand(CommandSpec),
    Full(ChildOptions),
}

impl From<ChildEntry> for ChildOptions {
    fn from(entry: ChildEntry) -> Self {
        match entry {
            ChildEntry::Full(opts) => opts,
            ChildEntry::Shorthand(cmd) => ChildOptions {
                cmd,
                start_delay: default_start_delay(),
                start_retries: default_start_retries(),
                stop_signal: default_stop_signal(),
                reload_signal: default_reload_signal(),
                umask: None,
                user: None,
                group: None,
                env: HashMap::new(),
            },
        }
    }
}

/// A child's resolved, ready-to-run configuration: names turned into ids,
/// signal names turned into `nix` signals, octal strings turned into bits.
#[derive(Debug, Clone)]
pub struct ChildConfig {
    pub name: String,
    pub argv: Vec<String>,
    pub env: HashMap<String, String>,
    pub start_delay_secs: u64,
    pub start_retries: u32,
    pub stop_signal: Signal,
    pub reload_signal: Signal,
    pub umask: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl ChildConfig {
    pub fn resolve(name: String, entry: ChildEntry) -> Result<Self, ConfigError> {
        let opts: ChildOptions = entry.into();

        let uid = match &opts.user {
            Some(user) => Some(
                User::from_name(user)
                    .map_err(|_| ConfigError::UnknownUser(user.clone()))?
                    .ok_or_else(|| ConfigError::UnknownUser(user.clone()))?
                    .uid
                    .as_raw(),
            ),
            None => None,
        };

        let gid = match &opts.group {
            Some(group) => Some(
                Group::from_name(group)
                    .map_err(|_| ConfigError::UnknownGroup(group.clone()))?
                    .ok_or_else(|| ConfigError::UnknownGroup(group.clone()))?
                    .gid
                    .as_raw(),
            ),
            None => None,
        };

        let umask = opts
            .umask
            .as_deref()
            .map(parse_octal_umask)
            .transpose()?;

        Ok(ChildConfig {
            name,
            argv: opts.cmd.to_argv(),
            env: opts.env,
            start_delay_secs: opts.start_delay,
            start_retries: opts.start_retries,
            stop_signal: parse_signal(&opts.stop_signal)?,
            reload_signal: parse_signal(&opts.reload_signal)?,
            umask,
            uid,
            gid,
        })
    }
}

pub fn parse_octal_umask(raw: &str) -> Result<u32, ConfigError> {
    u32::from_str_radix(raw.trim(), 8).map_err(|_| ConfigError::InvalidUmask(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_entry(yaml: &str) -> ChildEntry {
        serde_yaml::from_str(yaml).expect("valid yaml")
    }

    #[test]
    fn shorthand_string_becomes_shell_command() {
        let entry = parse_entry("\"sleep 1\"");
        let resolved = ChildConfig::resolve("foo".into(), entry).unwrap();
        assert_eq!(resolved.argv, vec!["/bin/sh", "-c", "sleep 1"]);
        assert_eq!(resolved.start_delay_secs, DEFAULT_START_DELAY_SECS);
    }

    #[test]
    fn shorthand_sequence_becomes_argv_command() {
        let entry = parse_entry("[\"sleep\", \"1\"]");
        let resolved = ChildConfig::resolve("foo".into(), entry).unwrap();
        assert_eq!(resolved.argv, vec!["sleep", "1"]);
    }

    #[test]
    fn full_record_overrides_defaults() {
        let entry = parse_entry(
            "cmd: \"sleep 1\"\nstart_delay: 5\nstart_retries: 3\nstop_signal: KILL\n",
        );
        let resolved = ChildConfig::resolve("foo".into(), entry).unwrap();
        assert_eq!(resolved.start_delay_secs, 5);
        assert_eq!(resolved.start_retries, 3);
        assert_eq!(resolved.stop_signal, Signal::SIGKILL);
    }

    #[test]
    fn umask_is_parsed_as_octal() {
        let entry = parse_entry("cmd: \"true\"\numask: \"0022\"\n");
        let resolved = ChildConfig::resolve("foo".into(), entry).unwrap();
        assert_eq!(resolved.umask, Some(0o022));
    }

    #[test]
    fn fully_permissive_umask_of_all_zeros_is_valid() {
        for raw in ["0", "00", "000"] {
            let entry = parse_entry(&format!("cmd: \"true\"\numask: \"{raw}\"\n"));
            let resolved = ChildConfig::resolve("foo".into(), entry).unwrap();
            assert_eq!(resolved.umask, Some(0));
        }
    }

    #[test]
    fn unknown_user_is_a_config_error() {
        let entry = parse_entry("cmd: \"true\"\nuser: \"definitely-not-a-real-user\"\n");
        let err = ChildConfig::resolve("foo".into(), entry).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownUser(_)));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<ChildEntry, _> =
            serde_yaml::from_str("cmd: \"true\"\nbogus_field: 1\n");
        assert!(result.is_err());
    }
}
