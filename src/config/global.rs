use serde::Deserialize;

/// Process-wide settings that are not tied to any one child.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Control socket address: `host:port` for TCP, or `unix/:/path/to.sock`
    /// for a UNIX domain socket. Absent disables the control server.
    pub listen: Option<String>,
    /// Octal umask applied to this process itself at startup, before any
    /// child is spawned.
    pub umask: Option<String>,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Accepted for parity with the source config format. This crate always
    /// logs to stdout/stderr via `tracing-subscriber`; redirecting to a file
    /// is left to the process supervisor invoking it (e.g. systemd, or
    /// shell redirection), not reimplemented here.
    pub file: Option<String>,
    pub level: Option<String>,
}
