use nix::sys::signal::Signal;

use super::error::ConfigError;

/// Parses a signal name as it appears in config (`TERM`, `SIGTERM`, `hup`,
/// ...) into the `nix` signal it names.
pub fn parse_signal(raw: &str) -> Result<Signal, ConfigError> {
    let trimmed = raw.trim();
    let upper = trimmed.strip_prefix("SIG").unwrap_or(trimmed).to_ascii_uppercase();
    let signal = match upper.as_str() {
        "HUP" => Signal::SIGHUP,
        "INT" => Signal::SIGINT,
        "QUIT" => Signal::SIGQUIT,
        "ILL" => Signal::SIGILL,
        "TRAP" => Signal::SIGTRAP,
        "ABRT" => Signal::SIGABRT,
        "KILL" => Signal::SIGKILL,
        "USR1" => Signal::SIGUSR1,
        "USR2" => Signal::SIGUSR2,
        "SEGV" => Signal::SIGSEGV,
        "PIPE" => Signal::SIGPIPE,
        "ALRM" => Signal::SIGALRM,
        "TERM" => Signal::SIGTERM,
        "CHLD" => Signal::SIGCHLD,
        "CONT" => Signal::SIGCONT,
        "STOP" => Signal::SIGSTOP,
        "TSTP" => Signal::SIGTSTP,
        "WINCH" => Signal::SIGWINCH,
        _ => return Err(ConfigError::UnknownSignal(raw.to_string())),
    };
    Ok(signal)
}
