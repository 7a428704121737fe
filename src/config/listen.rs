use std::net::SocketAddr;
use std::path::PathBuf;

use super::error::ConfigError;

/// A parsed `global.listen` address: either a TCP socket or a UNIX domain
/// socket path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

/// Parses `global.listen`. The special host token `unix/` names a UNIX
/// domain socket, with the path taking the place of the port, e.g.
/// `unix/:/tmp/procwarden.sock`; anything else is parsed as a `host:port`
/// TCP address.
pub fn parse_listen(raw: &str) -> Result<ListenAddr, ConfigError> {
    if let Some(path) = raw.strip_prefix("unix/:") {
        return Ok(ListenAddr::Unix(PathBuf::from(path)));
    }
    raw.parse::<SocketAddr>()
        .map(ListenAddr::Tcp)
        .map_err(|_| ConfigError::InvalidListen(raw.to_string()))
}
