use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("config has no children to run (`run` is empty)")]
    EmptyRun,
    #[error("unknown signal name: `{0}`")]
    UnknownSignal(String),
    #[error("invalid control socket address: `{0}`")]
    InvalidListen(String),
    #[error("invalid umask, expected an octal string: `{0}`")]
    InvalidUmask(String),
    #[error("no such user: `{0}`")]
    UnknownUser(String),
    #[error("no such group: `{0}`")]
    UnknownGroup(String),
}
