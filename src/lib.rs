pub mod child;
pub mod clock;
pub mod cli;
pub mod config;
pub mod control;
pub mod engine;
pub mod logging;
pub mod process;
pub mod signal_router;

pub use crate::config::Config;
pub use crate::engine::{Engine, EngineError};
