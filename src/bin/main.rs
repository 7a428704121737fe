use std::process::ExitCode;

use procwarden::cli::Cli;
use procwarden::config::loader::ConfigLoaderFile;
use procwarden::{Config, Engine};
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    if let Err(err) = procwarden::logging::init() {
        eprintln!("failed to initialize logging: {err}");
    }

    let config: Config = match ConfigLoaderFile::new(cli.config_path()).load() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if cli.print_config() {
        println!("{:#?}", config);
        return ExitCode::SUCCESS;
    }

    let engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(err) => {
            error!(error = %err, "failed to construct engine");
            return ExitCode::FAILURE;
        }
    };

    match engine.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "engine exited with an error");
            ExitCode::FAILURE
        }
    }
}
