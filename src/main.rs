use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use forgepipe::cli::{self, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let filter = if cli.debug {
        EnvFilter::new("forgepipe=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
