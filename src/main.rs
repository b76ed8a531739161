//! cmdlink binary entry point.

use std::process::ExitCode;

use cmdlink::cli::{self, ArgsError};
use cmdlink::{logging, runtime, Config};
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => return usage_error(&e),
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let (mode, target) = match args.runtime() {
        Ok(runtime) => runtime,
        Err(e) => return usage_error(&e),
    };

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_with_level(config.log_filter()) {
        eprintln!("warning: logging not initialized: {}", e);
    }
    info!(version = env!("CARGO_PKG_VERSION"), %mode, "cmdlink starting");

    match runtime::run(mode, target, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn usage_error(error: &ArgsError) -> ExitCode {
    eprintln!("error: {}\n\n{}", error, cli::usage());
    ExitCode::from(2)
}
