use std::io;
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use comicdb::settings::Settings;

fn init_logger(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            init_logger(comicdb::settings::DEFAULT_LOG_FILTER);
            error!(error = %e, "could not read settings");
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logger(&settings.log_filter);

    let stdout = io::stdout();
    match comicdb::run(&settings, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
