mod application;
mod presentation;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match application::run() {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "oniondev failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
