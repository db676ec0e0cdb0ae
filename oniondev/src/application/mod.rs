pub mod handlers;

use std::process::ExitCode;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use onion_core::error::Result;

pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = handlers::Settings {
        work_dir: cli.work_dir,
        workers: cli.workers,
    };
    match cli.command {
        Commands::Compress {
            source,
            out_dir,
            plan,
        } => handlers::handle_compress(&settings, source, out_dir, plan),
        Commands::Decompress {
            archive,
            manifest,
            master_password,
            name,
            out_dir,
        } => handlers::handle_decompress(
            &settings,
            archive,
            manifest,
            master_password,
            name,
            out_dir,
        ),
        Commands::Roundtrip { source, plan } => handlers::handle_roundtrip(&settings, source, plan),
        Commands::Manifest { file } => handlers::handle_manifest(file),
        Commands::Storage => handlers::handle_storage(&settings),
    }
}
