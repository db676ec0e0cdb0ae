use clap::{Args, Parser, Subcommand, ValueEnum};
use onion_core::ArchiveFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "oniondev CLI: layered archive chains", long_about = None)]
pub struct Cli {
    /// Scratch root for uploads, task work dirs and stored results
    /// (defaults to $ONION_WORK_DIR or <tmp>/onion)
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    /// Concurrent task limit (defaults to $MAX_CONCURRENT_TASKS or 3)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EncryptMode {
    /// Generated passwords on layers 1, 3, 5, ...
    Odd,
    /// Generated passwords only on the layers given with --layers
    Manual,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Number of archive layers to wrap around the input
    #[arg(long, default_value_t = 5)]
    pub iterations: u32,

    /// Formats rotated across layers (zip, 7z, tarzst)
    #[arg(long, value_delimiter = ',', default_value = "zip,7z,tarzst")]
    pub formats: Vec<ArchiveFormat>,

    #[arg(long, value_enum, default_value_t = EncryptMode::Odd)]
    pub encrypt: EncryptMode,

    /// Layer numbers to encrypt with --encrypt manual (e.g. 1,4,5)
    #[arg(long, value_delimiter = ',')]
    pub layers: Vec<u32>,

    /// Lock every --master-interval'th layer with this password
    #[arg(long)]
    pub master_password: Option<String>,

    #[arg(long, default_value_t = 10)]
    pub master_interval: u32,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Wrap a file in a chain of archive layers
    Compress {
        source: PathBuf,

        /// Where the outermost archive and its manifest are written
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        #[command(flatten)]
        plan: PlanArgs,
    },

    /// Peel a layered archive using its password manifest
    Decompress {
        archive: PathBuf,

        /// Manifest text file produced by `compress`
        #[arg(long)]
        manifest: PathBuf,

        #[arg(long)]
        master_password: Option<String>,

        /// Name to give the recovered file (defaults to the archive's name)
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Compress, then decompress the stored result and compare it with the input
    Roundtrip {
        source: PathBuf,

        #[command(flatten)]
        plan: PlanArgs,
    },

    /// Print the entries of a manifest file
    Manifest { file: PathBuf },

    /// Report how much of the storage quota stored results take up
    Storage,
}
