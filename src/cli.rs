use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dicom-media-export")]
#[command(author, version, about = "Convert DICOM studies into video and image files with a metadata ledger")]
pub struct Cli {
    /// Path to the TOML run configuration
    #[arg(required = true)]
    pub config: PathBuf,

    /// Replace an existing metadata file instead of refusing to start
    #[arg(long)]
    pub overwrite: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
