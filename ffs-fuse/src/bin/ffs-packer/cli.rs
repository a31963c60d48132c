use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Format a new image and copy a host directory into it
    Pack {
        /// Host source directory
        #[arg(long, short)]
        source: PathBuf,

        /// Output image
        #[arg(long, short)]
        out: PathBuf,

        #[command(flatten)]
        geometry: Geometry,
    },

    /// List a directory of an image
    Ls {
        #[arg(long, short)]
        image: PathBuf,

        #[command(flatten)]
        geometry: Geometry,

        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a file of an image
    Cat {
        #[arg(long, short)]
        image: PathBuf,

        #[command(flatten)]
        geometry: Geometry,

        path: String,
    },
}

/// Layout of the image: equally sized areas
#[derive(Args)]
pub struct Geometry {
    /// Size of one area in KiB
    #[arg(long, default_value_t = 128)]
    pub area_kib: u64,

    /// Number of areas, one of which is the scratch area
    #[arg(long, default_value_t = 4)]
    pub areas: usize,
}
