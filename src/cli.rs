use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "reelrec",
    about = "Hybrid-embedding movie recommendations",
    version
)]
pub struct Args {
    /// Data directory (config, model cache, snapshot). Defaults to ~/.reelrec
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the catalog snapshot from a dataset file
    Precompute {
        /// Path to the movie dataset (JSON map of id -> record)
        dataset: PathBuf,
    },

    /// Recommend movies similar to a title (resolved via TMDB)
    Recommend {
        /// Title to look up
        title: String,

        /// Number of results (defaults to the configured top_k)
        #[arg(long)]
        top_k: Option<usize>,

        /// Emit results as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print snapshot statistics
    Info {},
}
