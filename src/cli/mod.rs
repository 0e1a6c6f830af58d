use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::validate::RawArgs;

#[derive(Parser)]
#[command(
    name = "mashup",
    about = "Mashup Maker - Build an audio mashup from the opening seconds of many search results",
    version,
    long_about = "Searches YouTube for a singer or band, downloads the hits, extracts their audio, keeps the first seconds of each track and joins everything into a single mp3. Requires yt-dlp and ffmpeg."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a mashup
    Create {
        /// Singer, band or any search phrase
        #[arg(value_name = "SOURCE_QUERY")]
        source_query: String,

        /// Number of videos to download (more than 10)
        #[arg(value_name = "ITEM_COUNT", allow_hyphen_values = true)]
        item_count: String,

        /// Seconds kept from the start of each track (more than 20)
        #[arg(value_name = "CLIP_DURATION", allow_hyphen_values = true)]
        clip_duration: String,

        /// Output file, must end in .mp3
        #[arg(value_name = "OUTPUT_FILE")]
        output: String,

        /// Maximum concurrent extract/trim jobs (overrides config)
        #[arg(long, value_name = "COUNT")]
        workers: Option<usize>,

        /// Per-item time limit in seconds (overrides config)
        #[arg(long, value_name = "SECS")]
        item_timeout: Option<u64>,

        /// Base directory for temporary files (overrides config)
        #[arg(long, value_name = "DIR")]
        staging_dir: Option<PathBuf>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or initialise the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write the default configuration file
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },

    /// Check that yt-dlp, ffmpeg and ffprobe are installed
    Check,
}

impl Commands {
    /// Unvalidated pipeline arguments of a `create` invocation
    pub fn raw_args(&self) -> Option<RawArgs> {
        match self {
            Commands::Create {
                source_query,
                item_count,
                clip_duration,
                output,
                ..
            } => Some(RawArgs::new(
                source_query.as_str(),
                item_count.as_str(),
                clip_duration.as_str(),
                output.as_str(),
            )),
            _ => None,
        }
    }
}
