use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Crawl subreddit listings for image posts and browse the saved results
#[derive(Parser)]
#[command(name = "imgcrawl")]
#[command(about = "Crawl subreddit listings for image posts", long_about = None)]
pub struct Cli {
    /// Config file (TOML). Defaults to config.toml in the user config dir, if present
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the output directory
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl one collection and save the image posts
    Crawl {
        /// Subreddit name (without r/); the configured default when omitted
        collection: Option<String>,
        /// Pages to fetch (1-50)
        #[arg(short, long)]
        pages: Option<u32>,
        /// Output file name inside the output directory
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Crawl several collections concurrently, one output file each
    Batch {
        #[arg(required = true)]
        collections: Vec<String>,
        #[arg(short, long)]
        pages: Option<u32>,
    },
    /// Reduce a saved file to unique (title, image) pairs
    Filter {
        input: PathBuf,
        /// Defaults to <output-dir>/<input-stem>_images_only.json
        output: Option<PathBuf>,
    },
    /// List saved output files, newest first
    Files,
    /// Print the entries of a saved file (the newest when no name is given)
    Show {
        #[arg(short, long)]
        file: Option<String>,
        /// Print as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}
