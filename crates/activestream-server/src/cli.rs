//! Command-line interface

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "activestream")]
#[command(
    version,
    about = "Active-learning relevance classifier for streaming documents",
    long_about = None
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "activestream.yaml")]
    pub config: PathBuf,

    /// Seed keyword to track (repeatable); replaces the configured seed list
    #[arg(short, long = "keyword")]
    pub keywords: Vec<String>,

    /// Replay a recorded message file instead of connecting to the stream
    #[arg(short, long)]
    pub replay: Option<PathBuf>,

    /// Listen address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Seed for reproducible annotation rounds
    #[arg(long)]
    pub seed: Option<u64>,

    /// Bearer token for the streaming API
    #[arg(long, env = "ACTIVESTREAM_BEARER_TOKEN", hide_env_values = true)]
    pub bearer_token: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
