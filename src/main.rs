//! Word-count backend of the Media Cloud explorer
//!
//! Translates the explorer UI's query arguments into queries against the
//! upstream media search API, caches the resulting word counts, decorates them
//! with 2D word embedding coordinates, and serves them as JSON or CSV.

mod cache;
mod config;
mod csv;
mod embeddings;
mod error;
mod query;
mod samples;
mod search;
mod server;
mod wordcount;

use crate::{config::Config, samples::SampleSearches};
use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
};

/// HTTP backend serving explorer word counts
///
/// Word counts are computed by the upstream media search API over a random
/// sample of the stories matching a query, then cached in memory.
#[derive(Parser, Debug)]
#[command(version, author)]
struct Args {
    /// Address that the HTTP server should listen on
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    listen: SocketAddr,

    /// Base URL of the upstream media search API
    #[arg(long, default_value = "https://api.mediacloud.org")]
    search_api_url: Box<str>,

    /// API key used to authenticate against the upstream media search API
    #[arg(long)]
    search_api_key: Option<Box<str>>,

    /// Timeout of upstream media search API requests, in seconds
    ///
    /// Word counts over large story samples can take a while to compute.
    #[arg(long, default_value = "60")]
    search_api_timeout: u64,

    /// Base URL of the word embeddings server
    #[arg(long, default_value = "http://localhost:8000")]
    embeddings_url: Box<str>,

    /// Embedding model used to position words in 2D, as named in the word
    /// embeddings server's URLs
    #[arg(long, default_value = "google-news")]
    embeddings_model: Box<str>,

    /// Timeout of word embeddings server requests, in seconds
    #[arg(long, default_value = "30")]
    embeddings_timeout: u64,

    /// JSON file listing the sample searches offered to users
    ///
    /// A built-in list of sample searches is used if not specified.
    #[arg(long)]
    sample_searches: Option<PathBuf>,

    /// Time after which cached results are discarded, in seconds
    ///
    /// Setting this to 0 keeps cached results until they are evicted to make
    /// room for newer ones.
    #[arg(long, default_value = "86400")]
    cache_ttl: u64,

    /// Max number of cached results
    #[arg(long, default_value = "10000")]
    cache_capacity: NonZeroUsize,

    /// API key of a user allowed to query non-demo endpoints
    ///
    /// Can be specified multiple times. If no key is specified, non-demo
    /// endpoints are open to everyone.
    #[arg(long = "user-key")]
    user_keys: Vec<Box<str>>,

    /// Max number of words returned by JSON word count endpoints
    #[arg(long, default_value = "100")]
    num_words: NonZeroUsize,

    /// Number of stories sampled by JSON word count endpoints
    #[arg(long, default_value = "5000")]
    sample_size: NonZeroU32,

    /// Max number of words in CSV downloads
    #[arg(long, default_value = "500")]
    csv_num_words: NonZeroUsize,

    /// Number of stories sampled for CSV downloads
    ///
    /// Downloads are meant for offline analysis, so they use a bigger sample
    /// than interactive queries.
    #[arg(long, default_value = "10000")]
    csv_sample_size: NonZeroU32,
}
//
impl Args {
    /// Decode and validate CLI arguments
    pub fn parse_and_check() -> Result<Self> {
        // Decode CLI arguments
        let args = Args::parse();

        // Check CLI arguments for basic sanity
        anyhow::ensure!(
            args.search_api_timeout > 0 && args.embeddings_timeout > 0,
            "upstream request timeouts must be nonzero"
        );
        anyhow::ensure!(
            args.num_words <= args.csv_num_words,
            "CSV downloads should not contain fewer words than JSON responses"
        );
        for url in [&args.search_api_url, &args.embeddings_url] {
            anyhow::ensure!(
                url.starts_with("http://") || url.starts_with("https://"),
                "upstream URL {url} is not an HTTP(S) URL"
            );
        }
        Ok(args)
    }
}
//
#[tokio::main]
async fn main() -> Result<()> {
    // Set up logging
    setup_logging().map_err(|e| anyhow::format_err!("{e}"))?;

    // Decode CLI arguments
    let args = Args::parse_and_check()?;

    // Load the sample searches
    let samples = match &args.sample_searches {
        Some(path) => SampleSearches::load(path)
            .await
            .with_context(|| format!("loading sample searches from {}", path.display()))?,
        None => SampleSearches::builtin().context("loading built-in sample searches")?,
    };
    log::info!("Loaded {} sample searches", samples.len());

    // Start serving requests
    let config = Config::new(args);
    server::run(config, samples).await
}

/// Use anyhow for Result type erasure
pub use anyhow::Result;

/// Set up logging
fn setup_logging() -> syslog::Result<()> {
    syslog::init(
        syslog::Facility::LOG_USER,
        if cfg!(feature = "log-trace") {
            LevelFilter::Trace
        } else if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        None,
    )
}
