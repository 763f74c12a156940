//! Server configuration

use crate::Args;
use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    sync::Arc,
    time::Duration,
};

/// Final server configuration
///
/// This is the result of digesting [`Args`]. Please refer to [`Args`] to know
/// more about individual settings.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Config {
    /// Address that the HTTP server listens on
    pub listen: SocketAddr,

    /// Upstream media search API
    pub search: SearchApiConfig,

    /// Word embeddings server
    pub embeddings: EmbeddingsConfig,

    /// Result cache
    pub cache: CacheConfig,

    /// API keys of users allowed to query non-demo endpoints
    pub user_keys: Box<[Box<str>]>,

    /// Word count parameters of JSON endpoints
    pub json_counts: CountSizes,

    /// Word count parameters of CSV downloads
    pub csv_counts: CountSizes,
}
//
impl Config {
    /// Determine server configuration from CLI arguments
    pub(crate) fn new(args: Args) -> Arc<Self> {
        let Args {
            listen,
            search_api_url,
            search_api_key,
            search_api_timeout,
            embeddings_url,
            embeddings_model,
            embeddings_timeout,
            sample_searches: _,
            cache_ttl,
            cache_capacity,
            user_keys,
            num_words,
            sample_size,
            csv_num_words,
            csv_sample_size,
        } = args;
        Arc::new(Self {
            listen,
            search: SearchApiConfig {
                base_url: trim_base_url(search_api_url),
                key: search_api_key,
                timeout: Duration::from_secs(search_api_timeout),
            },
            embeddings: EmbeddingsConfig {
                base_url: trim_base_url(embeddings_url),
                model: embeddings_model,
                timeout: Duration::from_secs(embeddings_timeout),
            },
            cache: CacheConfig {
                ttl: (cache_ttl > 0).then(|| Duration::from_secs(cache_ttl)),
                capacity: cache_capacity,
            },
            user_keys: user_keys.into(),
            json_counts: CountSizes {
                num_words,
                sample_size,
            },
            csv_counts: CountSizes {
                num_words: csv_num_words,
                sample_size: csv_sample_size,
            },
        })
    }

    /// Configuration pointing at stub upstream servers
    #[cfg(test)]
    pub fn for_tests(search_url: &str, embeddings_url: &str) -> Arc<Self> {
        let args = <Args as clap::Parser>::parse_from([
            "explorer-words",
            "--search-api-url",
            search_url,
            "--search-api-key",
            "test-key",
            "--embeddings-url",
            embeddings_url,
        ]);
        Self::new(args)
    }
}

/// Upstream media search API configuration
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SearchApiConfig {
    /// Base URL, without trailing slash
    pub base_url: Box<str>,

    /// API key, if any
    pub key: Option<Box<str>>,

    /// Request timeout
    pub timeout: Duration,
}

/// Word embeddings server configuration
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct EmbeddingsConfig {
    /// Base URL, without trailing slash
    pub base_url: Box<str>,

    /// Name of the embedding model used for 2D word positions
    pub model: Box<str>,

    /// Request timeout
    pub timeout: Duration,
}

/// Result cache configuration
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CacheConfig {
    /// Time after which entries expire, if any
    pub ttl: Option<Duration>,

    /// Max number of entries
    pub capacity: NonZeroUsize,
}

/// Size parameters of a word count
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CountSizes {
    /// Max number of words that are reported
    pub num_words: NonZeroUsize,

    /// Number of stories that words are counted in
    pub sample_size: NonZeroU32,
}

/// Strip trailing slashes so that endpoint paths can be appended as-is
fn trim_base_url(url: Box<str>) -> Box<str> {
    url.trim_end_matches('/').into()
}
