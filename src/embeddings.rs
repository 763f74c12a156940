//! Client of the word embeddings server, which positions words in 2D and
//! finds similar words

use crate::{
    config::EmbeddingsConfig,
    error::{ApiError, ApiResult},
    Result,
};
use anyhow::Context;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// 2D position of a word
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Point2d {
    pub x: f64,
    pub y: f64,
}

/// Successful response from the word embeddings server
#[derive(Debug, Deserialize)]
#[serde(bound = "T: Deserialize<'de>")]
struct Envelope<T> {
    /// Absent when the server could not process the request
    #[serde(default)]
    results: Option<Vec<T>>,
}

/// Word embeddings server client
#[derive(Clone, Debug)]
pub struct EmbeddingsClient {
    /// HTTP client, with the configured timeout
    client: reqwest::Client,

    /// Server configuration
    config: EmbeddingsConfig,
}
//
impl EmbeddingsClient {
    /// Set up a client
    pub fn new(config: EmbeddingsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("setting up the word embeddings client")?;
        Ok(Self { client, config })
    }

    /// Name of the embedding model that words are positioned with
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Position some words in 2D with the configured embedding model
    ///
    /// The server answers with one position per word, in the same order as the
    /// input words. Answers that cannot be decoded, which happens with some
    /// non-English words, are reported as an empty list of positions.
    pub async fn lookup_2d(&self, terms: &[String]) -> ApiResult<Vec<Point2d>> {
        let endpoint = format!("api/v2/{}/2d", self.config.model);
        self.query_for_json(&endpoint, terms).await
    }

    /// Position some words in 2D with the model trained on a topic snapshot
    pub async fn topic_2d(
        &self,
        topics_id: u64,
        snapshots_id: u64,
        terms: &[String],
    ) -> ApiResult<Vec<Point2d>> {
        let endpoint = format!("api/v2/topics/{topics_id}/snapshots/{snapshots_id}/2d");
        self.query_for_json(&endpoint, terms).await
    }

    /// Words that a topic snapshot's model deems similar to some words
    ///
    /// Entries are passed through as the server reports them.
    pub async fn topic_similar_words(
        &self,
        topics_id: u64,
        snapshots_id: u64,
        terms: &[String],
    ) -> ApiResult<Vec<serde_json::Value>> {
        let endpoint =
            format!("api/v2/topics/{topics_id}/snapshots/{snapshots_id}/similar-words");
        self.query_for_json(&endpoint, terms).await
    }

    /// Send some words to an endpoint and decode the `results` of its answer
    ///
    /// Undecodable and result-less answers are reported as empty results.
    async fn query_for_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        terms: &[String],
    ) -> ApiResult<Vec<T>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/{endpoint}", self.config.base_url);
        let form = terms
            .iter()
            .map(|term| ("words[]", term.as_str()))
            .collect::<Vec<_>>();
        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ApiError::embeddings(format!("querying {endpoint}: {e}")))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::embeddings(format!("receiving {endpoint} answer: {e}")))?;
        match serde_json::from_slice::<Envelope<T>>(&body) {
            Ok(Envelope {
                results: Some(results),
            }) => Ok(results),
            Ok(Envelope { results: None }) => {
                log::warn!("No result from {endpoint} (HTTP {status})");
                Ok(Vec::new())
            }
            Err(e) => {
                log::warn!("Ignoring undecodable {endpoint} answer (HTTP {status}): {e}");
                Ok(Vec::new())
            }
        }
    }
}
