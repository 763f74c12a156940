//! Client of the upstream media search API

use crate::{
    config::SearchApiConfig,
    error::{ApiError, ApiResult},
    query::UpstreamQuery,
    wordcount::CountParams,
    Result,
};
use anyhow::Context;
use reqwest::Response;
use serde::{Deserialize, Serialize};

/// Number of occurences of a word (or ngram) within a sample of stories
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct WordCount {
    /// Most common spelling of the word
    pub term: String,

    /// Stem that occurences were grouped by
    pub stem: String,

    /// Number of occurences within the story sample
    pub count: u64,
}

/// Parameters of a word count request
#[derive(Debug, Serialize)]
struct WordCountRequest<'a> {
    q: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fq: Option<&'a str>,
    num_words: usize,
    sample_size: u32,
    ngram_size: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
}

/// Upstream media search API client
#[derive(Clone, Debug)]
pub struct SearchClient {
    /// HTTP client, with the configured timeout
    client: reqwest::Client,

    /// API configuration
    config: SearchApiConfig,
}
//
impl SearchClient {
    /// Set up a client
    pub fn new(config: SearchApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("setting up the media search API client")?;
        Ok(Self { client, config })
    }

    /// Count the most frequent words within a random sample of the stories
    /// that match a query
    ///
    /// Words are listed by decreasing number of occurences.
    pub async fn word_count(
        &self,
        query: &UpstreamQuery,
        params: CountParams,
    ) -> ApiResult<Vec<WordCount>> {
        let url = format!("{}/api/v2/wc/list", self.config.base_url);
        let request = WordCountRequest {
            q: &query.q,
            fq: query.fq.as_deref(),
            num_words: params.num_words.get(),
            sample_size: params.sample_size.get(),
            ngram_size: params.ngram_size.get(),
            key: self.config.key.as_deref(),
        };
        log::debug!("Requesting word counts for {query:?} with {params:?}");
        let response = self
            .client
            .get(&url)
            .query(&request)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(|e| ApiError::search(format!("querying word counts: {e}")))?;
        response
            .json::<Vec<WordCount>>()
            .await
            .map_err(|e| ApiError::search(format!("decoding word counts: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, wordcount::NgramSize};
    use std::num::{NonZeroU32, NonZeroUsize};
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn params() -> CountParams {
        CountParams {
            ngram_size: NgramSize::new(2).unwrap(),
            num_words: NonZeroUsize::new(3).unwrap(),
            sample_size: NonZeroU32::new(1000).unwrap(),
        }
    }

    fn query() -> UpstreamQuery {
        UpstreamQuery {
            q: "(climate)".into(),
            fq: Some("publish_day:[2018-01-01T00:00:00Z TO *]".into()),
        }
    }

    #[tokio::test]
    async fn request_format() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/wc/list"))
            .and(query_param("q", "(climate)"))
            .and(query_param("fq", "publish_day:[2018-01-01T00:00:00Z TO *]"))
            .and(query_param("num_words", "3"))
            .and(query_param("sample_size", "1000"))
            .and(query_param("ngram_size", "2"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"term": "climate change", "stem": "climat chang", "count": 120},
                {"term": "sea level", "stem": "sea level", "count": 40}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let config = Config::for_tests(&server.uri(), "http://unused");
        let client = SearchClient::new(config.search.clone()).unwrap();
        let counts = client.word_count(&query(), params()).await.unwrap();
        assert_eq!(
            counts,
            vec![
                WordCount {
                    term: "climate change".into(),
                    stem: "climat chang".into(),
                    count: 120
                },
                WordCount {
                    term: "sea level".into(),
                    stem: "sea level".into(),
                    count: 40
                },
            ]
        );
    }

    #[tokio::test]
    async fn upstream_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "(climate)"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("q", "(garbage)"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let config = Config::for_tests(&server.uri(), "http://unused");
        let client = SearchClient::new(config.search.clone()).unwrap();
        let failed = client.word_count(&query(), params()).await;
        assert!(matches!(failed, Err(ApiError::Upstream { .. })));
        let garbage = UpstreamQuery {
            q: "(garbage)".into(),
            fq: None,
        };
        let failed = client.word_count(&garbage, params()).await;
        assert!(matches!(failed, Err(ApiError::Upstream { .. })));
    }
}
