//! Word counts over story samples, decorated with 2D word positions

use crate::{
    cache::{Cache, Fingerprint},
    config::CountSizes,
    embeddings::{EmbeddingsClient, Point2d},
    error::{ApiError, ApiResult},
    query::QueryDescriptor,
    search::{SearchClient, WordCount},
};
use serde::Serialize;
use std::num::{NonZeroU32, NonZeroU8, NonZeroUsize};

/// Longest ngrams that the upstream search API can count
pub const MAX_NGRAM_SIZE: u8 = 3;

/// Cache namespace of word counts
const COUNTS_NAMESPACE: &str = "word_count";

/// Cache namespace of 2D word positions
const POSITIONS_NAMESPACE: &str = "google_news_2d";

/// Number of words per counted ngram
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct NgramSize(NonZeroU8);
//
impl NgramSize {
    /// Check that an ngram size is supported
    pub fn new(size: u8) -> ApiResult<Self> {
        NonZeroU8::new(size)
            .filter(|size| size.get() <= MAX_NGRAM_SIZE)
            .map(Self)
            .ok_or_else(|| {
                ApiError::Validation(format!(
                    "ngram_size must be between 1 and {MAX_NGRAM_SIZE}, got {size}"
                ))
            })
    }

    /// Decode the optional `ngram_size` request argument
    pub fn from_param(param: Option<&str>) -> ApiResult<Self> {
        let Some(param) = param else {
            return Ok(Self::default());
        };
        let size = param.trim().parse::<u8>().map_err(|_| {
            ApiError::Validation(format!("ngram_size must be an integer, got {param:?}"))
        })?;
        Self::new(size)
    }

    /// Number of words per ngram
    pub fn get(self) -> u8 {
        self.0.get()
    }
}
//
impl Default for NgramSize {
    fn default() -> Self {
        Self(NonZeroU8::MIN)
    }
}

/// Parameters of a word count, besides the query
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct CountParams {
    /// Number of words per counted ngram
    pub ngram_size: NgramSize,

    /// Max number of reported ngrams
    pub num_words: NonZeroUsize,

    /// Number of stories that ngrams are counted in
    pub sample_size: NonZeroU32,
}
//
impl CountParams {
    /// Count ngrams of a certain size with configured limits
    pub fn new(ngram_size: NgramSize, sizes: CountSizes) -> Self {
        Self {
            ngram_size,
            num_words: sizes.num_words,
            sample_size: sizes.sample_size,
        }
    }
}

/// Word count, as reported to clients
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WordCountRow {
    /// Most common spelling of the word
    pub term: String,

    /// Stem that occurences were grouped by
    pub stem: String,

    /// Number of occurences within the story sample
    pub count: u64,

    /// Number of stories in the sample
    pub sample_size: u32,

    /// Average number of occurences per story
    pub ratio: f64,

    /// Horizontal position of the word in the embedding model's 2D space
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_w2v_x: Option<f64>,

    /// Vertical position of the word in the embedding model's 2D space
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_w2v_y: Option<f64>,
}
//
impl WordCountRow {
    /// Report a word count, without a 2D position
    pub fn new(count: WordCount, sample_size: NonZeroU32) -> Self {
        let WordCount { term, stem, count } = count;
        Self {
            term,
            stem,
            count,
            sample_size: sample_size.get(),
            ratio: count as f64 / f64::from(sample_size.get()),
            google_w2v_x: None,
            google_w2v_y: None,
        }
    }
}

/// Word counting service
#[derive(Clone)]
pub struct WordCounter {
    search: SearchClient,
    embeddings: EmbeddingsClient,
    cache: Cache,
}
//
impl WordCounter {
    /// Set up the word counting service
    pub fn new(search: SearchClient, embeddings: EmbeddingsClient, cache: Cache) -> Self {
        Self {
            search,
            embeddings,
            cache,
        }
    }

    /// Most frequent words within a sample of the stories that match a query,
    /// by decreasing number of occurences
    ///
    /// Results are cached.
    pub async fn word_count(
        &self,
        query: &QueryDescriptor,
        params: CountParams,
    ) -> ApiResult<Vec<WordCount>> {
        let key = Fingerprint::new(COUNTS_NAMESPACE, &(query, params))?;
        self.cache
            .get_or_compute(&key, move || async move {
                let mut counts = self.search.word_count(&query.to_upstream(), params).await?;
                keep_top_words(&mut counts, params.num_words);
                Ok(counts)
            })
            .await
    }

    /// Word counts for a query, as reported to clients
    pub async fn rows(
        &self,
        query: &QueryDescriptor,
        params: CountParams,
    ) -> ApiResult<Vec<WordCountRow>> {
        let counts = self.word_count(query, params).await?;
        Ok(counts
            .into_iter()
            .map(|count| WordCountRow::new(count, params.sample_size))
            .collect())
    }

    /// Word counts for a query, with the 2D position of each word
    ///
    /// Words that the embeddings server could not position have no position.
    pub async fn rows_with_positions(
        &self,
        query: &QueryDescriptor,
        params: CountParams,
    ) -> ApiResult<Vec<WordCountRow>> {
        let mut rows = self.rows(query, params).await?;
        let terms = rows.iter().map(|row| row.term.clone()).collect::<Vec<_>>();
        let positions = self.positions_2d(&terms).await?;
        add_positions(&mut rows, &positions);
        Ok(rows)
    }

    /// 2D positions of some words, in the same order
    ///
    /// Successful lookups are cached. Empty results are not, since they are
    /// usually caused by a transient failure of the embeddings server.
    async fn positions_2d(&self, terms: &[String]) -> ApiResult<Vec<Point2d>> {
        let key = positions_key(self.embeddings.model(), terms)?;
        self.cache
            .get_or_compute_if(
                &key,
                move || self.embeddings.lookup_2d(terms),
                |positions: &Vec<Point2d>| !positions.is_empty(),
            )
            .await
    }
}

/// Cache key of the 2D positions of some words
fn positions_key(model: &str, terms: &[String]) -> ApiResult<Fingerprint> {
    Fingerprint::new(POSITIONS_NAMESPACE, &(model, terms))
}

/// Keep the most frequent words, by decreasing number of occurences
///
/// Words with equal counts are kept in their original order.
fn keep_top_words(counts: &mut Vec<WordCount>, num_words: NonZeroUsize) {
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(num_words.get());
}

/// Attach 2D positions to word counts
///
/// Positions are matched to words by index.
fn add_positions(rows: &mut [WordCountRow], positions: &[Point2d]) {
    if !positions.is_empty() && positions.len() != rows.len() {
        log::warn!(
            "Got {} word positions for {} words, some words will not be positioned",
            positions.len(),
            rows.len()
        );
    }
    for (row, position) in rows.iter_mut().zip(positions) {
        row.google_w2v_x = Some(position.x);
        row.google_w2v_y = Some(position.y);
    }
}
