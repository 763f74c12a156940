//! Pre-defined sample searches, which can be explored without logging in

use crate::{
    error::{ApiError, ApiResult},
    query::{QueryArgs, QueryDescriptor},
    Result,
};
use anyhow::Context;
use serde::Deserialize;
use std::{collections::HashSet, path::Path, sync::Arc};

/// Built-in sample searches
const BUILTIN: &str = include_str!("../data/sample_searches.json");

/// What we know about a sample search
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct SampleSearch {
    /// Identifier, as used in explorer URLs
    pub id: i64,

    /// Human-readable name
    pub label: String,

    /// What this search is about
    #[serde(default)]
    pub description: String,

    /// Queries that this search is made of, usually compared to each other
    pub queries: Box<[QueryArgs]>,
}

/// Read-only table of sample searches
#[derive(Clone, Debug)]
pub struct SampleSearches(Arc<[SampleSearch]>);
//
impl SampleSearches {
    /// Sample searches that ship with this program
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN)
    }

    /// Load sample searches from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .context("reading the sample searches file")?;
        Self::from_json(&json)
    }

    /// Decode and check sample searches
    pub fn from_json(json: &str) -> Result<Self> {
        let searches: Vec<SampleSearch> =
            serde_json::from_str(json).context("decoding sample searches")?;
        let samples = Self(searches.into());
        let mut ids = HashSet::new();
        for search in samples.0.iter() {
            anyhow::ensure!(
                ids.insert(search.id),
                "sample search ID {} is used more than once",
                search.id
            );
            anyhow::ensure!(
                !search.queries.is_empty(),
                "sample search {} has no query",
                search.id
            );
            log::debug!(
                "Sample search {} is {:?} ({}), with {} queries",
                search.id,
                search.label,
                search.description,
                search.queries.len()
            );
            for index in 0..search.queries.len() {
                QueryDescriptor::from_sample(&samples, search.id, index).with_context(|| {
                    format!("checking query #{index} of sample search {}", search.id)
                })?;
            }
        }
        Ok(samples)
    }

    /// Look up a sample search by ID
    pub fn get(&self, search_id: i64) -> ApiResult<&SampleSearch> {
        self.0
            .iter()
            .find(|search| search.id == search_id)
            .ok_or_else(|| ApiError::NotFound(format!("Unknown sample search {search_id}")))
    }

    /// Number of sample searches
    pub fn len(&self) -> usize {
        self.0.len()
    }
}
