//! Request handlers

use super::AppState;
use crate::{
    csv,
    error::{ApiError, ApiResult},
    query::{parse_compared_queries, parse_index, QueryArgs, QueryDescriptor},
    wordcount::{CountParams, NgramSize, WordCountRow},
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::HashMap;

/// URL query parameters, as received
type Params = HashMap<String, String>;

/// Name of the parameter listing the queries of a comparison
const COMPARED_QUERIES: &str = "compared_queries[]";

/// JSON response wrapping a list of results
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub list: Vec<T>,
}

/// Liveness probe
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Top words of one query, with their 2D positions
pub async fn word_count(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<Json<ListResponse<WordCountRow>>> {
    let query = match sample_search_id(&params)? {
        Some(search_id) => {
            let index = parse_index(params.get("index").map(String::as_str))?;
            QueryDescriptor::from_sample(&state.samples, search_id, index)?
        }
        None => QueryDescriptor::from_args(&QueryArgs::from_params(&params)?)?,
    };
    let count = count_params(&params, &state, false)?;
    log::debug!("Counting words of {:?} query {query:?}", query.origin);
    let list = state.counter.rows_with_positions(&query, count).await?;
    Ok(Json(ListResponse { list }))
}

/// Top words of several queries, in the order where queries were specified
pub async fn compare_word_counts(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<Json<ListResponse<Vec<WordCountRow>>>> {
    let queries = compared_queries(&params)?;
    compare(&state, &params, &queries).await
}

/// Like [`compare_word_counts()`], but a sample search may be compared
/// instead of ad-hoc queries
pub async fn demo_compare_word_counts(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> ApiResult<Json<ListResponse<Vec<WordCountRow>>>> {
    let queries = match sample_search_id(&params)? {
        Some(search_id) => {
            let search = state.samples.get(search_id)?;
            (0..search.queries.len())
                .map(|index| QueryDescriptor::from_sample(&state.samples, search_id, index))
                .collect::<ApiResult<Vec<_>>>()?
        }
        None => compared_queries(&params)?,
    };
    compare(&state, &params, &queries).await
}

/// Word counts of one query, as a CSV download
pub async fn word_count_csv(
    State(state): State<AppState>,
    Path((search_id_or_query, index)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> ApiResult<Response> {
    let query =
        QueryDescriptor::from_search_id_or_query(&state.samples, &search_id_or_query, &index)?;
    let count = count_params(&params, &state, true)?;
    log::debug!("Exporting word counts of {:?} query {query:?}", query.origin);
    let rows = state.counter.rows(&query, count).await?;
    let filename = format!("Explorer-wordcounts-ngrams-{}", count.ngram_size.get());
    Ok(csv::stream_response(rows, &filename))
}

/// Count the words of several queries concurrently
async fn compare(
    state: &AppState,
    params: &Params,
    queries: &[QueryDescriptor],
) -> ApiResult<Json<ListResponse<Vec<WordCountRow>>>> {
    let count = count_params(params, state, false)?;
    log::debug!("Comparing word counts of {} queries", queries.len());
    let list = try_join_all(queries.iter().map(|query| state.counter.rows(query, count))).await?;
    Ok(Json(ListResponse { list }))
}

/// Sample search that a request is about, if any
///
/// A search ID of -1 means that there is none.
fn sample_search_id(params: &Params) -> ApiResult<Option<i64>> {
    let Some(search_id) = params.get("search_id").map(|id| id.trim()) else {
        return Ok(None);
    };
    if search_id.is_empty() {
        return Ok(None);
    }
    let search_id = search_id.parse::<i64>().map_err(|_| {
        ApiError::Validation(format!("search_id must be an integer, got {search_id:?}"))
    })?;
    Ok((search_id != -1).then_some(search_id))
}

/// Decode the queries of a comparison request
fn compared_queries(params: &Params) -> ApiResult<Vec<QueryDescriptor>> {
    let compared = params.get(COMPARED_QUERIES).ok_or_else(|| {
        ApiError::Validation(format!("Missing {COMPARED_QUERIES} parameter"))
    })?;
    let queries = parse_compared_queries(compared)?;
    if queries.is_empty() {
        return Err(ApiError::Validation("No query to compare".into()));
    }
    queries.iter().map(QueryDescriptor::from_args).collect()
}

/// Word count parameters of a request
fn count_params(params: &Params, state: &AppState, for_csv: bool) -> ApiResult<CountParams> {
    let ngram_size = NgramSize::from_param(params.get("ngram_size").map(String::as_str))?;
    let sizes = if for_csv {
        state.config.csv_counts
    } else {
        state.config.json_counts
    };
    Ok(CountParams::new(ngram_size, sizes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn search_ids() {
        assert_eq!(sample_search_id(&params(&[])).unwrap(), None);
        assert_eq!(sample_search_id(&params(&[("search_id", "-1")])).unwrap(), None);
        assert_eq!(sample_search_id(&params(&[("search_id", "")])).unwrap(), None);
        assert_eq!(sample_search_id(&params(&[("search_id", "2")])).unwrap(), Some(2));
        assert!(matches!(
            sample_search_id(&params(&[("search_id", "two")])),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn comparisons_need_queries() {
        assert!(matches!(
            compared_queries(&params(&[])),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            compared_queries(&params(&[(COMPARED_QUERIES, " , ")])),
            Err(ApiError::Validation(_))
        ));
        let queries =
            compared_queries(&params(&[(COMPARED_QUERIES, "?q=rain,q=snow&sources=3")])).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].keywords.as_deref(), Some("rain"));
        assert_eq!(queries[1].sources.iter().collect::<Vec<_>>(), [3]);
    }
}
