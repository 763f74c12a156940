//! Translation of explorer UI query arguments into upstream search queries
//!
//! The explorer UI describes a query as some keywords, an optional range of
//! publication dates, and sets of media source and collection IDs. Queries
//! either come from a pre-defined [sample search](crate::samples) or from
//! arguments supplied by the user. In both cases they are normalized into a
//! [`QueryDescriptor`], which is what word counts are computed and cached for.

use crate::{
    error::{ApiError, ApiResult},
    samples::SampleSearches,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    fmt::Write,
    str::FromStr,
};

/// Date format used by the explorer UI
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Keyword and filter arguments of a query, as supplied by the explorer UI
///
/// Comes either from URL query parameters (see [`from_params()`]) or from
/// JSON query objects, which the UI writes in camelCase.
///
/// [`from_params()`]: QueryArgs::from_params
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct QueryArgs {
    /// Keywords, in the upstream search API's query language
    #[serde(default)]
    pub q: Option<String>,

    /// First day of publication, formatted as YYYY-MM-DD
    #[serde(default, alias = "startDate")]
    pub start_date: Option<String>,

    /// Last day of publication, formatted as YYYY-MM-DD
    #[serde(default, alias = "endDate")]
    pub end_date: Option<String>,

    /// Media source IDs
    #[serde(default)]
    pub sources: IdList,

    /// Collection IDs
    #[serde(default)]
    pub collections: IdList,
}
//
impl QueryArgs {
    /// Extract query arguments from URL query parameters
    ///
    /// Dates may be spelled in snake_case or camelCase, as in JSON queries.
    pub fn from_params(params: &HashMap<String, String>) -> ApiResult<Self> {
        let ids = |key: &str| {
            params
                .get(key)
                .map(|list| list.parse::<IdList>())
                .transpose()
                .map(Option::unwrap_or_default)
                .map_err(|e| ApiError::Validation(format!("Invalid {key}: {e}")))
        };
        let either = |snake: &str, camel: &str| {
            params.get(snake).or_else(|| params.get(camel)).cloned()
        };
        Ok(Self {
            q: params.get("q").cloned(),
            start_date: either("start_date", "startDate"),
            end_date: either("end_date", "endDate"),
            sources: ids("sources")?,
            collections: ids("collections")?,
        })
    }

    /// Query made of keywords only
    pub fn keywords(q: impl Into<String>) -> Self {
        Self {
            q: Some(q.into()),
            ..Self::default()
        }
    }
}

/// Set of media source or collection IDs
///
/// Accepts comma-separated lists ("1,2,3"), single numbers and JSON arrays of
/// numbers or numeric strings. Ordering and duplicates are normalized away.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(try_from = "RawIds")]
pub struct IdList(BTreeSet<u64>);
//
impl IdList {
    /// Truth that no ID was specified
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// IDs in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().copied()
    }
}
//
impl FromStr for IdList {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        s.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(parse_id)
            .collect::<Result<_, _>>()
            .map(Self)
    }
}
//
impl<const N: usize> From<[u64; N]> for IdList {
    fn from(ids: [u64; N]) -> Self {
        Self(ids.into())
    }
}
//
impl TryFrom<RawIds> for IdList {
    type Error = String;

    fn try_from(raw: RawIds) -> Result<Self, String> {
        match raw {
            RawIds::Text(list) => list.parse(),
            RawIds::One(id) => Ok(Self([id].into())),
            RawIds::Many(ids) => ids
                .into_iter()
                .map(|id| match id {
                    RawId::Number(id) => Ok(id),
                    RawId::Text(id) => parse_id(id.trim()),
                })
                .collect::<Result<_, _>>()
                .map(Self),
        }
    }
}

/// Serialized forms of an [`IdList`]
#[derive(Deserialize)]
#[serde(untagged)]
enum RawIds {
    One(u64),
    Text(String),
    Many(Vec<RawId>),
}

/// Serialized forms of one ID within an [`IdList`]
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

/// Parse a single media source or collection ID
fn parse_id(id: &str) -> Result<u64, String> {
    id.parse()
        .map_err(|_| format!("{id:?} is not a valid ID"))
}

/// Where a query comes from
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Origin {
    /// Query number `index` of the sample search with ID `search_id`
    Sample { search_id: i64, index: usize },

    /// Arguments that were supplied directly
    AdHoc,
}

/// Inclusive range of publication days, possibly open on either side
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}
//
impl DateRange {
    /// Truth that this range does not restrict publication dates
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Normalized query, which word counts are computed for
///
/// The serialized form only contains what affects the search results, so that
/// identical sample and ad-hoc queries share cache entries.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct QueryDescriptor {
    /// Where this query comes from
    #[serde(skip)]
    pub origin: Origin,

    /// Keywords, if any
    pub keywords: Option<String>,

    /// Range of publication days
    pub dates: DateRange,

    /// Media source IDs
    pub sources: IdList,

    /// Collection IDs
    pub collections: IdList,
}
//
impl QueryDescriptor {
    /// Build a query from arguments supplied by the user
    ///
    /// Fails if there are neither keywords nor filters.
    pub fn from_args(args: &QueryArgs) -> ApiResult<Self> {
        let query = Self::build(args, Origin::AdHoc)?;
        if query.keywords.is_none()
            && query.dates.is_unbounded()
            && query.sources.is_empty()
            && query.collections.is_empty()
        {
            return Err(ApiError::Validation(
                "Query needs keywords (q) or at least one filter".into(),
            ));
        }
        Ok(query)
    }

    /// Build query number `index` of a sample search
    pub fn from_sample(samples: &SampleSearches, search_id: i64, index: usize) -> ApiResult<Self> {
        let search = samples.get(search_id)?;
        let args = search.queries.get(index).ok_or_else(|| {
            ApiError::NotFound(format!(
                "Sample search {search_id} has no query #{index}"
            ))
        })?;
        Self::build(args, Origin::Sample { search_id, index })
    }

    /// Build a query from the path segments of a CSV download URL
    ///
    /// The first segment is either the ID of a sample search, a JSON list of
    /// query objects (of which the first one is used), or bare keywords. When a
    /// sample search lookup fails, the segment is taken as keywords. The query
    /// index only matters for sample searches.
    pub fn from_search_id_or_query(
        samples: &SampleSearches,
        search_id_or_query: &str,
        index: &str,
    ) -> ApiResult<Self> {
        if let Ok(search_id) = search_id_or_query.trim().parse::<i64>() {
            if search_id >= 0 {
                let index = parse_index(Some(index))?;
                match Self::from_sample(samples, search_id, index) {
                    Ok(query) => return Ok(query),
                    Err(ApiError::NotFound(e)) => {
                        log::debug!("{e}, treating {search_id_or_query:?} as keywords")
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        match serde_json::from_str::<serde_json::Value>(search_id_or_query) {
            Ok(list @ serde_json::Value::Array(_)) => {
                let queries = serde_json::from_value::<Vec<QueryArgs>>(list)
                    .map_err(|e| ApiError::Validation(format!("Invalid query list: {e}")))?;
                let first = queries.first().ok_or_else(|| {
                    ApiError::Validation("Query list should not be empty".into())
                })?;
                Self::from_args(first)
            }
            _ => Self::from_args(&QueryArgs::keywords(search_id_or_query)),
        }
    }

    /// Translate into the upstream search API's query language
    pub fn to_upstream(&self) -> UpstreamQuery {
        let mut q = match &self.keywords {
            Some(keywords) => format!("({keywords})"),
            None => "*".to_owned(),
        };
        let media_clauses = [
            ("media_id", &self.sources),
            ("tags_id_media", &self.collections),
        ]
        .into_iter()
        .filter(|(_field, ids)| !ids.is_empty())
        .map(|(field, ids)| {
            let ids = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
            format!("({field}:({}))", ids.join(" "))
        })
        .collect::<Vec<_>>();
        if !media_clauses.is_empty() {
            if self.keywords.is_none() {
                q = "(*)".to_owned();
            }
            write!(q, " AND ({})", media_clauses.join(" OR "))
                .expect("writing to a String can't fail");
        }
        let fq = (!self.dates.is_unbounded()).then(|| {
            let day = |date: Option<NaiveDate>| match date {
                Some(date) => format!("{}T00:00:00Z", date.format(DATE_FORMAT)),
                None => "*".to_owned(),
            };
            format!(
                "publish_day:[{} TO {}]",
                day(self.dates.start),
                day(self.dates.end)
            )
        });
        UpstreamQuery { q, fq }
    }

    /// Normalize query arguments, without checking that the query is selective
    fn build(args: &QueryArgs, origin: Origin) -> ApiResult<Self> {
        let keywords = (args.q.as_deref())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_owned);
        let dates = DateRange {
            start: parse_date("start_date", args.start_date.as_deref())?,
            end: parse_date("end_date", args.end_date.as_deref())?,
        };
        if let DateRange {
            start: Some(start),
            end: Some(end),
        } = dates
        {
            if start > end {
                return Err(ApiError::Validation(format!(
                    "Start date {start} is after end date {end}"
                )));
            }
        }
        Ok(Self {
            origin,
            keywords,
            dates,
            sources: args.sources.clone(),
            collections: args.collections.clone(),
        })
    }
}

/// Parse an optional date argument, treating blank dates as absent
fn parse_date(name: &str, date: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    let Some(date) = date.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map(Some)
        .map_err(|_| ApiError::Validation(format!("Invalid {name} {date:?}, expected YYYY-MM-DD")))
}

/// Decode a query index, which defaults to 0
pub fn parse_index(index: Option<&str>) -> ApiResult<usize> {
    let Some(index) = index else {
        return Ok(0);
    };
    index.trim().parse().map_err(|_| {
        ApiError::Validation(format!("index must be a non-negative integer, got {index:?}"))
    })
}

/// Parse the `compared_queries[]` argument of comparison endpoints
///
/// This is a comma-separated list of URL-encoded query strings, each of which
/// may start with a question mark. Commas within a query string must be
/// percent-encoded.
pub fn parse_compared_queries(compared: &str) -> ApiResult<Vec<QueryArgs>> {
    compared
        .split(',')
        .filter(|query| !query.trim().is_empty())
        .map(|query| {
            let query = query.trim().trim_start_matches('?');
            let params = serde_urlencoded::from_str::<HashMap<String, String>>(query)
                .map_err(|e| ApiError::Validation(format!("Invalid compared query {query:?}: {e}")))?;
            QueryArgs::from_params(&params)
        })
        .collect()
}

/// Query in the upstream search API's language
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct UpstreamQuery {
    /// Main query
    pub q: String,

    /// Filter query, if any
    pub fq: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn samples() -> SampleSearches {
        SampleSearches::from_json(
            r#"[{"id": 0, "label": "Climate", "queries": [
                    {"q": "climate", "startDate": "2018-01-01", "endDate": "2018-06-30", "collections": [9139487]},
                    {"q": "global warming", "sources": ["1", "2"]}
                ]}]"#,
        )
        .unwrap()
    }

    #[test]
    fn keywords_only() {
        let query = QueryDescriptor::from_args(&QueryArgs::keywords(" climate ")).unwrap();
        assert_eq!(query.origin, Origin::AdHoc);
        assert_eq!(query.keywords.as_deref(), Some("climate"));
        assert_eq!(
            query.to_upstream(),
            UpstreamQuery {
                q: "(climate)".into(),
                fq: None
            }
        );
    }

    #[test]
    fn full_translation() {
        let args = QueryArgs::from_params(&params(&[
            ("q", "climate OR weather"),
            ("start_date", "2018-01-01"),
            ("end_date", "2018-02-01"),
            ("sources", "3,1"),
            ("collections", "7"),
        ]))
        .unwrap();
        let query = QueryDescriptor::from_args(&args).unwrap().to_upstream();
        assert_eq!(
            query.q,
            "(climate OR weather) AND ((media_id:(1 3)) OR (tags_id_media:(7)))"
        );
        assert_eq!(
            query.fq.as_deref(),
            Some("publish_day:[2018-01-01T00:00:00Z TO 2018-02-01T00:00:00Z]")
        );
    }

    #[test]
    fn filters_without_keywords() {
        let args = QueryArgs {
            collections: [5, 6].into(),
            start_date: Some("2019-03-01".into()),
            ..QueryArgs::default()
        };
        let query = QueryDescriptor::from_args(&args).unwrap().to_upstream();
        assert_eq!(query.q, "(*) AND ((tags_id_media:(5 6)))");
        assert_eq!(
            query.fq.as_deref(),
            Some("publish_day:[2019-03-01T00:00:00Z TO *]")
        );
    }

    #[test]
    fn unselective_query_is_rejected() {
        for args in [QueryArgs::default(), QueryArgs::keywords("   ")] {
            assert!(matches!(
                QueryDescriptor::from_args(&args),
                Err(ApiError::Validation(_))
            ));
        }
    }

    #[test]
    fn bad_arguments_are_rejected() {
        let bad_date = QueryArgs {
            start_date: Some("01/02/2018".into()),
            ..QueryArgs::keywords("x")
        };
        assert!(matches!(
            QueryDescriptor::from_args(&bad_date),
            Err(ApiError::Validation(_))
        ));
        let reversed = QueryArgs {
            start_date: Some("2018-02-01".into()),
            end_date: Some("2018-01-01".into()),
            ..QueryArgs::keywords("x")
        };
        assert!(matches!(
            QueryDescriptor::from_args(&reversed),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            QueryArgs::from_params(&params(&[("q", "x"), ("sources", "1,abc")])),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn id_order_is_irrelevant() {
        let a = QueryArgs::from_params(&params(&[("q", "x"), ("sources", "2,1,2")])).unwrap();
        let b = QueryArgs::from_params(&params(&[("q", "x"), ("sources", "1, 2")])).unwrap();
        assert_eq!(
            QueryDescriptor::from_args(&a).unwrap(),
            QueryDescriptor::from_args(&b).unwrap()
        );
    }

    #[test]
    fn json_query_objects() {
        let args: QueryArgs = serde_json::from_str(
            r#"{"label": "q1", "q": "x", "color": "ff0000", "startDate": "2018-01-01",
                "sources": [3, "4"], "collections": "5,6"}"#,
        )
        .unwrap();
        assert_eq!(args.start_date.as_deref(), Some("2018-01-01"));
        assert_eq!(args.sources, IdList::from([3, 4]));
        assert_eq!(args.collections, IdList::from([5, 6]));
        assert!(serde_json::from_str::<QueryArgs>(r#"{"sources": [-1]}"#).is_err());
    }

    #[test]
    fn sample_queries() {
        let samples = samples();
        let first = QueryDescriptor::from_sample(&samples, 0, 0).unwrap();
        assert_eq!(first, QueryDescriptor::from_sample(&samples, 0, 0).unwrap());
        assert_eq!(
            first.origin,
            Origin::Sample {
                search_id: 0,
                index: 0
            }
        );
        assert_eq!(first.collections, IdList::from([9139487]));
        let second = QueryDescriptor::from_sample(&samples, 0, 1).unwrap();
        assert_eq!(second.sources, IdList::from([1, 2]));
        assert!(matches!(
            QueryDescriptor::from_sample(&samples, 0, 2),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            QueryDescriptor::from_sample(&samples, 999, 0),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn csv_path_segments() {
        let samples = samples();
        let sample = QueryDescriptor::from_search_id_or_query(&samples, "0", "1").unwrap();
        assert_eq!(sample.keywords.as_deref(), Some("global warming"));

        let unknown = QueryDescriptor::from_search_id_or_query(&samples, "999", "0").unwrap();
        assert_eq!(unknown.origin, Origin::AdHoc);
        assert_eq!(unknown.keywords.as_deref(), Some("999"));

        let json = QueryDescriptor::from_search_id_or_query(
            &samples,
            r#"[{"q": "bees", "sources": [2]}, {"q": "wasps"}]"#,
            "first",
        )
        .unwrap();
        assert_eq!(json.keywords.as_deref(), Some("bees"));
        assert_eq!(json.sources, IdList::from([2]));

        let keywords = QueryDescriptor::from_search_id_or_query(&samples, "honey bees", "x").unwrap();
        assert_eq!(keywords.keywords.as_deref(), Some("honey bees"));

        let object = QueryDescriptor::from_search_id_or_query(&samples, r#"{"q": "bees"}"#, "0")
            .unwrap();
        assert_eq!(object.keywords.as_deref(), Some(r#"{"q": "bees"}"#));

        assert!(matches!(
            QueryDescriptor::from_search_id_or_query(&samples, "[]", "0"),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            QueryDescriptor::from_search_id_or_query(&samples, "0", "second"),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn invalid_query_lists_are_rejected() {
        let samples = samples();
        for list in [
            r#"[{"q": "bees", "sources": [-5]}]"#,
            r#"[{"q": "bees", "collections": [{"id": 3}]}]"#,
            r#"[{"q": ["bees"]}]"#,
            "[1, 2]",
        ] {
            assert!(
                matches!(
                    QueryDescriptor::from_search_id_or_query(&samples, list, "0"),
                    Err(ApiError::Validation(_))
                ),
                "{list}"
            );
        }
    }

    #[test]
    fn indices() {
        assert_eq!(parse_index(None).unwrap(), 0);
        assert_eq!(parse_index(Some(" 3")).unwrap(), 3);
        assert!(matches!(parse_index(Some("-1")), Err(ApiError::Validation(_))));
    }

    #[test]
    fn camel_case_dates() {
        let args = QueryArgs::from_params(&params(&[
            ("q", "x"),
            ("startDate", "2018-01-01"),
            ("endDate", "2018-02-01"),
        ]))
        .unwrap();
        let query = QueryDescriptor::from_args(&args).unwrap();
        assert_eq!(query.dates.start, NaiveDate::from_ymd_opt(2018, 1, 1));
        assert_eq!(query.dates.end, NaiveDate::from_ymd_opt(2018, 2, 1));

        let both = QueryArgs::from_params(&params(&[
            ("q", "x"),
            ("start_date", "2019-01-01"),
            ("startDate", "2018-01-01"),
        ]))
        .unwrap();
        assert_eq!(both.start_date.as_deref(), Some("2019-01-01"));
    }

    #[test]
    fn compared_queries() {
        let queries = parse_compared_queries(
            "?q=climate&sources=1%2C2,?q=weather%20report&start_date=2018-01-01",
        )
        .unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].q.as_deref(), Some("climate"));
        assert_eq!(queries[0].sources, IdList::from([1, 2]));
        assert_eq!(queries[1].q.as_deref(), Some("weather report"));
        assert_eq!(queries[1].start_date.as_deref(), Some("2018-01-01"));
    }
}
