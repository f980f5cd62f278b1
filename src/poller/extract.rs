//! Record extraction and pagination advance over raw JSON responses
//!
//! A [`ResponsePath`] is a small dot/bracket path language evaluated against
//! `serde_json::Value` bodies: `$.data.items`, `items[*].id`, `results[0]`.
//! [`ResponseExtractor`] uses it to pull the record list out of a response
//! and to decide whether and how a next page should be requested for each of
//! the three supported pagination styles (cursor, page, offset).
//!
//! Error policy: a path that fails to parse or matches nothing is a hard
//! failure when it is the primary record path; the same conditions on the
//! secondary cursor path are logged and mean "no next page".

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use super::error::ExtractError;
use crate::models::{PaginationConfig, PaginationKind};

/// One step of a parsed response path
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathStep {
    /// Object member access
    Field(String),
    /// Array element access
    Index(usize),
    /// All elements of an array / all values of an object
    Wildcard,
}

/// Parsed response-path expression
#[derive(Debug, Clone)]
pub struct ResponsePath {
    raw: String,
    steps: Vec<PathStep>,
}

impl ResponsePath {
    /// Parse a path expression. An optional leading `$` denotes the root.
    pub fn parse(raw: &str) -> Result<Self, ExtractError> {
        let mut steps = Vec::new();
        let trimmed = raw.trim();
        let body = trimmed.strip_prefix('$').unwrap_or(trimmed);
        let body = body.strip_prefix('.').unwrap_or(body);

        if body.is_empty() {
            // Bare "$" selects the whole body
            return Ok(Self {
                raw: raw.to_string(),
                steps,
            });
        }

        for segment in body.split('.') {
            if segment.is_empty() {
                return Err(ExtractError::malformed(raw, "empty path segment"));
            }

            let (field, brackets) = match segment.find('[') {
                Some(pos) => (&segment[..pos], &segment[pos..]),
                None => (segment, ""),
            };

            if !field.is_empty() {
                if field == "*" {
                    steps.push(PathStep::Wildcard);
                } else {
                    steps.push(PathStep::Field(field.to_string()));
                }
            } else if brackets.is_empty() {
                return Err(ExtractError::malformed(raw, "empty path segment"));
            }

            let mut rest = brackets;
            while !rest.is_empty() {
                let inner_end = rest
                    .find(']')
                    .ok_or_else(|| ExtractError::malformed(raw, "unterminated bracket"))?;
                let inner = &rest[1..inner_end];
                if inner == "*" {
                    steps.push(PathStep::Wildcard);
                } else {
                    let index: usize = inner.parse().map_err(|_| {
                        ExtractError::malformed(raw, format!("invalid array index '{inner}'"))
                    })?;
                    steps.push(PathStep::Index(index));
                }
                rest = &rest[inner_end + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(ExtractError::malformed(raw, "unexpected trailing characters"));
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            steps,
        })
    }

    /// Evaluate against a response body, returning every matching value
    pub fn eval<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![root];

        for step in &self.steps {
            let mut next = Vec::new();
            for value in current {
                match step {
                    PathStep::Field(name) => {
                        if let Some(v) = value.get(name.as_str()) {
                            next.push(v);
                        }
                    }
                    PathStep::Index(i) => {
                        if let Some(v) = value.get(*i) {
                            next.push(v);
                        }
                    }
                    PathStep::Wildcard => match value {
                        Value::Array(items) => next.extend(items.iter()),
                        Value::Object(map) => next.extend(map.values()),
                        _ => {}
                    },
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }

        current
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Stateless record extraction and pagination-advance logic
pub struct ResponseExtractor;

impl ResponseExtractor {
    /// Extract the record list from a response body.
    ///
    /// With no configured path the whole body is the extracted value. A path
    /// yielding exactly one match uses that match alone; multiple matches
    /// form the list. The result is always normalized to a list: a matched
    /// array contributes its elements, a scalar or object becomes a
    /// single-element list, null becomes empty.
    pub fn extract_records(
        body: &Value,
        response_path: Option<&str>,
    ) -> Result<Vec<Value>, ExtractError> {
        let Some(raw_path) = response_path else {
            return Ok(Self::normalize(body.clone()));
        };

        let path = ResponsePath::parse(raw_path)?;
        let matches = path.eval(body);

        match matches.len() {
            0 => Err(ExtractError::shape_mismatch(raw_path)),
            1 => Ok(Self::normalize(matches[0].clone())),
            _ => Ok(matches.into_iter().cloned().collect()),
        }
    }

    fn normalize(value: Value) -> Vec<Value> {
        match value {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }

    /// Seed pagination parameters for the first request of a cycle
    pub fn initial_params(pagination: &PaginationConfig) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        match pagination.kind {
            PaginationKind::Cursor => {}
            PaginationKind::Page => {
                params.insert(
                    pagination.page_param().to_string(),
                    pagination.start_page().to_string(),
                );
                params.insert(
                    pagination.page_size_param().to_string(),
                    pagination.page_size().to_string(),
                );
            }
            PaginationKind::Offset => {
                params.insert(pagination.offset_param().to_string(), "0".to_string());
                params.insert(
                    pagination.limit_param().to_string(),
                    pagination.page_size().to_string(),
                );
            }
        }
        params
    }

    /// Whether another page should be requested after the current response.
    ///
    /// Cursor style asks the response; page and offset styles use the
    /// non-empty-page heuristic, which can cost one trailing empty request
    /// per cycle at the true end of data. That extra request is expected.
    pub fn has_next_page(
        body: &Value,
        records: &[Value],
        pagination: &PaginationConfig,
    ) -> bool {
        match pagination.kind {
            PaginationKind::Cursor => Self::next_cursor(body, pagination).is_some(),
            PaginationKind::Page | PaginationKind::Offset => !records.is_empty(),
        }
    }

    /// Compute the pagination parameters for the next page request
    pub fn next_page_params(
        current: &BTreeMap<String, String>,
        body: &Value,
        pagination: &PaginationConfig,
    ) -> BTreeMap<String, String> {
        let mut params = current.clone();

        match pagination.kind {
            PaginationKind::Cursor => {
                if let Some(cursor) = Self::next_cursor(body, pagination) {
                    params.insert(pagination.cursor_param().to_string(), cursor);
                }
            }
            PaginationKind::Page => {
                let current_page = current
                    .get(pagination.page_param())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or_else(|| pagination.start_page());
                params.insert(
                    pagination.page_param().to_string(),
                    (current_page + 1).to_string(),
                );
                params
                    .entry(pagination.page_size_param().to_string())
                    .or_insert_with(|| pagination.page_size().to_string());
            }
            PaginationKind::Offset => {
                let offset = current
                    .get(pagination.offset_param())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0);
                let limit = current
                    .get(pagination.limit_param())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or_else(|| pagination.page_size());
                params.insert(
                    pagination.offset_param().to_string(),
                    (offset + limit).to_string(),
                );
                params.insert(pagination.limit_param().to_string(), limit.to_string());
            }
        }

        params
    }

    /// Extract the next cursor value, if any. Errors on the cursor path are
    /// logged and treated as end of data rather than propagated.
    fn next_cursor(body: &Value, pagination: &PaginationConfig) -> Option<String> {
        let raw_path = pagination.cursor_path.as_deref()?;

        let path = match ResponsePath::parse(raw_path) {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %raw_path, error = %e, "Invalid cursor path, stopping pagination");
                return None;
            }
        };

        match path.eval(body).first() {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_list_from_path() {
        let body = json!({"items": [{"id": 1}, {"id": 2}]});
        let records = ResponseExtractor::extract_records(&body, Some("items")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], 1);
    }

    #[test]
    fn test_extract_singleton_unwrapped() {
        let body = json!({"data": {"record": {"id": 7}}});
        let records = ResponseExtractor::extract_records(&body, Some("data.record")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], 7);
    }

    #[test]
    fn test_extract_whole_body_without_path() {
        let body = json!([{"id": 1}, {"id": 2}, {"id": 3}]);
        let records = ResponseExtractor::extract_records(&body, None).unwrap();
        assert_eq!(records.len(), 3);

        let scalar = json!({"id": 1});
        let records = ResponseExtractor::extract_records(&scalar, None).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_extract_multiple_matches() {
        let body = json!({"groups": [{"items": [1, 2]}, {"items": [3]}]});
        let records =
            ResponseExtractor::extract_records(&body, Some("groups[*].items")).unwrap();
        // Two matches (the two arrays) form the list without flattening
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_extract_dollar_root() {
        let body = json!({"items": [{"id": 1}]});
        let records = ResponseExtractor::extract_records(&body, Some("$.items")).unwrap();
        assert_eq!(records.len(), 1);

        let records = ResponseExtractor::extract_records(&body, Some("$")).unwrap();
        assert_eq!(records.len(), 1); // whole body, object normalized to one element
    }

    #[test]
    fn test_extract_indexed_path() {
        let body = json!({"pages": [{"items": [10, 20]}, {"items": [30]}]});
        let records =
            ResponseExtractor::extract_records(&body, Some("pages[1].items")).unwrap();
        assert_eq!(records, vec![json!(30)]);
    }

    #[test]
    fn test_extract_no_match_is_error() {
        let body = json!({"items": []});
        let err = ResponseExtractor::extract_records(&body, Some("records")).unwrap_err();
        assert!(matches!(err, ExtractError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_extract_empty_array_match_is_empty_list() {
        let body = json!({"items": []});
        let records = ResponseExtractor::extract_records(&body, Some("items")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_malformed_path() {
        assert!(ResponsePath::parse("items[").is_err());
        assert!(ResponsePath::parse("items[x]").is_err());
        assert!(ResponsePath::parse("a..b").is_err());
    }

    #[test]
    fn test_initial_params_page() {
        let pagination = PaginationConfig::of_kind(PaginationKind::Page);
        let params = ResponseExtractor::initial_params(&pagination);
        assert_eq!(params.get("page").map(String::as_str), Some("1"));
        assert_eq!(params.get("per_page").map(String::as_str), Some("50"));
    }

    #[test]
    fn test_initial_params_offset() {
        let pagination = PaginationConfig::of_kind(PaginationKind::Offset);
        let params = ResponseExtractor::initial_params(&pagination);
        assert_eq!(params.get("offset").map(String::as_str), Some("0"));
        assert_eq!(params.get("limit").map(String::as_str), Some("50"));
    }

    #[test]
    fn test_initial_params_cursor_empty() {
        let pagination = PaginationConfig::of_kind(PaginationKind::Cursor);
        assert!(ResponseExtractor::initial_params(&pagination).is_empty());
    }

    #[test]
    fn test_page_advance() {
        let pagination = PaginationConfig::of_kind(PaginationKind::Page);
        let body = json!({"items": [{"id": 1}]});
        let records = ResponseExtractor::extract_records(&body, Some("items")).unwrap();

        assert!(ResponseExtractor::has_next_page(&body, &records, &pagination));

        let mut current = BTreeMap::new();
        current.insert("page".to_string(), "1".to_string());
        let next = ResponseExtractor::next_page_params(&current, &body, &pagination);
        assert_eq!(next.get("page").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_page_empty_stops() {
        let pagination = PaginationConfig::of_kind(PaginationKind::Page);
        let body = json!({"items": []});
        assert!(!ResponseExtractor::has_next_page(&body, &[], &pagination));
    }

    #[test]
    fn test_offset_advance() {
        let pagination = PaginationConfig::of_kind(PaginationKind::Offset);
        let body = json!({"items": [1, 2, 3]});
        let records = ResponseExtractor::extract_records(&body, Some("items")).unwrap();
        assert!(ResponseExtractor::has_next_page(&body, &records, &pagination));

        let current = ResponseExtractor::initial_params(&pagination);
        let next = ResponseExtractor::next_page_params(&current, &body, &pagination);
        assert_eq!(next.get("offset").map(String::as_str), Some("50"));
        assert_eq!(next.get("limit").map(String::as_str), Some("50"));

        let next2 = ResponseExtractor::next_page_params(&next, &body, &pagination);
        assert_eq!(next2.get("offset").map(String::as_str), Some("100"));
    }

    #[test]
    fn test_cursor_advance() {
        let mut pagination = PaginationConfig::of_kind(PaginationKind::Cursor);
        pagination.cursor_path = Some("meta.next".to_string());

        let body = json!({"items": [1], "meta": {"next": "abc"}});
        assert!(ResponseExtractor::has_next_page(&body, &[json!(1)], &pagination));
        let next =
            ResponseExtractor::next_page_params(&BTreeMap::new(), &body, &pagination);
        assert_eq!(next.get("cursor").map(String::as_str), Some("abc"));

        let done = json!({"items": [1], "meta": {"next": null}});
        assert!(!ResponseExtractor::has_next_page(&done, &[json!(1)], &pagination));
    }

    #[test]
    fn test_cursor_numeric_value() {
        let mut pagination = PaginationConfig::of_kind(PaginationKind::Cursor);
        pagination.cursor_path = Some("next_id".to_string());
        pagination.cursor_param = Some("after".to_string());

        let body = json!({"next_id": 4711});
        let next =
            ResponseExtractor::next_page_params(&BTreeMap::new(), &body, &pagination);
        assert_eq!(next.get("after").map(String::as_str), Some("4711"));
    }

    #[test]
    fn test_cursor_bad_path_means_done() {
        let mut pagination = PaginationConfig::of_kind(PaginationKind::Cursor);
        pagination.cursor_path = Some("meta[".to_string());

        let body = json!({"meta": {"next": "abc"}});
        // Invalid cursor path is swallowed, not propagated
        assert!(!ResponseExtractor::has_next_page(&body, &[json!(1)], &pagination));
    }
}
