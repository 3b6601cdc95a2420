//! Search-term parsing and membership.
//!
//! Terms arrive as a JSON array literal held in a string parameter.  Matching
//! is exact and case-sensitive: no trimming, no Unicode normalisation.

use std::collections::HashSet;

use thiserror::Error;

/// Rejections of the search-term parameter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The parameter is not syntactically valid JSON.
    #[error("Invalid JSON array for search text: {0}")]
    InvalidJson(String),
    /// Valid JSON, but not an array, or an element is not a string.
    #[error("The search text array must be a valid JSON array of strings.")]
    NotStringArray,
}

/// The set of strings a text run must equal to be reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchTerms(HashSet<String>);

impl SearchTerms {
    /// Parse the external representation: a JSON array whose every element
    /// is a string.  Duplicates collapse; an empty array is valid.
    pub fn parse(json: &str) -> Result<Self, ValidationError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ValidationError::InvalidJson(e.to_string()))?;

        let serde_json::Value::Array(items) = value else {
            return Err(ValidationError::NotStringArray);
        };

        items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => Ok(s),
                _ => Err(ValidationError::NotStringArray),
            })
            .collect::<Result<HashSet<_>, _>>()
            .map(Self)
    }

    pub fn contains(&self, text: &str) -> bool {
        self.0.contains(text)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for SearchTerms {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_array() {
        let terms = SearchTerms::parse(r#"["Invoice", "Total", "Invoice"]"#).unwrap();
        assert_eq!(terms.len(), 2);
        assert!(terms.contains("Invoice"));
        assert!(terms.contains("Total"));
    }

    #[test]
    fn test_parse_empty_array() {
        let terms = SearchTerms::parse("[]").unwrap();
        assert!(terms.is_empty());
    }

    #[test]
    fn test_parse_keeps_whitespace_and_case() {
        let terms = SearchTerms::parse(r#"[" Hello", ""]"#).unwrap();
        assert!(terms.contains(" Hello"));
        assert!(terms.contains(""));
        assert!(!terms.contains("Hello"));
        assert!(!terms.contains(" hello"));
    }

    #[test]
    fn test_parse_not_json() {
        let err = SearchTerms::parse("not-json").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidJson(_)));
        assert!(err
            .to_string()
            .starts_with("Invalid JSON array for search text: "));
    }

    #[test]
    fn test_parse_scalar_string() {
        assert_eq!(
            SearchTerms::parse(r#""abc""#).unwrap_err(),
            ValidationError::NotStringArray
        );
    }

    #[test]
    fn test_parse_number_elements() {
        let err = SearchTerms::parse("[1,2]").unwrap_err();
        assert_eq!(err, ValidationError::NotStringArray);
        assert_eq!(
            err.to_string(),
            "The search text array must be a valid JSON array of strings."
        );
    }

    #[test]
    fn test_parse_mixed_elements() {
        assert_eq!(
            SearchTerms::parse(r#"["a", null]"#).unwrap_err(),
            ValidationError::NotStringArray
        );
    }

    #[test]
    fn test_parse_object() {
        assert_eq!(
            SearchTerms::parse(r#"{"a": "b"}"#).unwrap_err(),
            ValidationError::NotStringArray
        );
    }

    #[test]
    fn test_from_iterator() {
        let terms: SearchTerms = ["a", "b"].into_iter().collect();
        assert!(terms.contains("a"));
        assert_eq!(terms.iter().count(), 2);
    }
}
