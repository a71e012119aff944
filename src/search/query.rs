//! Search query parser.
//!
//! Parses user-typed query strings into a structured [`SearchQuery`].
//!
//! # Supported syntax
//!
//! **Simple search**: `text` searches subject, sender and body tokens.
//!
//! **Field-specific**:
//! - `from:alice`
//! - `subject:meetup`
//! - `body:"trail head"`
//!
//! **Date filters**:
//! - `date:2024-01-01` / `date:2024-01` / `date:2024`
//! - `date:2024-01-01..2024-06-30`
//! - `before:2024-06-01` / `after:2024-01-01`
//!
//! **Operators**:
//! - `term1 term2`: implicit AND
//! - `term1 OR term2`: explicit OR
//! - `-term`: NOT (exclude)
//! - `"exact phrase"`: every word must be a whole token

use chrono::NaiveDate;

/// Which field to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    /// Subject, sender and body.
    All,
    From,
    Subject,
    Body,
}

/// How to match text against tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOperator {
    /// Each word is a substring of some token.
    Contains(String),
    /// Each word equals some token.
    Exact(String),
}

/// Date range filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateFilter {
    /// Single day.
    Exact(NaiveDate),
    /// Inclusive range.
    Range(NaiveDate, NaiveDate),
    /// Before a date (exclusive).
    Before(NaiveDate),
    /// After a date (exclusive).
    After(NaiveDate),
    /// All days in a month.
    Month(i32, u32),
    /// All days in a year.
    Year(i32),
}

/// A single search term.
#[derive(Debug, Clone)]
pub struct SearchTerm {
    pub field: SearchField,
    pub operator: SearchOperator,
    pub negated: bool,
}

/// A fully parsed search query.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Text-based search terms (AND by default).
    pub terms: Vec<SearchTerm>,
    /// Optional date filter.
    pub date_filter: Option<DateFilter>,
    /// Whether this is an OR query (any term matches) vs AND (all must match).
    pub is_or: bool,
}

/// Parse a query string into a structured [`SearchQuery`].
///
/// Never fails. Unrecognized syntax is treated as a plain text search.
pub fn parse_query(input: &str) -> SearchQuery {
    let mut terms = Vec::new();
    let mut date_filter = None;

    let tokens = split_query(input.trim());
    let is_or = tokens.iter().any(|t| t == "OR");

    for token in &tokens {
        if token == "OR" {
            continue;
        }

        let (negated, token) = match token.strip_prefix('-') {
            Some(stripped) if !stripped.is_empty() => (true, stripped),
            _ => (false, token.as_str()),
        };

        let field_term = |field: SearchField, value: &str| SearchTerm {
            field,
            operator: make_operator(value),
            negated,
        };

        if let Some(value) = token.strip_prefix("from:") {
            terms.push(field_term(SearchField::From, value));
        } else if let Some(value) = token.strip_prefix("subject:") {
            terms.push(field_term(SearchField::Subject, value));
        } else if let Some(value) = token.strip_prefix("body:") {
            terms.push(field_term(SearchField::Body, value));
        } else if let Some(value) = token.strip_prefix("date:") {
            date_filter = parse_date_filter(value);
        } else if let Some(value) = token.strip_prefix("before:") {
            if let Some(d) = parse_naive_date(value) {
                date_filter = Some(DateFilter::Before(d));
            }
        } else if let Some(value) = token.strip_prefix("after:") {
            if let Some(d) = parse_naive_date(value) {
                date_filter = Some(DateFilter::After(d));
            }
        } else {
            terms.push(field_term(SearchField::All, token));
        }
    }

    SearchQuery {
        terms,
        date_filter,
        is_or,
    }
}

/// Build an operator from a value string (quoted → Exact, otherwise → Contains).
fn make_operator(value: &str) -> SearchOperator {
    match value.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(unquoted) => SearchOperator::Exact(unquoted.to_lowercase()),
        None => SearchOperator::Contains(value.trim_matches('"').to_lowercase()),
    }
}

/// Split input on whitespace, respecting quoted strings.
fn split_query(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            current.push(ch);
        } else if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Parse a date filter value like `2024-01-01`, `2024-01`, `2024`,
/// or a range `2024-01-01..2024-06-30` (partial dates accepted in ranges).
fn parse_date_filter(value: &str) -> Option<DateFilter> {
    if let Some((start, end)) = value.split_once("..") {
        let s = parse_flexible_date_start(start)?;
        let e = parse_flexible_date_end(end)?;
        return Some(DateFilter::Range(s, e));
    }

    if let Some(d) = parse_naive_date(value) {
        return Some(DateFilter::Exact(d));
    }

    let parts: Vec<&str> = value.split('-').collect();
    match parts.as_slice() {
        [year, month] => {
            let year: i32 = year.parse().ok()?;
            let month: u32 = month.parse().ok()?;
            (1..=12)
                .contains(&month)
                .then_some(DateFilter::Month(year, month))
        }
        [year] => {
            let year: i32 = year.parse().ok()?;
            (1970..=2100).contains(&year).then_some(DateFilter::Year(year))
        }
        _ => None,
    }
}

/// Parse a date string like `2024-01-04`.
fn parse_naive_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// First day of a `YYYY-MM-DD`, `YYYY-MM` or `YYYY` period.
fn parse_flexible_date_start(s: &str) -> Option<NaiveDate> {
    if let Some(d) = parse_naive_date(s) {
        return Some(d);
    }
    match s.split('-').collect::<Vec<_>>().as_slice() {
        [year, month] => NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1),
        [year] => NaiveDate::from_ymd_opt(year.parse().ok()?, 1, 1),
        _ => None,
    }
}

/// Last day of a `YYYY-MM-DD`, `YYYY-MM` or `YYYY` period.
fn parse_flexible_date_end(s: &str) -> Option<NaiveDate> {
    if let Some(d) = parse_naive_date(s) {
        return Some(d);
    }
    match s.split('-').collect::<Vec<_>>().as_slice() {
        [year, month] => {
            let year: i32 = year.parse().ok()?;
            let month: u32 = month.parse().ok()?;
            // Last day of month: go to first of next month, subtract 1 day
            let (ny, nm) = if month == 12 {
                (year + 1, 1)
            } else {
                (year, month + 1)
            };
            NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()
        }
        [year] => NaiveDate::from_ymd_opt(year.parse().ok()?, 12, 31),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_query() {
        let q = parse_query("hello");
        assert_eq!(q.terms.len(), 1);
        assert_eq!(q.terms[0].field, SearchField::All);
        assert_eq!(q.terms[0].operator, SearchOperator::Contains("hello".into()));
        assert!(!q.terms[0].negated);
    }

    #[test]
    fn test_parse_field_query() {
        let q = parse_query("from:Alice subject:hello body:trail");
        assert_eq!(q.terms.len(), 3);
        assert_eq!(q.terms[0].field, SearchField::From);
        assert_eq!(q.terms[0].operator, SearchOperator::Contains("alice".into()));
        assert_eq!(q.terms[1].field, SearchField::Subject);
        assert_eq!(q.terms[2].field, SearchField::Body);
    }

    #[test]
    fn test_parse_negation() {
        let q = parse_query("-subject:spam");
        assert_eq!(q.terms.len(), 1);
        assert!(q.terms[0].negated);
        assert_eq!(q.terms[0].field, SearchField::Subject);
    }

    #[test]
    fn test_lone_dash_is_text() {
        let q = parse_query("-");
        assert_eq!(q.terms.len(), 1);
        assert!(!q.terms[0].negated);
    }

    #[test]
    fn test_unknown_field_is_plain_text() {
        let q = parse_query("has:attachment");
        assert_eq!(q.terms.len(), 1);
        assert_eq!(q.terms[0].field, SearchField::All);
    }

    #[test]
    fn test_parse_date_exact() {
        let q = parse_query("date:2024-01-15");
        if let Some(DateFilter::Exact(d)) = &q.date_filter {
            assert_eq!(d.to_string(), "2024-01-15");
        } else {
            panic!("expected Exact date filter");
        }
    }

    #[test]
    fn test_parse_date_range() {
        let q = parse_query("date:2024-01..2024-02");
        if let Some(DateFilter::Range(s, e)) = &q.date_filter {
            assert_eq!(s.to_string(), "2024-01-01");
            assert_eq!(e.to_string(), "2024-02-29");
        } else {
            panic!("expected Range date filter");
        }
    }

    #[test]
    fn test_parse_date_month_and_year() {
        assert_eq!(
            parse_query("date:2024-01").date_filter,
            Some(DateFilter::Month(2024, 1))
        );
        assert_eq!(
            parse_query("date:2024").date_filter,
            Some(DateFilter::Year(2024))
        );
        assert_eq!(parse_query("date:2024-13").date_filter, None);
    }

    #[test]
    fn test_parse_before_after() {
        let q = parse_query("before:2024-06-01");
        assert!(matches!(q.date_filter, Some(DateFilter::Before(_))));

        let q = parse_query("after:2024-01-01");
        assert!(matches!(q.date_filter, Some(DateFilter::After(_))));
    }

    #[test]
    fn test_parse_or_query() {
        let q = parse_query("from:alice OR from:bob");
        assert!(q.is_or);
        assert_eq!(q.terms.len(), 2);
    }

    #[test]
    fn test_parse_quoted_phrase() {
        let q = parse_query("subject:\"Hello World\"");
        assert_eq!(q.terms.len(), 1);
        assert_eq!(
            q.terms[0].operator,
            SearchOperator::Exact("hello world".into())
        );
    }

    #[test]
    fn test_parse_empty_query() {
        let q = parse_query("   ");
        assert!(q.terms.is_empty());
        assert!(q.date_filter.is_none());
    }
}
