//! Evaluating a parsed query against search entries.
//!
//! Complexity: O(n · t) where n = number of entries and t = tokens per entry.

use chrono::Datelike;

use super::query::{DateFilter, SearchField, SearchOperator, SearchQuery, SearchTerm};
use super::tokenize::query_tokens;
use super::SearchEntry;

/// Ids of the entries matching `query`, in entry order.
pub fn search_entries(entries: &[SearchEntry], query: &SearchQuery) -> Vec<u64> {
    entries
        .iter()
        .filter(|entry| entry_matches(entry, query))
        .map(|entry| entry.id)
        .collect()
}

/// Check whether a single entry matches the query.
pub fn entry_matches(entry: &SearchEntry, query: &SearchQuery) -> bool {
    // Date filter first (cheapest to check)
    if let Some(ref df) = query.date_filter {
        if !matches_date(entry, df) {
            return false;
        }
    }

    if query.terms.is_empty() {
        return true;
    }

    if query.is_or {
        query.terms.iter().any(|term| term_matches_entry(entry, term))
    } else {
        query.terms.iter().all(|term| term_matches_entry(entry, term))
    }
}

fn term_matches_entry(entry: &SearchEntry, term: &SearchTerm) -> bool {
    let op = &term.operator;
    let raw_match = match term.field {
        SearchField::All => matches_tokens(
            &[
                &entry.subject_tokens,
                &entry.sender_tokens,
                &entry.body_tokens,
            ],
            op,
        ),
        SearchField::From => matches_tokens(&[&entry.sender_tokens], op),
        SearchField::Subject => matches_tokens(&[&entry.subject_tokens], op),
        SearchField::Body => matches_tokens(&[&entry.body_tokens], op),
    };

    raw_match != term.negated
}

/// Every word of the needle must match some token of the given fields.
fn matches_tokens(fields: &[&Vec<String>], op: &SearchOperator) -> bool {
    let (needle, exact) = match op {
        SearchOperator::Contains(needle) => (needle, false),
        SearchOperator::Exact(phrase) => (phrase, true),
    };
    let words = query_tokens(needle);
    words.iter().all(|word| {
        fields.iter().flat_map(|f| f.iter()).any(|token| {
            if exact {
                token == word
            } else {
                token.contains(word.as_str())
            }
        })
    })
}

/// Entries without a date never pass a date filter.
fn matches_date(entry: &SearchEntry, filter: &DateFilter) -> bool {
    let Some(date) = entry.date.map(|d| d.date_naive()) else {
        return false;
    };
    match filter {
        DateFilter::Exact(d) => date == *d,
        DateFilter::Range(start, end) => date >= *start && date <= *end,
        DateFilter::Before(d) => date < *d,
        DateFilter::After(d) => date > *d,
        DateFilter::Month(year, month) => date.year() == *year && date.month() == *month,
        DateFilter::Year(year) => date.year() == *year,
    }
}
