//! Paging of the thread index.

use serde::{Deserialize, Serialize};

use super::Corpus;

/// One row of an index page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexEntry {
    pub thread_id: u64,
    /// `"January 2024"` from the last activity, or `"Unknown date"`.
    pub month: String,
}

/// One page of the thread index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexPage {
    /// 1-based page number.
    pub number: usize,
    pub total_pages: usize,
    pub entries: Vec<IndexEntry>,
}

impl Corpus {
    /// Page the threads, most recently active first.
    ///
    /// Threads without any known date come last; ties keep thread order.
    /// An empty corpus still has one (empty) page. A `per_page` of zero is
    /// treated as one.
    pub fn index_pages(&self, per_page: usize) -> Vec<IndexPage> {
        let per_page = per_page.max(1);

        let mut threads: Vec<_> = self.threads.iter().collect();
        threads.sort_by(|a, b| {
            // Reversed date order, `None` after every date
            match (a.last_activity, b.last_activity) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
            .then(a.id.cmp(&b.id))
        });

        let entries: Vec<IndexEntry> = threads
            .into_iter()
            .map(|t| IndexEntry {
                thread_id: t.id,
                month: t
                    .last_activity
                    .map(|d| d.format("%B %Y").to_string())
                    .unwrap_or_else(|| "Unknown date".to_string()),
            })
            .collect();

        if entries.is_empty() {
            return vec![IndexPage {
                number: 1,
                total_pages: 1,
                entries,
            }];
        }

        let total_pages = entries.len().div_ceil(per_page);
        entries
            .chunks(per_page)
            .enumerate()
            .map(|(idx, chunk)| IndexPage {
                number: idx + 1,
                total_pages,
                entries: chunk.to_vec(),
            })
            .collect()
    }
}
