//! Search index: per-message token records, per-thread entries, and a small
//! query language evaluated over them.
//!
//! The index is derived from the [`Corpus`] alone. Building it twice from
//! the same corpus gives byte-identical JSON, which [`SearchIndex::digest`]
//! makes cheap to check.

pub mod matching;
pub mod query;
pub mod tokenize;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::SearchConfig;
use crate::corpus::{ArchivedMessage, Corpus, ThreadSummary};
use crate::model::subject::{normalize_subject, DEFAULT_SUBJECT};
use crate::normalize::{html_to_text, NO_CONTENT_HTML};

use self::query::parse_query;
use self::tokenize::tokenize;

/// Tokenized searchable fields of one message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchEntry {
    /// Corpus id of the message.
    pub id: u64,
    pub subject_tokens: Vec<String>,
    pub sender_tokens: Vec<String>,
    pub body_tokens: Vec<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Listing data of one thread for search result pages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadSearchEntry {
    pub id: u64,
    pub title: String,
    pub slug: String,
    pub participants: Vec<String>,
    pub message_count: usize,
    pub start_date: Option<DateTime<Utc>>,
    pub last_date: Option<DateTime<Utc>>,
}

/// Everything a client-side search needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchIndex {
    /// One entry per message, in corpus id order.
    pub messages: Vec<SearchEntry>,
    /// One entry per thread, in thread id order.
    pub threads: Vec<ThreadSearchEntry>,
}

impl SearchIndex {
    /// Build the index from a finalized corpus.
    pub fn build(corpus: &Corpus, config: &SearchConfig) -> Self {
        let messages: Vec<SearchEntry> = corpus
            .messages
            .iter()
            .map(|m| message_entry(m, config))
            .collect();
        let threads: Vec<ThreadSearchEntry> = corpus.threads.iter().map(thread_entry).collect();

        info!(
            entries = messages.len(),
            threads = threads.len(),
            "Built search index"
        );
        Self { messages, threads }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Compact JSON encoding. Field and entry order are fixed, so equal
    /// indexes always serialize to equal bytes.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Hex SHA-256 of [`Self::to_json`].
    pub fn digest(&self) -> serde_json::Result<String> {
        let json = self.to_json()?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Corpus ids of the messages matching a query string, ascending.
    pub fn search(&self, query: &str) -> Vec<u64> {
        matching::search_entries(&self.messages, &parse_query(query))
    }
}

fn message_entry(archived: &ArchivedMessage, config: &SearchConfig) -> SearchEntry {
    let msg = &archived.message;
    let min = config.min_token_length;

    let subject = normalize_subject(&msg.subject);
    let subject_tokens = if subject == DEFAULT_SUBJECT {
        Vec::new()
    } else {
        tokenize(&subject, min, 0)
    };

    let sender = format!("{} {}", msg.sender.display_name, msg.sender.address);

    // The empty-body marker is presentation, not message text
    let body_tokens = if msg.body_html == NO_CONTENT_HTML {
        Vec::new()
    } else {
        tokenize(&html_to_text(&msg.body_html), min, config.max_body_tokens)
    };

    SearchEntry {
        id: archived.id,
        subject_tokens,
        sender_tokens: tokenize(&sender, min, 0),
        body_tokens,
        date: msg.sent_at,
    }
}

fn thread_entry(thread: &ThreadSummary) -> ThreadSearchEntry {
    ThreadSearchEntry {
        id: thread.id,
        title: thread.subject.clone(),
        slug: thread.slug.clone(),
        participants: thread.participants.clone(),
        message_count: thread.message_count,
        start_date: thread.started_at,
        last_date: thread.last_activity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorpusConfig, ThreadingConfig};
    use crate::model::{Message, Sender};
    use crate::threading::build_forest;
    use chrono::TimeZone;

    fn corpus() -> Corpus {
        let mut a = Message::placeholder(0);
        a.placeholder = false;
        a.message_id = Some("a@example.com".into());
        a.subject = "Re: [hikers] Trail Report".into();
        a.sender = Sender::parse("Alice Walker <alice@example.com>");
        a.sent_at = Some(Utc.with_ymd_and_hms(2024, 1, 4, 10, 0, 0).unwrap());
        a.body_html =
            "<div class=\"plaintext\">Muddy switchbacks &amp; a fallen tree<br>\n</div>".into();

        let mut b = Message::placeholder(1);
        b.placeholder = false;
        b.in_reply_to = vec!["a@example.com".into()];
        b.sender = Sender::parse("bob@example.org");

        let messages = vec![a, b];
        let forest = build_forest(&messages, &ThreadingConfig::default());
        Corpus::assemble(messages, &forest, &CorpusConfig::default(), "Hikers")
    }

    #[test]
    fn test_entries_per_message() {
        let index = SearchIndex::build(&corpus(), &SearchConfig::default());
        assert_eq!(index.len(), 2);
        let a = &index.messages[0];
        assert_eq!(a.id, 1);
        assert_eq!(a.subject_tokens, vec!["trail", "report"]);
        assert_eq!(a.sender_tokens, vec!["alice", "walker", "example", "com"]);
        assert_eq!(a.body_tokens, vec!["muddy", "switchbacks", "fallen", "tree"]);
        assert!(a.date.is_some());

        let b = &index.messages[1];
        assert!(b.subject_tokens.is_empty());
        assert!(b.body_tokens.is_empty());
        assert_eq!(b.date, None);

        assert_eq!(index.threads.len(), 1);
        assert_eq!(index.threads[0].title, "Trail Report");
        assert_eq!(index.threads[0].message_count, 2);
    }

    #[test]
    fn test_body_token_cap() {
        let config = SearchConfig {
            max_body_tokens: 2,
            ..Default::default()
        };
        let index = SearchIndex::build(&corpus(), &config);
        assert_eq!(index.messages[0].body_tokens, vec!["muddy", "switchbacks"]);
    }

    #[test]
    fn test_rebuild_is_byte_identical() {
        let c = corpus();
        let first = SearchIndex::build(&c, &SearchConfig::default());
        let second = SearchIndex::build(&c, &SearchConfig::default());
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
        let digest = first.digest().unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, second.digest().unwrap());
    }

    #[test]
    fn test_search() {
        let index = SearchIndex::build(&corpus(), &SearchConfig::default());
        assert_eq!(index.search("switch"), vec![1]);
        assert_eq!(index.search("from:bob"), vec![2]);
        assert_eq!(index.search("example"), vec![1, 2]);
        assert!(index.search("glacier").is_empty());
    }

    #[test]
    fn test_empty_body_has_no_body_tokens() {
        let index = SearchIndex::build(&corpus(), &SearchConfig::default());
        assert!(index.search("content").is_empty());
    }
}
