//! Corpus assembly: ordering, identifiers, and per-thread summaries.
//!
//! Threads are ordered by the date of their root message; inside a thread
//! messages are laid out depth-first with siblings by date. Corpus ids are
//! handed out in that same order, starting at 1, so unchanged input always
//! yields the same ids.

mod pages;

pub use pages::{IndexEntry, IndexPage};

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::CorpusConfig;
use crate::model::subject::{normalize_subject, slugify};
use crate::model::Message;
use crate::normalize::html_to_text;
use crate::threading::Forest;

/// A message with its place in the corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchivedMessage {
    /// Corpus id (1-based, traversal order).
    pub id: u64,
    pub thread_id: u64,
    /// Corpus id of the parent message, `None` for thread roots.
    pub parent_id: Option<u64>,
    /// Distance from the thread root.
    pub depth: usize,
    #[serde(flatten)]
    pub message: Message,
}

/// What a thread listing needs without walking the messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadSummary {
    /// Thread id (1-based, thread order).
    pub id: u64,
    /// Corpus id of the root message.
    pub root_id: u64,
    /// Normalized subject of the root message.
    pub subject: String,
    pub slug: String,
    /// Corpus ids of all members in traversal order.
    pub message_ids: Vec<u64>,
    pub message_count: usize,
    /// Earliest known date in the thread.
    pub started_at: Option<DateTime<Utc>>,
    /// Latest known date in the thread.
    pub last_activity: Option<DateTime<Utc>>,
    /// Distinct sender names in order of first appearance.
    pub participants: Vec<String>,
    /// Start of the root message's text.
    pub snippet: String,
}

/// The finalized, ordered collection. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Corpus {
    pub group_name: String,
    /// All messages, `messages[i].id == i + 1`.
    pub messages: Vec<ArchivedMessage>,
    /// All threads, `threads[i].id == i + 1`.
    pub threads: Vec<ThreadSummary>,
}

impl Corpus {
    /// Order `messages` along `forest` and assign ids.
    ///
    /// `forest` must have been built from the same `messages` slice.
    pub fn assemble(
        messages: Vec<Message>,
        forest: &Forest,
        config: &CorpusConfig,
        group_name: &str,
    ) -> Self {
        let children = sorted_children(&messages, forest);

        let mut roots: Vec<usize> = forest.threads.iter().map(|t| t.root).collect();
        roots.sort_by_key(|&r| messages[r].date_key());

        // Traversal order over positions
        let mut order: Vec<(usize, u64, usize)> = Vec::with_capacity(messages.len());
        let mut thread_spans = Vec::with_capacity(roots.len());
        for (thread_idx, &root) in roots.iter().enumerate() {
            let start = order.len();
            let mut stack = vec![(root, 0usize)];
            while let Some((node, depth)) = stack.pop() {
                order.push((node, thread_idx as u64 + 1, depth));
                for &child in children[node].iter().rev() {
                    stack.push((child, depth + 1));
                }
            }
            thread_spans.push(start..order.len());
        }

        let mut id_of = vec![0u64; messages.len()];
        for (pos, &(node, _, _)) in order.iter().enumerate() {
            id_of[node] = pos as u64 + 1;
        }

        let mut slots: Vec<Option<Message>> = messages.into_iter().map(Some).collect();
        let archived: Vec<ArchivedMessage> = order
            .iter()
            .filter_map(|&(node, thread_id, depth)| {
                slots[node].take().map(|message| ArchivedMessage {
                    id: id_of[node],
                    thread_id,
                    parent_id: forest.parent[node].map(|p| id_of[p]),
                    depth,
                    message,
                })
            })
            .collect();

        let threads: Vec<ThreadSummary> = thread_spans
            .into_iter()
            .enumerate()
            .map(|(idx, span)| summarize(idx as u64 + 1, &archived[span], config.snippet_length))
            .collect();

        info!(
            messages = archived.len(),
            threads = threads.len(),
            "Assembled corpus"
        );

        Self {
            group_name: group_name.to_string(),
            messages: archived,
            threads,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Message by corpus id.
    pub fn message(&self, id: u64) -> Option<&ArchivedMessage> {
        let idx = usize::try_from(id).ok()?.checked_sub(1)?;
        self.messages.get(idx)
    }

    /// Thread by thread id.
    pub fn thread(&self, id: u64) -> Option<&ThreadSummary> {
        let idx = usize::try_from(id).ok()?.checked_sub(1)?;
        self.threads.get(idx)
    }

    /// Members of a thread in traversal order.
    pub fn thread_messages<'a>(
        &'a self,
        thread: &'a ThreadSummary,
    ) -> impl Iterator<Item = &'a ArchivedMessage> + 'a {
        thread.message_ids.iter().filter_map(|&id| self.message(id))
    }

    /// Number of placeholder messages.
    pub fn placeholder_count(&self) -> usize {
        self.messages.iter().filter(|m| m.message.placeholder).count()
    }
}

/// Children of every position, ordered by date.
fn sorted_children(messages: &[Message], forest: &Forest) -> Vec<Vec<usize>> {
    let mut children = forest.children();
    for list in &mut children {
        list.sort_by_key(|&c| messages[c].date_key());
    }
    children
}

fn summarize(id: u64, members: &[ArchivedMessage], snippet_length: usize) -> ThreadSummary {
    let root = &members[0];
    let subject = normalize_subject(&root.message.subject);
    let slug = slugify(&subject);

    let mut seen = HashSet::new();
    let participants = members
        .iter()
        .map(|m| m.message.sender.display().to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect();

    let dates = members.iter().filter_map(|m| m.message.sent_at);

    ThreadSummary {
        id,
        root_id: root.id,
        subject,
        slug,
        message_ids: members.iter().map(|m| m.id).collect(),
        message_count: members.len(),
        started_at: dates.clone().min(),
        last_activity: dates.max(),
        participants,
        snippet: snippet(&root.message.body_html, snippet_length),
    }
}

/// Visible text of a body, cut at a word boundary with `...` appended.
pub fn snippet(body_html: &str, max_chars: usize) -> String {
    let text = html_to_text(body_html)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if text.chars().count() <= max_chars {
        return text;
    }
    let cut: String = text.chars().take(max_chars).collect();
    let head = match cut.rfind(' ') {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}...", head.trim_end())
}
