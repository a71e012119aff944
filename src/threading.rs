//! Thread reconstruction from reply headers.
//!
//! `Message-ID` values are untrusted labels. They are resolved once through
//! a label → index table, and every edge lives in a `parent` side table
//! indexed by message position, so cycle handling is plain data work.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use crate::config::{LinkPolicy, ThreadingConfig};
use crate::error::{Degradation, Warning};
use crate::model::subject::{has_reply_prefix, normalize_subject};
use crate::model::Message;

/// One conversation: a rooted tree over message positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    /// Position of the root message.
    pub root: usize,
    /// Every member position mapped to its parent (`None` for the root).
    pub nodes: BTreeMap<usize, Option<usize>>,
}

/// All threads of a message set.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    /// Threads in order of their root position.
    pub threads: Vec<Thread>,
    /// Parent of each message position.
    pub parent: Vec<Option<usize>>,
    /// One `ThreadCycleBroken` per cycle found.
    pub warnings: Vec<Warning>,
}

impl Forest {
    /// Children of every position, in position order.
    pub fn children(&self) -> Vec<Vec<usize>> {
        let mut children = vec![Vec::new(); self.parent.len()];
        for (child, parent) in self.parent.iter().enumerate() {
            if let Some(p) = parent {
                children[*p].push(child);
            }
        }
        children
    }
}

/// Link `messages` into a forest.
///
/// Positions in the result are positions in `messages`. Runs in linear time
/// apart from the optional subject merge, which sorts the roots once.
pub fn build_forest(messages: &[Message], config: &ThreadingConfig) -> Forest {
    let labels = label_table(messages);

    let mut parent: Vec<Option<usize>> = messages
        .iter()
        .enumerate()
        .map(|(idx, msg)| resolve_parent(idx, msg, &labels, config.link_policy))
        .collect();

    let warnings = break_cycles(messages, &mut parent);

    if config.merge_by_subject {
        merge_by_subject(messages, &mut parent);
    }

    let threads = collect_threads(&parent);
    info!(
        messages = messages.len(),
        threads = threads.len(),
        cycles = warnings.len(),
        "Built thread forest"
    );

    Forest {
        threads,
        parent,
        warnings,
    }
}

/// Label → position. The earliest record carrying a duplicated label owns it.
fn label_table(messages: &[Message]) -> HashMap<&str, usize> {
    let mut labels = HashMap::with_capacity(messages.len());
    for (idx, msg) in messages.iter().enumerate() {
        if let Some(id) = msg.message_id.as_deref() {
            let owner = *labels.entry(id).or_insert(idx);
            if owner != idx {
                debug!(
                    record = msg.seq,
                    owner = messages[owner].seq,
                    message_id = id,
                    "Duplicate Message-ID"
                );
            }
        }
    }
    labels
}

/// First candidate label that names a different message.
fn resolve_parent(
    idx: usize,
    msg: &Message,
    labels: &HashMap<&str, usize>,
    policy: LinkPolicy,
) -> Option<usize> {
    let in_reply_to = msg.in_reply_to.first().into_iter();
    let references = msg.references.iter().rev();

    let resolve = |label: &String| labels.get(label.as_str()).copied().filter(|&p| p != idx);

    match policy {
        LinkPolicy::InReplyToFirst => in_reply_to.chain(references).find_map(resolve),
        LinkPolicy::ReferencesFirst => references.chain(in_reply_to).find_map(resolve),
    }
}

/// Walk every parent chain with path tracking and cut each cycle found.
///
/// The cut falls on the cycle member with the latest date (unknown dates
/// count as latest, ties go to the later record), which becomes a root.
fn break_cycles(messages: &[Message], parent: &mut [Option<usize>]) -> Vec<Warning> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Unvisited,
        OnPath,
        Done,
    }

    let mut state = vec![State::Unvisited; parent.len()];
    let mut warnings = Vec::new();
    let mut path: Vec<usize> = Vec::new();

    for start in 0..parent.len() {
        if state[start] != State::Unvisited {
            continue;
        }
        path.clear();
        let mut node = Some(start);
        while let Some(current) = node {
            match state[current] {
                State::Done => break,
                State::OnPath => {
                    let cycle_start = path.iter().position(|&n| n == current).unwrap_or(0);
                    let cycle = &path[cycle_start..];
                    let orphan = cycle
                        .iter()
                        .copied()
                        .max_by_key(|&n| messages[n].date_key())
                        .unwrap_or(current);
                    parent[orphan] = None;
                    debug!(
                        record = messages[orphan].seq,
                        cycle_len = cycle.len(),
                        "Broke reply cycle"
                    );
                    warnings.push(Warning {
                        record: messages[orphan].seq,
                        degradation: Degradation::ThreadCycleBroken {
                            orphaned: messages[orphan].seq,
                            cycle_len: cycle.len(),
                        },
                    });
                    break;
                }
                State::Unvisited => {
                    state[current] = State::OnPath;
                    path.push(current);
                    node = parent[current];
                }
            }
        }
        for &n in &path {
            state[n] = State::Done;
        }
    }

    warnings
}

/// Attach reply-prefixed roots to the earliest earlier root with the same
/// normalized subject. Roots only ever gain an earlier parent, so no cycle
/// can form.
fn merge_by_subject(messages: &[Message], parent: &mut [Option<usize>]) {
    let mut roots: Vec<usize> = (0..parent.len()).filter(|&i| parent[i].is_none()).collect();
    roots.sort_by_key(|&i| messages[i].date_key());

    let mut first_by_subject: HashMap<String, usize> = HashMap::new();
    for root in roots {
        let subject = normalize_subject(&messages[root].subject);
        match first_by_subject.get(&subject) {
            Some(&earlier) if has_reply_prefix(&messages[root].subject) => {
                debug!(
                    record = messages[root].seq,
                    parent = messages[earlier].seq,
                    "Merged thread by subject"
                );
                parent[root] = Some(earlier);
            }
            Some(_) => {}
            None => {
                first_by_subject.insert(subject, root);
            }
        }
    }
}

/// Group positions by their root.
fn collect_threads(parent: &[Option<usize>]) -> Vec<Thread> {
    let mut root_of: Vec<Option<usize>> = vec![None; parent.len()];
    let mut by_root: BTreeMap<usize, BTreeMap<usize, Option<usize>>> = BTreeMap::new();

    for start in 0..parent.len() {
        // Climb until a node with a known root, then fill in the path
        let mut path = Vec::new();
        let mut node = start;
        let root = loop {
            if let Some(root) = root_of[node] {
                break root;
            }
            path.push(node);
            match parent[node] {
                Some(p) => node = p,
                None => break node,
            }
        };
        for n in path {
            root_of[n] = Some(root);
        }
        by_root
            .entry(root)
            .or_default()
            .insert(start, parent[start]);
    }

    by_root
        .into_iter()
        .map(|(root, nodes)| Thread { root, nodes })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(seq: u64, id: &str, in_reply_to: &[&str], day: Option<u32>) -> Message {
        let mut m = Message::placeholder(seq);
        m.placeholder = false;
        m.message_id = (!id.is_empty()).then(|| id.to_string());
        m.in_reply_to = in_reply_to.iter().map(|s| s.to_string()).collect();
        m.sent_at = day.map(|d| Utc.with_ymd_and_hms(2024, 1, d, 10, 0, 0).unwrap());
        m
    }

    fn build(messages: &[Message]) -> Forest {
        build_forest(messages, &ThreadingConfig::default())
    }

    fn assert_partition(forest: &Forest, n: usize) {
        let mut seen = vec![0; n];
        for t in &forest.threads {
            for &node in t.nodes.keys() {
                seen[node] += 1;
            }
            assert_eq!(t.nodes[&t.root], None);
        }
        assert!(seen.iter().all(|&c| c == 1), "membership: {seen:?}");
    }

    #[test]
    fn test_reply_links_to_parent() {
        let messages = vec![msg(0, "a", &[], Some(1)), msg(1, "b", &["a"], Some(2))];
        let forest = build(&messages);
        assert_eq!(forest.threads.len(), 1);
        assert_eq!(forest.threads[0].root, 0);
        assert_eq!(forest.parent, vec![None, Some(0)]);
        assert!(forest.warnings.is_empty());
    }

    #[test]
    fn test_missing_parent_becomes_root() {
        let messages = vec![msg(0, "a", &[], Some(1)), msg(1, "b", &["ghost"], Some(2))];
        let forest = build(&messages);
        assert_eq!(forest.threads.len(), 2);
        assert_eq!(forest.parent, vec![None, None]);
    }

    #[test]
    fn test_references_fallback_newest_first() {
        let mut reply = msg(2, "c", &["ghost"], Some(3));
        reply.references = vec!["a".into(), "b".into(), "ghost2".into()];
        let messages = vec![msg(0, "a", &[], Some(1)), msg(1, "b", &["a"], Some(2)), reply];
        let forest = build(&messages);
        assert_eq!(forest.parent[2], Some(1));
    }

    #[test]
    fn test_references_first_policy() {
        let mut reply = msg(2, "c", &["a"], Some(3));
        reply.references = vec!["b".into()];
        let messages = vec![msg(0, "a", &[], Some(1)), msg(1, "b", &[], Some(2)), reply];

        let forest = build(&messages);
        assert_eq!(forest.parent[2], Some(0));

        let config = ThreadingConfig {
            link_policy: LinkPolicy::ReferencesFirst,
            ..Default::default()
        };
        let forest = build_forest(&messages, &config);
        assert_eq!(forest.parent[2], Some(1));
    }

    #[test]
    fn test_duplicate_ids_resolve_to_earliest() {
        let messages = vec![
            msg(0, "dup", &[], Some(1)),
            msg(1, "dup", &[], Some(2)),
            msg(2, "x", &["dup"], Some(3)),
        ];
        let forest = build(&messages);
        assert_eq!(forest.parent, vec![None, None, Some(0)]);
        assert_partition(&forest, 3);
    }

    #[test]
    fn test_self_reply_is_ignored() {
        let messages = vec![msg(0, "a", &["a"], Some(1))];
        let forest = build(&messages);
        assert_eq!(forest.parent, vec![None]);
        assert!(forest.warnings.is_empty());
    }

    #[test]
    fn test_three_cycle_orphans_latest() {
        // A → C, B → A, C → B
        let messages = vec![
            msg(0, "A", &["C"], Some(1)),
            msg(1, "B", &["A"], Some(2)),
            msg(2, "C", &["B"], Some(3)),
        ];
        let forest = build(&messages);
        assert_eq!(forest.parent, vec![Some(2), Some(0), None]);
        assert_eq!(forest.threads.len(), 1);
        assert_eq!(forest.threads[0].root, 2);
        assert_eq!(forest.warnings.len(), 1);
        assert_eq!(
            forest.warnings[0].degradation,
            Degradation::ThreadCycleBroken {
                orphaned: 2,
                cycle_len: 3
            }
        );
        assert_partition(&forest, 3);
    }

    #[test]
    fn test_cycle_with_unknown_date_orphans_undated() {
        let messages = vec![
            msg(0, "A", &["B"], None),
            msg(1, "B", &["A"], Some(5)),
            msg(2, "C", &["A"], Some(6)),
        ];
        let forest = build(&messages);
        assert_eq!(forest.parent, vec![None, Some(0), Some(0)]);
        assert_eq!(forest.warnings[0].record, 0);
    }

    #[test]
    fn test_tail_into_cycle() {
        // D hangs off a 2-cycle between A and B
        let messages = vec![
            msg(0, "D", &["A"], Some(9)),
            msg(1, "A", &["B"], Some(1)),
            msg(2, "B", &["A"], Some(2)),
        ];
        let forest = build(&messages);
        assert_eq!(forest.parent, vec![Some(1), Some(2), None]);
        assert_eq!(forest.warnings.len(), 1);
        assert_partition(&forest, 3);
    }

    #[test]
    fn test_merge_by_subject() {
        let mut first = msg(0, "a", &[], Some(1));
        first.subject = "Trail report".into();
        let mut orphan_reply = msg(1, "b", &[], Some(2));
        orphan_reply.subject = "Re: Trail report".into();
        let mut unrelated = msg(2, "c", &[], Some(3));
        unrelated.subject = "Trail report".into();
        let messages = vec![first, orphan_reply, unrelated];

        assert_eq!(build(&messages).threads.len(), 3);

        let config = ThreadingConfig {
            merge_by_subject: true,
            ..Default::default()
        };
        let forest = build_forest(&messages, &config);
        assert_eq!(forest.parent, vec![None, Some(0), None]);
        assert_eq!(forest.threads.len(), 2);
    }

    #[test]
    fn test_children() {
        let messages = vec![
            msg(0, "a", &[], Some(1)),
            msg(1, "b", &["a"], Some(2)),
            msg(2, "c", &["a"], Some(3)),
        ];
        let children = build(&messages).children();
        assert_eq!(children[0], vec![1, 2]);
        assert!(children[1].is_empty());
    }
}
