//! The whole conversion: raw MBOX bytes in, corpus + warnings + search index out.
//!
//! Nothing is observable until every phase has finished. Records are parsed
//! independently (in parallel when configured), then re-sorted by input
//! position before threading, so completion order never leaks into output.

use std::io::BufRead;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::Config;
use crate::corpus::Corpus;
use crate::error::{ArchiveError, Degradation, Degraded, Result, Warning};
use crate::model::Message;
use crate::normalize::Normalizer;
use crate::parser::{parse_record, MboxReader, RawRecord};
use crate::search::SearchIndex;
use crate::threading::build_forest;

/// Result of one run.
#[derive(Debug, Clone)]
pub struct Archive {
    pub corpus: Corpus,
    /// Every degradation of the run, ordered by record index.
    pub warnings: Vec<Warning>,
    pub search: SearchIndex,
}

impl Archive {
    /// Number of warnings of a given kind (see [`Degradation::kind`]).
    pub fn warning_count(&self, kind: &str) -> usize {
        self.warnings
            .iter()
            .filter(|w| w.degradation.kind() == kind)
            .count()
    }
}

/// Build an archive from any buffered MBOX stream.
pub fn build_archive(reader: impl BufRead, config: &Config) -> Result<Archive> {
    let mbox = MboxReader::new(reader)
        .with_max_message_size(config.parser.max_message_size)
        .with_from_unescaping(config.parser.unescape_from_lines);
    run(mbox, config, None)
}

/// Build an archive from an MBOX file.
///
/// `progress` receives `(bytes_read, total_bytes)` while records are split.
pub fn build_archive_from_path(
    path: &Path,
    config: &Config,
    progress: Option<&dyn Fn(u64, u64)>,
) -> Result<Archive> {
    info!(path = %path.display(), "Building archive");
    let mbox = MboxReader::open_with_buffer(path, config.performance.read_buffer_size)?
        .with_max_message_size(config.parser.max_message_size)
        .with_from_unescaping(config.parser.unescape_from_lines);
    run(mbox, config, progress)
}

fn run<R: BufRead>(
    mut mbox: MboxReader<R>,
    config: &Config,
    progress: Option<&dyn Fn(u64, u64)>,
) -> Result<Archive> {
    let records = mbox.read_all(progress)?;
    if records.is_empty() {
        return Err(ArchiveError::EmptyArchive);
    }
    info!(records = records.len(), "Split input into records");

    let normalizer = Normalizer::new(&config.normalize);
    let parsed: Vec<Degraded<Message>> = if config.performance.parallel {
        records
            .par_iter()
            .map(|r| parse_isolated(r, &normalizer))
            .collect()
    } else {
        records
            .iter()
            .map(|r| parse_isolated(r, &normalizer))
            .collect()
    };
    drop(records);

    let mut warnings = Vec::new();
    let mut messages: Vec<Message> = parsed
        .into_iter()
        .map(|d| {
            warnings.extend(d.warnings(d.value.seq));
            d.value
        })
        .collect();
    messages.sort_by_key(|m| m.seq);

    let forest = build_forest(&messages, &config.threading);
    warnings.extend(forest.warnings.iter().cloned());
    warnings.sort_by_key(|w| w.record);

    let corpus = Corpus::assemble(messages, &forest, &config.corpus, &config.general.group_name);
    let search = SearchIndex::build(&corpus, &config.search);

    info!(
        messages = corpus.len(),
        threads = corpus.threads.len(),
        placeholders = corpus.placeholder_count(),
        warnings = warnings.len(),
        "Archive complete"
    );

    Ok(Archive {
        corpus,
        warnings,
        search,
    })
}

/// Parse one record; a panic anywhere inside degrades it to a placeholder.
fn parse_isolated(record: &RawRecord, normalizer: &Normalizer) -> Degraded<Message> {
    isolate(record.index, || parse_record(record, normalizer))
}

fn isolate(index: u64, parse: impl FnOnce() -> Degraded<Message>) -> Degraded<Message> {
    match panic::catch_unwind(AssertUnwindSafe(parse)) {
        Ok(parsed) => parsed,
        Err(_) => {
            debug!(record = index, "Record parser panicked");
            Degraded::with(
                Message::placeholder(index),
                Degradation::ParseDegraded("parser panicked".to_string()),
            )
        }
    }
}
