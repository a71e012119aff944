//! Streaming MBOX record splitter.
//!
//! Reads any `BufRead` line by line and hands out one [`RawRecord`] per
//! message. Never interprets headers; that is [`super::record`]'s job.
//! Tolerant of malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ArchiveError, Result};

/// Default read buffer size (1 MB).
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum record size in bytes (64 MB).
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Report progress every 4 MB.
const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

/// One delimited message, still raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Zero-based position of the record in the input.
    pub index: u64,
    /// Byte offset of the record start (its `From ` line, if any).
    pub offset: u64,
    /// The `From ` envelope line without the `From ` prefix and line ending.
    pub envelope: Option<String>,
    /// Header block and body, with the envelope line removed.
    pub content: Vec<u8>,
}

/// Streaming MBOX splitter.
///
/// The splitter is tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (split only when the line
///   looks like an envelope; logged)
/// - Input that is a single bare message without any `From ` line
/// - Truncated records at EOF
/// - NUL bytes and other binary content in the body
/// - UTF-8 BOM at the start of the input
pub struct MboxReader<R> {
    reader: R,
    source: PathBuf,
    total_size: Option<u64>,
    max_message_size: usize,
    unescape_from_lines: bool,
}

impl MboxReader<BufReader<File>> {
    /// Open an MBOX file with the default read buffer.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_buffer(path, READ_BUFFER_SIZE)
    }

    /// Open an MBOX file with an explicit read buffer size.
    pub fn open_with_buffer(path: impl AsRef<Path>, buffer_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArchiveError::FileNotFound(path.clone())
            } else {
                ArchiveError::io(&path, e)
            }
        })?;
        let total_size = file.metadata().ok().map(|m| m.len());
        let mut reader = Self::new(BufReader::with_capacity(buffer_size.max(4096), file));
        reader.source = path;
        reader.total_size = total_size;
        Ok(reader)
    }
}

impl<R: BufRead> MboxReader<R> {
    /// Wrap an already-buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            source: PathBuf::from("<stream>"),
            total_size: None,
            max_message_size: MAX_MESSAGE_SIZE,
            unescape_from_lines: true,
        }
    }

    /// Set the per-record size limit; larger records are truncated.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Enable or disable mboxrd `>From ` unescaping.
    pub fn with_from_unescaping(mut self, enabled: bool) -> Self {
        self.unescape_from_lines = enabled;
        self
    }

    /// Split the input, calling `record_callback` for each record found.
    ///
    /// The callback returns `true` to continue or `false` to stop early.
    /// `progress` receives `(bytes_read, total_size)` and is only invoked
    /// when the total size is known.
    ///
    /// Returns the number of records delivered.
    pub fn for_each_record(
        &mut self,
        record_callback: &mut dyn FnMut(RawRecord) -> bool,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<u64> {
        let mut count: u64 = 0;
        let mut current_offset: u64 = 0;
        let mut last_progress: u64 = 0;
        let mut prev_line_was_empty = true;
        let mut current: Option<RecordBuilder> = None;

        // Reusable line buffer
        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line_buf.clear();
            let line_len = self
                .reader
                .read_until(b'\n', &mut line_buf)
                .map_err(|e| ArchiveError::io(&self.source, e))?;
            if line_len == 0 {
                break; // EOF
            }

            let line: &[u8] = if current_offset == 0 {
                strip_bom(&line_buf)
            } else {
                &line_buf
            };

            let starts_record = match &current {
                None => !is_blank_line(line),
                Some(_) if is_mbox_separator(line) => {
                    if prev_line_was_empty {
                        true
                    } else if looks_like_envelope(line) {
                        warn!(
                            offset = current_offset,
                            "Found 'From ' separator without preceding blank line"
                        );
                        true
                    } else {
                        false
                    }
                }
                Some(_) => false,
            };

            if starts_record {
                if let Some(done) = current.take() {
                    count += 1;
                    if !record_callback(done.finish()) {
                        return Ok(count);
                    }
                }
                let mut builder = RecordBuilder::new(count, current_offset);
                if is_mbox_separator(line) {
                    builder.envelope = Some(envelope_text(line));
                } else {
                    debug!(
                        offset = current_offset,
                        "Input has no 'From ' line, reading a bare message"
                    );
                    builder.push(line, self.max_message_size);
                }
                current = Some(builder);
            } else if let Some(builder) = current.as_mut() {
                if self.unescape_from_lines && is_escaped_from(line) {
                    builder.push(&line[1..], self.max_message_size);
                } else {
                    builder.push(line, self.max_message_size);
                }
            }

            prev_line_was_empty = is_blank_line(line);
            current_offset += line_len as u64;

            if let (Some(cb), Some(total)) = (progress, self.total_size) {
                if current_offset - last_progress >= PROGRESS_INTERVAL {
                    cb(current_offset, total);
                    last_progress = current_offset;
                }
            }
        }

        // Flush last record
        if let Some(done) = current.take() {
            count += 1;
            record_callback(done.finish());
        }

        if let (Some(cb), Some(total)) = (progress, self.total_size) {
            cb(total, total);
        }

        Ok(count)
    }

    /// Collect every record into memory.
    pub fn read_all(&mut self, progress: Option<&dyn Fn(u64, u64)>) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();
        self.for_each_record(
            &mut |record| {
                records.push(record);
                true
            },
            progress,
        )?;
        Ok(records)
    }
}

/// Accumulates one record's bytes and enforces the size limit.
struct RecordBuilder {
    index: u64,
    offset: u64,
    envelope: Option<String>,
    content: Vec<u8>,
    truncated: bool,
}

impl RecordBuilder {
    fn new(index: u64, offset: u64) -> Self {
        Self {
            index,
            offset,
            envelope: None,
            content: Vec::with_capacity(16 * 1024),
            truncated: false,
        }
    }

    fn push(&mut self, line: &[u8], max: usize) {
        if self.content.len() + line.len() <= max {
            self.content.extend_from_slice(line);
        } else if !self.truncated {
            // Warn once per record
            warn!(
                offset = self.offset,
                max_size = max,
                "Message exceeds maximum size, truncating body"
            );
            self.truncated = true;
        }
    }

    fn finish(self) -> RawRecord {
        RawRecord {
            index: self.index,
            offset: self.offset,
            envelope: self.envelope,
            content: self.content,
        }
    }
}

fn strip_bom(line: &[u8]) -> &[u8] {
    line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line)
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    line.starts_with(b"From ")
}

/// Stricter check used when no blank line precedes a `From ` line:
/// an envelope has a sender token followed by something containing a digit.
fn looks_like_envelope(line: &[u8]) -> bool {
    let text = String::from_utf8_lossy(line);
    let mut parts = text["From ".len()..].split_whitespace();
    let sender = parts.next();
    let rest: Vec<&str> = parts.collect();
    sender.is_some()
        && rest.len() >= 3
        && rest
            .iter()
            .any(|p| p.contains(|c: char| c.is_ascii_digit()))
}

/// `>From `, `>>From `, … (mboxrd quoting of body lines).
fn is_escaped_from(line: &[u8]) -> bool {
    let quotes = line.iter().take_while(|&&b| b == b'>').count();
    quotes > 0 && line[quotes..].starts_with(b"From ")
}

/// The envelope line without `From ` and the line ending.
fn envelope_text(line: &[u8]) -> String {
    String::from_utf8_lossy(&line["From ".len()..])
        .trim_end_matches(['\r', '\n'])
        .trim()
        .to_string()
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
