//! The parsed message record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attachment::AttachmentMeta;
use super::sender::Sender;
use crate::normalize::NO_CONTENT_HTML;

/// One mail record after parsing and body normalization.
///
/// Created once per input record; nothing but the parser writes to it. The
/// raw body is gone by the time a `Message` exists: `body_html` is the only
/// form of the content that is kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Zero-based index of the record in the input.
    pub seq: u64,

    /// `Message-ID` without angle brackets. Untrusted: may be missing or shared.
    pub message_id: Option<String>,

    /// `In-Reply-To` ids in header order (brackets stripped).
    pub in_reply_to: Vec<String>,

    /// `References` ids, oldest first (brackets stripped).
    pub references: Vec<String>,

    /// Decoded subject line, as sent.
    pub subject: String,

    pub sender: Sender,

    /// Send time normalized to UTC. `None` is the "unknown date" sentinel.
    pub sent_at: Option<DateTime<Utc>>,

    /// Sanitized HTML body, safe to embed as-is.
    pub body_html: String,

    pub has_attachments: bool,

    pub attachments: Vec<AttachmentMeta>,

    /// `true` when the record could not be parsed and this is a stand-in.
    pub placeholder: bool,
}

impl Message {
    /// Stand-in for a record that could not be parsed at all.
    pub fn placeholder(seq: u64) -> Self {
        Self {
            seq,
            message_id: None,
            in_reply_to: Vec::new(),
            references: Vec::new(),
            subject: String::new(),
            sender: Sender::default(),
            sent_at: None,
            body_html: NO_CONTENT_HTML.to_string(),
            has_attachments: false,
            attachments: Vec::new(),
            placeholder: true,
        }
    }

    /// Ordering key used wherever messages are sorted by date:
    /// dated messages first in time order, unknown dates last, ties by input order.
    pub fn date_key(&self) -> (bool, Option<DateTime<Utc>>, u64) {
        (self.sent_at.is_none(), self.sent_at, self.seq)
    }
}
