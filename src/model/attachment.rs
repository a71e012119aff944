//! Attachment metadata.
//!
//! Archives keep only the description of an attachment; the payload itself
//! is dropped once its size has been measured.

use serde::{Deserialize, Serialize};

/// Metadata about one attachment of a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentMeta {
    /// Filename from the headers, or `attachment_N` when missing.
    pub filename: String,

    /// MIME content type (e.g. `"image/jpeg"`, `"application/pdf"`).
    pub content_type: String,

    /// Decoded size in bytes.
    pub size: u64,

    /// `true` for inline parts (typically images referenced from HTML).
    pub is_inline: bool,
}
