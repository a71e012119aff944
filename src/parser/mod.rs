//! Email parsing: MBOX record splitting, header decoding, MIME body
//! selection, and per-record message construction.

pub mod header;
pub mod mbox;
pub mod mime;
pub mod record;

pub use mbox::{MboxReader, RawRecord};
pub use record::parse_record;
