//! `mboxsite`: turn a mailing-list MBOX export into a threaded, sanitized,
//! searchable corpus ready for static-site rendering.
//!
//! The library is one pure transformation, [`build_archive`]: raw MBOX bytes
//! in, a [`Corpus`], the list of per-record [`Warning`]s and a
//! [`SearchIndex`] out. Rendering and file output are left to the caller.

pub mod config;
pub mod corpus;
pub mod error;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod search;
pub mod threading;

pub use corpus::Corpus;
pub use error::{ArchiveError, Degradation, Warning};
pub use pipeline::{build_archive, build_archive_from_path, Archive};
pub use search::SearchIndex;
