//! Core data model types for archived messages, senders, attachments, and
//! subject lines.

pub mod attachment;
pub mod message;
pub mod sender;
pub mod subject;

pub use attachment::AttachmentMeta;
pub use message::Message;
pub use sender::Sender;
