//! One raw record in, one [`Message`] out.
//!
//! Headers are decoded here by hand (see [`super::header`]) so that every
//! encoded-word problem is visible; the MIME tree is left to `mail-parser`.

use mail_parser::MessageParser;
use tracing::debug;

use super::header::{
    decode_encoded_words, decode_header_bytes, extract_ids, extract_message_id, parse_date,
    parse_envelope_date, split_header_block, HeaderMap,
};
use super::mbox::RawRecord;
use super::mime::extract_content;
use crate::error::{Degradation, Degraded};
use crate::model::{Message, Sender};
use crate::normalize::Normalizer;

/// Parse and normalize one record.
///
/// Never fails: a record without recognizable headers, or one whose MIME
/// structure cannot be read, becomes a placeholder message carrying
/// [`Degradation::ParseDegraded`].
pub fn parse_record(record: &RawRecord, normalizer: &Normalizer) -> Degraded<Message> {
    let header_bytes = match split_header_block(&record.content) {
        Some((headers, _)) => headers,
        None => &record.content[..],
    };
    let mut degradations = Vec::new();
    let header_text = decode_header_bytes(header_bytes).unwrap_into(&mut degradations);
    let headers = HeaderMap::parse(&header_text);
    if headers.is_empty() {
        return placeholder(record, normalizer, "no header fields found");
    }

    let Some(parsed) = MessageParser::default().parse(&record.content[..]) else {
        return placeholder(record, normalizer, "MIME structure could not be read");
    };

    let subject = headers
        .get("subject")
        .map(|s| decode_encoded_words(s).unwrap_into(&mut degradations))
        .unwrap_or_default();

    let sender = match headers.get("from") {
        Some(from) => Sender::parse(&decode_encoded_words(from).unwrap_into(&mut degradations)),
        None => envelope_sender(record),
    };

    let sent_at = resolve_date(record, headers.get("date")).unwrap_into(&mut degradations);

    let content = extract_content(&parsed).unwrap_into(&mut degradations);
    let body_html = normalizer
        .normalize(&content.body)
        .unwrap_into(&mut degradations);

    let message = Message {
        seq: record.index,
        message_id: headers.get("message-id").and_then(extract_message_id),
        in_reply_to: headers.get("in-reply-to").map(extract_ids).unwrap_or_default(),
        references: headers.get("references").map(extract_ids).unwrap_or_default(),
        subject,
        sender,
        sent_at,
        body_html,
        has_attachments: !content.attachments.is_empty(),
        attachments: content.attachments,
        placeholder: false,
    };

    Degraded {
        value: message,
        degradations,
    }
}

/// `Date` header, else the envelope date, else the unknown-date sentinel.
fn resolve_date(
    record: &RawRecord,
    header: Option<&str>,
) -> Degraded<Option<chrono::DateTime<chrono::Utc>>> {
    if let Some(dt) = header.and_then(parse_date) {
        return Degraded::clean(Some(dt));
    }
    if let Some(dt) = record.envelope.as_deref().and_then(parse_envelope_date) {
        debug!(record = record.index, "Using envelope date");
        return Degraded::clean(Some(dt));
    }
    let detail = match header {
        Some(raw) => format!("unparsable Date header '{}'", raw.trim()),
        None => "no Date header".to_string(),
    };
    Degraded::with(None, Degradation::DateUnresolved(detail))
}

/// Address from the envelope line, used when `From:` is missing.
fn envelope_sender(record: &RawRecord) -> Sender {
    record
        .envelope
        .as_deref()
        .and_then(|e| e.split_whitespace().next())
        .filter(|addr| *addr != "-" && !addr.eq_ignore_ascii_case("MAILER-DAEMON"))
        .map(Sender::parse)
        .unwrap_or_default()
}

/// Keep an unparsable record: its raw text becomes an escaped plain-text body.
fn placeholder(record: &RawRecord, normalizer: &Normalizer, reason: &str) -> Degraded<Message> {
    debug!(record = record.index, reason, "Record degraded to placeholder");
    let mut degradations = vec![Degradation::ParseDegraded(reason.to_string())];

    let mut message = Message::placeholder(record.index);
    message.sender = envelope_sender(record);
    message.sent_at = resolve_date(record, None).unwrap_into(&mut degradations);
    message.body_html = normalizer.normalize_text(&String::from_utf8_lossy(&record.content));

    Degraded {
        value: message,
        degradations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(envelope: Option<&str>, content: &str) -> RawRecord {
        RawRecord {
            index: 4,
            offset: 0,
            envelope: envelope.map(String::from),
            content: content.as_bytes().to_vec(),
        }
    }

    fn parse(envelope: Option<&str>, content: &str) -> Degraded<Message> {
        parse_record(&record(envelope, content), &Normalizer::default())
    }

    #[test]
    fn test_parse_full_message() {
        let m = parse(
            Some("alice@example.com Thu Jan  4 10:00:00 2024"),
            "From: Alice <alice@example.com>\n\
             Subject: =?UTF-8?Q?Caf=C3=A9?= meetup\n\
             Date: Thu, 04 Jan 2024 10:00:00 +0000\n\
             Message-ID: <m1@example.com>\n\
             In-Reply-To: <m0@example.com>\n\
             References: <a@example.com> <m0@example.com>\n\
             \n\
             Hello <all>\n",
        );
        assert!(m.is_clean(), "{:?}", m.degradations);
        let m = m.value;
        assert_eq!(m.seq, 4);
        assert_eq!(m.subject, "Café meetup");
        assert_eq!(m.sender.display_name, "Alice");
        assert_eq!(m.sender.address, "alice@example.com");
        assert_eq!(m.message_id.as_deref(), Some("m1@example.com"));
        assert_eq!(m.in_reply_to, vec!["m0@example.com"]);
        assert_eq!(m.references, vec!["a@example.com", "m0@example.com"]);
        assert_eq!(
            m.sent_at.unwrap().format("%Y-%m-%d %H:%M").to_string(),
            "2024-01-04 10:00"
        );
        assert!(m.body_html.contains("Hello &lt;all&gt;"));
        assert!(!m.placeholder);
        assert!(!m.has_attachments);
    }

    #[test]
    fn test_envelope_date_fallback() {
        let m = parse(
            Some("bob@example.com Mon Jan  1 10:00:00 2024"),
            "From: bob@example.com\nDate: sometime last week\n\nbody\n",
        );
        assert!(m.is_clean());
        assert_eq!(
            m.value.sent_at.unwrap().format("%Y-%m-%d").to_string(),
            "2024-01-01"
        );
    }

    #[test]
    fn test_unresolved_date() {
        let m = parse(None, "From: bob@example.com\nDate: sometime last week\n\nbody\n");
        assert!(m.value.sent_at.is_none());
        assert_eq!(m.degradations.len(), 1);
        assert_eq!(m.degradations[0].kind(), "DateUnresolved");
    }

    #[test]
    fn test_latin1_raw_header_is_reported() {
        let mut raw = record(None, "");
        raw.content = b"From: ren\xe9@example.com\nSubject: Caf\xe9\n\
Date: Thu, 04 Jan 2024 10:00:00 +0000\n\nbody\n"
            .to_vec();
        let m = parse_record(&raw, &Normalizer::default());
        assert_eq!(m.value.subject, "Caf\u{e9}");
        assert!(!m.value.placeholder);
        assert_eq!(
            m.degradations,
            vec![Degradation::EncodingUnresolved(
                "raw 8-bit header decoded as Windows-1252".to_string()
            )]
        );
    }

    #[test]
    fn test_missing_from_uses_envelope() {
        let m = parse(
            Some("carol@example.com Mon Jan  1 10:00:00 2024"),
            "Subject: anonymous\n\nbody\n",
        );
        assert_eq!(m.value.sender.address, "carol@example.com");
    }

    #[test]
    fn test_headerless_record_is_placeholder() {
        let m = parse(
            Some("dave@example.com Mon Jan  1 10:00:00 2024"),
            "just some words\nwithout any headers\n",
        );
        assert!(m.value.placeholder);
        assert_eq!(m.degradations[0].kind(), "ParseDegraded");
        assert!(m.value.body_html.contains("just some words"));
        assert!(m.value.sent_at.is_some());
    }

    #[test]
    fn test_unknown_subject_charset_degrades() {
        let m = parse(
            None,
            "From: a@b.com\nDate: Mon, 1 Jan 2024 10:00:00 +0000\nSubject: =?x-unknown?Q?hi?=\n\nbody\n",
        );
        assert_eq!(m.value.subject, "hi");
        assert_eq!(m.degradations.len(), 1);
        assert_eq!(m.degradations[0].kind(), "EncodingUnresolved");
    }
}
