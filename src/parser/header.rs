//! RFC 5322 header handling: block splitting, folding, encoded-words
//! (RFC 2047), message-id lists, and lenient date parsing.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

use crate::error::{Degradation, Degraded};

/// Base64 for encoded-words: real-world senders drop or mangle padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Unfolded headers of one message, in their original order.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    /// `(lowercase_name, raw_value)` pairs.
    fields: Vec<(String, String)>,
}

impl HeaderMap {
    /// Parse a header block. Continuation lines (leading space or tab) are
    /// joined to the previous field; lines without a colon are skipped.
    pub fn parse(text: &str) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();

        for line in text.lines() {
            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some(last) = fields.last_mut() {
                    last.1.push(' ');
                    last.1.push_str(line.trim());
                }
            } else if let Some(colon_pos) = line.find(':') {
                let name = line[..colon_pos].trim();
                if name.is_empty() || name.contains(char::is_whitespace) {
                    continue;
                }
                let value = line[colon_pos + 1..].trim().to_string();
                fields.push((name.to_lowercase(), value));
            }
        }

        Self { fields }
    }

    /// First value for a header name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Split a message into `(header_bytes, body_bytes)` at the first blank line.
///
/// Returns `None` when no blank line exists; the caller decides whether the
/// whole thing is headers or body.
pub fn split_header_block(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let mut line_start = 0;
    while line_start < data.len() {
        let line_end = data[line_start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| line_start + p + 1)
            .unwrap_or(data.len());
        let line = &data[line_start..line_end];
        if line.iter().all(|&b| b == b'\n' || b == b'\r') {
            return Some((&data[..line_start], &data[line_end..]));
        }
        line_start = line_end;
    }
    None
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every
/// byte). The fallback is a guess and is reported as
/// [`Degradation::EncodingUnresolved`].
pub fn decode_header_bytes(bytes: &[u8]) -> Degraded<String> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Degraded::clean(s.to_string()),
        Err(_) => {
            debug!("Raw 8-bit header is not UTF-8, decoding as Windows-1252");
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            Degraded::with(
                decoded.into_owned(),
                Degradation::EncodingUnresolved(
                    "raw 8-bit header decoded as Windows-1252".to_string(),
                ),
            )
        }
    }
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Every encoded-word carries its own charset, so one value may mix several.
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?ISO-8859-1?Q?caf=E9?="` → `"Holacafé"`.
///
/// A word in an unknown charset is decoded as lossy UTF-8, and a word whose
/// base64 is invalid becomes U+FFFD. Both are reported as
/// [`Degradation::EncodingUnresolved`]. A structurally broken word is kept
/// as literal text.
pub fn decode_encoded_words(input: &str) -> Degraded<String> {
    let mut result = String::with_capacity(input.len());
    let mut degradations = Vec::new();
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some(decoded) = try_decode_one_word(after_start) {
            let text = decoded.text.unwrap_into(&mut degradations);
            result.push_str(&text);
            remaining = &remaining[start + 2 + decoded.consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    Degraded {
        value: result,
        degradations,
    }
}

struct DecodedWord {
    text: Degraded<String>,
    consumed: usize, // bytes consumed from the string *after* the initial "=?"
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // Format: charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let consumed = first_q + 1 + second_q + 1 + end + 2;

    let bytes = match encoding {
        "B" | "b" => {
            let compact: String = encoded_text
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            match LENIENT_BASE64.decode(compact.trim_end_matches('=')) {
                Ok(bytes) => bytes,
                Err(e) => {
                    return Some(DecodedWord {
                        text: Degraded::with(
                            char::REPLACEMENT_CHARACTER.to_string(),
                            Degradation::EncodingUnresolved(format!(
                                "invalid base64 in encoded-word: {e}"
                            )),
                        ),
                        consumed,
                    });
                }
            }
        }
        "Q" | "q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    // RFC 2231 language suffix: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);

    Some(DecodedWord {
        text: decode_charset(charset, &bytes),
        consumed,
    })
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    None => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode bytes using a named charset, reporting charsets nobody knows.
pub fn decode_charset(charset: &str, bytes: &[u8]) -> Degraded<String> {
    let label = charset.trim().trim_matches('"');
    if label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8") {
        return decode_utf8_lossy(bytes);
    }
    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(encoding) => {
            let (decoded, _, had_errors) = encoding.decode(bytes);
            if had_errors {
                Degraded::with(
                    decoded.into_owned(),
                    Degradation::EncodingUnresolved(format!("malformed {label} sequence")),
                )
            } else {
                Degraded::clean(decoded.into_owned())
            }
        }
        None => {
            debug!(charset = label, "Unknown charset, falling back to UTF-8 lossy");
            Degraded::with(
                String::from_utf8_lossy(bytes).into_owned(),
                Degradation::EncodingUnresolved(format!("unknown charset '{label}'")),
            )
        }
    }
}

fn decode_utf8_lossy(bytes: &[u8]) -> Degraded<String> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Degraded::clean(s.to_string()),
        Err(_) => Degraded::with(
            String::from_utf8_lossy(bytes).into_owned(),
            Degradation::EncodingUnresolved("malformed UTF-8 sequence".to_string()),
        ),
    }
}

/// Strip angle brackets and whitespace from a message id.
pub fn normalize_id(id: &str) -> String {
    id.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}

/// Extract every message id from a header value, in order.
///
/// Takes all `<…>` tokens; if there are none, falls back to whitespace
/// separated tokens that look like ids (contain `@`).
pub fn extract_ids(s: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut remaining = s;
    while let Some(start) = remaining.find('<') {
        if let Some(end) = remaining[start..].find('>') {
            let id = normalize_id(&remaining[start..start + end + 1]);
            if !id.is_empty() {
                result.push(id);
            }
            remaining = &remaining[start + end + 1..];
        } else {
            break;
        }
    }

    if result.is_empty() {
        result = s
            .split_whitespace()
            .filter(|t| t.contains('@'))
            .map(normalize_id)
            .filter(|t| !t.is_empty())
            .collect();
    }
    result
}

/// The `Message-ID` value, if one can be found.
pub fn extract_message_id(s: &str) -> Option<String> {
    extract_ids(s).into_iter().next().or_else(|| {
        let id = normalize_id(s);
        (!id.is_empty() && !id.contains(char::is_whitespace)).then_some(id)
    })
}

/// Parse an email date string in various common formats.
///
/// Supports RFC 2822, ISO 8601, and many broken real-world variants.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    // Drop trailing comments such as "(PST)" and collapse whitespace
    let cleaned = strip_trailing_comment(trimmed);
    let no_dow = strip_day_of_week(&cleaned);
    let no_dow_normalized = normalize_imap_date(&no_dow);

    let formats = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%d %b %Y %H:%M:%S",
        "%b %d %H:%M:%S %Y",
        "%b %d %Y %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];

    for candidate in [&no_dow, &no_dow_normalized] {
        let replaced = replace_named_tz(candidate);
        for text in [candidate.as_str(), replaced.as_str()] {
            for fmt in &formats {
                if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
                    return Some(dt.with_timezone(&Utc));
                }
                if let Ok(ndt) = NaiveDateTime::parse_from_str(text, fmt) {
                    return Some(Utc.from_utc_datetime(&ndt));
                }
            }
        }
    }

    mail_parser_date(trimmed)
}

/// Parse the date part of an mbox envelope line
/// (`sender@example.com Mon Jan  1 10:00:00 2024`).
pub fn parse_envelope_date(envelope: &str) -> Option<DateTime<Utc>> {
    let mut tokens = envelope.split_whitespace();
    tokens.next()?; // sender
    let rest: Vec<&str> = tokens.collect();
    if rest.is_empty() {
        return None;
    }
    let joined = rest.join(" ");

    for fmt in ["%a %b %d %H:%M:%S %Y", "%a %b %d %H:%M %Y"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&joined, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }
    // Some exporters append a zone: "Mon Jan 01 10:00:00 +0100 2024"
    if rest.len() == 6 {
        let reordered = format!(
            "{} {} {} {} {} {}",
            rest[0], rest[2], rest[1], rest[5], rest[3], rest[4]
        );
        if let Ok(dt) = DateTime::parse_from_rfc2822(&reordered) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    parse_date(&joined)
}

/// Attempt to parse a date using `mail-parser`'s built-in parser.
fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    use mail_parser::MessageParser;

    // Wrap input in a minimal RFC 5322 message so mail-parser can parse it
    let fake_msg = format!("Date: {input}\n\n");
    let parsed = MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Normalize IMAP-style dates: `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    if !s.contains('-') {
        return s.to_string();
    }

    let title_months = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    for month in &title_months {
        let upper = format!("-{}-", month.to_uppercase());
        let lower = format!("-{}-", month.to_lowercase());
        let title = format!("-{month}-");
        for pattern in [&upper, &lower, &title] {
            if s.contains(pattern.as_str()) {
                return s.replacen(pattern.as_str(), &format!(" {month} "), 1);
            }
        }
    }

    s.to_string()
}

/// Strip leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    let days = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in &days {
        if let Some(rest) = s.strip_prefix(day) {
            let rest = rest.strip_prefix(',').unwrap_or(rest);
            if rest.starts_with(' ') || rest.is_empty() {
                return rest.trim().to_string();
            }
        }
    }
    s.to_string()
}

/// `"… -0800 (PST)"` → `"… -0800"`, with runs of whitespace collapsed.
fn strip_trailing_comment(s: &str) -> String {
    let without = match (s.rfind('('), s.ends_with(')')) {
        (Some(open), true) => &s[..open],
        _ => s,
    };
    without.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace well-known timezone abbreviations with numeric offsets.
fn replace_named_tz(s: &str) -> String {
    let tzs = [
        ("CEST", "+0200"),
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("UT", "+0000"),
        ("CET", "+0100"),
        ("BST", "+0100"),
        ("JST", "+0900"),
    ];
    for (name, offset) in &tzs {
        if let Some(prefix) = s.strip_suffix(name) {
            if prefix.ends_with(' ') {
                return format!("{prefix}{offset}");
            }
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_encoded_word() {
        let input = "=?UTF-8?B?SG9sYSBtdW5kbw==?=";
        assert_eq!(decode_encoded_words(input).value, "Hola mundo");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        let decoded = decode_encoded_words("=?ISO-8859-1?Q?caf=E9?=");
        assert_eq!(decoded.value, "café");
        assert!(decoded.is_clean());
    }

    #[test]
    fn test_decode_multiple_encoded_words() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input).value, "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_charsets_in_one_value() {
        let input = "Re: =?ISO-8859-1?Q?R=E9sum=E9?= und =?Windows-1252?Q?M=FCller?=";
        assert_eq!(decode_encoded_words(input).value, "Re: Résumé und Müller");
    }

    #[test]
    fn test_decode_unpadded_base64() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYQ?=").value, "Hola");
    }

    #[test]
    fn test_unknown_charset_degrades() {
        let decoded = decode_encoded_words("=?x-klingon?Q?Qapla=27?=");
        assert_eq!(decoded.value, "Qapla'");
        assert_eq!(decoded.degradations.len(), 1);
        assert_eq!(decoded.degradations[0].kind(), "EncodingUnresolved");
    }

    #[test]
    fn test_broken_encoded_word_kept_literally() {
        let decoded = decode_encoded_words("price =? unknown");
        assert_eq!(decoded.value, "price =? unknown");
        assert!(decoded.is_clean());
    }

    #[test]
    fn test_invalid_base64_becomes_replacement_char() {
        let decoded = decode_encoded_words("=?UTF-8?B?!!!?= hi");
        assert_eq!(decoded.value, "\u{FFFD} hi");
        assert_eq!(decoded.degradations.len(), 1);
        assert_eq!(decoded.degradations[0].kind(), "EncodingUnresolved");
    }

    #[test]
    fn test_decode_header_bytes() {
        let clean = decode_header_bytes("Subject: Grüße\n".as_bytes());
        assert_eq!(clean.value, "Subject: Grüße\n");
        assert!(clean.is_clean());

        let guessed = decode_header_bytes(b"Subject: caf\xe9\n");
        assert_eq!(guessed.value, "Subject: café\n");
        assert_eq!(guessed.degradations.len(), 1);
        assert_eq!(guessed.degradations[0].kind(), "EncodingUnresolved");
    }

    #[test]
    fn test_decode_utf8_base64_japanese() {
        // 山田太郎
        let decoded = decode_encoded_words("=?UTF-8?B?5bGx55Sw5aSq6YOO?=");
        assert_eq!(decoded.value, "山田太郎");
    }

    #[test]
    fn test_header_map_unfolds() {
        let headers =
            HeaderMap::parse("Subject: This is a long\n\tsubject line\nFrom: user@example.com\n");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("subject"), Some("This is a long subject line"));
        assert_eq!(headers.get("FROM"), Some("user@example.com"));
    }

    #[test]
    fn test_split_header_block() {
        let data = b"From: a@b.com\r\nSubject: Hi\r\n\r\nBody\r\n";
        let (headers, body) = split_header_block(data).unwrap();
        assert_eq!(headers, b"From: a@b.com\r\nSubject: Hi\r\n");
        assert_eq!(body, b"Body\r\n");
        assert!(split_header_block(b"no blank line").is_none());
    }

    #[test]
    fn test_extract_ids() {
        let ids = extract_ids("<a@b.com> <c@d.com>\n <e@f.com>");
        assert_eq!(ids, vec!["a@b.com", "c@d.com", "e@f.com"]);
        assert_eq!(extract_ids("bare@id.example"), vec!["bare@id.example"]);
        assert!(extract_ids("").is_empty());
    }

    #[test]
    fn test_extract_message_id() {
        assert_eq!(
            extract_message_id(" <msg001@example.com> ").as_deref(),
            Some("msg001@example.com")
        );
        assert_eq!(extract_message_id("   "), None);
    }

    #[test]
    fn test_parse_date_rfc2822() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 +0000").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-01-04");
    }

    #[test]
    fn test_parse_date_normalizes_to_utc() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 +0200").unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "08:00");
    }

    #[test]
    fn test_parse_date_named_tz_and_comment() {
        assert!(parse_date("Thu, 04 Jan 2024 10:00:00 EST").is_some());
        assert!(parse_date("Thu, 4 Jan 2024 10:00:00 -0800 (PST)").is_some());
    }

    #[test]
    fn test_parse_date_imap_style() {
        let dt = parse_date("16-JUL-2025 03:01:03").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2025-07-16");
    }

    #[test]
    fn test_parse_date_garbage() {
        assert!(parse_date("not a date at all").is_none());
        assert!(parse_date("").is_none());
    }

    #[test]
    fn test_parse_envelope_date() {
        let dt = parse_envelope_date("user@example.com Mon Jan  1 10:00:00 2024").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2024-01-01 10:00");
        assert!(parse_envelope_date("MAILER-DAEMON").is_none());
    }

    #[test]
    fn test_normalize_imap_date() {
        assert_eq!(
            normalize_imap_date("16-JUL-2025 03:01:03"),
            "16 Jul 2025 03:01:03"
        );
        assert_eq!(
            normalize_imap_date("04 Jan 2024 10:00:00"),
            "04 Jan 2024 10:00:00"
        );
    }
}
