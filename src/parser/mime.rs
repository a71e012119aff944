//! MIME body selection and attachment listing on top of `mail-parser`.

use mail_parser::{MessagePart, MimeHeaders, PartType};
use tracing::debug;

use crate::error::{Degradation, Degraded};
use crate::model::attachment::AttachmentMeta;
use crate::normalize::BodySource;

/// Body and attachment metadata taken from one parsed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeContent {
    pub body: BodySource,
    pub attachments: Vec<AttachmentMeta>,
}

/// Pick the body and list attachments.
///
/// The first HTML part wins, then the first plain-text part. `mail-parser`
/// fills its HTML and text body lists with converted alternatives when one
/// flavor is missing, so only parts whose own type matches are considered.
pub fn extract_content(msg: &mail_parser::Message<'_>) -> Degraded<MimeContent> {
    let mut degradations = Vec::new();

    let body = match first_html_part(msg) {
        Some((part, html)) => {
            check_part_encoding(part, &mut degradations);
            BodySource::Html(html.to_string())
        }
        None => match first_text_part(msg) {
            Some((part, text)) => {
                check_part_encoding(part, &mut degradations);
                let (flowed, delsp) = flowed_params(part);
                BodySource::Text {
                    text: text.to_string(),
                    flowed,
                    delsp,
                }
            }
            None => BodySource::Empty,
        },
    };

    let body = match body {
        BodySource::Html(ref s) | BodySource::Text { text: ref s, .. } if s.trim().is_empty() => {
            BodySource::Empty
        }
        other => other,
    };

    Degraded {
        value: MimeContent {
            body,
            attachments: list_attachments(msg),
        },
        degradations,
    }
}

fn first_html_part<'a>(
    msg: &'a mail_parser::Message<'_>,
) -> Option<(&'a MessagePart<'a>, &'a str)> {
    let mut idx = 0;
    while let Some(part) = msg.html_part(idx) {
        if let PartType::Html(html) = &part.body {
            return Some((part, html.as_ref()));
        }
        idx += 1;
    }
    None
}

fn first_text_part<'a>(
    msg: &'a mail_parser::Message<'_>,
) -> Option<(&'a MessagePart<'a>, &'a str)> {
    let mut idx = 0;
    while let Some(part) = msg.text_part(idx) {
        if let PartType::Text(text) = &part.body {
            return Some((part, text.as_ref()));
        }
        idx += 1;
    }
    None
}

/// Report a part whose transfer encoding broke or whose charset nobody knows.
fn check_part_encoding(part: &MessagePart<'_>, degradations: &mut Vec<Degradation>) {
    if part.is_encoding_problem {
        degradations.push(Degradation::EncodingUnresolved(
            "body part could not be decoded cleanly".to_string(),
        ));
        return;
    }
    let charset = part
        .content_type()
        .and_then(|ct| ct.attribute("charset"))
        .map(|c| c.trim().trim_matches('"'));
    if let Some(charset) = charset {
        if !charset.is_empty() && encoding_rs::Encoding::for_label(charset.as_bytes()).is_none() {
            debug!(charset, "Body declares an unknown charset");
            degradations.push(Degradation::EncodingUnresolved(format!(
                "unknown body charset '{charset}'"
            )));
        }
    }
}

/// `(flowed, delsp)` from `Content-Type: text/plain; format=flowed; delsp=yes`.
fn flowed_params(part: &MessagePart<'_>) -> (bool, bool) {
    let Some(ct) = part.content_type() else {
        return (false, false);
    };
    let is = |name: &str, expected: &str| {
        ct.attribute(name)
            .map(|v| v.trim().eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    };
    (is("format", "flowed"), is("delsp", "yes"))
}

/// Build attachment metadata from a parsed `mail_parser::Message`.
fn list_attachments(msg: &mail_parser::Message<'_>) -> Vec<AttachmentMeta> {
    msg.attachments()
        .enumerate()
        .map(|(idx, part)| {
            let filename = part
                .attachment_name()
                .map(String::from)
                .unwrap_or_else(|| format!("attachment_{idx}"));

            let content_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{sub}", ct.ctype()),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());

            let is_inline = part
                .content_disposition()
                .map(|d| d.ctype().eq_ignore_ascii_case("inline"))
                .unwrap_or(false);

            AttachmentMeta {
                filename,
                content_type,
                size: part.contents().len() as u64,
                is_inline,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mail_parser::MessageParser;

    fn content(raw: &str) -> Degraded<MimeContent> {
        let msg = MessageParser::default().parse(raw.as_bytes()).unwrap();
        extract_content(&msg)
    }

    #[test]
    fn test_plain_text_body() {
        let c = content("From: a@b.com\nSubject: Hi\n\nHello there\n");
        match &c.value.body {
            BodySource::Text { text, flowed, .. } => {
                assert!(text.contains("Hello there"));
                assert!(!*flowed);
            }
            other => panic!("unexpected body {other:?}"),
        }
        assert!(c.value.attachments.is_empty());
        assert!(c.is_clean());
    }

    #[test]
    fn test_html_preferred_over_text() {
        let raw = "From: a@b.com\n\
                   MIME-Version: 1.0\n\
                   Content-Type: multipart/alternative; boundary=\"XX\"\n\
                   \n\
                   --XX\n\
                   Content-Type: text/plain\n\
                   \n\
                   plain version\n\
                   --XX\n\
                   Content-Type: text/html\n\
                   \n\
                   <p>html version</p>\n\
                   --XX--\n";
        match content(raw).value.body {
            BodySource::Html(html) => assert!(html.contains("html version")),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_flowed_parameters() {
        let raw = "From: a@b.com\n\
                   Content-Type: text/plain; charset=utf-8; format=flowed; delsp=yes\n\
                   \n\
                   soft \nbreak\n";
        match content(raw).value.body {
            BodySource::Text { flowed, delsp, .. } => {
                assert!(flowed);
                assert!(delsp);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_empty_body() {
        let c = content("From: a@b.com\nSubject: Nothing\n\n\n");
        assert_eq!(c.value.body, BodySource::Empty);
    }

    #[test]
    fn test_unknown_charset_is_reported() {
        let raw = "From: a@b.com\nContent-Type: text/plain; charset=x-martian\n\nhello\n";
        let c = content(raw);
        assert_eq!(c.degradations.len(), 1);
        assert_eq!(c.degradations[0].kind(), "EncodingUnresolved");
    }

    #[test]
    fn test_attachments_listed() {
        let raw = "From: a@b.com\n\
                   MIME-Version: 1.0\n\
                   Content-Type: multipart/mixed; boundary=\"XX\"\n\
                   \n\
                   --XX\n\
                   Content-Type: text/plain\n\
                   \n\
                   see attached\n\
                   --XX\n\
                   Content-Type: application/pdf; name=\"route.pdf\"\n\
                   Content-Disposition: attachment; filename=\"route.pdf\"\n\
                   Content-Transfer-Encoding: base64\n\
                   \n\
                   JVBERi0xLjQK\n\
                   --XX--\n";
        let c = content(raw);
        assert_eq!(c.value.attachments.len(), 1);
        let att = &c.value.attachments[0];
        assert_eq!(att.filename, "route.pdf");
        assert_eq!(att.content_type, "application/pdf");
        assert_eq!(att.size, 9);
        assert!(!att.is_inline);
    }
}
