//! HTML sanitizing and HTML-to-text extraction.

use std::collections::{HashMap, HashSet};

use ammonia::{Builder, UrlRelative};
use once_cell::sync::Lazy;

use super::text::LINK_REL;

static SANITIZER: Lazy<Builder<'static>> = Lazy::new(|| {
    let mut builder = Builder::default();
    builder
        .rm_tags(&["img"])
        .url_relative(UrlRelative::Deny)
        .url_schemes(HashSet::from(["http", "https", "ftp", "mailto"]))
        .link_rel(Some(LINK_REL))
        .allowed_classes(HashMap::from([
            ("div", HashSet::from(["plaintext", "no-content"])),
            ("blockquote", HashSet::from(["quote"])),
        ]));
    builder
});

/// Remove active content and external resource references from HTML.
///
/// Scripts and styles go with their content; event-handler and other
/// unknown attributes, images, and relative links are dropped. The result
/// is a fixed point: sanitizing it again returns it unchanged.
pub fn sanitize(html: &str) -> String {
    SANITIZER.clean(&html.replace('\0', "")).to_string()
}

/// Convert HTML to plain text.
///
/// - Preserves line breaks from `<br>`, `<p>`, `<div>` and other blocks
/// - Removes scripts and styles
/// - Decodes named and numeric character references
/// - Collapses runs of blank lines
pub fn html_to_text(html: &str) -> String {
    let mut text = remove_tag_block(html, "script");
    text = remove_tag_block(&text, "style");

    // Strip tags, turning block boundaries into newlines
    let mut stripped = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(open) = rest.find('<') {
        stripped.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('>') else {
            rest = "";
            break;
        };
        let tag = &rest[open + 1..open + close];
        rest = &rest[open + close + 1..];
        if is_block_tag(tag) {
            stripped.push('\n');
            // The source newline after a <br> is the same break
            if tag_name(tag) == "br" {
                rest = rest.strip_prefix('\n').unwrap_or(rest);
            }
        }
    }
    stripped.push_str(rest);

    let decoded = decode_entities(&stripped);

    // Collapse multiple blank lines into at most one
    let mut prev_was_blank = false;
    let mut cleaned = String::with_capacity(decoded.len());
    for line in decoded.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_was_blank {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }

    cleaned.trim().to_string()
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn is_block_tag(tag: &str) -> bool {
    matches!(
        tag_name(tag).as_str(),
        "br" | "p"
            | "div"
            | "tr"
            | "li"
            | "blockquote"
            | "pre"
            | "table"
            | "ul"
            | "ol"
            | "hr"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
    )
}

/// Remove an entire tag block (e.g. `<script>…</script>`), case-insensitively.
fn remove_tag_block(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    let mut result = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(start) = lower[pos..].find(&open).map(|s| pos + s) {
        result.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => {
                // No closing tag: remove rest
                pos = html.len();
                break;
            }
        }
    }
    result.push_str(&html[pos..]);
    result
}

/// Decode character references in one pass (`&amp;lt;` stays `&lt;`).
fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&after[..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(&['x', 'X'][..]) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(|c| if c == '\u{a0}' { ' ' } else { c });
    }
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "copy" => '©',
        "reg" => '®',
        "hellip" => '…',
        "mdash" => '—',
        "ndash" => '–',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "euro" => '€',
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_basic() {
        let html = "<p>Hello <b>world</b></p><p>Second paragraph</p>";
        let text = html_to_text(html);
        assert!(text.contains("Hello world"));
        assert!(text.contains("Second paragraph"));
    }

    #[test]
    fn test_html_to_text_entities() {
        assert_eq!(html_to_text("Tom &amp; Jerry &lt;3&gt;"), "Tom & Jerry <3>");
        assert_eq!(html_to_text("&amp;lt; &#233;t&#xE9;"), "&lt; été");
        assert_eq!(html_to_text("fish & chips"), "fish & chips");
    }

    #[test]
    fn test_html_to_text_removes_scripts() {
        assert_eq!(
            html_to_text("Before<SCRIPT>alert('xss')</script>After"),
            "BeforeAfter"
        );
    }

    #[test]
    fn test_html_to_text_line_breaks() {
        let text = html_to_text("<div class=\"plaintext\">one<br>\ntwo<br>\n</div>");
        assert_eq!(text, "one\ntwo");
    }

    #[test]
    fn test_sanitize_strips_script_keeps_text() {
        let out = sanitize("<p onclick=\"evil()\">Hello<script>alert(1)</script> there</p>");
        assert!(!out.contains("script"));
        assert!(!out.contains("onclick"));
        assert!(out.contains("Hello"));
        assert!(out.contains("there"));
    }

    #[test]
    fn test_sanitize_drops_images_and_relative_links() {
        let out = sanitize("<img src=\"http://tracker.example/p.gif\"><a href=\"/local\">x</a>");
        assert!(!out.contains("<img"));
        assert!(!out.contains("/local"));
        assert!(out.contains("x"));
    }

    #[test]
    fn test_sanitize_adds_rel_to_links() {
        let out = sanitize("<a href=\"https://example.com/\" target=\"_blank\">site</a>");
        assert_eq!(
            out,
            "<a href=\"https://example.com/\" rel=\"noopener noreferrer\">site</a>"
        );
    }

    #[test]
    fn test_sanitize_filters_classes() {
        let out = sanitize("<div class=\"plaintext evil\">x</div>");
        assert_eq!(out, "<div class=\"plaintext\">x</div>");
    }

    #[test]
    fn test_sanitize_is_fixed_point() {
        let once = sanitize("<table><tr><td>a &amp; b</td></tr></table><blockquote class=\"quote\">q</blockquote>");
        assert_eq!(sanitize(&once), once);
    }
}
