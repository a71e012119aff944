//! Plain text to HTML: escaping, line breaks, quote blocks, links.

use linkify::{LinkFinder, LinkKind};
use once_cell::sync::Lazy;

static LINK_FINDER: Lazy<LinkFinder> = Lazy::new(LinkFinder::new);

/// Schemes turned into links. Anything else stays text.
const LINK_SCHEMES: &[&str] = &["http", "https", "ftp"];

pub(super) const LINK_REL: &str = "noopener noreferrer";

/// Render plain text as an HTML fragment.
///
/// Returns `None` when the text has no visible content. The output only
/// uses markup that the HTML sanitizer keeps unchanged.
pub(super) fn render(text: &str, max_quote_depth: usize, link_urls: bool) -> Option<String> {
    let text = clean_text(text);
    let text = text.trim_end();
    if text.trim().is_empty() {
        return None;
    }

    let mut out = String::with_capacity(text.len() + text.len() / 4 + 64);
    out.push_str("<div class=\"plaintext\">");

    let mut open_depth = 0;
    for line in text.split('\n') {
        let (depth, content) = quote_level(line, max_quote_depth);
        while open_depth < depth {
            out.push_str("<blockquote class=\"quote\">");
            open_depth += 1;
        }
        while open_depth > depth {
            out.push_str("</blockquote>");
            open_depth -= 1;
        }
        push_line(&mut out, content, link_urls);
        out.push_str("<br>\n");
    }
    for _ in 0..open_depth {
        out.push_str("</blockquote>");
    }

    out.push_str("</div>");
    Some(out)
}

/// Drop NULs and fold every line ending to `\n`.
fn clean_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\0', "")
}

/// Quote depth of a line (capped) and the line without its markers.
///
/// `"> > text"` and `">>text"` are both depth 2. With a cap of zero quoting
/// is disabled and lines pass through untouched.
fn quote_level(line: &str, max_depth: usize) -> (usize, &str) {
    if max_depth == 0 || !line.starts_with('>') {
        return (0, line);
    }
    let mut depth = 0;
    let mut rest = line;
    while let Some(after) = rest.strip_prefix('>') {
        depth += 1;
        rest = after;
        let skipped = rest.trim_start_matches(' ');
        if skipped.starts_with('>') {
            rest = skipped;
        }
    }
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    (depth.min(max_depth), rest)
}

fn push_line(out: &mut String, line: &str, link_urls: bool) {
    if !link_urls {
        escape_text(line, out);
        return;
    }
    for span in LINK_FINDER.spans(line) {
        let s = span.as_str();
        match span.kind() {
            Some(LinkKind::Url) if is_linkable_url(s) => push_anchor(out, s, s),
            Some(LinkKind::Email) => push_anchor(out, &format!("mailto:{s}"), s),
            _ => escape_text(s, out),
        }
    }
}

fn is_linkable_url(s: &str) -> bool {
    url::Url::parse(s)
        .map(|u| LINK_SCHEMES.contains(&u.scheme()))
        .unwrap_or(false)
}

fn push_anchor(out: &mut String, href: &str, text: &str) {
    out.push_str("<a href=\"");
    escape_attr(href, out);
    out.push_str("\" rel=\"");
    out.push_str(LINK_REL);
    out.push_str("\">");
    escape_text(text, out);
    out.push_str("</a>");
}

/// Escape text content the way an HTML serializer does.
pub(super) fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

/// Undo `format=flowed` (RFC 3676): join soft-broken lines of equal quote
/// depth and remove space-stuffing. With `delsp` the trailing space of a
/// soft break is deleted instead of kept.
pub(super) fn unflow(text: &str, delsp: bool) -> String {
    let text = text.replace("\r\n", "\n");
    let mut lines: Vec<String> = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for raw in text.split('\n') {
        let depth = raw.bytes().take_while(|&b| b == b'>').count();
        let rest = &raw[depth..];
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        let soft = rest.ends_with(' ') && rest != "-- ";
        let content = if soft && delsp {
            &rest[..rest.len() - 1]
        } else {
            rest
        };

        let mut current = match pending.take() {
            Some((d, acc)) if d == depth => acc,
            Some((d, acc)) => {
                lines.push(requote(d, &acc));
                String::new()
            }
            None => String::new(),
        };
        current.push_str(content);

        if soft {
            pending = Some((depth, current));
        } else {
            lines.push(requote(depth, &current));
        }
    }
    if let Some((d, acc)) = pending {
        lines.push(requote(d, &acc));
    }
    lines.join("\n")
}

fn requote(depth: usize, content: &str) -> String {
    if depth == 0 {
        content.to_string()
    } else {
        format!("{} {content}", ">".repeat(depth))
    }
}
