//! Subject line normalization and slugs.

use once_cell::sync::Lazy;
use regex::Regex;

/// Shown when a subject is empty once prefixes are gone.
pub const DEFAULT_SUBJECT: &str = "(No subject)";

static WAS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*was:?\s+([^)]*)\)").expect("valid regex"));
static ATTACHMENTS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\[\s*\d+\s+attachments?\s*\]\s*$").expect("valid regex"));
static BRACKET_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[[^\]]*\]\s*").expect("valid regex"));
static PREFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(re|fwd?|aw|sv|vs)(\[\d+\]|\d+)?\s*:\s*").expect("valid regex")
});
static SLUG_SPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_]+").expect("valid regex"));
static SLUG_STRIP_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w-]").expect("valid regex"));
static SLUG_DASH_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("valid regex"));

/// Thread title for a subject line.
///
/// - `"Re: Fwd: [list] Hello"` → `"Hello"`
/// - `"New topic (was: Old topic)"` → `"Old topic"`
/// - `"Photos [2 Attachments]"` → `"Photos"`
/// - `""` or `"Re: "` → `"(No subject)"`
pub fn normalize_subject(subject: &str) -> String {
    let mut subject = match WAS_REGEX.captures(subject) {
        Some(caps) => caps[1].trim().to_string(),
        None => subject.to_string(),
    };
    subject = ATTACHMENTS_REGEX.replace(&subject, "").into_owned();

    loop {
        let before = subject.len();
        subject = BRACKET_REGEX.replace(&subject, "").into_owned();
        subject = PREFIX_REGEX.replace(&subject, "").into_owned();
        if subject.len() == before {
            break;
        }
    }

    let trimmed = subject.trim();
    if trimmed.is_empty() {
        DEFAULT_SUBJECT.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `true` if the subject starts with a reply or forward marker, possibly
/// after `[list]` tags.
pub fn has_reply_prefix(subject: &str) -> bool {
    let untagged = BRACKET_REGEX.replace(subject, "");
    PREFIX_REGEX.is_match(&untagged)
}

/// Filesystem-safe form of a title: lowercase words joined by hyphens.
pub fn slugify(text: &str) -> String {
    let lower = text.to_lowercase();
    let dashed = SLUG_SPACE_REGEX.replace_all(&lower, "-");
    let stripped = SLUG_STRIP_REGEX.replace_all(&dashed, "");
    let collapsed = SLUG_DASH_REGEX.replace_all(&stripped, "-");
    collapsed.trim_matches('-').to_string()
}
