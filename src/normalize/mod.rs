//! Body normalization: every body becomes sanitized HTML that can be
//! embedded as-is.
//!
//! Plain text goes through escaping, quote detection and linking; HTML goes
//! through `ammonia`. Both paths produce output that the HTML path leaves
//! unchanged, so normalizing an already-normalized body is a no-op.

mod html;
mod text;

pub use html::{html_to_text, sanitize};

use crate::config::NormalizeConfig;
use crate::error::{Degradation, Degraded};

/// Marker body for messages without any renderable content.
pub const NO_CONTENT_HTML: &str = "<div class=\"no-content\">(no content)</div>";

/// Raw body content as selected from the message, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySource {
    /// An HTML fragment or document.
    Html(String),
    /// Plain text. `flowed` / `delsp` mirror the `format=flowed` parameters.
    Text {
        text: String,
        flowed: bool,
        delsp: bool,
    },
    /// Nothing renderable was found.
    Empty,
}

/// Converts selected bodies to safe HTML.
#[derive(Debug, Clone)]
pub struct Normalizer {
    max_quote_depth: usize,
    link_urls: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&NormalizeConfig::default())
    }
}

impl Normalizer {
    pub fn new(config: &NormalizeConfig) -> Self {
        Self {
            max_quote_depth: config.max_quote_depth,
            link_urls: config.link_urls,
        }
    }

    /// Normalize a body. Never fails; a body that cannot be sanitized
    /// falls back to the plain-text path.
    pub fn normalize(&self, body: &BodySource) -> Degraded<String> {
        match body {
            BodySource::Html(html) => self.normalize_html(html),
            BodySource::Text {
                text,
                flowed: true,
                delsp,
            } => Degraded::clean(self.normalize_text(&text::unflow(text, *delsp))),
            BodySource::Text { text, .. } => Degraded::clean(self.normalize_text(text)),
            BodySource::Empty => Degraded::clean(NO_CONTENT_HTML.to_string()),
        }
    }

    /// Plain text to HTML.
    pub fn normalize_text(&self, text: &str) -> String {
        text::render(text, self.max_quote_depth, self.link_urls)
            .unwrap_or_else(|| NO_CONTENT_HTML.to_string())
    }

    /// Sanitize an HTML body.
    ///
    /// When sanitizing leaves no visible text although a plain tag strip of
    /// the input finds some, that text is rendered through the plain-text
    /// path instead and [`Degradation::BodyUnsanitizable`] is reported.
    pub fn normalize_html(&self, raw: &str) -> Degraded<String> {
        self.settle(sanitize(raw), raw)
    }

    fn settle(&self, sanitized: String, raw: &str) -> Degraded<String> {
        if !html_to_text(&sanitized).is_empty() {
            return Degraded::clean(sanitized);
        }
        let salvaged = html_to_text(raw);
        if salvaged.is_empty() {
            return Degraded::clean(NO_CONTENT_HTML.to_string());
        }
        Degraded::with(
            self.normalize_text(&salvaged),
            Degradation::BodyUnsanitizable(format!(
                "sanitized HTML had no visible text, kept {} characters as plain text",
                salvaged.chars().count()
            )),
        )
    }
}
