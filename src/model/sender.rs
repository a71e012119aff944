//! Sender parsing for the `From:` header.

use serde::{Deserialize, Serialize};

/// Who sent a message.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `display_name = "Juan García"`, `address = "juan@ejemplo.com"`
/// - `"juan@ejemplo.com (Juan García)"` → same as above
/// - `"juan@ejemplo.com"` → `display_name = ""`, `address = "juan@ejemplo.com"`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sender {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (may be empty or not an address at all).
    pub address: String,
}

impl Sender {
    /// Parse a single decoded `From:` value.
    ///
    /// Supported formats:
    /// - `"Display Name <user@domain>"` and `"\"Last, First\" <user@domain>"`
    /// - `"<user@domain>"`
    /// - `"user@domain (Display Name)"` (old-style comment form)
    /// - `"user@domain"`
    ///
    /// Anything else is kept verbatim as the display name so it is not lost.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }

        if let Some((name, addr)) = split_angle_form(trimmed) {
            return Self {
                display_name: unquote(name),
                address: addr.to_string(),
            };
        }

        if let Some((addr, comment)) = split_comment_form(trimmed) {
            return Self {
                display_name: unquote(comment),
                address: addr.to_string(),
            };
        }

        if trimmed.contains('@') && !trimmed.contains(char::is_whitespace) {
            return Self {
                display_name: String::new(),
                address: trimmed.to_string(),
            };
        }

        Self {
            display_name: unquote(trimmed),
            address: String::new(),
        }
    }

    /// Name for display: the display name, else the address, else `"Unknown"`.
    pub fn display(&self) -> &str {
        if !self.display_name.is_empty() {
            &self.display_name
        } else if !self.address.is_empty() {
            &self.address
        } else {
            "Unknown"
        }
    }
}

/// `Name <addr>` → `(Name, addr)`. The last `<…>` pair wins.
fn split_angle_form(s: &str) -> Option<(&str, &str)> {
    let open = s.rfind('<')?;
    let close = open + s[open..].find('>')?;
    let addr = s[open + 1..close].trim();
    let name = s[..open].trim();
    Some((name, addr))
}

/// `addr (Name)` → `(addr, Name)`.
fn split_comment_form(s: &str) -> Option<(&str, &str)> {
    let inner = s.strip_suffix(')')?;
    let open = inner.find('(')?;
    let addr = inner[..open].trim();
    if !addr.contains('@') || addr.contains(char::is_whitespace) {
        return None;
    }
    Some((addr, inner[open + 1..].trim()))
}

/// Strip one level of surrounding double quotes and unescape `\"`.
fn unquote(s: &str) -> String {
    let trimmed = s.trim();
    let inner = trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed);
    inner.replace("\\\"", "\"").trim().to_string()
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.display_name.is_empty(), self.address.is_empty()) {
            (false, false) => write!(f, "{} <{}>", self.display_name, self.address),
            _ => f.write_str(self.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_address() {
        let s = Sender::parse("user@example.com");
        assert_eq!(s.address, "user@example.com");
        assert_eq!(s.display_name, "");
        assert_eq!(s.display(), "user@example.com");
    }

    #[test]
    fn test_parse_angle_only() {
        let s = Sender::parse("<user@example.com>");
        assert_eq!(s.address, "user@example.com");
        assert_eq!(s.display_name, "");
    }

    #[test]
    fn test_parse_quoted_name_with_comma() {
        let s = Sender::parse("\"Last, First\" <user@example.com>");
        assert_eq!(s.display_name, "Last, First");
        assert_eq!(s.address, "user@example.com");
    }

    #[test]
    fn test_parse_comment_form() {
        let s = Sender::parse("trail@example.org (Trail Walker)");
        assert_eq!(s.address, "trail@example.org");
        assert_eq!(s.display_name, "Trail Walker");
    }

    #[test]
    fn test_parse_name_only_is_kept() {
        let s = Sender::parse("Just A Name");
        assert_eq!(s.display_name, "Just A Name");
        assert!(s.address.is_empty());
    }

    #[test]
    fn test_empty_is_unknown() {
        let s = Sender::parse("   ");
        assert_eq!(s, Sender::default());
        assert_eq!(s.display(), "Unknown");
    }

    #[test]
    fn test_display_format() {
        let s = Sender::parse("Alice <alice@example.com>");
        assert_eq!(s.to_string(), "Alice <alice@example.com>");
    }
}
