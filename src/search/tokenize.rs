//! Tokenization shared by index building and query matching.

use std::collections::HashSet;

/// Lowercased alphanumeric runs of `text`, at least `min_len` characters
/// long, each kept once in order of first occurrence. At most `cap` tokens
/// are returned (`0` = no limit).
pub fn tokenize(text: &str, min_len: usize, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        if raw.is_empty() || raw.chars().count() < min_len {
            continue;
        }
        let token = raw.to_lowercase();
        if seen.insert(token.clone()) {
            tokens.push(token);
            if cap != 0 && tokens.len() == cap {
                break;
            }
        }
    }
    tokens
}

/// Query-side split: same boundaries and case folding, no length floor.
pub fn query_tokens(text: &str) -> Vec<String> {
    tokenize(text, 1, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_basic() {
        assert_eq!(
            tokenize("Hello, World! hello-again", 2, 0),
            vec!["hello", "world", "again"]
        );
    }

    #[test]
    fn test_tokenize_min_length() {
        assert_eq!(tokenize("a an the I x2", 2, 0), vec!["an", "the", "x2"]);
        assert_eq!(tokenize("a an the", 3, 0), vec!["the"]);
    }

    #[test]
    fn test_tokenize_unicode() {
        assert_eq!(tokenize("Café ÜBER straße", 2, 0), vec!["café", "über", "straße"]);
    }

    #[test]
    fn test_tokenize_cap() {
        assert_eq!(tokenize("one two three four", 1, 2), vec!["one", "two"]);
    }

    #[test]
    fn test_query_tokens() {
        assert_eq!(query_tokens("e-mail"), vec!["e", "mail"]);
        assert!(query_tokens("!!!").is_empty());
    }
}
