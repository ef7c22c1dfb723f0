//! Deterministic tokenization shared by document-term accounting and the
//! statistical strategy's coverage/novelty math.
//!
//! Lowercasing is the caller's responsibility — callers that need
//! case-insensitive comparison lowercase before calling `tokenize`, so that
//! this function stays a pure, Unicode-aware character split with no
//! locale-dependent behavior baked in.

use regex::Regex;
use std::sync::OnceLock;

fn non_word_or_space() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("static regex is valid"))
}

/// Replace every character that is not a word character or whitespace with
/// a space, split on whitespace, and drop tokens of length <= 2.
///
/// No stemming, no stop-word list. Deterministic: equal input always
/// produces equal output, which both the coverage computation and the
/// document-term index rely on seeing the same stream.
pub fn tokenize(s: &str) -> Vec<String> {
    let cleaned = non_word_or_space().replace_all(s, " ");
    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn drops_short_tokens() {
        let toks = tokenize("a an the cat sat on it");
        assert_eq!(toks, vec!["the", "cat", "sat"]);
    }

    #[test]
    fn strips_punctuation() {
        let toks = tokenize("hello, world! it's rust-lang.");
        assert_eq!(toks, vec!["hello", "world", "rust", "lang"]);
    }

    #[test]
    fn empty_string_yields_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
        assert!(tokenize("!!").is_empty());
    }

    #[test]
    fn idempotent_for_ascii() {
        let s = "The Quick-Brown Fox, jumps over: the lazy dog!";
        let once = tokenize(s);
        let rejoined = once.join(" ");
        let twice = tokenize(&rejoined);
        assert_eq!(once, twice);
    }

    #[test]
    fn unicode_word_chars_are_preserved() {
        let toks = tokenize("café naïve résumé");
        let set: HashSet<_> = toks.into_iter().collect();
        assert!(set.contains("café"));
        assert!(set.contains("naïve"));
        assert!(set.contains("résumé"));
    }
}
