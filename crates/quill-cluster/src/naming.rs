//! Cluster name derivation.
//!
//! Cluster names are a cheap heuristic over member text, not an LLM call:
//! strip punctuation, keep the first few tokens of at least two characters,
//! cap the total length. Good enough for a sidebar label; the bulk preview
//! path owns proper LLM-generated topic names.

use quill_core::defaults;

/// Derive a cluster name from note text.
///
/// Takes up to `max_tokens` tokens of length >= 2 (punctuation stripped),
/// joined by spaces, truncated to `max_chars` on a char boundary, with the
/// first letter upcased. Falls back to [`defaults::FALLBACK_CLUSTER_NAME`]
/// when no usable token exists.
pub fn derive_cluster_name(text: &str, max_tokens: usize, max_chars: usize) -> String {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|token| token.chars().count() >= 2)
        .take(max_tokens)
        .collect();

    if tokens.is_empty() {
        return defaults::FALLBACK_CLUSTER_NAME.to_string();
    }

    let joined = tokens.join(" ");
    let truncated: String = joined.chars().take(max_chars).collect();
    capitalize(truncated.trim_end())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Derive a name from several member texts, sampling the first few.
pub fn derive_cluster_name_from_members<'a, I>(texts: I, max_tokens: usize, max_chars: usize) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let sample: Vec<&str> = texts.into_iter().take(5).collect();
    derive_cluster_name(&sample.join(" "), max_tokens, max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(text: &str) -> String {
        derive_cluster_name(text, defaults::NAME_MAX_TOKENS, defaults::NAME_MAX_CHARS)
    }

    #[test]
    fn test_basic_name() {
        assert_eq!(name("buy oat milk tomorrow"), "Buy oat mi");
    }

    #[test]
    fn test_strips_punctuation() {
        assert_eq!(name("to-do: call mom!"), "Todo call");
    }

    #[test]
    fn test_skips_short_tokens() {
        // "a" and "i" fall below the 2-char token floor.
        assert_eq!(name("a i plan trips"), "Plan trips");
    }

    #[test]
    fn test_fallback_on_no_usable_tokens() {
        assert_eq!(name("! ? ."), defaults::FALLBACK_CLUSTER_NAME);
        assert_eq!(name(""), defaults::FALLBACK_CLUSTER_NAME);
        assert_eq!(name("a b c"), defaults::FALLBACK_CLUSTER_NAME);
    }

    #[test]
    fn test_char_cap_respects_boundaries() {
        let n = name("héllo wörld again");
        assert!(n.chars().count() <= defaults::NAME_MAX_CHARS);
        assert!(n.starts_with("Héllo"));
    }

    #[test]
    fn test_name_from_members_samples_texts() {
        let texts = ["grocery run", "buy bread", "milk eggs"];
        let n = derive_cluster_name_from_members(
            texts.iter().copied(),
            defaults::NAME_MAX_TOKENS,
            defaults::NAME_MAX_CHARS,
        );
        assert_eq!(n, "Grocery ru");
    }
}
