//! Pure mapping from a raw operator utterance to a `ClassifiedQuery`.
//!
//! Mirrors the shape of `deepseek-agent`'s `local_routing::should_use_local`:
//! plain keyword lists, no I/O, no model calls, exhaustively unit tested.

use std::collections::BTreeSet;

use xi_core::{ClassifiedQuery, QueryScope, HIDDEN_SENTINEL};

const COUNTING_PHRASES: &[&str] = &["how many", "count"];

const EXCLUSION_PHRASES: &[&str] = &["excluding", "gitignore", "ignore"];

const RECURSIVE_SYNONYMS: &[&str] = &[
    "recursively",
    "subfolders",
    "subfolder",
    "subdirectories",
    "subdirectory",
    "tree",
    "under",
    "all levels",
    "nested",
];

/// `(alias, expansion)` pairs. Checked in order; first match wins per
/// alias, but all aliases present in the utterance contribute extensions.
const LANGUAGE_ALIASES: &[(&str, &[&str])] = &[
    ("python", &["py"]),
    ("javascript", &["js", "jsx"]),
    ("typescript", &["ts", "tsx"]),
    ("rust", &["rs"]),
    ("markdown", &["md", "markdown"]),
    ("hidden", &[HIDDEN_SENTINEL]),
];

const FACTUAL_PHRASES: &[&str] = &[
    "where am i",
    "working directory",
    "framework version",
    "active model",
    "what mode",
    "current mode",
    "which workspace",
];

/// Classify a raw operator utterance. Pure and referentially transparent:
/// the same input always produces the same output, with no I/O performed.
pub fn classify(utterance: &str) -> ClassifiedQuery {
    let normalized = normalize(utterance);

    let is_counting = contains_any(&normalized, COUNTING_PHRASES);
    let is_exclusionary = contains_any(&normalized, EXCLUSION_PHRASES);

    if is_counting && is_exclusionary {
        return ClassifiedQuery::Reasoning;
    }

    if is_counting {
        let scope = if contains_any(&normalized, RECURSIVE_SYNONYMS) {
            QueryScope::Recursive
        } else {
            QueryScope::Local
        };
        let extensions = extract_extensions(&normalized);
        if scope == QueryScope::Recursive || !extensions.is_empty() {
            return ClassifiedQuery::Computed { scope, extensions };
        }
        return ClassifiedQuery::Static;
    }

    if contains_any(&normalized, FACTUAL_PHRASES) {
        return ClassifiedQuery::Static;
    }

    ClassifiedQuery::Reasoning
}

fn normalize(utterance: &str) -> String {
    utterance
        .trim()
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?'))
        .to_lowercase()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Union of explicit dotted suffixes (`.<1-6 alphanumerics>`) and language
/// alias expansions found in the normalized utterance.
fn extract_extensions(normalized: &str) -> BTreeSet<String> {
    let mut extensions = BTreeSet::new();

    let bytes = normalized.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'.' {
            let rest = &normalized[i + 1..];
            let suffix_len = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .count();
            if (1..=6).contains(&suffix_len) {
                let candidate: String = rest.chars().take(suffix_len).collect();
                // Don't treat a trailing-sentence period ("... files.") as
                // an extension when nothing alphanumeric follows it.
                extensions.insert(candidate);
            }
        }
        i += 1;
    }

    for (alias, expansion) in LANGUAGE_ALIASES {
        if normalized.contains(alias) {
            for ext in *expansion {
                extensions.insert(ext.to_string());
            }
        }
    }

    extensions
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn classify_never_panics_on_arbitrary_text(text in ".{0,200}") {
            let _ = classify(&text);
        }

        #[test]
        fn classify_is_pure_for_any_input(text in ".{0,200}") {
            prop_assert_eq!(classify(&text), classify(&text));
        }
    }

    #[test]
    fn counting_with_exclusion_forces_reasoning() {
        let result = classify("how many files are there excluding the gitignore entries");
        assert_eq!(result, ClassifiedQuery::Reasoning);
    }

    #[test]
    fn plain_counting_is_static() {
        let result = classify("how many files are in this directory");
        assert_eq!(result, ClassifiedQuery::Static);
    }

    #[test]
    fn counting_with_extension_is_computed_local() {
        let result = classify("count the .rs files here");
        match result {
            ClassifiedQuery::Computed { scope, extensions } => {
                assert_eq!(scope, QueryScope::Local);
                assert!(extensions.contains("rs"));
            }
            other => panic!("expected Computed, got {other:?}"),
        }
    }

    #[test]
    fn counting_recursively_is_computed_recursive_even_without_extension() {
        let result = classify("how many files exist recursively under this tree");
        match result {
            ClassifiedQuery::Computed { scope, extensions } => {
                assert_eq!(scope, QueryScope::Recursive);
                assert!(extensions.is_empty());
            }
            other => panic!("expected Computed, got {other:?}"),
        }
    }

    #[test]
    fn language_alias_expands_to_multiple_extensions() {
        let result = classify("count the javascript files in subfolders");
        match result {
            ClassifiedQuery::Computed { scope, extensions } => {
                assert_eq!(scope, QueryScope::Recursive);
                assert!(extensions.contains("js"));
                assert!(extensions.contains("jsx"));
            }
            other => panic!("expected Computed, got {other:?}"),
        }
    }

    #[test]
    fn hidden_keyword_maps_to_sentinel() {
        let result = classify("how many hidden files are there");
        match result {
            ClassifiedQuery::Computed { extensions, .. } => {
                assert!(extensions.contains(HIDDEN_SENTINEL));
            }
            other => panic!("expected Computed, got {other:?}"),
        }
    }

    #[test]
    fn factual_phrase_is_static() {
        assert_eq!(classify("where am i"), ClassifiedQuery::Static);
        assert_eq!(classify("What is the active model?"), ClassifiedQuery::Static);
    }

    #[test]
    fn open_ended_prompt_is_reasoning() {
        let result = classify("refactor the authentication module to use sessions");
        assert_eq!(result, ClassifiedQuery::Reasoning);
    }

    #[test]
    fn classification_is_idempotent_and_pure() {
        let input = "count the .py files recursively";
        assert_eq!(classify(input), classify(input));
    }

    #[test]
    fn case_and_trailing_punctuation_do_not_affect_classification() {
        assert_eq!(classify("Where Am I?"), classify("where am i"));
    }
}
