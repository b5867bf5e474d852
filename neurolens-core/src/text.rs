//! Text tokenization helpers shared by the lexical and timing statistics.
//!
//! Word tokens follow Penn-Treebank conventions: punctuation marks and contraction
//! suffixes (`n't`, `'s`, `'re`, ...) are tokens of their own, and a run of periods
//! (the pause marker) is a single token. Tokens are lowercased.

use regex::Regex;
use std::sync::OnceLock;

const CONTRACTION_SUFFIXES: [&str; 6] = ["'s", "'re", "'ve", "'ll", "'d", "'m"];

fn pause_marker_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.\.\.|<pause>").ok()).as_ref()
}

fn sentence_boundary_regex() -> Option<&'static Regex> {
    // Terminal punctuation followed by whitespace and an uppercase/digit/quote start.
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[.!?]+["')\]]*\s+["'(\[]*[A-Z0-9]"#).ok())
        .as_ref()
}

/// Number of explicit pause markers (`...` or `<pause>`) in the text.
pub fn count_pause_markers(text: &str) -> usize {
    match pause_marker_regex() {
        Some(re) => re.find_iter(text).count(),
        None => text.matches("...").count() + text.matches("<pause>").count(),
    }
}

/// Lowercased word tokens.
pub fn tokenize_words(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for chunk in text.split_whitespace() {
        split_chunk(&chunk.to_lowercase(), &mut tokens);
    }
    tokens
}

fn split_chunk(chunk: &str, out: &mut Vec<String>) {
    let chars: Vec<char> = chunk.chars().collect();
    let is_word_char = |c: char| c.is_alphanumeric() || c == '\'' || c == '-';

    let mut start = 0;
    while start < chars.len() && !chars[start].is_alphanumeric() {
        start = push_punct(&chars, start, out);
    }

    let mut end = chars.len();
    while end > start && !chars[end - 1].is_alphanumeric() {
        end -= 1;
    }

    if start < end {
        // Interior punctuation other than apostrophes/hyphens splits the word.
        let mut word_start = start;
        let mut i = start;
        while i < end {
            if is_word_char(chars[i]) {
                i += 1;
                continue;
            }
            push_word(&chars[word_start..i].iter().collect::<String>(), out);
            i = push_punct(&chars, i, out);
            word_start = i;
        }
        if word_start < end {
            push_word(&chars[word_start..end].iter().collect::<String>(), out);
        }
    }

    let mut i = end.max(start);
    while i < chars.len() {
        i = push_punct(&chars, i, out);
    }
}

/// Push the punctuation token starting at `i`; consecutive periods form one token.
fn push_punct(chars: &[char], i: usize, out: &mut Vec<String>) -> usize {
    if chars[i] == '.' {
        let mut j = i;
        while j < chars.len() && chars[j] == '.' {
            j += 1;
        }
        out.push(chars[i..j].iter().collect());
        j
    } else {
        out.push(chars[i].to_string());
        i + 1
    }
}

fn push_word(word: &str, out: &mut Vec<String>) {
    let word = word.trim_matches(|c: char| c == '\'' || c == '-');
    if word.is_empty() {
        return;
    }
    if let Some(stem) = word.strip_suffix("n't") {
        if !stem.is_empty() {
            out.push(stem.to_string());
            out.push("n't".to_string());
            return;
        }
    }
    for suffix in CONTRACTION_SUFFIXES {
        if let Some(stem) = word.strip_suffix(suffix) {
            if !stem.is_empty() {
                out.push(stem.to_string());
                out.push(suffix.to_string());
                return;
            }
        }
    }
    out.push(word.to_string());
}

/// Sentences of the text; an ellipsis inside a sentence does not end it.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut sentences = Vec::new();
    let mut last = 0;
    let Some(boundary) = sentence_boundary_regex() else {
        return vec![trimmed];
    };
    for m in boundary.find_iter(trimmed) {
        let matched = m.as_str();
        // The match ends on the first character of the next sentence (plus any
        // opening quote); cut right after the whitespace run.
        let ws = matched
            .char_indices()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, _)| i)
            .unwrap_or(matched.len());
        if matched.starts_with("..") {
            continue;
        }
        let cut = m.start() + ws;
        let sentence = trimmed[last..cut].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        last = cut;
    }
    let tail = trimmed[last..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Whitespace-delimited words left after stripping punctuation.
pub fn lexicon_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| w.chars().any(|c| c.is_alphanumeric()))
        .count()
}

/// Estimated English syllables across the whole text.
pub fn syllable_count(text: &str) -> usize {
    text.split_whitespace().map(word_syllables).sum()
}

fn word_syllables(raw: &str) -> usize {
    let word: String = raw
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();
    if word.is_empty() {
        return 0;
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let chars: Vec<char> = word.chars().collect();

    let mut groups = 0;
    let mut prev_vowel = false;
    for &c in &chars {
        let v = is_vowel(c);
        if v && !prev_vowel {
            groups += 1;
        }
        prev_vowel = v;
    }

    // Silent trailing "e" ("make"), but not "-le" ("table") or a lone vowel ("the").
    let n = chars.len();
    if n > 2 && chars[n - 1] == 'e' && !is_vowel(chars[n - 2]) && chars[n - 2] != 'l' && groups > 1 {
        groups -= 1;
    }

    groups.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_punctuation() {
        assert_eq!(
            tokenize_words("Hello, world."),
            vec!["hello", ",", "world", "."]
        );
    }

    #[test]
    fn test_tokenize_splits_contractions() {
        assert_eq!(
            tokenize_words("I don't think it's here"),
            vec!["i", "do", "n't", "think", "it", "'s", "here"]
        );
    }

    #[test]
    fn test_tokenize_keeps_ellipsis_as_one_token() {
        assert_eq!(tokenize_words("hello ... world"), vec!["hello", "...", "world"]);
        assert_eq!(tokenize_words("well...yes"), vec!["well", "...", "yes"]);
    }

    #[test]
    fn test_tokenize_keeps_hyphenated_words() {
        assert_eq!(tokenize_words("a well-known place"), vec!["a", "well-known", "place"]);
    }

    #[test]
    fn test_tokenize_empty_input() {
        assert!(tokenize_words("").is_empty());
        assert!(tokenize_words("   \n\t").is_empty());
    }

    #[test]
    fn test_split_sentences_basic() {
        let s = split_sentences("I went home. Then I slept! Did you?");
        assert_eq!(s, vec!["I went home.", "Then I slept!", "Did you?"]);
    }

    #[test]
    fn test_split_sentences_ellipsis_does_not_break() {
        let s = split_sentences("I was ... Going somewhere");
        assert_eq!(s.len(), 1);
        let s = split_sentences("hello ... world");
        assert_eq!(s, vec!["hello ... world"]);
    }

    #[test]
    fn test_split_sentences_empty() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("  ").is_empty());
    }

    #[test]
    fn test_count_pause_markers() {
        assert_eq!(count_pause_markers("a ... b <pause> c"), 2);
        assert_eq!(count_pause_markers("no pauses here."), 0);
    }

    #[test]
    fn test_patterns_compile() {
        assert!(pause_marker_regex().is_some());
        assert!(sentence_boundary_regex().is_some());
    }

    #[test]
    fn test_lexicon_count_ignores_punctuation_only_words() {
        assert_eq!(lexicon_count("hello ... world, again!"), 3);
        assert_eq!(lexicon_count(""), 0);
    }

    #[test]
    fn test_syllable_count() {
        assert_eq!(word_syllables("cat"), 1);
        assert_eq!(word_syllables("make"), 1);
        assert_eq!(word_syllables("table"), 2);
        assert_eq!(word_syllables("the"), 1);
        assert_eq!(word_syllables("banana"), 3);
        assert_eq!(word_syllables("..."), 0);
        assert_eq!(syllable_count("hello ... world"), 3);
    }
}
