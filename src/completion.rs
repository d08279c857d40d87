//! Static completion candidates for the autocomplete popup.
//!
//! Candidates come from Python keywords, builtins and every identifier that
//! already appears in the buffer.

use crate::constants::MAX_COMPLETIONS;
use crate::highlight::CharIndex;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

const PYTHON_BUILTINS: &[&str] = &[
    "abs", "all", "any", "bool", "bytes", "callable", "chr", "dict", "dir", "divmod",
    "enumerate", "Exception", "filter", "float", "format", "frozenset", "getattr", "hasattr",
    "hash", "help", "hex", "id", "input", "int", "isinstance", "issubclass", "iter", "len",
    "list", "map", "max", "min", "next", "object", "open", "ord", "pow", "print", "property",
    "range", "repr", "reversed", "round", "self", "set", "setattr", "slice", "sorted",
    "staticmethod", "str", "sum", "super", "tuple", "type", "ValueError", "zip",
];

fn identifier_regex() -> &'static Regex {
    static IDENT_REGEX: OnceLock<Regex> = OnceLock::new();
    IDENT_REGEX.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap())
}

/// Same alphabet as `identifier_regex`.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Start offset and text of the identifier fragment ending at `cursor`.
pub fn word_prefix(text: &str, cursor: usize) -> (usize, String) {
    let before: Vec<char> = text.chars().take(cursor).collect();
    let start = before
        .iter()
        .rposition(|&c| !is_word_char(c))
        .map_or(0, |p| p + 1);
    (start, before[start..].iter().collect())
}

/// Completion candidates for the fragment before `cursor`.
pub fn complete(text: &str, cursor: usize) -> Vec<String> {
    let (start, prefix) = word_prefix(text, cursor);
    if prefix.is_empty() || prefix.starts_with(|c: char| c.is_ascii_digit()) {
        return Vec::new();
    }

    let index = CharIndex::new(text);
    let fragment_start = index.to_byte(start);
    let buffer_words = identifier_regex()
        .find_iter(text)
        .filter(|m| m.start() != fragment_start)
        .map(|m| m.as_str());

    let candidates: BTreeSet<&str> = PYTHON_KEYWORDS
        .iter()
        .chain(PYTHON_BUILTINS)
        .copied()
        .chain(buffer_words)
        .filter(|w| w.starts_with(prefix.as_str()) && *w != prefix)
        .collect();

    candidates
        .into_iter()
        .take(MAX_COMPLETIONS)
        .map(str::to_string)
        .collect()
}

/// Replaces the fragment before `cursor` with `word`; returns the new text
/// and cursor position.
pub fn apply_completion(text: &str, cursor: usize, word: &str) -> (String, usize) {
    let (start, _) = word_prefix(text, cursor);
    let index = CharIndex::new(text);
    let (head, tail) = (&text[..index.to_byte(start)], &text[index.to_byte(cursor)..]);
    let new_cursor = start + word.chars().count();
    (format!("{}{}{}", head, word, tail), new_cursor)
}
