//! Find / replace over the buffer text. Offsets are characters.

use crate::highlight::CharIndex;
use std::ops::Range;

/// Next occurrence of `needle` at or after `from`, wrapping around to the
/// start of the buffer.
pub fn find_next(text: &str, needle: &str, from: usize) -> Option<Range<usize>> {
    if needle.is_empty() {
        return None;
    }
    let index = CharIndex::new(text);
    let from_byte = index.to_byte(from.min(index.char_count()));
    let byte = text[from_byte..]
        .find(needle)
        .map(|b| b + from_byte)
        .or_else(|| text.find(needle))?;
    let start = index.to_char(byte);
    Some(start..start + needle.chars().count())
}

/// Every non-overlapping occurrence of `needle`.
pub fn find_all(text: &str, needle: &str) -> Vec<Range<usize>> {
    if needle.is_empty() {
        return Vec::new();
    }
    let index = CharIndex::new(text);
    let len = needle.chars().count();
    text.match_indices(needle)
        .map(|(b, _)| {
            let start = index.to_char(b);
            start..start + len
        })
        .collect()
}

/// Replaces every occurrence; returns the new text and the count.
pub fn replace_all(text: &str, needle: &str, replacement: &str) -> (String, usize) {
    if needle.is_empty() {
        return (text.to_string(), 0);
    }
    let count = text.matches(needle).count();
    (text.replace(needle, replacement), count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_next_and_wrap() {
        let text = "foo bar foo";
        assert_eq!(find_next(text, "foo", 0), Some(0..3));
        assert_eq!(find_next(text, "foo", 1), Some(8..11));
        assert_eq!(find_next(text, "foo", 9), Some(0..3));
        assert_eq!(find_next(text, "baz", 0), None);
        assert_eq!(find_next(text, "", 0), None);
        assert_eq!(find_next(text, "foo", 100), Some(0..3));
    }

    #[test]
    fn test_find_next_counts_characters() {
        let text = "żółw i żółw";
        assert_eq!(find_next(text, "żółw", 1), Some(7..11));
    }

    #[test]
    fn test_find_all() {
        assert_eq!(find_all("aXbXc", "X"), vec![1..2, 3..4]);
        assert!(find_all("abc", "").is_empty());
    }

    #[test]
    fn test_replace_all() {
        assert_eq!(replace_all("a.b.c", ".", "::"), ("a::b::c".to_string(), 2));
        assert_eq!(replace_all("abc", "x", "y"), ("abc".to_string(), 0));
        assert_eq!(replace_all("abc", "", "y"), ("abc".to_string(), 0));
    }
}
