//! Bracket and quote matching around the cursor, plus the auto-pairing
//! rules used by the editor key handler.
//!
//! All positions are character offsets into the buffer.

/// Positions of a matched pair, in buffer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BracketMatch {
    pub open: usize,
    pub close: usize,
}

fn partner(ch: char) -> Option<char> {
    match ch {
        '(' => Some(')'),
        '[' => Some(']'),
        '{' => Some('}'),
        ')' => Some('('),
        ']' => Some('['),
        '}' => Some('{'),
        _ => None,
    }
}

fn is_opener(ch: char) -> bool {
    matches!(ch, '(' | '[' | '{')
}

/// Finds the partner of the bracket or quote just before `cursor`.
///
/// Returns `None` when the character before the cursor is not a delimiter,
/// when the scan reaches the buffer boundary without balancing, or for
/// triple quotes.
pub fn find_match(text: &str, cursor: usize) -> Option<BracketMatch> {
    let chars: Vec<char> = text.chars().collect();
    if cursor == 0 || cursor > chars.len() {
        return None;
    }
    let at = cursor - 1;
    let ch = chars[at];

    if ch == '\'' || ch == '"' {
        return match_quote(&chars, at);
    }

    let target = partner(ch)?;
    let mut depth = 1usize;
    if is_opener(ch) {
        for (i, &c) in chars.iter().enumerate().skip(at + 1) {
            if c == ch {
                depth += 1;
            } else if c == target {
                depth -= 1;
                if depth == 0 {
                    return Some(BracketMatch { open: at, close: i });
                }
            }
        }
    } else {
        for i in (0..at).rev() {
            let c = chars[i];
            if c == ch {
                depth += 1;
            } else if c == target {
                depth -= 1;
                if depth == 0 {
                    return Some(BracketMatch { open: i, close: at });
                }
            }
        }
    }
    None
}

/// A quote is escaped when an odd number of backslashes precede it.
fn is_unescaped_quote(chars: &[char], i: usize, quote: char) -> bool {
    let backslashes = chars[..i].iter().rev().take_while(|&&c| c == '\\').count();
    chars[i] == quote && backslashes % 2 == 0
}

fn match_quote(chars: &[char], at: usize) -> Option<BracketMatch> {
    let quote = chars[at];
    let part_of_triple = |i: usize| {
        let run_start = i.saturating_sub(2);
        let run_end = (i + 3).min(chars.len());
        chars[run_start..run_end]
            .windows(3)
            .any(|w| w.iter().all(|&c| c == quote))
    };
    if part_of_triple(at) {
        return None;
    }

    let line_start = chars[..at]
        .iter()
        .rposition(|&c| c == '\n')
        .map_or(0, |p| p + 1);
    let line_end = chars[at..]
        .iter()
        .position(|&c| c == '\n')
        .map_or(chars.len(), |p| at + p);

    let before = (line_start..at)
        .filter(|&i| is_unescaped_quote(chars, i, quote))
        .count();

    if before % 2 == 0 {
        let close = (at + 1..line_end).find(|&i| is_unescaped_quote(chars, i, quote))?;
        Some(BracketMatch { open: at, close })
    } else {
        let open = (line_start..at)
            .rev()
            .find(|&i| is_unescaped_quote(chars, i, quote))?;
        Some(BracketMatch { open, close: at })
    }
}

/// Closing character inserted automatically after `ch`.
pub fn closing_pair(ch: char) -> Option<char> {
    match ch {
        '(' => Some(')'),
        '[' => Some(']'),
        '{' => Some('}'),
        '\'' => Some('\''),
        '"' => Some('"'),
        _ => None,
    }
}

/// True when typing `ch` at `cursor` should step over an identical closer
/// instead of inserting a second one.
pub fn should_skip_closer(text: &str, cursor: usize, ch: char) -> bool {
    matches!(ch, ')' | ']' | '}' | '\'' | '"') && text.chars().nth(cursor) == Some(ch)
}

/// True when the cursor sits between an empty auto-inserted pair, so a
/// backspace should remove both characters.
pub fn is_empty_pair(text: &str, cursor: usize) -> bool {
    if cursor == 0 {
        return false;
    }
    let mut it = text.chars().skip(cursor - 1);
    match (it.next(), it.next()) {
        (Some(before), Some(after)) => closing_pair(before) == Some(after),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_match() {
        let text = "f(a, (b), [c])";
        assert_eq!(find_match(text, 2), Some(BracketMatch { open: 1, close: 13 }));
    }

    #[test]
    fn test_backward_match() {
        let text = "f(a, (b), [c])";
        assert_eq!(find_match(text, 14), Some(BracketMatch { open: 1, close: 13 }));
        assert_eq!(find_match(text, 8), Some(BracketMatch { open: 5, close: 7 }));
    }

    #[test]
    fn test_mixed_nesting_balanced() {
        let text = "{'a': [1, (2, 3)], 'b': {}}";
        let len = text.chars().count();
        assert_eq!(find_match(text, 1), Some(BracketMatch { open: 0, close: len - 1 }));
        assert_eq!(find_match(text, len), Some(BracketMatch { open: 0, close: len - 1 }));
        let bracket = text.find('[').unwrap();
        let m = find_match(text, bracket + 1).unwrap();
        assert_eq!(text.chars().nth(m.close), Some(']'));
    }

    #[test]
    fn test_every_bracket_in_balanced_input_finds_partner() {
        let text = "def f(x):\n    return [g(y) for y in {x: (1, 2)}]\n";
        for (i, c) in text.chars().enumerate() {
            if partner(c).is_some() {
                let m = find_match(text, i + 1).expect("balanced input");
                let open = text.chars().nth(m.open).unwrap();
                let close = text.chars().nth(m.close).unwrap();
                assert_eq!(partner(open), Some(close));
                assert!(m.open == i || m.close == i);
            }
        }
    }

    #[test]
    fn test_unbalanced_returns_none() {
        assert_eq!(find_match("((a)", 1), None);
        assert_eq!(find_match("a)", 2), None);
    }

    #[test]
    fn test_non_delimiter_and_bounds() {
        assert_eq!(find_match("abc", 2), None);
        assert_eq!(find_match("()", 0), None);
        assert_eq!(find_match("()", 10), None);
    }

    #[test]
    fn test_quote_match() {
        let text = "x = 'abc' + \"d\"";
        assert_eq!(find_match(text, 5), Some(BracketMatch { open: 4, close: 8 }));
        assert_eq!(find_match(text, 9), Some(BracketMatch { open: 4, close: 8 }));
        assert_eq!(find_match(text, 15), Some(BracketMatch { open: 12, close: 14 }));
    }

    #[test]
    fn test_escaped_quote_is_skipped() {
        let text = r"'it\'s'";
        assert_eq!(find_match(text, 1), Some(BracketMatch { open: 0, close: 6 }));
    }

    #[test]
    fn test_escaped_backslash_before_quote() {
        let text = r"'a\\' + 'b'";
        assert_eq!(find_match(text, 1), Some(BracketMatch { open: 0, close: 4 }));
        assert_eq!(find_match(text, 5), Some(BracketMatch { open: 0, close: 4 }));
        let text = r"'a\\\'b'";
        assert_eq!(find_match(text, 1), Some(BracketMatch { open: 0, close: 7 }));
    }

    #[test]
    fn test_triple_quote_has_no_match() {
        let text = "\"\"\"doc\"\"\"";
        assert_eq!(find_match(text, 3), None);
        assert_eq!(find_match(text, 9), None);
    }

    #[test]
    fn test_auto_pair_helpers() {
        assert_eq!(closing_pair('('), Some(')'));
        assert_eq!(closing_pair('"'), Some('"'));
        assert_eq!(closing_pair('a'), None);

        assert!(should_skip_closer("f()", 2, ')'));
        assert!(!should_skip_closer("f()", 2, ']'));
        assert!(!should_skip_closer("f(", 2, ')'));

        assert!(is_empty_pair("f()", 2));
        assert!(is_empty_pair("''", 1));
        assert!(!is_empty_pair("f(x)", 2));
        assert!(!is_empty_pair("()", 0));
    }
}
