//! Indentation helpers: auto-indent on Enter, whitespace visualisation and
//! the indentation checker.

use crate::constants::INDENT_WIDTH;
use std::fmt;

fn leading_whitespace(line: &str) -> &str {
    let end = line
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map_or(line.len(), |(i, _)| i);
    &line[..end]
}

/// Indentation to insert after pressing Enter at the end of `line`.
///
/// Keeps the current indentation and opens one more level after a block
/// header or an unclosed opening bracket.
pub fn next_line_indent(line: &str) -> String {
    let mut indent = leading_whitespace(line).to_string();
    if line.trim_end().ends_with([':', '[', '(', '{']) {
        indent.push_str(&" ".repeat(INDENT_WIDTH));
    }
    indent
}

/// Indentation for a Tab key press.
pub fn tab_text() -> String {
    " ".repeat(INDENT_WIDTH)
}

/// `(line, width)` for every line with leading whitespace; lines are
/// 0-based and widths are in characters.
pub fn indent_ranges(text: &str) -> Vec<(usize, usize)> {
    text.split('\n')
        .enumerate()
        .filter_map(|(i, line)| {
            let width = leading_whitespace(line).chars().count();
            (width > 0).then_some((i, width))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndentProblem {
    NotMultiple { spaces: usize },
    MixedTabsAndSpaces,
}

/// An indentation problem on a 1-based line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndentIssue {
    pub line: usize,
    pub problem: IndentProblem,
}

impl fmt::Display for IndentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.problem {
            IndentProblem::NotMultiple { spaces } => write!(
                f,
                "Line {}: indentation of {} spaces is not a multiple of {}",
                self.line, spaces, INDENT_WIDTH
            ),
            IndentProblem::MixedTabsAndSpaces => {
                write!(f, "Line {}: indentation mixes tabs and spaces", self.line)
            }
        }
    }
}

/// Flags non-blank lines whose indentation is not a whole number of levels.
pub fn check_indentation(text: &str) -> Vec<IndentIssue> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(i, line)| {
            let indent = leading_whitespace(line);
            let problem = if indent.contains('\t') && indent.contains(' ') {
                IndentProblem::MixedTabsAndSpaces
            } else {
                let spaces = indent.chars().filter(|&c| c == ' ').count();
                if spaces % INDENT_WIDTH == 0 {
                    return None;
                }
                IndentProblem::NotMultiple { spaces }
            };
            Some(IndentIssue {
                line: i + 1,
                problem,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_line_indent() {
        assert_eq!(next_line_indent("x = 1"), "");
        assert_eq!(next_line_indent("def f():"), "    ");
        assert_eq!(next_line_indent("    if x:  "), "        ");
        assert_eq!(next_line_indent("    items = ["), "        ");
        assert_eq!(next_line_indent("\tcall("), "\t    ");
        assert_eq!(next_line_indent("        return x"), "        ");
    }

    #[test]
    fn test_indent_ranges() {
        let text = "def f():\n    x = 1\n\n  \n\ty\n";
        assert_eq!(indent_ranges(text), vec![(1, 4), (3, 2), (4, 1)]);
    }

    #[test]
    fn test_check_indentation() {
        let text = "def f():\n   x = 1\n    y = 2\n\n      \n\t z = 3\n";
        let issues = check_indentation(text);
        assert_eq!(
            issues,
            vec![
                IndentIssue {
                    line: 2,
                    problem: IndentProblem::NotMultiple { spaces: 3 }
                },
                IndentIssue {
                    line: 6,
                    problem: IndentProblem::MixedTabsAndSpaces
                },
            ]
        );
        assert_eq!(
            issues[0].to_string(),
            "Line 2: indentation of 3 spaces is not a multiple of 4"
        );
    }

    #[test]
    fn test_clean_file_has_no_issues() {
        assert!(check_indentation("class A:\n    def f(self):\n        pass\n").is_empty());
    }
}
