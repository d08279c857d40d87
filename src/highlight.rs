//! Regex-driven syntax highlighting for Python source.
//!
//! Every edit re-scans the whole buffer with a fixed, ordered list of
//! patterns. Later passes override earlier ones where they overlap, so a
//! keyword inside a comment ends up tagged as a comment. The result is a
//! sorted list of non-overlapping spans in character offsets, ready to be
//! applied as text tags.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// A named display attribute applied to a range of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tag {
    Keyword,
    Function,
    Class,
    SelfRef,
    Number,
    Delimiter,
    String,
    Comment,
}

impl Tag {
    /// Every tag, in the order the passes apply them.
    pub const ALL: [Tag; 8] = [
        Tag::Keyword,
        Tag::Function,
        Tag::Class,
        Tag::SelfRef,
        Tag::Number,
        Tag::Delimiter,
        Tag::String,
        Tag::Comment,
    ];

    /// Text-tag name used by the editor widget.
    pub fn name(self) -> &'static str {
        match self {
            Tag::Keyword => "keyword",
            Tag::Function => "function",
            Tag::Class => "class",
            Tag::SelfRef => "self",
            Tag::Number => "number",
            Tag::Delimiter => "delimiters",
            Tag::String => "string",
            Tag::Comment => "comment",
        }
    }
}

/// A tagged half-open range `[start, end)` in character offsets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub tag: Tag,
}

struct Pass {
    regex: Regex,
    tag: Tag,
    group: usize,
}

const KEYWORDS_PATTERN: &str = r"\b(if|else|elif|for|while|import|from|as|return|True|False|def|class|try|except|finally|pass|break|continue|in|is|None|not|or|and|yield|lambda|global|nonlocal|with|await|async|raise|assert|del)\b";

fn passes() -> &'static [Pass] {
    static PASSES: OnceLock<Vec<Pass>> = OnceLock::new();
    PASSES.get_or_init(|| {
        let table: [(&str, Tag, usize); 9] = [
            (KEYWORDS_PATTERN, Tag::Keyword, 0),
            (r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(", Tag::Function, 1),
            (r"\b(class)\s+([A-Za-z_][A-Za-z0-9_]*)\b", Tag::Class, 2),
            (r"\b(self|cls)\b", Tag::SelfRef, 0),
            (r"\b\d+(\.\d*)?([eE][+-]?\d+)?\b", Tag::Number, 0),
            (r"[()\[\]{}]", Tag::Delimiter, 0),
            (r#"(?s)(""".*?"""|'''.*?''')"#, Tag::String, 0),
            (r#""(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'"#, Tag::String, 0),
            (r"#.*", Tag::Comment, 0),
        ];
        table
            .into_iter()
            .map(|(pattern, tag, group)| Pass {
                regex: Regex::new(pattern).unwrap(),
                tag,
                group,
            })
            .collect()
    })
}

/// Maps byte offsets of a string to character offsets.
pub(crate) struct CharIndex {
    starts: Vec<usize>,
    len: usize,
}

impl CharIndex {
    pub(crate) fn new(text: &str) -> Self {
        Self {
            starts: text.char_indices().map(|(b, _)| b).collect(),
            len: text.len(),
        }
    }

    pub(crate) fn char_count(&self) -> usize {
        self.starts.len()
    }

    /// Character offset of the char boundary at `byte`.
    pub(crate) fn to_char(&self, byte: usize) -> usize {
        if byte >= self.len {
            return self.starts.len();
        }
        self.starts.partition_point(|&b| b < byte)
    }

    /// Byte offset of the character at `char_offset`, clamped to the end.
    pub(crate) fn to_byte(&self, char_offset: usize) -> usize {
        self.starts.get(char_offset).copied().unwrap_or(self.len)
    }
}

/// Highlights a whole buffer.
pub fn highlight(source: &str) -> Vec<Span> {
    let index = CharIndex::new(source);
    let mut cells: Vec<Option<Tag>> = vec![None; index.char_count()];

    for pass in passes() {
        for caps in pass.regex.captures_iter(source) {
            let Some(m) = caps.get(pass.group) else {
                continue;
            };
            if m.start() == m.end() {
                continue;
            }
            let start = index.to_char(m.start());
            let end = index.to_char(m.end());
            for cell in &mut cells[start..end] {
                *cell = Some(pass.tag);
            }
        }
    }

    collapse(&cells)
}

fn collapse(cells: &[Option<Tag>]) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    for (i, cell) in cells.iter().enumerate() {
        let Some(tag) = *cell else { continue };
        match spans.last_mut() {
            Some(last) if last.end == i && last.tag == tag => last.end = i + 1,
            _ => spans.push(Span {
                start: i,
                end: i + 1,
                tag,
            }),
        }
    }
    spans
}

/// A fenced code block found in a chat response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Lower-cased language tag after the opening fence, if any.
    pub language: Option<String>,
    /// Character range of the block body.
    pub body: Range<usize>,
}

impl CodeBlock {
    /// The body text with trailing line breaks removed, ready to copy.
    pub fn text(&self, source: &str) -> String {
        let body: String = source
            .chars()
            .skip(self.body.start)
            .take(self.body.len())
            .collect();
        body.trim_end_matches(['\n', '\r']).to_string()
    }
}

fn code_block_regex() -> &'static Regex {
    static CODE_BLOCK_REGEX: OnceLock<Regex> = OnceLock::new();
    // A language tag only counts when a line break follows it.
    CODE_BLOCK_REGEX.get_or_init(|| {
        Regex::new(r"(?s)```(?:([A-Za-z0-9_+\-]+)[ \t]*\r?\n|[ \t]*\r?\n?)(.*?)```").unwrap()
    })
}

/// Finds fenced ```` ```lang ... ``` ```` blocks in `text`.
pub fn code_blocks(text: &str) -> Vec<CodeBlock> {
    let index = CharIndex::new(text);
    code_block_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let body = caps.get(2)?;
            let language = caps
                .get(1)
                .map(|m| m.as_str().to_lowercase())
                .filter(|l| !l.is_empty());
            Some(CodeBlock {
                language,
                body: index.to_char(body.start())..index.to_char(body.end()),
            })
        })
        .collect()
}

/// Highlights the bodies of all fenced code blocks, with spans offset into
/// the surrounding text.
pub fn highlight_code_blocks(text: &str) -> Vec<Span> {
    let index = CharIndex::new(text);
    let mut spans = Vec::new();
    for block in code_blocks(text) {
        let body = &text[index.to_byte(block.body.start)..index.to_byte(block.body.end)];
        spans.extend(highlight(body).into_iter().map(|s| Span {
            start: s.start + block.body.start,
            end: s.end + block.body.start,
            tag: s.tag,
        }));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged<'a>(source: &'a str, spans: &[Span], tag: Tag) -> Vec<&'a str> {
        let index = CharIndex::new(source);
        spans
            .iter()
            .filter(|s| s.tag == tag)
            .map(|s| &source[index.to_byte(s.start)..index.to_byte(s.end)])
            .collect()
    }

    #[test]
    fn test_keywords_and_functions() {
        let src = "def greet(name):\n    return print(name)\n";
        let spans = highlight(src);
        assert_eq!(tagged(src, &spans, Tag::Keyword), vec!["def", "return"]);
        assert_eq!(tagged(src, &spans, Tag::Function), vec!["greet", "print"]);
    }

    #[test]
    fn test_class_name_and_self() {
        let src = "class Point:\n    def norm(self):\n        return self.x\n";
        let spans = highlight(src);
        assert_eq!(tagged(src, &spans, Tag::Class), vec!["Point"]);
        assert_eq!(tagged(src, &spans, Tag::SelfRef), vec!["self", "self"]);
    }

    #[test]
    fn test_numbers() {
        let src = "x = 42 + 3.14 + 1e10";
        let spans = highlight(src);
        assert_eq!(tagged(src, &spans, Tag::Number), vec!["42", "3.14", "1e10"]);
    }

    #[test]
    fn test_comment_overrides_keyword() {
        let src = "x = 1  # if this were code";
        let spans = highlight(src);
        assert_eq!(tagged(src, &spans, Tag::Comment), vec!["# if this were code"]);
        assert!(tagged(src, &spans, Tag::Keyword).is_empty());
    }

    #[test]
    fn test_string_overrides_contents() {
        let src = r#"s = "call(1) if" + 'it\'s'"#;
        let spans = highlight(src);
        assert_eq!(
            tagged(src, &spans, Tag::String),
            vec![r#""call(1) if""#, r"'it\'s'"]
        );
        assert!(tagged(src, &spans, Tag::Function).is_empty());
    }

    #[test]
    fn test_triple_quoted_string_spans_lines() {
        let src = "doc = \"\"\"first\nsecond if\"\"\"\nx = 1\n";
        let spans = highlight(src);
        assert_eq!(
            tagged(src, &spans, Tag::String),
            vec!["\"\"\"first\nsecond if\"\"\""]
        );
        assert!(tagged(src, &spans, Tag::Keyword).is_empty());
    }

    #[test]
    fn test_hash_inside_string_is_comment() {
        // Comments are applied last, as the tag passes always have been.
        let src = "s = '#'";
        let spans = highlight(src);
        assert_eq!(tagged(src, &spans, Tag::Comment), vec!["#'"]);
    }

    #[test]
    fn test_offsets_are_characters() {
        let src = "ż = 'ą'\nif x:";
        let spans = highlight(src);
        let kw = spans.iter().find(|s| s.tag == Tag::Keyword).unwrap();
        assert_eq!((kw.start, kw.end), (8, 10));
    }

    #[test]
    fn test_deterministic_and_idempotent() {
        let src = "import os\n\nclass A(object):\n    def f(self, x=[1, 2]):\n        return {'k': x}  # done\n";
        let first = highlight(src);
        let second = highlight(src);
        assert_eq!(first, second);
        assert!(first.windows(2).all(|w| w[0].end <= w[1].start));
        let chars = src.chars().count();
        assert!(first.iter().all(|s| s.start < s.end && s.end <= chars));
    }

    #[test]
    fn test_empty_source() {
        assert!(highlight("").is_empty());
    }

    #[test]
    fn test_code_blocks() {
        let text = "Here:\n```python\nprint(1)\n```\nand\n```\nx = 2\n```";
        let blocks = code_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language.as_deref(), Some("python"));
        assert_eq!(blocks[1].language, None);
        let body: String = text
            .chars()
            .skip(blocks[0].body.start)
            .take(blocks[0].body.len())
            .collect();
        assert_eq!(body, "print(1)\n");
    }

    #[test]
    fn test_code_block_text() {
        let text = "Sure:\n```py\nfor ż in x:\n    pass\n```\n";
        let blocks = code_blocks(text);
        assert_eq!(blocks[0].text(text), "for ż in x:\n    pass");
    }

    #[test]
    fn test_inline_fence_has_no_language() {
        let text = "Use ```print(1)``` here";
        let blocks = code_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, None);
        let body: String = text
            .chars()
            .skip(blocks[0].body.start)
            .take(blocks[0].body.len())
            .collect();
        assert_eq!(body, "print(1)");
    }

    #[test]
    fn test_highlight_code_blocks_offsets() {
        let text = "Try:\n```py\nif x:\n```";
        let spans = highlight_code_blocks(text);
        let kw = spans.iter().find(|s| s.tag == Tag::Keyword).unwrap();
        let word: String = text.chars().skip(kw.start).take(kw.end - kw.start).collect();
        assert_eq!(word, "if");
    }
}
