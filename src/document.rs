/// Open-document model.
///
/// Positions use LSP's UTF-16 columns.  Solargraph counts characters, so
/// [`Document::char_column`] converts before a request goes out.  Lines may
/// end in `\n` or `\r\n`.
use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::{Position, Range, Url};

/// What counts as a "word" in Ruby source: numeric literals, and
/// identifiers optionally preceded by a symbol colon and followed by a
/// `!`/`?` suffix.  Sigils such as `@` and `$` are never part of a word.
static WORD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(-?\d+(?:\.\d+)?)|(:?[A-Za-z][^-`~@#%^&()=+\[{}|;:'",<>/.*\]\s\\!?]*[!?]?)"#)
        .expect("word pattern is a valid regex")
});

/// A text document as last synchronised by the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub uri: Url,
    pub text: String,
}

impl Document {
    pub fn new(uri: Url, text: impl Into<String>) -> Self {
        Self {
            uri,
            text: text.into(),
        }
    }

    /// The file name to report to Solargraph: the file system path for
    /// `file://` URIs, the URI itself otherwise.
    pub fn file_name(&self) -> String {
        match self.uri.to_file_path() {
            Ok(path) => path.display().to_string(),
            Err(()) => self.uri.to_string(),
        }
    }

    /// Line `index` without its terminator.
    pub fn line(&self, index: u32) -> Option<&str> {
        self.text
            .split('\n')
            .nth(index as usize)
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }

    /// The range of the word touching `position`, if any.
    ///
    /// A word touches the caret when the caret is inside it or at either of
    /// its ends.
    pub fn word_range_at(&self, position: Position) -> Option<Range> {
        let line = self.line(position.line)?;
        let caret = position.character;

        for m in WORD_PATTERN.find_iter(line) {
            let start = utf16_len(&line[..m.start()]);
            let end = start + utf16_len(m.as_str());
            if start > caret {
                break;
            }
            if caret <= end {
                return Some(Range {
                    start: Position::new(position.line, start),
                    end: Position::new(position.line, end),
                });
            }
        }
        None
    }

    /// The text covered by a single-line or multi-line `range`.
    ///
    /// Positions past the end of a line clamp to the line end.
    pub fn text_in(&self, range: Range) -> String {
        let mut out = String::new();
        for line_no in range.start.line..=range.end.line {
            let Some(line) = self.line(line_no) else {
                break;
            };
            let from = if line_no == range.start.line {
                char_index(line, range.start.character)
            } else {
                0
            };
            let to = if line_no == range.end.line {
                char_index(line, range.end.character)
            } else {
                usize::MAX
            };
            out.extend(line.chars().skip(from).take(to.saturating_sub(from)));
            if line_no != range.end.line {
                out.push('\n');
            }
        }
        out
    }

    /// The single character immediately before `position` on its line.
    pub fn char_before(&self, position: Position) -> Option<char> {
        let line = self.line(position.line)?;
        let column = char_index(line, position.character).checked_sub(1)?;
        line.chars().nth(column)
    }

    /// `position`'s column counted in characters, as Solargraph counts it.
    pub fn char_column(&self, position: Position) -> u32 {
        self.line(position.line)
            .map(|line| char_index(line, position.character) as u32)
            .unwrap_or(position.character)
    }
}

fn utf16_len(text: &str) -> u32 {
    text.chars().map(char::len_utf16).sum::<usize>() as u32
}

/// Index of the character at UTF-16 column `column`, clamped to the line end.
fn char_index(line: &str, column: u32) -> usize {
    let mut units = 0;
    for (index, c) in line.chars().enumerate() {
        if units >= column as usize {
            return index;
        }
        units += c.len_utf16();
    }
    line.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new(Url::parse("file:///project/app.rb").unwrap(), text)
    }

    fn range(line: u32, start: u32, end: u32) -> Range {
        Range {
            start: Position::new(line, start),
            end: Position::new(line, end),
        }
    }

    #[test]
    fn test_word_range_inside_identifier() {
        let d = doc("def foo\n  bar_baz\n");
        assert_eq!(d.word_range_at(Position::new(1, 5)), Some(range(1, 2, 9)));
        assert_eq!(d.word_range_at(Position::new(1, 9)), Some(range(1, 2, 9)));
    }

    #[test]
    fn test_word_range_excludes_sigils() {
        let d = doc("@@count + $stdout + @name");
        assert_eq!(d.word_range_at(Position::new(0, 4)), Some(range(0, 2, 7)));
        assert_eq!(d.word_range_at(Position::new(0, 12)), Some(range(0, 11, 17)));
        assert_eq!(d.word_range_at(Position::new(0, 25)), Some(range(0, 21, 25)));
    }

    #[test]
    fn test_word_range_includes_symbol_colon() {
        let d = doc("x = :sym");
        let r = d.word_range_at(Position::new(0, 6)).unwrap();
        assert_eq!(r, range(0, 4, 8));
        assert_eq!(d.text_in(r), ":sym");
    }

    #[test]
    fn test_word_range_after_namespace_separator() {
        let d = doc("Foo::Ba");
        let r = d.word_range_at(Position::new(0, 7)).unwrap();
        assert_eq!(d.text_in(r), ":Ba");
        assert_eq!(d.char_before(r.start), Some(':'));
    }

    #[test]
    fn test_no_word_after_dot() {
        let d = doc("def foo\n  self.");
        assert_eq!(d.word_range_at(Position::new(1, 7)), None);
        assert_eq!(d.word_range_at(Position::new(5, 0)), None);
    }

    #[test]
    fn test_predicate_suffix_is_part_of_word() {
        let d = doc("list.empty?");
        assert_eq!(d.word_range_at(Position::new(0, 8)), Some(range(0, 5, 11)));
    }

    #[test]
    fn test_crlf_lines() {
        let d = doc("a = 1\r\nfoo\r\n");
        assert_eq!(d.line(1), Some("foo"));
        assert_eq!(d.word_range_at(Position::new(1, 3)), Some(range(1, 0, 3)));
    }

    #[test]
    fn test_text_in_spans_lines() {
        let d = doc("abc\ndef\n");
        let r = Range {
            start: Position::new(0, 1),
            end: Position::new(1, 2),
        };
        assert_eq!(d.text_in(r), "bc\nde");
    }

    #[test]
    fn test_char_before_line_start() {
        let d = doc("abc");
        assert_eq!(d.char_before(Position::new(0, 0)), None);
        assert_eq!(d.char_before(Position::new(0, 1)), Some('a'));
    }

    #[test]
    fn test_columns_are_utf16() {
        // The emoji takes two UTF-16 units but is a single character.
        let d = doc("s = \"\u{1F600}\"; s.up");
        assert_eq!(d.word_range_at(Position::new(0, 14)), Some(range(0, 12, 14)));
        assert_eq!(d.text_in(range(0, 12, 14)), "up");
        assert_eq!(d.char_before(Position::new(0, 12)), Some('.'));
        assert_eq!(d.char_column(Position::new(0, 14)), 13);
        assert_eq!(d.char_column(Position::new(3, 4)), 4);
    }

    #[test]
    fn test_file_name_uses_path() {
        assert_eq!(doc("").file_name(), "/project/app.rb");
    }
}
