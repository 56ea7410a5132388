//! A line-indexed document buffer with character-accurate patching.

use crate::text::{TextPosition, TextRange};
use crate::utf8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("line {line} is out of range (document has {count} lines)")]
    LineOutOfRange { line: usize, count: usize },
    #[error("position {0} is out of range")]
    PositionOutOfRange(TextPosition),
}

/// An in-memory document split into lines.
///
/// The logical text is `lines.join("\n")`; no line contains a newline and
/// there is always at least one (possibly empty) line. All columns count
/// Unicode scalar values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    uri: String,
    lines: Vec<String>,
}

impl Document {
    pub fn new(uri: impl Into<String>, text: &str) -> Self {
        let mut doc = Self {
            uri: uri.into(),
            lines: Vec::new(),
        };
        doc.set_text(text);
        doc
    }

    /// The identifier this document was opened under; its extension drives
    /// grammar selection.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Replaces the whole content. Text ending in `\n` keeps a trailing
    /// empty line, so the split always yields `newline count + 1` lines.
    pub fn set_text(&mut self, text: &str) {
        self.lines = text.split('\n').map(str::to_string).collect();
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn line(&self, line: usize) -> Result<&str, DocumentError> {
        self.lines
            .get(line)
            .map(String::as_str)
            .ok_or(DocumentError::LineOutOfRange {
                line,
                count: self.lines.len(),
            })
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Whether `pos` addresses a character or the end of an existing line.
    pub fn is_valid_position(&self, pos: TextPosition) -> bool {
        match self.lines.get(pos.line) {
            Some(line) => pos.column <= utf8::char_count(line),
            None => false,
        }
    }

    /// Replaces `range` with `new_text`.
    ///
    /// The first affected line keeps its prefix, the last keeps its suffix,
    /// and interior lines of `new_text` are inserted in between; afterwards
    /// `line_count` changes by `newline count − (end.line − start.line)`.
    /// A start line past the end appends to the document instead.
    pub fn patch(&mut self, range: TextRange, new_text: &str) -> Result<(), DocumentError> {
        if range.start.line >= self.lines.len() {
            self.append(new_text);
            return Ok(());
        }
        if !self.is_valid_position(range.start) {
            return Err(DocumentError::PositionOutOfRange(range.start));
        }
        if !self.is_valid_position(range.end) {
            return Err(DocumentError::PositionOutOfRange(range.end));
        }

        let start_line = &self.lines[range.start.line];
        let prefix = start_line[..utf8::char_to_byte(start_line, range.start.column)].to_string();
        let end_line = &self.lines[range.end.line];
        let suffix = end_line[utf8::char_to_byte(end_line, range.end.column)..].to_string();

        let new_lines: Vec<&str> = new_text.split('\n').collect();
        let mut replacement = Vec::with_capacity(new_lines.len());
        if let [only] = new_lines.as_slice() {
            replacement.push(format!("{prefix}{only}{suffix}"));
        } else {
            replacement.push(format!("{prefix}{}", new_lines[0]));
            for interior in &new_lines[1..new_lines.len() - 1] {
                replacement.push((*interior).to_string());
            }
            replacement.push(format!("{}{suffix}", new_lines[new_lines.len() - 1]));
        }
        self.lines
            .splice(range.start.line..=range.end.line, replacement);
        Ok(())
    }

    pub fn insert(&mut self, pos: TextPosition, text: &str) -> Result<(), DocumentError> {
        self.patch(TextRange::empty(pos), text)
    }

    pub fn remove(&mut self, range: TextRange) -> Result<(), DocumentError> {
        self.patch(range, "")
    }

    /// The text covered by `range`, with `\n` between lines.
    pub fn text_in(&self, range: TextRange) -> Result<String, DocumentError> {
        if !self.is_valid_position(range.start) {
            return Err(DocumentError::PositionOutOfRange(range.start));
        }
        if !self.is_valid_position(range.end) {
            return Err(DocumentError::PositionOutOfRange(range.end));
        }
        let start_line = &self.lines[range.start.line];
        if range.start.line == range.end.line {
            let start = utf8::char_to_byte(start_line, range.start.column);
            let end = utf8::char_to_byte(start_line, range.end.column);
            return Ok(start_line[start..end].to_string());
        }
        let mut out = start_line[utf8::char_to_byte(start_line, range.start.column)..].to_string();
        for line in &self.lines[range.start.line + 1..range.end.line] {
            out.push('\n');
            out.push_str(line);
        }
        let end_line = &self.lines[range.end.line];
        out.push('\n');
        out.push_str(&end_line[..utf8::char_to_byte(end_line, range.end.column)]);
        Ok(out)
    }

    fn append(&mut self, text: &str) {
        let mut parts = text.split('\n');
        if let Some(first) = parts.next() {
            self.lines
                .last_mut()
                .expect("document always has at least one line")
                .push_str(first);
        }
        self.lines.extend(parts.map(str::to_string));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pos(line: usize, column: usize) -> TextPosition {
        TextPosition::new(line, column)
    }

    fn range(start: (usize, usize), end: (usize, usize)) -> TextRange {
        TextRange::new(pos(start.0, start.1), pos(end.0, end.1)).unwrap()
    }

    #[test]
    fn set_text_preserves_trailing_empty_line() {
        let doc = Document::new("test.txt", "a\nb\n");
        assert_eq!(doc.line_count(), 3);
        assert_eq!(doc.line(2), Ok(""));

        let doc = Document::new("test.txt", "");
        assert_eq!(doc.line_count(), 1);
        assert_eq!(doc.line(0), Ok(""));
    }

    #[test]
    fn text_round_trips() {
        for text in ["", "one", "a\nb", "a\nb\n", "\n\n", "行1\n行2"] {
            let doc = Document::new("test.txt", text);
            assert_eq!(doc.text(), text);
            assert_eq!(Document::new("test.txt", &doc.text()).text(), text);
        }
    }

    #[test]
    fn line_access_is_bounds_checked() {
        let doc = Document::new("test.txt", "a\nb");
        assert_eq!(doc.line(1), Ok("b"));
        assert_eq!(
            doc.line(2),
            Err(DocumentError::LineOutOfRange { line: 2, count: 2 })
        );
    }

    #[test]
    fn single_line_patch_replaces_character_columns() {
        let mut doc = Document::new("test.txt", "\n行1: 你好\n行2: World\n行3: 结束");
        doc.patch(range((1, 4), (1, 6)), "您不好").unwrap();
        assert_eq!(doc.line(1), Ok("行1: 您不好"));
    }

    #[test]
    fn multi_line_patch_joins_prefix_and_suffix() {
        let mut doc = Document::new("test.txt", "\n行1: 你好\n行2: World\n行3: 结束");
        doc.patch(range((2, 4), (3, 2)), "宇宙\n最后一行").unwrap();
        assert_eq!(doc.text(), "\n行1: 你好\n行2: 宇宙\n最后一行: 结束");
    }

    #[test]
    fn patch_with_multi_line_text_grows_a_single_line_range() {
        let mut doc = Document::new("test.txt", "hello world");
        doc.patch(range((0, 5), (0, 6)), "\nmid\n").unwrap();
        assert_eq!(doc.text(), "hello\nmid\nworld");
        assert_eq!(doc.line_count(), 3);
    }

    #[test]
    fn patch_line_count_invariant() {
        // line count = before − (end.line − start.line) + newline count
        let mut doc = Document::new("test.txt", "a\nb\nc\nd");
        doc.patch(range((1, 0), (2, 1)), "x\ny\nz").unwrap();
        assert_eq!(doc.line_count(), 4 - 1 + 2);
        assert_eq!(doc.text(), "a\nx\ny\nz\nd");
    }

    #[test]
    fn deletion_is_a_patch_with_empty_text() {
        let mut doc = Document::new("test.txt", "a\nbcd\ne");
        doc.remove(range((0, 1), (2, 0))).unwrap();
        assert_eq!(doc.text(), "ae");
    }

    #[test]
    fn insert_splices_at_position() {
        let mut doc = Document::new("test.txt", "ab");
        doc.insert(pos(0, 1), "==").unwrap();
        assert_eq!(doc.text(), "a==b");
        doc.insert(pos(0, 4), "\n").unwrap();
        assert_eq!(doc.text(), "a==b\n");
    }

    #[test]
    fn patch_past_the_last_line_appends() {
        let mut doc = Document::new("test.txt", "a");
        doc.patch(range((5, 0), (5, 0)), "b\nc").unwrap();
        assert_eq!(doc.text(), "ab\nc");
    }

    #[test]
    fn patch_rejects_out_of_range_columns() {
        let mut doc = Document::new("test.txt", "ab\ncd");
        let err = doc.patch(range((0, 3), (1, 0)), "x").unwrap_err();
        assert_eq!(err, DocumentError::PositionOutOfRange(pos(0, 3)));
        let err = doc.patch(range((0, 0), (1, 3)), "x").unwrap_err();
        assert_eq!(err, DocumentError::PositionOutOfRange(pos(1, 3)));
        assert_eq!(doc.text(), "ab\ncd");
    }

    #[test]
    fn end_of_line_column_is_a_valid_position() {
        let mut doc = Document::new("test.txt", "你好");
        assert!(doc.is_valid_position(pos(0, 2)));
        assert!(!doc.is_valid_position(pos(0, 3)));
        doc.insert(pos(0, 2), "!").unwrap();
        assert_eq!(doc.text(), "你好!");
    }

    #[test]
    fn text_in_covers_single_and_multi_line_ranges() {
        let doc = Document::new("test.txt", "abc\ndef\nghi");
        assert_eq!(doc.text_in(range((0, 1), (0, 3))).unwrap(), "bc");
        assert_eq!(doc.text_in(range((0, 2), (2, 1))).unwrap(), "c\ndef\ng");
        assert_eq!(doc.text_in(range((1, 1), (1, 1))).unwrap(), "");
    }
}
