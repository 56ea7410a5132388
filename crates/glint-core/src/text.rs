//! Character-addressed text coordinates.
//!
//! All public positions in glint count lines and columns in Unicode scalar
//! values, never bytes. Byte offsets only appear at the regex and string
//! splicing boundaries, via [`crate::utf8`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// A zero-based `(line, column)` position; `column` counts Unicode scalar
/// values within the line.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TextPosition {
    pub line: usize,
    pub column: usize,
}

impl TextPosition {
    #[inline]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for TextPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Error raised when a range is constructed with `end < start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("range end {end} precedes start {start}")]
pub struct InvalidRange {
    pub start: TextPosition,
    pub end: TextPosition,
}

/// A pair of positions with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: TextPosition,
    pub end: TextPosition,
}

impl TextRange {
    /// Builds a range, rejecting inverted endpoints.
    pub fn new(start: TextPosition, end: TextPosition) -> Result<Self, InvalidRange> {
        if end < start {
            return Err(InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// A zero-width range at `pos`.
    #[inline]
    pub const fn empty(pos: TextPosition) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    /// Whether `pos` lies within the range. The upper bound is inclusive so
    /// a caret sitting at the end of a span still counts as inside it.
    pub fn contains(&self, pos: TextPosition) -> bool {
        self.start <= pos && pos <= self.end
    }

    /// Whether the range covers no characters.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pos(line: usize, column: usize) -> TextPosition {
        TextPosition::new(line, column)
    }

    #[test]
    fn positions_order_lexicographically() {
        assert!(pos(0, 5) < pos(1, 0));
        assert!(pos(2, 3) < pos(2, 4));
        assert_eq!(pos(1, 1), pos(1, 1));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = TextRange::new(pos(1, 0), pos(0, 9)).unwrap_err();
        assert_eq!(
            err,
            InvalidRange {
                start: pos(1, 0),
                end: pos(0, 9),
            }
        );
        assert!(TextRange::new(pos(0, 4), pos(0, 2)).is_err());
    }

    #[test]
    fn containment_is_end_inclusive() {
        let range = TextRange::new(pos(0, 2), pos(1, 3)).unwrap();
        assert!(range.contains(pos(0, 2)));
        assert!(range.contains(pos(0, 100)));
        assert!(range.contains(pos(1, 3)));
        assert!(!range.contains(pos(1, 4)));
        assert!(!range.contains(pos(0, 1)));
    }

    #[test]
    fn empty_range_contains_only_its_position() {
        let range = TextRange::empty(pos(3, 7));
        assert!(range.is_empty());
        assert!(range.contains(pos(3, 7)));
        assert!(!range.contains(pos(3, 8)));
    }
}
