use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Byte-offset span into source text. Start is inclusive, end is exclusive.
///
/// Spans are produced by the external parser and carried through lowering
/// onto RDT nodes. Nodes synthesized by later passes have no span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Creates a span from byte offsets.
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "span start ({start}) must be <= end ({end})");
        Self { start, end }
    }

    /// Length in bytes.
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Whether the span covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Smallest span covering both `self` and `other`.
    pub fn cover(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Convert to a `usize` range clamped to `source_len`, never empty
    /// unless the source itself is empty. ariadne needs at least one
    /// character to attach a label to.
    pub fn to_range(self, source_len: usize) -> Range<usize> {
        let start = (self.start as usize).min(source_len);
        let end = (self.end as usize).min(source_len).max(start);
        if start == end {
            start..(end + 1).min(source_len)
        } else {
            start..end
        }
    }
}

/// Line start offsets for converting byte offsets to (line, column).
#[derive(Debug)]
pub struct LineIndex {
    /// Offset of each line's first byte. Always starts with 0.
    line_starts: Vec<u32>,
}

impl LineIndex {
    /// Scans `source` once for newlines.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| (i + 1) as u32),
        );
        Self { line_starts }
    }

    /// 1-based (line, column); the column counts bytes.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let line_idx = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        (line_idx as u32 + 1, offset - self.line_starts[line_idx] + 1)
    }

    /// Number of lines, counting a trailing empty one.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_takes_outer_bounds() {
        let merged = Span::new(5, 10).cover(Span::new(8, 15));
        assert_eq!(merged, Span::new(5, 15));
        assert_eq!(merged.len(), 10);
    }

    #[test]
    fn to_range_widens_empty_spans() {
        assert_eq!(Span::new(3, 3).to_range(10), 3..4);
        assert_eq!(Span::new(2, 6).to_range(10), 2..6);
        // Clamped to the end of the source.
        assert_eq!(Span::new(8, 40).to_range(10), 8..10);
        assert_eq!(Span::new(10, 10).to_range(10), 10..10);
    }

    #[test]
    fn span_deserializes_from_parser_json() {
        let span: Span = serde_json::from_str(r#"{"start": 4, "end": 9}"#).unwrap();
        assert_eq!(span, Span::new(4, 9));
        assert!(!span.is_empty());
    }

    #[test]
    fn line_index_multiple_lines() {
        let idx = LineIndex::new("Transaction {\n  amount: number\n}");
        assert_eq!(idx.line_col(0), (1, 1));
        assert_eq!(idx.line_col(16), (2, 3));
        assert_eq!(idx.line_col(31), (3, 1));
        assert_eq!(idx.line_count(), 3);
    }
}
