// ChapterSleuth - core/text.rs
//
// Decoded source text with a line index.
//
// The engine decodes each file exactly once (app layer reads bytes, core
// receives the decoded string) and normalises line endings to LF. Every
// byte offset used anywhere in the engine - boundaries, gaps, spacing
// constraints, sample windows - is an offset into this decoded, normalised
// text. Offsets are always line-aligned before slicing, so slices never
// land inside a multi-byte code point.

/// Byte range of one line's content in the decoded text, newline excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

/// The decoded, LF-normalised content of one source file plus its line
/// index and the encoding it was decoded from.
#[derive(Debug)]
pub struct NovelText {
    text: String,
    lines: Vec<LineSpan>,
    encoding: &'static str,
    confidence: f32,
}

impl NovelText {
    /// Build from decoded text. CRLF and lone CR are normalised to LF
    /// before the line index is built.
    pub fn new(decoded: String, encoding: &'static str, confidence: f32) -> Self {
        let text = if decoded.contains('\r') {
            decoded.replace("\r\n", "\n").replace('\r', "\n")
        } else {
            decoded
        };

        let mut lines = Vec::new();
        let mut start = 0usize;
        for (idx, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                lines.push(LineSpan { start, end: idx });
                start = idx + 1;
            }
        }
        if start < text.len() {
            lines.push(LineSpan {
                start,
                end: text.len(),
            });
        }

        Self {
            text,
            lines,
            encoding,
            confidence,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len_bytes(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn encoding(&self) -> &'static str {
        self.encoding
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Content of line `n`, newline excluded. Panics on out-of-range `n`;
    /// callers iterate within `line_count()`.
    pub fn line(&self, n: usize) -> &str {
        let span = self.lines[n];
        &self.text[span.start..span.end]
    }

    pub fn line_span(&self, n: usize) -> LineSpan {
        self.lines[n]
    }

    /// Byte offset of the start of line `n`.
    pub fn line_start(&self, n: usize) -> usize {
        self.lines[n].start
    }

    /// Index of the line containing `offset` (or the last line for offsets
    /// at or past the end of the text).
    pub fn line_at_offset(&self, offset: usize) -> usize {
        if self.lines.is_empty() {
            return 0;
        }
        match self
            .lines
            .binary_search_by(|span| span.start.cmp(&offset))
        {
            Ok(n) => n,
            // Insertion point n means lines[n].start > offset, so the
            // offset falls inside (or at the newline of) line n - 1.
            Err(0) => 0,
            Err(n) => n - 1,
        }
    }

    /// Largest line-start offset at or below `offset`.
    pub fn snap_to_line_start(&self, offset: usize) -> usize {
        if self.lines.is_empty() {
            return 0;
        }
        self.line_start(self.line_at_offset(offset.min(self.text.len())))
    }

    /// Text between two line-aligned offsets. Both ends are snapped to
    /// line starts (the end exclusive, extended to the end of text when it
    /// falls past the final line start).
    pub fn slice_lines(&self, start: usize, end: usize) -> &str {
        let s = self.snap_to_line_start(start);
        let e = if end >= self.text.len() {
            self.text.len()
        } else {
            self.snap_to_line_start(end)
        };
        &self.text[s.min(e)..e.max(s)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nt(s: &str) -> NovelText {
        NovelText::new(s.to_string(), "UTF-8", 1.0)
    }

    #[test]
    fn test_line_index_basic() {
        let t = nt("alpha\nbeta\ngamma");
        assert_eq!(t.line_count(), 3);
        assert_eq!(t.line(0), "alpha");
        assert_eq!(t.line(1), "beta");
        assert_eq!(t.line(2), "gamma");
        assert_eq!(t.line_start(1), 6);
    }

    #[test]
    fn test_trailing_newline_is_not_a_line() {
        let t = nt("alpha\nbeta\n");
        assert_eq!(t.line_count(), 2);
    }

    #[test]
    fn test_crlf_normalised() {
        let t = nt("alpha\r\nbeta\rgamma");
        assert_eq!(t.line_count(), 3);
        assert_eq!(t.line(1), "beta");
        assert_eq!(t.text(), "alpha\nbeta\ngamma");
    }

    #[test]
    fn test_line_at_offset() {
        let t = nt("ab\ncd\nef");
        assert_eq!(t.line_at_offset(0), 0);
        assert_eq!(t.line_at_offset(1), 0);
        assert_eq!(t.line_at_offset(2), 0); // the newline itself
        assert_eq!(t.line_at_offset(3), 1);
        assert_eq!(t.line_at_offset(7), 2);
        assert_eq!(t.line_at_offset(999), 2);
    }

    #[test]
    fn test_snap_to_line_start() {
        let t = nt("ab\ncd\nef");
        assert_eq!(t.snap_to_line_start(4), 3);
        assert_eq!(t.snap_to_line_start(0), 0);
        assert_eq!(t.snap_to_line_start(6), 6);
    }

    #[test]
    fn test_slice_lines_multibyte() {
        let t = nt("제1화 시작\n본문입니다\n제2화 계속");
        let s = t.slice_lines(0, t.line_start(1));
        assert_eq!(s, "제1화 시작\n");
    }

    #[test]
    fn test_empty() {
        let t = nt("");
        assert!(t.is_empty());
        assert_eq!(t.line_count(), 0);
        assert_eq!(t.snap_to_line_start(10), 0);
    }
}
