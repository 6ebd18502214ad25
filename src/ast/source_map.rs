use super::Span;

/// Maps byte offsets to line/column positions within a REPL line or source file.
pub struct SourceMap {
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        SourceMap { line_starts }
    }

    /// Returns (line, col), both 1-based.
    pub fn lookup(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let col = offset.saturating_sub(self.line_starts[line]);
        (line + 1, col + 1)
    }

    /// Full text of the given 1-based line number, without its line ending.
    pub fn line_text<'a>(&self, source: &'a str, line: usize) -> &'a str {
        if line == 0 || line > self.line_starts.len() {
            return "";
        }
        let start = self.line_starts[line - 1];
        let end = self.line_starts.get(line).copied().unwrap_or(source.len());
        source[start..end].trim_end_matches(['\n', '\r'])
    }

    /// Number of caret columns needed to underline `span` on its first line.
    pub fn underline_width(&self, source: &str, span: Span) -> usize {
        let (line, col) = self.lookup(span.start);
        let remaining = self.line_text(source, line).len().saturating_sub(col - 1);
        span.end.saturating_sub(span.start).min(remaining).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line() {
        let src = "let x = 5;";
        let sm = SourceMap::new(src);
        assert_eq!(sm.lookup(0), (1, 1));
        assert_eq!(sm.lookup(4), (1, 5));
        assert_eq!(sm.lookup(10), (1, 11));
    }

    #[test]
    fn multi_line() {
        let src = "let a = 1;\nlet b = 2;\na + b";
        let sm = SourceMap::new(src);
        assert_eq!(sm.lookup(10), (1, 11)); // '\n' belongs to line 1
        assert_eq!(sm.lookup(11), (2, 1));
        assert_eq!(sm.lookup(22), (3, 1));
        assert_eq!(sm.line_text(src, 2), "let b = 2;");
        assert_eq!(sm.line_text(src, 3), "a + b");
    }

    #[test]
    fn line_text_out_of_bounds() {
        let src = "puts(1)";
        let sm = SourceMap::new(src);
        assert_eq!(sm.line_text(src, 0), "");
        assert_eq!(sm.line_text(src, 99), "");
    }

    #[test]
    fn crlf_is_trimmed() {
        let src = "let a = 1;\r\na";
        let sm = SourceMap::new(src);
        assert_eq!(sm.line_text(src, 1), "let a = 1;");
    }

    #[test]
    fn empty_source() {
        let sm = SourceMap::new("");
        assert_eq!(sm.lookup(0), (1, 1));
        assert_eq!(sm.line_text("", 1), "");
    }

    #[test]
    fn underline_is_clamped_to_line() {
        let src = "\"abc\ndef";
        let sm = SourceMap::new(src);
        assert_eq!(sm.underline_width(src, Span { start: 0, end: 8 }), 4);
        assert_eq!(sm.underline_width(src, Span { start: 2, end: 2 }), 1);
    }
}
