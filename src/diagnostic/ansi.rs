use crate::ast::SourceMap;
use super::Diagnostic;

pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn paint(&self, code: &str, s: &str) -> String {
        if self.use_color { format!("\x1b[{code}m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold(&self, s: &str) -> String {
        self.paint("1", s)
    }

    fn bold_red(&self, s: &str) -> String {
        self.paint("1;31", s)
    }

    fn cyan(&self, s: &str) -> String {
        self.paint("36", s)
    }

    fn dim(&self, s: &str) -> String {
        self.paint("2", s)
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let mut out = String::new();

        // "error[MK-P002]: message"
        let head = match d.code {
            Some(code) => format!("error[{code}]"),
            None => "error".to_string(),
        };
        out.push_str(&format!("{}: {}\n", self.bold_red(&head), self.bold(&d.message)));

        // Only the first label is drawn under the snippet
        if let (Some(label), Some(source)) = (d.labels.first(), &d.source) {
            let map = SourceMap::new(source);
            let (line, col) = map.lookup(label.span.start);
            let line_text = map.line_text(source, line);

            out.push_str(&format!("  {} {}:{}\n", self.cyan("-->"), line, col));

            let gutter = line.to_string().len();
            let pipe = self.cyan("|");
            let pad = " ".repeat(gutter);

            out.push_str(&format!("{pad} {pipe}\n"));
            let line_num = self.cyan(&format!("{line:>gutter$}"));
            out.push_str(&format!("{line_num} {pipe} {line_text}\n"));

            // Carets stop at the end of the line
            let width = map.underline_width(source, label.span);
            let carets = self.bold_red(&"^".repeat(width));
            let indent = " ".repeat(col.saturating_sub(1));
            if label.message.is_empty() {
                out.push_str(&format!("{pad} {pipe} {indent}{carets}\n"));
            } else {
                out.push_str(&format!(
                    "{pad} {pipe} {indent}{carets} {}\n",
                    self.bold_red(&label.message)
                ));
            }
            out.push_str(&format!("{pad} {pipe}\n"));
        }

        for note in &d.notes {
            out.push_str(&format!("  {} note: {}\n", self.dim("="), note));
        }
        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  {} help: {}\n", self.dim("="), suggestion));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn plain() -> AnsiRenderer {
        AnsiRenderer { use_color: false }
    }

    fn make_diag(source: &str, start: usize, end: usize) -> Diagnostic {
        Diagnostic::error("expected expression, got EOF")
            .with_code("MK-P002")
            .with_span(Span { start, end }, "here")
            .with_source(source.to_string())
            .with_note("while parsing a let statement")
            .with_suggestion("add a value after '='")
    }

    #[test]
    fn render_header_with_code() {
        let out = plain().render(&make_diag("let x = ;", 8, 9));
        assert!(out.starts_with("error[MK-P002]: expected expression"), "bad header in:\n{out}");
    }

    #[test]
    fn render_header_without_code() {
        let out = plain().render(&Diagnostic::error("division by zero"));
        assert_eq!(out, "error: division by zero\n");
    }

    #[test]
    fn render_snippet_and_carets() {
        let out = plain().render(&make_diag("let x = ;", 8, 9));
        assert!(out.contains("--> 1:9"), "missing location in:\n{out}");
        assert!(out.contains("1 | let x = ;"), "missing source line in:\n{out}");
        assert!(out.contains("  |         ^ here"), "misplaced caret in:\n{out}");
    }

    #[test]
    fn render_note_and_help() {
        let out = plain().render(&make_diag("let x = ;", 8, 9));
        assert!(out.contains("= note: while parsing a let statement"), "missing note in:\n{out}");
        assert!(out.contains("= help: add a value after '='"), "missing help in:\n{out}");
    }

    #[test]
    fn render_multiline_source_correct_line() {
        let source = "let a = 1;\nlet b = @;";
        let d = Diagnostic::error("bad")
            .with_span(Span { start: 19, end: 20 }, "")
            .with_source(source.to_string());
        let out = plain().render(&d);
        assert!(out.contains("--> 2:9"), "expected line 2 in:\n{out}");
        assert!(out.contains("2 | let b = @;"), "expected second line in:\n{out}");
    }

    #[test]
    fn carets_clamped_to_line() {
        let d = Diagnostic::error("bad")
            .with_span(Span { start: 4, end: 40 }, "")
            .with_source("let abc\nmore".to_string());
        let out = plain().render(&d);
        assert!(out.contains("    ^^^\n"), "expected 3 carets in:\n{out}");
    }

    #[test]
    fn color_toggle() {
        let d = make_diag("let x = ;", 8, 9);
        assert!(AnsiRenderer { use_color: true }.render(&d).contains("\x1b["));
        assert!(!plain().render(&d).contains("\x1b["));
    }
}
