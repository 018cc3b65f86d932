//! Rust-compiler-style error reports.
//!
//! Renders an error message against its source context: the offending line
//! with its line number, a caret underline at the error column, and optional
//! notes. All three error families (lexical, syntactic, compiler) funnel
//! through here in the CLI.

use std::fmt;

use krait_ast::SourceLocation;

/// A label attached to a source location.
#[derive(Debug, Clone)]
pub struct Label {
    pub location: SourceLocation,
    /// Underline width in characters; at least one caret is always drawn.
    pub length: usize,
    pub message: String,
}

impl Label {
    pub fn new(location: SourceLocation, length: usize, message: impl Into<String>) -> Self {
        Self {
            location,
            length,
            message: message.into(),
        }
    }
}

/// A rich diagnostic with source context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub source: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: String::new(),
            labels: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_label(mut self, location: SourceLocation, length: usize, message: impl Into<String>) -> Self {
        self.labels.push(Label::new(location, length, message));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    fn line_content(&self, line: u32) -> &str {
        self.source
            .lines()
            .nth(line.saturating_sub(1) as usize)
            .unwrap_or("")
    }

    fn line_number_width(&self) -> usize {
        self.labels
            .iter()
            .map(|label| label.location.line.to_string().len())
            .max()
            .unwrap_or(1)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;

        if self.source.is_empty() || self.labels.is_empty() {
            for note in &self.notes {
                writeln!(f, "  = note: {note}")?;
            }
            return Ok(());
        }

        let width = self.line_number_width();
        writeln!(f, "{:width$} |", "")?;
        for label in &self.labels {
            let line = label.location.line;
            let content = self.line_content(line);
            writeln!(f, "{line:width$} | {content}")?;

            write!(f, "{:width$} | ", "")?;
            for _ in 0..label.location.column {
                write!(f, " ")?;
            }
            for _ in 0..label.length.max(1) {
                write!(f, "^")?;
            }
            if !label.message.is_empty() {
                write!(f, " {}", label.message)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "{:width$} |", "")?;

        for note in &self.notes {
            writeln!(f, "  = note: {note}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_line_and_caret() {
        let diagnostic = Diagnostic::new("expected an expression")
            .with_source("x = = 1\n")
            .with_label(SourceLocation::new(1, 4), 1, "here")
            .with_note("a value must follow `=`");

        let output = diagnostic.to_string();
        assert!(output.contains("error: expected an expression"));
        assert!(output.contains("1 | x = = 1"));
        assert!(output.contains("^ here"));
        assert!(output.contains("= note: a value must follow `=`"));
    }

    #[test]
    fn works_without_source() {
        let output = Diagnostic::new("boom").to_string();
        assert!(output.contains("error: boom"));
    }
}
