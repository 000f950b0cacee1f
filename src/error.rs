use crate::ast::Span;
use std::fmt;

/// Kind of compile error. Every kind is fatal: the first error aborts the
/// whole compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedAttribute,
    DuplicateAttribute,
    InvalidAttributeValue,
    UnmatchedClosingTag,
    MissingOpeningTag,
    UnclosedTag,
    InvalidSlotPlacement,
    InvalidComponentName,
    // Tokenizer / expression parser
    UnexpectedToken,
    UnterminatedTag,
    UnterminatedExpression,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedAttribute => "Unsupported attribute",
            ErrorKind::DuplicateAttribute => "Duplicate attribute",
            ErrorKind::InvalidAttributeValue => "Invalid attribute value",
            ErrorKind::UnmatchedClosingTag => "Unmatched closing tag",
            ErrorKind::MissingOpeningTag => "Missing opening tag",
            ErrorKind::UnclosedTag => "Unclosed tag",
            ErrorKind::InvalidSlotPlacement => "Invalid slot placement",
            ErrorKind::InvalidComponentName => "Invalid component name",
            ErrorKind::UnexpectedToken => "Unexpected token",
            ErrorKind::UnterminatedTag => "Unterminated tag",
            ErrorKind::UnterminatedExpression => "Unterminated expression",
        }
    }
}

/// Error during compilation, anchored to a source span.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
    pub related_span: Option<Span>,
    pub related_label: Option<String>,
    pub help: Option<String>,
}

impl ParseError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            related_span: None,
            related_label: None,
            help: None,
        }
    }

    /// Add a related span (e.g. "opened here").
    pub fn with_related(mut self, span: Span) -> Self {
        self.related_span = Some(span);
        self
    }

    pub fn with_related_label(mut self, label: impl Into<String>) -> Self {
        self.related_label = Some(label.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// 1-indexed line of the primary span, as reported to users.
    pub fn line(&self) -> usize {
        self.span.start.line + 1
    }

    pub fn column(&self) -> usize {
        self.span.start.col + 1
    }

    /// Render the error with a source excerpt: location header, the
    /// offending line with caret underlines (indentation-adjusted), the
    /// related line if any, and help text.
    pub fn render(&self, source: &str, filename: &str) -> String {
        let mut output = String::new();
        output.push('\n');

        output.push_str(&format!(" file: {}:{}:{}\n", filename, self.line(), self.column()));
        output.push_str(&format!("error: {}\n", self.message));

        let line_num_width = self
            .related_span
            .iter()
            .chain(std::iter::once(&self.span))
            .map(|s| format!("{}", s.start.line + 1).len())
            .max()
            .unwrap_or(2)
            .max(2);

        output.push_str(&format!("{:>width$} |\n", "", width = line_num_width));
        Self::excerpt(&mut output, source, &self.span, line_num_width, None);

        if let Some(ref related) = self.related_span {
            let label = self.related_label.as_deref().unwrap_or("opened here");
            Self::excerpt(&mut output, source, related, line_num_width, Some(label));
        }

        if let Some(ref help) = self.help {
            output.push('\n');
            for (i, help_line) in help.lines().enumerate() {
                if i == 0 {
                    output.push_str(&format!(" help: {}\n", help_line));
                } else {
                    output.push_str(&format!("       {}\n", help_line));
                }
            }
        }

        output.push('\n');
        output
    }

    fn excerpt(output: &mut String, source: &str, span: &Span, width: usize, label: Option<&str>) {
        let Some(source_line) = source.lines().nth(span.start.line) else {
            return;
        };

        // Strip the line's own indentation and shift the carets with it.
        let indent = source_line.len() - source_line.trim_start().len();
        let shown = source_line.trim_start();
        let line_no = span.start.line + 1;

        output.push_str(&format!("{:>width$} | {}\n", line_no, shown, width = width));

        let caret_start = span.start.col.saturating_sub(indent);
        let caret_len = if span.end.line == span.start.line {
            (span.end.col.saturating_sub(span.start.col)).max(1)
        } else {
            shown.len().saturating_sub(caret_start).max(1)
        };

        let spaces = " ".repeat(caret_start);
        let carets = "^".repeat(caret_len);
        match label {
            Some(label) => {
                output.push_str(&format!("{:>width$} | {}{} {}\n", "", spaces, carets, label, width = width));
            }
            None => {
                output.push_str(&format!("{:>width$} | {}{}\n", "", spaces, carets, width = width));
            }
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}
