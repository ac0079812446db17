//! Error types and reporting

use thiserror::Error;

/// Result type alias for the front end
pub type Result<T> = std::result::Result<T, CompileError>;

/// Error produced while lexing or parsing
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("[line {line}] Error: {message}")]
    Lexer { message: String, line: usize },

    #[error("[line {line}] Error: {message}")]
    Parser { message: String, line: usize },
}

impl CompileError {
    pub fn lexer(message: impl Into<String>, line: usize) -> Self {
        Self::Lexer {
            message: message.into(),
            line,
        }
    }

    pub fn parser(message: impl Into<String>, line: usize) -> Self {
        Self::Parser {
            message: message.into(),
            line,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Self::Lexer { line, .. } => *line,
            Self::Parser { line, .. } => *line,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Lexer { message, .. } => message,
            Self::Parser { message, .. } => message,
        }
    }
}

/// Byte range of a 1-based line within `source`, if it exists
fn line_span(source: &str, line: usize) -> Option<std::ops::Range<usize>> {
    if line == 0 {
        return None;
    }
    let mut offset = 0;
    for (n, text) in source.split('\n').enumerate() {
        if n + 1 == line {
            return Some(offset..offset + text.len().max(1));
        }
        offset += text.len() + 1;
    }
    None
}

/// Report an error with ariadne, pointing at the offending line
pub fn report_error(filename: &str, source: &str, line: usize, message: &str) {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    match line_span(source, line) {
        Some(span) => {
            let _ = Report::build(ReportKind::Error, filename, span.start)
                .with_message(format!("[line {line}] Error: {message}"))
                .with_label(
                    Label::new((filename, span))
                        .with_message(message)
                        .with_color(Color::Red),
                )
                .finish()
                .eprint((filename, Source::from(source)));
        }
        None => {
            // No usable source context (natives report line 0)
            eprintln!("[line {line}] Error: {message}");
        }
    }
}
