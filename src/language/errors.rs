use crate::language::span::Span;
use miette::SourceSpan;
use thiserror::Error;

/// A parse or lex failure. `label` annotates the offending span; it
/// defaults to the message.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    pub label: String,
    pub span: Span,
    pub help: Option<String>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        let message = message.into();
        Self {
            label: message.clone(),
            message,
            span,
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Zero-width spans (end of input) still get one column underlined.
    pub fn to_source_span(&self) -> SourceSpan {
        (self.span.start, self.span.len().max(1)).into()
    }
}

/// Every error the parser recovered from, in source order.
#[derive(Clone, Debug, Error)]
#[error("{} syntax error(s)", .errors.len())]
pub struct SyntaxErrors {
    pub errors: Vec<SyntaxError>,
}

impl SyntaxErrors {
    pub fn new(mut errors: Vec<SyntaxError>) -> Self {
        errors.sort_by_key(|err| err.span.start);
        Self { errors }
    }

    /// One-line summary used where there is no source to render against
    /// (`eval`, failed imports).
    pub fn first_message(&self) -> String {
        self.errors
            .first()
            .map(ToString::to_string)
            .unwrap_or_else(|| "syntax error".into())
    }
}
