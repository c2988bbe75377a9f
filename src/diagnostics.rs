use crate::{
    language::{errors::SyntaxErrors, typecheck::TypeError},
    runtime::error::Failure,
};
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use std::path::Path;
use thiserror::Error;

/// A located front-end error rendered against its source text.
#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{stage} error: {message}")]
pub struct SourceDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    stage: &'static str,
    message: String,
    label: String,
}

impl SourceDiagnostic {
    fn new(src: &NamedSource<String>, stage: &'static str, span: SourceSpan) -> Self {
        Self {
            src: src.clone(),
            span,
            help: None,
            stage,
            message: String::new(),
            label: String::new(),
        }
    }
}

fn named_source(path: &Path, source: &str) -> NamedSource<String> {
    NamedSource::new(path.display().to_string(), source.to_string())
}

pub fn emit_syntax_errors(path: &Path, source: &str, errors: &SyntaxErrors) {
    let src = named_source(path, source);
    for err in &errors.errors {
        let diagnostic = SourceDiagnostic {
            help: err.help.clone(),
            message: err.message.clone(),
            label: err.label.clone(),
            ..SourceDiagnostic::new(&src, "Syntax", err.to_source_span())
        };
        eprintln!("{:?}", Report::new(diagnostic));
    }
}

pub fn emit_type_errors(path: &Path, source: &str, errors: &[TypeError]) {
    let src = named_source(path, source);
    for err in errors {
        let span = (err.span.start, err.span.len().max(1)).into();
        let diagnostic = SourceDiagnostic {
            help: err.help.clone(),
            message: err.message.clone(),
            label: err.label.clone(),
            ..SourceDiagnostic::new(&src, "Type", span)
        };
        eprintln!("{:?}", Report::new(diagnostic));
    }
}

pub fn report_runtime_error(failure: &Failure) {
    eprintln!("{failure}");
}

pub fn report_io_error(path: &Path, error: &std::io::Error) {
    eprintln!("Failed to access {}: {}", path.display(), error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::span::Position;

    #[test]
    fn type_errors_underline_at_least_one_column() {
        let err = TypeError::new(Path::new("main.shape"), Position::new(1, 5, 4), "bad")
            .with_label("here");
        let src = named_source(Path::new("main.shape"), "var x = 1");
        let diagnostic = SourceDiagnostic {
            message: err.message.clone(),
            label: err.label.clone(),
            ..SourceDiagnostic::new(&src, "Type", (err.span.start, err.span.len().max(1)).into())
        };
        assert_eq!(diagnostic.to_string(), "Type error: bad");
        assert_eq!(diagnostic.span.offset(), 4);
        assert_eq!(diagnostic.span.len(), 1);
    }

    #[test]
    fn reports_render_the_file_name_and_message() {
        let src = named_source(Path::new("main.shape"), "var = 1");
        let diagnostic = SourceDiagnostic {
            message: "Expected a name".to_string(),
            label: "here".to_string(),
            help: Some("write `var name = value`".to_string()),
            ..SourceDiagnostic::new(&src, "Syntax", (4, 1).into())
        };
        let rendered = format!("{:?}", Report::new(diagnostic.clone()));
        assert!(rendered.contains("main.shape"), "{rendered}");
        assert!(rendered.contains("Syntax error: Expected a name"), "{rendered}");
        assert_eq!(diagnostic.help.as_deref(), Some("write `var name = value`"));
    }
}
