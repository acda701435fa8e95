use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};

/// A problem found while scanning a document's fenced blocks.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub span: Range<usize>,
    pub file_id: usize,
    pub severity: Severity,
    /// Another place in the source the error refers to, such as an earlier
    /// definition.
    pub related: Option<(Range<usize>, String)>,
    pub notes: Vec<String>,
}

impl ParseError {
    pub fn error(message: impl Into<String>, span: Range<usize>, file_id: usize) -> Self {
        ParseError {
            message: message.into(),
            span,
            file_id,
            severity: Severity::Error,
            related: None,
            notes: Vec::new(),
        }
    }

    /// A fence whose info string could not be read.
    pub fn bad_fence(reason: &str, span: Range<usize>, file_id: usize) -> Self {
        Self::error(format!("invalid fence attributes: {}", reason), span, file_id)
            .with_note("attributes are `:name`, `+req`, `%(call)`, `>out`, `title=...`, `hidden`, `disabled`")
    }

    /// A second block named `name`; `first` is the span of the earlier one.
    pub fn duplicate_block(
        name: &str,
        span: Range<usize>,
        first: Range<usize>,
        file_id: usize,
    ) -> Self {
        let mut error = Self::error(format!("duplicate block name '{}'", name), span, file_id)
            .with_note("block names must be unique within a document");
        error.related = Some((first, "first defined here".to_string()));
        error
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let mut labels = vec![Label::primary(self.file_id, self.span.clone())];
        if let Some((span, message)) = &self.related {
            labels.push(Label::secondary(self.file_id, span.clone()).with_message(message));
        }
        Diagnostic::new(self.severity)
            .with_message(&self.message)
            .with_labels(labels)
            .with_notes(self.notes.clone())
    }
}
