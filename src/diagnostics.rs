//! The diagnostics/tip sink plus the error-kind and tip-category
//! vocabularies it publishes.

use crate::source::SourceRegistry;
use crate::span::SourceSpan;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Abstract error kinds. Not every kind is a hard parse failure —
/// several (`RecoverySkippedTokens`, the type-analyzer ones) are reported at
/// `Warning` unless escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ParserErrorCode {
    UnexpectedToken,
    ExpectedToken,
    ExpectedIdentifier,
    ExpectedTypeName,
    UnknownTypeName,
    ExpectedExpression,
    ExpectedFunctionBody,
    BadRepeat,
    UnclosedGroup,
    UnclosedBracket,
    UnclosedBrace,
    BadRange,
    InvalidEscape,
    UnknownAttribute,
    UnknownModifier,
    IllegalImportPosition,
    CircularImport,
    CannotOpenImport,
    CannotReadImport,
    TooManyBrackets,
    TooManyCounters,
    ComplexityExceeded,
    TypeMismatchAssignment,
    TypeMismatchArgument,
    ReturnTypeMismatch,
    ReturnCountMismatch,
    ObjectClassMismatch,
    RecursiveFunctionNeedsType,
    AssignToConstant,
    RecoverySkippedTokens,
}

impl ParserErrorCode {
    /// `ObjectClassMismatch` is always an error regardless of
    /// `type_errors_are_fatal`; every other type-analyzer finding
    /// defaults to a warning.
    pub fn is_always_error(self) -> bool {
        matches!(self, ParserErrorCode::ObjectClassMismatch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum TipCategory {
    TypeSafety,
    Performance,
    CodeQuality,
    BestPractice,
    Style,
    HostSpecific,
}

/// A single reported diagnostic. `token_span` is the span of the token at
/// which the failure (or, for a tip, the triggering construct) was
/// detected — recovery must never lose this, per the design notes' recovery
/// discipline.
#[derive(Debug, Clone)]
pub struct ParserDiagnostic {
    pub severity: Severity,
    pub code: ParserErrorCode,
    pub message: String,
    pub span: SourceSpan,
}

/// Tips are a distinct, always-non-fatal stream with their own priority and
/// category, produced only by the type analyzer and merged
/// into the main diagnostics list by `Diagnostics::publish_tip`.
#[derive(Debug, Clone)]
pub struct Tip {
    pub category: TipCategory,
    pub priority: u8,
    pub message: String,
    pub span: SourceSpan,
}

/// Internal to the type analyzer before being folded into `ParserDiagnostic`
/// form by `Diagnostics::publish_type_diagnostic`.
#[derive(Debug, Clone)]
pub struct TypeDiagnostic {
    pub code: ParserErrorCode,
    pub message: String,
    pub span: SourceSpan,
}

/// Accumulates errors, warnings, tips and notes in source order within a
/// file; diagnostics raised while parsing an import are naturally sequenced
/// between the `import` statement's opening and its completion because the
/// child parser context writes into the very same sink.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<ParserDiagnostic>,
    tips: Vec<Tip>,
    tip_level: u8,
    type_errors_are_fatal: bool,
}

impl Diagnostics {
    pub fn new(tip_level: u8, type_errors_are_fatal: bool) -> Self {
        Self { entries: Vec::new(), tips: Vec::new(), tip_level, type_errors_are_fatal }
    }

    pub fn report(&mut self, severity: Severity, code: ParserErrorCode, message: impl Into<String>, span: SourceSpan) {
        self.entries.push(ParserDiagnostic { severity, code, message: message.into(), span });
    }

    pub fn push_error(&mut self, code: ParserErrorCode, message: impl Into<String>, span: SourceSpan) {
        self.report(Severity::Error, code, message, span);
    }

    pub fn push_warning(&mut self, code: ParserErrorCode, message: impl Into<String>, span: SourceSpan) {
        self.report(Severity::Warning, code, message, span);
    }

    pub fn push_note(&mut self, code: ParserErrorCode, message: impl Into<String>, span: SourceSpan) {
        self.report(Severity::Info, code, message, span);
    }

    /// Converts a `TypeDiagnostic` into a `ParserDiagnostic` honoring
    /// `type_errors_are_fatal`: every finding is a warning
    /// unless its code is always-fatal or the analyzer was configured to
    /// escalate.
    pub fn publish_type_diagnostic(&mut self, diag: TypeDiagnostic) {
        let severity = if diag.code.is_always_error() || self.type_errors_are_fatal {
            Severity::Error
        } else {
            Severity::Warning
        };
        self.report(severity, diag.code, diag.message, diag.span);
    }

    /// Emits `tip` if its priority is within the configured `tip_level`
    ///.
    pub fn publish_tip(&mut self, tip: Tip) {
        if self.tip_level > 0 && tip.priority <= self.tip_level {
            self.tips.push(tip);
        }
    }

    pub fn tip_level(&self) -> u8 {
        self.tip_level
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.tips.is_empty()
    }

    pub fn entries(&self) -> &[ParserDiagnostic] {
        &self.entries
    }

    pub fn tips(&self) -> &[Tip] {
        &self.tips
    }

    pub fn into_entries(self) -> Vec<ParserDiagnostic> {
        self.entries
    }

    /// Imported-file errors are wrapped with the importing-path context
    /// string "in imported file '<path>': <inner>".
    pub fn wrap_import_errors(&mut self, path: &str, from: usize) {
        for diag in &mut self.entries[from..] {
            diag.message = format!("in imported file '{path}': {}", diag.message);
        }
    }
}

/// Renders a tip using the wire format:
/// `[TIP] <file>:<line>:<col>: <category>: <message>`.
pub fn format_tip(tip: &Tip, registry: &SourceRegistry) -> String {
    let info = registry.get(tip.span.source);
    format!(
        "[TIP] {}:{}:{}: {}: {}",
        info.filename,
        tip.span.line,
        tip.span.column,
        tip.category,
        tip.message
    )
}

#[cfg(feature = "display-diagnostics")]
pub fn render_diagnostic(diag: &ParserDiagnostic, registry: &SourceRegistry, source_text: &str) -> String {
    use annotate_snippets::{Level, Renderer, Snippet};
    let info = registry.get(diag.span.source);
    let level = match diag.severity {
        Severity::Error => Level::Error,
        Severity::Warning => Level::Warning,
        Severity::Info => Level::Info,
    };
    let offset = diag.span.offset as usize;
    let end = offset + diag.span.length as usize;
    let message = level.title(&diag.message).snippet(
        Snippet::source(source_text)
            .origin(&info.filename)
            .fold(true)
            .annotation(level.span(offset..end.max(offset + 1))),
    );
    Renderer::styled().render(message).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceIdx;

    fn span() -> SourceSpan {
        SourceSpan::new(0, 1, 1, 1, SourceIdx(0))
    }

    #[test]
    fn object_class_mismatch_is_always_error() {
        let mut diags = Diagnostics::new(0, false);
        diags.publish_type_diagnostic(TypeDiagnostic {
            code: ParserErrorCode::ObjectClassMismatch,
            message: "mismatch".into(),
            span: span(),
        });
        assert!(diags.has_errors());
    }

    #[test]
    fn type_errors_are_warnings_unless_fatal() {
        let mut diags = Diagnostics::new(0, false);
        diags.publish_type_diagnostic(TypeDiagnostic {
            code: ParserErrorCode::TypeMismatchAssignment,
            message: "mismatch".into(),
            span: span(),
        });
        assert!(!diags.has_errors());

        let mut fatal = Diagnostics::new(0, true);
        fatal.publish_type_diagnostic(TypeDiagnostic {
            code: ParserErrorCode::TypeMismatchAssignment,
            message: "mismatch".into(),
            span: span(),
        });
        assert!(fatal.has_errors());
    }

    #[test]
    fn tip_level_zero_emits_nothing() {
        let mut diags = Diagnostics::new(0, false);
        diags.publish_tip(Tip { category: TipCategory::Style, priority: 1, message: "m".into(), span: span() });
        assert!(diags.tips().is_empty());
    }

    #[test]
    fn higher_tip_level_is_a_superset() {
        let mut low = Diagnostics::new(1, false);
        let mut high = Diagnostics::new(3, false);
        for priority in 1..=3 {
            let tip = Tip { category: TipCategory::Style, priority, message: format!("p{priority}"), span: span() };
            low.publish_tip(tip.clone());
            high.publish_tip(tip);
        }
        assert!(low.tips().len() <= high.tips().len());
        assert!(low.tips().iter().all(|t| high.tips().iter().any(|h| h.message == t.message)));
    }
}
