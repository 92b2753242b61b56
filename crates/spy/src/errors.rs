use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

use crate::location::Loc;

/// Result type alias for operations that can fail with a [`SpyError`].
pub type SpyResult<T> = Result<T, SpyError>;

/// The error kinds surfaced to SPy programs and to the CLI.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>`
/// implementations. The string form is the wire-level name (e.g. "W_TypeError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    #[strum(serialize = "W_TypeError")]
    TypeError,
    #[strum(serialize = "W_ScopeError")]
    ScopeError,
    #[strum(serialize = "W_ImportError")]
    ImportError,
    #[strum(serialize = "W_ParseError")]
    ParseError,
    #[strum(serialize = "W_ValueError")]
    ValueError,
    #[strum(serialize = "W_IndexError")]
    IndexError,
    #[strum(serialize = "W_KeyError")]
    KeyError,
    #[strum(serialize = "W_ZeroDivisionError")]
    ZeroDivisionError,
    /// Unrecoverable runtime failures (e.g. out-of-bounds unsafe access).
    #[strum(serialize = "W_PanicError")]
    PanicError,
    /// Errors raised during scope analysis, typechecking or redshift.
    #[strum(serialize = "W_StaticError")]
    StaticError,
    /// The app-level debugger asked to quit.
    #[strum(serialize = "W_SPdbQuit")]
    SPdbQuit,
}

/// Severity of a single [`Annotation`] attached to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Note,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Note => "note",
        }
    }
}

/// A source-anchored message attached to a [`SpyError`].
#[derive(Debug, Clone)]
pub struct Annotation {
    pub severity: Severity,
    pub message: String,
    pub loc: Loc,
}

/// The error value used across the whole VM.
///
/// Carries a kind, a primary message and an ordered list of annotations,
/// each pointing at a source span. Static errors may be routed to a warning
/// sink instead of unwinding, depending on the redshift error mode.
#[derive(Debug, Clone)]
pub struct SpyError {
    pub kind: ErrorKind,
    pub message: String,
    pub annotations: Vec<Annotation>,
}

impl SpyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            annotations: Vec::new(),
        }
    }

    /// Builds an error with a single primary annotation.
    pub fn simple(kind: ErrorKind, message: impl Into<String>, secondary: impl Into<String>, loc: Loc) -> Self {
        let mut err = Self::new(kind, message);
        err.add(Severity::Error, secondary, loc);
        err
    }

    /// Appends an annotation, preserving insertion order.
    pub fn add(&mut self, severity: Severity, message: impl Into<String>, loc: Loc) {
        self.annotations.push(Annotation {
            severity,
            message: message.into(),
            loc,
        });
    }

    /// Chainable variant of [`SpyError::add`].
    #[must_use]
    pub fn with(mut self, severity: Severity, message: impl Into<String>, loc: Loc) -> Self {
        self.add(severity, message, loc);
        self
    }

    /// Renders the error with caret-underlined source lines.
    ///
    /// `read_source` is called once per distinct filename; returning `None`
    /// falls back to the location-only format.
    pub fn render(&self, mut read_source: impl FnMut(&str) -> Option<String>) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        let _ = writeln!(out, "{}: {}", self.kind, self.message);
        for ann in &self.annotations {
            if ann.loc.is_fake() {
                let _ = writeln!(out, "  {}: {}", ann.severity.label(), ann.message);
                continue;
            }
            let _ = writeln!(out, "  --> {}:{}", ann.loc.filename, ann.loc.line_start);
            if let Some(src) = read_source(&ann.loc.filename) {
                if let Some(line) = src.lines().nth(ann.loc.line_start.saturating_sub(1) as usize) {
                    let _ = writeln!(out, "   |{line}");
                    let col_end = if ann.loc.line_end == ann.loc.line_start {
                        (ann.loc.col_end as usize).min(line.len())
                    } else {
                        line.len()
                    };
                    let width = col_end.saturating_sub(ann.loc.col_start as usize).max(1);
                    let _ = writeln!(
                        out,
                        "   |{}{} {}: {}",
                        " ".repeat(ann.loc.col_start as usize),
                        "^".repeat(width),
                        ann.severity.label(),
                        ann.message
                    );
                    continue;
                }
            }
            let _ = writeln!(out, "   {}: {}", ann.severity.label(), ann.message);
        }
        out
    }
}

impl fmt::Display for SpyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for ann in &self.annotations {
            write!(f, "\n  {}: {} ({})", ann.severity.label(), ann.message, ann.loc)?;
        }
        Ok(())
    }
}

impl std::error::Error for SpyError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kind_roundtrips_through_wire_name() {
        assert_eq!(ErrorKind::TypeError.to_string(), "W_TypeError");
        assert_eq!(ErrorKind::from_str("W_ZeroDivisionError").unwrap(), ErrorKind::ZeroDivisionError);
    }

    #[test]
    fn render_underlines_the_span() {
        let loc = Loc::new("demo.spy".into(), 1, 1, 4, 7);
        let err = SpyError::simple(ErrorKind::TypeError, "bad operand", "this is red", loc);
        let rendered = err.render(|_| Some("x = abc + 1".to_owned()));
        assert!(rendered.starts_with("W_TypeError: bad operand"));
        assert!(rendered.contains("^^^"));
    }
}
