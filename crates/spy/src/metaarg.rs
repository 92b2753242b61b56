use crate::ast::Color;
use crate::errors::{ErrorKind, Severity, SpyError, SpyResult};
use crate::fqn::FqnTable;
use crate::location::Loc;
use crate::object::{Key, Object};
use crate::types::Type;

/// The abstract value the evaluator reasons about before (or instead of)
/// computing it.
///
/// Operation dispatch must be driven by *static* types so that
/// interpretation and compilation agree: the same object can have different
/// static types (`x: MyClass` vs `y: object`) and thus respond to different
/// operations. A `MetaArg` tracks the color and static type of one
/// expression, plus its source location and originating symbol for error
/// messages.
///
/// The representation makes the central invariant structural: a blue
/// `MetaArg` always carries a value; a red one carries a value during
/// interpretation and none during redshift.
#[derive(Debug, Clone)]
pub struct MetaArg {
    /// Per-VM creation stamp; clones share it. The typechecker uses serials
    /// to map an OpSpec's argument plan back to caller argument positions.
    pub serial: u64,
    pub loc: Loc,
    /// Name of the symbol this value was read from, if any.
    pub sym: Option<String>,
    kind: MetaArgKind,
}

#[derive(Debug, Clone)]
enum MetaArgKind {
    Red { ty: Type, value: Option<Object> },
    Blue { ty: Type, value: Object },
}

impl MetaArg {
    pub fn red(serial: u64, ty: Type, value: Option<Object>, loc: Loc) -> Self {
        Self {
            serial,
            loc,
            sym: None,
            kind: MetaArgKind::Red { ty, value },
        }
    }

    pub fn blue(serial: u64, ty: Type, value: Object, loc: Loc) -> Self {
        Self {
            serial,
            loc,
            sym: None,
            kind: MetaArgKind::Blue { ty, value },
        }
    }

    #[must_use]
    pub fn with_sym(mut self, sym: impl Into<String>) -> Self {
        self.sym = Some(sym.into());
        self
    }

    pub fn color(&self) -> Color {
        match self.kind {
            MetaArgKind::Red { .. } => Color::Red,
            MetaArgKind::Blue { .. } => Color::Blue,
        }
    }

    pub fn is_blue(&self) -> bool {
        matches!(self.kind, MetaArgKind::Blue { .. })
    }

    pub fn static_type(&self) -> &Type {
        match &self.kind {
            MetaArgKind::Red { ty, .. } | MetaArgKind::Blue { ty, .. } => ty,
        }
    }

    /// The concrete value, if one is known (always for blue, usually for red
    /// during interpretation, never for red during redshift).
    pub fn value(&self) -> Option<&Object> {
        match &self.kind {
            MetaArgKind::Red { value, .. } => value.as_ref(),
            MetaArgKind::Blue { value, .. } => Some(value),
        }
    }

    /// The value, present iff the arg is blue.
    pub fn blue_value(&self) -> Option<&Object> {
        match &self.kind {
            MetaArgKind::Blue { value, .. } => Some(value),
            MetaArgKind::Red { .. } => None,
        }
    }

    /// Demotes to red, keeping the value (if any) and identity.
    #[must_use]
    pub fn as_red(&self) -> Self {
        match &self.kind {
            MetaArgKind::Red { .. } => self.clone(),
            MetaArgKind::Blue { ty, value } => Self {
                serial: self.serial,
                loc: self.loc.clone(),
                sym: self.sym.clone(),
                kind: MetaArgKind::Red {
                    ty: ty.clone(),
                    value: Some(value.clone()),
                },
            },
        }
    }

    /// Requires a blue value, with a red-argument diagnostic otherwise.
    pub fn blue_ensure(&self) -> SpyResult<&Object> {
        self.blue_value().ok_or_else(|| {
            SpyError::new(ErrorKind::TypeError, "expected blue argument").with(
                Severity::Error,
                "this is red",
                self.loc.clone(),
            )
        })
    }

    /// Requires a blue type value.
    pub fn blue_type(&self) -> SpyResult<Type> {
        let value = self.blue_ensure()?;
        value.as_type().cloned().ok_or_else(|| {
            SpyError::new(ErrorKind::TypeError, "expected a type").with(
                Severity::Error,
                "this is not a type",
                self.loc.clone(),
            )
        })
    }

    /// Requires a blue string value.
    pub fn blue_str(&self) -> SpyResult<String> {
        let value = self.blue_ensure()?;
        value.as_str().map(str::to_owned).ok_or_else(|| {
            SpyError::new(ErrorKind::TypeError, "expected a string").with(
                Severity::Error,
                "this is not a string",
                self.loc.clone(),
            )
        })
    }

    pub fn spy_key(&self) -> Key {
        Key::MetaArg {
            blue: self.is_blue(),
            ty: Box::new(Key::Fqn(self.static_type().fqn())),
            value: self.blue_value().map(|v| Box::new(v.spy_key())),
        }
    }

    pub fn repr(&self, fqns: &FqnTable) -> String {
        let color = match self.color() {
            Color::Red => "red",
            Color::Blue => "blue",
        };
        let ty = fqns.human(self.static_type().fqn());
        match self.blue_value() {
            Some(v) => format!("<MetaArg {color} {ty} = {}>", v.repr(fqns)),
            None => format!("<MetaArg {color} {ty}>"),
        }
    }

    /// Equality used by the blue cache and `universal_eq`: same static type,
    /// and equal values when both sides are blue.
    pub fn metaarg_eq(&self, other: &Self) -> bool {
        if self.static_type() != other.static_type() {
            return false;
        }
        match (self.blue_value(), other.blue_value()) {
            (Some(a), Some(b)) => a.spy_key() == b.spy_key(),
            _ => true,
        }
    }
}
