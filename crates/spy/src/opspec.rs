use crate::function::FuncRef;
use crate::metaarg::MetaArg;
use crate::object::Object;

/// The output of a type's metafunction: a description of *how* to perform an
/// operation, before typechecking.
///
/// Conceptually, `c = a + b` executes in three steps:
///
/// 1. the `ADD` operator is called with the operands' [`MetaArg`]s and asks
///    the left (then right) type's `__add__` metafunction for an `OpSpec`;
/// 2. the typechecker turns the `OpSpec` into an executable
///    [`crate::opimpl::OpImpl`], inserting implicit conversions — this is
///    where typechecking can fail;
/// 3. the `OpImpl` is invoked with the concrete values.
///
/// Metafunctions never see concrete operand values, only static types (plus
/// values for blue arguments), so step 1 is always blue and can be optimized
/// away during redshifting.
#[derive(Debug, Clone)]
pub enum OpSpec {
    /// The operation is not applicable to these operand types.
    Null,
    /// Call this function with the original arguments, in order.
    Simple(FuncRef),
    /// Call this function with an explicit argument plan: entries are either
    /// caller arguments (matched by identity) or extra blue constants.
    Complex { func: FuncRef, args: Vec<MetaArg> },
    /// The result is this blue value; no call is needed.
    Const(Object),
}

impl OpSpec {
    pub fn simple(func: FuncRef) -> Self {
        Self::Simple(func)
    }

    pub fn complex(func: FuncRef, args: Vec<MetaArg>) -> Self {
        Self::Complex { func, args }
    }

    pub fn constant(value: Object) -> Self {
        Self::Const(value)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn func(&self) -> Option<&FuncRef> {
        match self {
            Self::Simple(f) | Self::Complex { func: f, .. } => Some(f),
            Self::Null | Self::Const(_) => None,
        }
    }
}
