//! Internal evaluation errors
//!
//! These never cross the engine boundary at runtime: a compiled evaluator
//! maps them to an absent value. They only surface as [`EngineError`]s when
//! constant folding proves that an expression raises unconditionally.

use quantab_diagnostics::{ErrorCode, QTB0200, QTB0201, QTB0202, QTB0203, QTB0204};
use thiserror::Error;

/// Result of one evaluation step
pub(crate) type EvalResult<T> = Result<T, EvalError>;

/// An error raised while evaluating an expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum EvalError {
    /// Operand types do not support the attempted operation
    #[error("unsupported operand type: {0}")]
    Type(String),

    /// Integer division or floor division by zero
    #[error("division by zero")]
    DivisionByZero,

    /// `min`/`max` over an empty sequence without a default
    #[error("{0}() over an empty sequence")]
    EmptyAggregate(&'static str),

    /// Ordering comparison between unorderable types
    #[error("'{left}' and '{right}' are not orderable")]
    NotOrderable {
        left: &'static str,
        right: &'static str,
    },

    /// Arithmetic overflowed the 64-bit integer range
    #[error("integer overflow")]
    Overflow,

    /// Folding sentinel: the sub-expression depends on response data and
    /// cannot be evaluated at compile time. Never raised at runtime.
    #[error("expression is not constant")]
    NotConst,
}

impl EvalError {
    /// The diagnostic code for this error
    pub(crate) fn code(&self) -> ErrorCode {
        match self {
            Self::Type(_) | Self::NotConst => QTB0200,
            Self::DivisionByZero => QTB0201,
            Self::EmptyAggregate(_) => QTB0202,
            Self::NotOrderable { .. } => QTB0203,
            Self::Overflow => QTB0204,
        }
    }
}
