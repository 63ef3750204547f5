//! Skirmish Expr -- formula language for battle data.
//!
//! Skill damage, healing, and periodic buff ticks are authored as small
//! arithmetic formulas in data files rather than compiled code. This crate
//! tokenizes, parses, and evaluates them:
//!
//! ```
//! use skirmish_expr::prelude::*;
//!
//! let ctx = MapContext::new()
//!     .with_attribute("caster", "physical_atk", 40.0)
//!     .with_attribute("target", "physical_def", 10.0);
//!
//! let mut evaluator = Evaluator::new(0xC0FFEE);
//! let damage = evaluator
//!     .evaluate_str("max(caster.physical_atk * 1.5 - target.physical_def, 1)", &ctx)
//!     .unwrap();
//! assert_eq!(damage, 50.0);
//! ```
//!
//! All randomness (`random`, `irandom`, `crit`) flows through the
//! evaluator's seeded PCG stream, so identical seeds give identical
//! simulations.

#![deny(unsafe_code)]

pub mod eval;
pub mod parser;
pub mod token;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while tokenizing, parsing, or evaluating a formula.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("malformed number '{text}' at offset {offset}")]
    MalformedNumber { text: String, offset: usize },

    #[error("unexpected token '{found}' at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("formula ended unexpectedly")]
    UnexpectedEnd,

    #[error("unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("unknown attribute '{entity}.{attribute}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("function '{function}' takes {expected} argument(s), got {found}")]
    WrongArity {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid argument to '{function}': {details}")]
    InvalidArgument { function: String, details: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("formula produced a non-finite value")]
    NonFiniteResult,
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::eval::{
        EmptyContext, EvalContext, Evaluator, FunctionTable, MapContext, NativeFn,
    };
    pub use crate::parser::{parse, BinaryOp, Expr, UnaryOp};
    pub use crate::ExprError;
}
