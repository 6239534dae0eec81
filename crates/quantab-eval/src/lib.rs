//! Expression compiler, variable compiler and evaluation engine
//!
//! The engine turns user expression text and variable configurations into
//! immutable, shareable evaluators over survey responses. Parsing resolves
//! names eagerly against the field catalog and the declaration registry,
//! folds constants (rejecting expressions that provably raise) and enforces
//! a fixed nesting-depth limit; evaluation is pure and never fails for
//! business reasons.

mod compile;
mod engine;
mod error;
mod expression;
mod interpreter;
mod ir;
mod registry;
mod sync;
mod value;
mod variable;

pub use engine::Engine;
pub use expression::{
    BooleanEvaluator, BooleanExpression, FieldDependency, NumericEvaluator, NumericExpression,
};
pub use value::Value;
pub use variable::{
    BooleanVariable, CompiledVariable, InstanceListVariable, IntegerVariable, VariableEvaluator,
};
