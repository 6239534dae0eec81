//! Expression and variable evaluation engine for survey analytics
//!
//! This crate provides:
//! - Parsing and compiling a restricted scripting-language expression
//!   grammar into shareable evaluators over survey responses
//! - A multi-entity variable system (grouped, range, date, survey-id and
//!   composite components) with fast-path compilation for instance-list
//!   variables
//! - A concurrency-safe declaration registry with entity-instance
//!   synchronization
//!
//! # Example
//!
//! ```ignore
//! use quantab::{Engine, InMemoryEntityRepository, InMemoryFieldCatalog};
//! use std::sync::Arc;
//!
//! let fields = Arc::new(InMemoryFieldCatalog::new());
//! let entities = Arc::new(InMemoryEntityRepository::new());
//! let engine = Engine::new(fields, entities);
//!
//! let condition = engine.parse_user_boolean_expression("any(brand_used)")?;
//! let hit = condition.evaluate(&response, &combination);
//! ```

// Re-export all public APIs from internal crates
pub use quantab_ast as ast;
pub use quantab_diagnostics as diagnostics;
pub use quantab_eval as eval;
pub use quantab_model as model;
pub use quantab_parser as parser;

// Convenience re-exports
pub use quantab_diagnostics::{EngineError, ErrorCode, Result};
pub use quantab_eval::{
    BooleanEvaluator, BooleanExpression, CompiledVariable, Engine, FieldDependency,
    NumericEvaluator, NumericExpression, Value, VariableEvaluator,
};
pub use quantab_model::{
    AnswerRecord, ChoiceKind, EntityInstance, EntityRepository, EntityType, EntityValue,
    EntityValueCombination, FieldCatalog, InMemoryEntityRepository, InMemoryFieldCatalog,
    Response, ResponseFieldDescriptor, VariableComponent, VariableConfiguration,
    VariableDefinition, VariableGrouping,
};
pub use quantab_parser::parse_expression;
