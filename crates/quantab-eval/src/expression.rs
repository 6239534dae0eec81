//! Compiled user expressions
//!
//! A compiled expression is an immutable, shareable evaluator: the resolved
//! tree plus the analysis the aggregation layer needs (referenced sources
//! and user-controllable entity types). Evaluation never fails for business
//! reasons: runtime type friction and missing data resolve to falsy/absent.

use crate::interpreter::{evaluate, Mode};
use crate::ir::Node;
use crate::value::Value;
use quantab_model::{EntityValueCombination, Response};
use std::sync::Arc;

/// One referenced field or declared variable with its entity types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDependency {
    /// Source name as declared
    pub name: String,
    /// Entity types the source carries
    pub entity_types: Vec<String>,
    /// Whether the source is a declared variable rather than a raw field
    pub is_variable: bool,
}

#[derive(Debug)]
pub(crate) struct ExpressionCore {
    pub source: String,
    pub root: Node,
    pub dependencies: Vec<FieldDependency>,
    pub user_entity_combination: Vec<String>,
}

impl ExpressionCore {
    fn run(&self, response: &Response, combination: &EntityValueCombination) -> Option<Value> {
        let mode = Mode::Runtime {
            response,
            combination,
        };
        evaluate(&self.root, &mode, &mut Vec::new()).ok()
    }
}

/// A compiled boolean condition over responses
#[derive(Debug, Clone)]
pub struct BooleanExpression {
    core: Arc<ExpressionCore>,
}

impl BooleanExpression {
    pub(crate) fn new(core: ExpressionCore) -> Self {
        Self {
            core: Arc::new(core),
        }
    }

    /// The expression that accepts every response (empty input text)
    pub(crate) fn always_true() -> Self {
        Self::new(ExpressionCore {
            source: String::new(),
            root: Node::Const(Value::Bool(true)),
            dependencies: Vec::new(),
            user_entity_combination: Vec::new(),
        })
    }

    /// The original expression text
    pub fn source(&self) -> &str {
        &self.core.source
    }

    /// Fields and variables the expression reads
    pub fn field_dependencies(&self) -> &[FieldDependency] {
        &self.core.dependencies
    }

    /// Entity types explicitly bound with a `result.<type>` argument
    pub fn user_entity_combination(&self) -> &[String] {
        &self.core.user_entity_combination
    }

    /// Evaluate against one response at one entity-value combination
    ///
    /// Runtime evaluation errors are falsy, never surfaced.
    pub fn evaluate(&self, response: &Response, combination: &EntityValueCombination) -> bool {
        self.core
            .run(response, combination)
            .is_some_and(|value| value.is_truthy())
    }

    /// Bind the combination once for repeated per-response evaluation
    pub fn create_for_entity_values(
        &self,
        combination: &EntityValueCombination,
    ) -> BooleanEvaluator {
        BooleanEvaluator {
            expression: self.clone(),
            combination: combination.clone(),
        }
    }
}

/// A [`BooleanExpression`] bound to a fixed entity-value combination
#[derive(Debug, Clone)]
pub struct BooleanEvaluator {
    expression: BooleanExpression,
    combination: EntityValueCombination,
}

impl BooleanEvaluator {
    /// Evaluate against one response
    pub fn evaluate(&self, response: &Response) -> bool {
        self.expression.evaluate(response, &self.combination)
    }
}

/// A compiled numeric expression over responses
#[derive(Debug, Clone)]
pub struct NumericExpression {
    core: Arc<ExpressionCore>,
}

impl NumericExpression {
    pub(crate) fn new(core: ExpressionCore) -> Self {
        Self {
            core: Arc::new(core),
        }
    }

    /// The original expression text
    pub fn source(&self) -> &str {
        &self.core.source
    }

    /// Fields and variables the expression reads
    pub fn field_dependencies(&self) -> &[FieldDependency] {
        &self.core.dependencies
    }

    /// Entity types explicitly bound with a `result.<type>` argument
    pub fn user_entity_combination(&self) -> &[String] {
        &self.core.user_entity_combination
    }

    /// Evaluate against one response at one entity-value combination
    ///
    /// `None` means "no value": a runtime error, an absent answer, or a
    /// non-numeric result. A list with exactly one numeric element reads as
    /// that number (a single-choice field accessor yields such a list).
    pub fn evaluate(
        &self,
        response: &Response,
        combination: &EntityValueCombination,
    ) -> Option<i64> {
        self.core
            .run(response, combination)
            .and_then(|value| coerce_numeric(&value))
    }

    /// Bind the combination once for repeated per-response evaluation
    pub fn create_for_entity_values(
        &self,
        combination: &EntityValueCombination,
    ) -> NumericEvaluator {
        NumericEvaluator {
            expression: self.clone(),
            combination: combination.clone(),
        }
    }
}

/// A [`NumericExpression`] bound to a fixed entity-value combination
#[derive(Debug, Clone)]
pub struct NumericEvaluator {
    expression: NumericExpression,
    combination: EntityValueCombination,
}

impl NumericEvaluator {
    /// Evaluate against one response
    pub fn evaluate(&self, response: &Response) -> Option<i64> {
        self.expression.evaluate(response, &self.combination)
    }
}

fn coerce_numeric(value: &Value) -> Option<i64> {
    match value {
        Value::List(items) if items.len() == 1 => coerce_numeric(&items[0]),
        other => other.as_number(),
    }
}
