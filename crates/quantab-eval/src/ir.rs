//! Resolved expression trees
//!
//! The compiler lowers the parsed AST into this tree: identifier references
//! are resolved to field descriptors, declared variables or loop variables,
//! and folded constants become [`Node::Const`] leaves. Resolution captures
//! `Arc`s at compile time, so a later redeclaration of a dependency never
//! changes an already compiled expression.

use crate::value::Value;
use crate::variable::CompiledVariable;
use quantab_ast::{AggregateFn, BinaryOp, BoolOp, CompareOp, MethodKind, UnaryOp};
use quantab_model::ResponseFieldDescriptor;
use std::sync::Arc;

/// A resolved data source behind a name
#[derive(Debug, Clone)]
pub(crate) enum ResolvedSource {
    /// A raw response field
    Field(Arc<ResponseFieldDescriptor>),
    /// A previously declared variable
    Variable(Arc<CompiledVariable>),
}

impl ResolvedSource {
    /// The source name as declared
    pub(crate) fn name(&self) -> &str {
        match self {
            Self::Field(field) => &field.name,
            Self::Variable(variable) => variable.identifier(),
        }
    }

    /// The entity types an accessor argument may bind for this source
    pub(crate) fn bindable_entity_types(&self) -> Vec<&str> {
        match self {
            Self::Field(field) => field.entity_types.iter().map(String::as_str).collect(),
            Self::Variable(variable) => variable.entity_type().into_iter().collect(),
        }
    }

    /// The entity type whose instances form the answer domain, if any
    pub(crate) fn answer_domain(&self) -> Option<&str> {
        match self {
            Self::Field(field) => field.answer_entity_type(),
            Self::Variable(variable) => variable.entity_type(),
        }
    }

    /// The answer values of this source for one response
    pub(crate) fn answers(
        &self,
        response: &quantab_model::Response,
        combination: &quantab_model::EntityValueCombination,
    ) -> Vec<i64> {
        match self {
            Self::Field(field) => response.answers(&field.name, combination),
            Self::Variable(variable) => match variable.as_ref() {
                CompiledVariable::Integer(integer) => {
                    integer.satisfied_instance_ids(response, combination)
                }
                // Validation never admits a boolean variable as a source
                CompiledVariable::Boolean(_) => Vec::new(),
            },
        }
    }

    /// Whether the source records at most one answer per coordinate
    pub(crate) fn is_single_choice_field(&self) -> bool {
        matches!(self, Self::Field(field) if field.is_single_choice())
    }
}

/// A field or variable reference with its entity-type bindings
#[derive(Debug)]
pub(crate) struct FieldNode {
    /// The resolved source
    pub source: ResolvedSource,
    /// Explicit `<entityType>=<expr>` bindings from the accessor call
    pub bindings: Vec<(String, Node)>,
    /// Bare references bind the evaluation combination implicitly; accessor
    /// calls bind only their explicit arguments
    pub implicit: bool,
}

/// One node of a resolved expression tree
#[derive(Debug)]
pub(crate) enum Node {
    /// A compile-time constant
    Const(Value),
    /// Field or variable reference
    Field(FieldNode),
    /// `result.<entityType>`: the instance id bound for the type
    Entity(String),
    /// Comprehension loop variable
    Loop(String),

    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Bool {
        op: BoolOp,
        operands: Vec<Node>,
    },
    Not(Box<Node>),
    Compare {
        first: Box<Node>,
        rest: Vec<(CompareOp, Node)>,
    },
    Ternary {
        condition: Box<Node>,
        then_node: Box<Node>,
        else_node: Box<Node>,
    },

    List(Vec<Node>),
    Dict(Vec<(Node, Node)>),
    Comprehension {
        element: Box<Node>,
        var: String,
        iterable: Box<Node>,
        filter: Option<Box<Node>>,
    },

    Aggregate {
        function: AggregateFn,
        arg: Box<Node>,
        default: Option<Box<Node>>,
    },
    Method {
        receiver: Box<Node>,
        method: MethodKind,
        args: Vec<Node>,
    },
}

impl Node {
    /// Maximum nesting depth, re-checked after folding
    pub(crate) fn depth(&self) -> usize {
        1 + match self {
            Self::Const(_) | Self::Entity(_) | Self::Loop(_) => 0,
            Self::Field(field) => field
                .bindings
                .iter()
                .map(|(_, node)| node.depth())
                .max()
                .unwrap_or(0),
            Self::Binary { left, right, .. } => left.depth().max(right.depth()),
            Self::Unary { operand, .. } => operand.depth(),
            Self::Not(operand) => operand.depth(),
            Self::Bool { operands, .. } => {
                operands.iter().map(Node::depth).max().unwrap_or(0)
            }
            Self::Compare { first, rest } => rest
                .iter()
                .map(|(_, node)| node.depth())
                .max()
                .unwrap_or(0)
                .max(first.depth()),
            Self::Ternary {
                condition,
                then_node,
                else_node,
            } => condition.depth().max(then_node.depth()).max(else_node.depth()),
            Self::List(items) => items.iter().map(Node::depth).max().unwrap_or(0),
            Self::Dict(entries) => entries
                .iter()
                .map(|(k, v)| k.depth().max(v.depth()))
                .max()
                .unwrap_or(0),
            Self::Comprehension {
                element,
                iterable,
                filter,
                ..
            } => element
                .depth()
                .max(iterable.depth())
                .max(filter.as_deref().map(Node::depth).unwrap_or(0)),
            Self::Aggregate { arg, default, .. } => arg
                .depth()
                .max(default.as_deref().map(Node::depth).unwrap_or(0)),
            Self::Method { receiver, args, .. } => args
                .iter()
                .map(Node::depth)
                .max()
                .unwrap_or(0)
                .max(receiver.depth()),
        }
    }
}
