//! Expression AST nodes
//!
//! The node shapes mirror the grammar: boolean connectives and comparison
//! chains keep their operand lists intact (they are not desugared to nested
//! binaries) so that folding and truthiness evaluation can follow the
//! dynamic-language short-circuit rules exactly.

use crate::{
    AggregateFn, BinaryOp, BoolOp, BoxExpr, CompareOp, Identifier, Literal, MethodKind,
    OptBoxExpr, Spanned, UnaryOp,
};

/// All expression types in the language
#[derive(Debug, Clone)]
pub enum Expression {
    /// Literal value (`None`, boolean, integer, string)
    Literal(Literal),

    /// Bare identifier reference: a field, a declared variable or a
    /// comprehension loop variable (resolved by the compiler)
    IdentifierRef(IdentifierRef),
    /// Field accessor call: `response.<field>(<entityType>=<expr>, ...)`
    FieldAccess(FieldAccessExpr),
    /// Entity accessor: `result.<entityType>`
    EntityAccess(EntityAccessExpr),

    /// Binary arithmetic operation
    BinaryOp(BinaryOpExpr),
    /// Unary operation (`-x`, `~x`)
    UnaryOp(UnaryOpExpr),
    /// `and`/`or` chain with operand-returning semantics
    BoolOp(BoolOpExpr),
    /// `not x`
    Not(NotExpr),
    /// Chained comparison (`a < b <= c`)
    Compare(CompareExpr),
    /// Conditional expression (`x if cond else y`)
    Ternary(TernaryExpr),

    /// List display (`[a, b, c]`)
    List(ListExpr),
    /// Dict display (`{k: v, ...}`)
    Dict(DictExpr),
    /// List or generator comprehension
    Comprehension(ComprehensionExpr),

    /// Aggregate call (`sum`/`min`/`max`/`any`/`len`)
    Aggregate(AggregateCallExpr),
    /// Method call (`.count`, `.get`)
    MethodCall(MethodCallExpr),
}

/// Bare identifier reference
#[derive(Debug, Clone)]
pub struct IdentifierRef {
    /// The referenced name
    pub name: Identifier,
}

/// One `<entityType>=<expr>` binding inside a field accessor call
#[derive(Debug, Clone)]
pub struct EntityBinding {
    /// Entity type identifier named by the keyword argument
    pub entity_type: String,
    /// Bound expression (a `result.<type>` accessor, a literal or a list)
    pub value: BoxExpr,
}

/// Field accessor call: `response.<field>(bindings...)`
#[derive(Debug, Clone)]
pub struct FieldAccessExpr {
    /// Field or variable name after `response.`
    pub field: Identifier,
    /// Entity-type keyword bindings; empty means "aggregate across all"
    pub bindings: Vec<EntityBinding>,
}

/// Entity accessor: `result.<entityType>`, the iterated instance id
#[derive(Debug, Clone)]
pub struct EntityAccessExpr {
    /// Entity type identifier
    pub entity_type: String,
}

/// Binary arithmetic expression
#[derive(Debug, Clone)]
pub struct BinaryOpExpr {
    /// Left operand
    pub left: BoxExpr,
    /// Operator
    pub op: BinaryOp,
    /// Right operand
    pub right: BoxExpr,
}

/// Unary expression
#[derive(Debug, Clone)]
pub struct UnaryOpExpr {
    /// Operator
    pub op: UnaryOp,
    /// Operand
    pub operand: BoxExpr,
}

/// Boolean connective chain (`a and b and c`)
///
/// Operands are kept flat; evaluation returns the deciding operand itself,
/// not a coerced boolean.
#[derive(Debug, Clone)]
pub struct BoolOpExpr {
    /// Connective
    pub op: BoolOp,
    /// Two or more operands
    pub operands: Vec<Spanned<Expression>>,
}

/// `not x` expression
#[derive(Debug, Clone)]
pub struct NotExpr {
    /// Operand
    pub operand: BoxExpr,
}

/// Chained comparison: `first op1 e1 op2 e2 ...`
///
/// `a < b < c` is evaluated as `a < b and b < c` with `b` evaluated once.
#[derive(Debug, Clone)]
pub struct CompareExpr {
    /// Leftmost operand
    pub first: BoxExpr,
    /// Operator/operand pairs, left to right
    pub rest: Vec<(CompareOp, Spanned<Expression>)>,
}

/// Conditional expression: `then_expr if condition else else_expr`
#[derive(Debug, Clone)]
pub struct TernaryExpr {
    /// Condition (written between `if` and `else`)
    pub condition: BoxExpr,
    /// Value when the condition is truthy
    pub then_expr: BoxExpr,
    /// Value when the condition is falsy
    pub else_expr: BoxExpr,
}

/// List display
#[derive(Debug, Clone)]
pub struct ListExpr {
    /// Element expressions
    pub elements: Vec<Spanned<Expression>>,
}

/// Dict display
#[derive(Debug, Clone)]
pub struct DictExpr {
    /// Key/value expression pairs in source order
    pub entries: Vec<(Spanned<Expression>, Spanned<Expression>)>,
}

/// Comprehension: `[element for var in iterable if filter]` or the
/// parenthesis-free generator form inside an aggregate call
#[derive(Debug, Clone)]
pub struct ComprehensionExpr {
    /// Element expression
    pub element: BoxExpr,
    /// Loop variable name
    pub var: Identifier,
    /// Iterated expression
    pub iterable: BoxExpr,
    /// Optional `if` filter
    pub filter: OptBoxExpr,
}

/// Aggregate function call
#[derive(Debug, Clone)]
pub struct AggregateCallExpr {
    /// The function
    pub function: AggregateFn,
    /// The sole positional argument (an iterable or, for `len`, a collection)
    pub arg: BoxExpr,
    /// Optional `default=` keyword argument (`min`/`max` only)
    pub default: OptBoxExpr,
}

/// Method call on a value (`receiver.method(args...)`)
#[derive(Debug, Clone)]
pub struct MethodCallExpr {
    /// Receiver expression
    pub receiver: BoxExpr,
    /// The method
    pub method: MethodKind,
    /// Positional arguments
    pub args: Vec<Spanned<Expression>>,
}

impl Expression {
    /// Maximum nesting depth of the tree rooted at this node
    ///
    /// Used by the compiler's stack-safety guard: both the parser and the
    /// post-fold check reject trees deeper than the fixed limit.
    pub fn depth(&self) -> usize {
        1 + match self {
            Self::Literal(_) | Self::IdentifierRef(_) | Self::EntityAccess(_) => 0,
            Self::FieldAccess(f) => f
                .bindings
                .iter()
                .map(|b| b.value.depth())
                .max()
                .unwrap_or(0),
            Self::BinaryOp(b) => b.left.depth().max(b.right.depth()),
            Self::UnaryOp(u) => u.operand.depth(),
            Self::Not(n) => n.operand.depth(),
            Self::BoolOp(b) => b.operands.iter().map(|o| o.depth()).max().unwrap_or(0),
            Self::Compare(c) => c
                .rest
                .iter()
                .map(|(_, e)| e.depth())
                .max()
                .unwrap_or(0)
                .max(c.first.depth()),
            Self::Ternary(t) => t
                .condition
                .depth()
                .max(t.then_expr.depth())
                .max(t.else_expr.depth()),
            Self::List(l) => l.elements.iter().map(|e| e.depth()).max().unwrap_or(0),
            Self::Dict(d) => d
                .entries
                .iter()
                .map(|(k, v)| k.depth().max(v.depth()))
                .max()
                .unwrap_or(0),
            Self::Comprehension(c) => c
                .element
                .depth()
                .max(c.iterable.depth())
                .max(c.filter.as_ref().map(|f| f.depth()).unwrap_or(0)),
            Self::Aggregate(a) => a
                .arg
                .depth()
                .max(a.default.as_ref().map(|d| d.depth()).unwrap_or(0)),
            Self::MethodCall(m) => m
                .args
                .iter()
                .map(|a| a.depth())
                .max()
                .unwrap_or(0)
                .max(m.receiver.depth()),
        }
    }

    /// Whether this node is a plain literal
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}
