//! Operators of the expression language with precedence information

use serde::{Deserialize, Serialize};

/// Binary arithmetic operators with their precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Precedence 1 (lowest of the arithmetic tier)
    /// Addition
    Add,
    /// Subtraction
    Subtract,

    // Precedence 2
    /// Division (`/`), truncating like floor division (a documented quirk)
    Divide,
    /// Floor division (`//`)
    FloorDivide,
    /// Multiplication
    Multiply,

    // Precedence 3 (highest, right-associative)
    /// Power (`**`)
    Power,
}

impl BinaryOp {
    /// Get the precedence level (higher binds tighter)
    pub const fn precedence(&self) -> u8 {
        match self {
            Self::Add | Self::Subtract => 1,
            Self::Multiply | Self::Divide | Self::FloorDivide => 2,
            Self::Power => 3,
        }
    }

    /// Check if the operator is right-associative
    pub const fn is_right_associative(&self) -> bool {
        matches!(self, Self::Power)
    }

    /// Source form of the operator
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::FloorDivide => "//",
            Self::Power => "**",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Arithmetic negation (`-x`)
    Negate,
    /// Bitwise invert (`~x`, equals `-x - 1` on integers)
    Invert,
}

impl UnaryOp {
    /// Source form of the operator
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Negate => "-",
            Self::Invert => "~",
        }
    }
}

/// Boolean connectives with operand-returning semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoolOp {
    /// `and`: returns the first falsy operand, else the last operand
    And,
    /// `or`: returns the first truthy operand, else the last operand
    Or,
}

impl BoolOp {
    /// Source form of the operator
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// Comparison operators (chainable: `a < b < c`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// Equality
    Equal,
    /// Inequality
    NotEqual,
    /// Less than
    Less,
    /// Less than or equal
    LessOrEqual,
    /// Greater than
    Greater,
    /// Greater than or equal
    GreaterOrEqual,
}

impl CompareOp {
    /// Source form of the operator
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        }
    }

    /// Whether the operator needs ordered operands (as opposed to equality)
    pub const fn is_ordering(&self) -> bool {
        !matches!(self, Self::Equal | Self::NotEqual)
    }
}

/// Built-in aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFn {
    /// `sum(iterable)`: 0 for an empty sequence
    Sum,
    /// `min(iterable[, default=...])`
    Min,
    /// `max(iterable[, default=...])`
    Max,
    /// `any(iterable)`: truthiness of any element
    Any,
    /// `len(collection)`
    Len,
}

impl AggregateFn {
    /// Resolve a call target name to an aggregate function
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(Self::Sum),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "any" => Some(Self::Any),
            "len" => Some(Self::Len),
            _ => None,
        }
    }

    /// Source form of the function name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Any => "any",
            Self::Len => "len",
        }
    }

    /// Whether the function accepts a `default=` keyword argument
    pub const fn accepts_default(&self) -> bool {
        matches!(self, Self::Min | Self::Max)
    }
}

/// Built-in methods on collection values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodKind {
    /// `list.count(value)`
    Count,
    /// `dict.get(key[, default])`
    Get,
}

impl MethodKind {
    /// Resolve a method name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "count" => Some(Self::Count),
            "get" => Some(Self::Get),
            _ => None,
        }
    }

    /// Source form of the method name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Get => "get",
        }
    }
}
