//! Abstract syntax tree for the quantab expression language
//!
//! The expression language is a restricted subset of a dynamic scripting
//! language: literals, arithmetic, truthy boolean logic, chained comparisons,
//! ternaries, comprehensions, a handful of aggregate calls and the two
//! survey-specific accessor forms (`response.<field>(...)` and
//! `result.<entityType>`).

mod expression;
mod literal;
mod operator;

pub use expression::*;
pub use literal::*;
pub use operator::*;

/// A node with source span information
pub type Spanned<T> = quantab_diagnostics::Spanned<T>;

/// Type alias for boxed expressions
pub type BoxExpr = Box<Spanned<Expression>>;

/// Type alias for optional boxed expressions
pub type OptBoxExpr = Option<Box<Spanned<Expression>>>;

/// An identifier in the expression language
///
/// Identifiers are matched case-insensitively against fields and declared
/// variables; the original casing is kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    /// The identifier text as written
    pub name: String,
}

impl Identifier {
    /// Create a new identifier
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The case-folded form used for symbol lookup
    pub fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
