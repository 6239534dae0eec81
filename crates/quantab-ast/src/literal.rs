//! Literal AST nodes

use serde::{Deserialize, Serialize};

/// A literal value in the expression language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Literal {
    /// The `None` literal
    None,
    /// Boolean literal (`True`/`False`)
    Boolean(bool),
    /// Integer literal (64-bit signed; the language has no floats)
    Integer(i64),
    /// String literal (single or double quoted)
    String(String),
}

impl Literal {
    /// Check whether the literal is truthy under dynamic-language rules
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Boolean(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::String(s) => !s.is_empty(),
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Boolean(true) => write!(f, "True"),
            Self::Boolean(false) => write!(f, "False"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::String(s) => write!(f, "'{s}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Literal::None.is_truthy());
        assert!(!Literal::Integer(0).is_truthy());
        assert!(Literal::Integer(-1).is_truthy());
        assert!(!Literal::String(String::new()).is_truthy());
        assert!(Literal::Boolean(true).is_truthy());
    }
}
