//! Engine error types

use crate::{ErrorCode, SourceLocation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the expression and variable engine
///
/// Parse and validation errors are the only variants that escape the public
/// API: evaluation errors stay internal to the engine and surface as absent
/// values, never as failures of a compiled evaluator.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum EngineError {
    /// Parse error (malformed syntax, unknown identifier, provable raise)
    #[error("{code}: {message}")]
    Parse {
        code: ErrorCode,
        message: String,
        expression: String,
        location: Option<SourceLocation>,
    },

    /// Validation error for a variable configuration
    #[error("{code}: {message}")]
    Validation {
        code: ErrorCode,
        message: String,
        identifier: Option<String>,
    },

    /// Internal evaluation error (constant folding, runtime dispatch)
    #[error("{code}: {message}")]
    Evaluation { code: ErrorCode, message: String },

    /// Multiple errors collected
    #[error("Multiple errors: {}", .0.len())]
    Multiple(Vec<EngineError>),
}

impl EngineError {
    /// Create a parse error
    pub fn parse(
        code: ErrorCode,
        message: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self::Parse {
            code,
            message: message.into(),
            expression: expression.into(),
            location: None,
        }
    }

    /// Create a parse error with location
    pub fn parse_at(
        code: ErrorCode,
        message: impl Into<String>,
        expression: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        Self::Parse {
            code,
            message: message.into(),
            expression: expression.into(),
            location: Some(location),
        }
    }

    /// Create a validation error
    pub fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
            identifier: None,
        }
    }

    /// Create a validation error tied to a variable identifier
    pub fn validation_for(
        code: ErrorCode,
        message: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self::Validation {
            code,
            message: message.into(),
            identifier: Some(identifier.into()),
        }
    }

    /// Create an evaluation error
    pub fn evaluation(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Evaluation {
            code,
            message: message.into(),
        }
    }

    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Parse { code, .. } => *code,
            Self::Validation { code, .. } => *code,
            Self::Evaluation { code, .. } => *code,
            Self::Multiple(errors) => errors
                .first()
                .map(|e| e.code())
                .unwrap_or(ErrorCode::new(0)),
        }
    }

    /// Get the location if available
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Self::Parse { location, .. } => location.as_ref(),
            _ => None,
        }
    }

    /// Check if this is a parse error
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
