//! Engine error codes following a structured numbering system
//!
//! Error code ranges:
//! - QTB0001-QTB0099: Parse errors (syntax, unknown identifiers, folding)
//! - QTB0100-QTB0199: Validation errors (variable configurations)
//! - QTB0200-QTB0299: Evaluation errors (internal runtime)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(u16);

impl ErrorCode {
    /// Create a new error code
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Get the numeric code
    pub const fn code(&self) -> u16 {
        self.0
    }

    /// Get error information for this code
    pub fn info(&self) -> &'static ErrorInfo {
        ERROR_INFO.get(&self.0).unwrap_or(&UNKNOWN_ERROR)
    }

    /// Check if this is a parse error (0001-0099)
    pub const fn is_parse_error(&self) -> bool {
        self.0 >= 1 && self.0 < 100
    }

    /// Check if this is a validation error (0100-0199)
    pub const fn is_validation_error(&self) -> bool {
        self.0 >= 100 && self.0 < 200
    }

    /// Check if this is an evaluation error (0200-0299)
    pub const fn is_evaluation_error(&self) -> bool {
        self.0 >= 200 && self.0 < 300
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QTB{:04}", self.0)
    }
}

/// Information about an error code
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Short description of the error
    pub description: &'static str,
    /// Detailed help text
    pub help: Option<&'static str>,
}

impl ErrorInfo {
    const fn new(description: &'static str) -> Self {
        Self {
            description,
            help: None,
        }
    }

    const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

static UNKNOWN_ERROR: ErrorInfo = ErrorInfo::new("Unknown error");

use std::collections::HashMap;
use std::sync::LazyLock;

static ERROR_INFO: LazyLock<HashMap<u16, ErrorInfo>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    // Parse errors (0001-0099)
    map.insert(1, ErrorInfo::new("Unexpected token"));
    map.insert(2, ErrorInfo::new("Unexpected end of input"));
    map.insert(3, ErrorInfo::new("Unterminated string literal"));
    map.insert(4, ErrorInfo::new("Invalid number format"));
    map.insert(5, ErrorInfo::new("Unknown identifier"));
    map.insert(
        6,
        ErrorInfo::new("Unknown entity type in field accessor argument"),
    );
    map.insert(7, ErrorInfo::new("Wrong number of arguments"));
    map.insert(8, ErrorInfo::new("Unknown function or method"));
    map.insert(
        9,
        ErrorInfo::new("Expression always raises")
            .with_help("A constant sub-expression provably throws when evaluated"),
    );
    map.insert(
        10,
        ErrorInfo::new("Expression too deeply nested")
            .with_help("Flatten the expression or split it into intermediate variables"),
    );
    map.insert(11, ErrorInfo::new("Expected expression"));
    map.insert(12, ErrorInfo::new("Keyword argument expected"));

    // Validation errors (0100-0199)
    map.insert(100, ErrorInfo::new("Variable definition is missing"));
    map.insert(101, ErrorInfo::new("Variable definition has no groups"));
    map.insert(102, ErrorInfo::new("Duplicate group instance id"));
    map.insert(103, ErrorInfo::new("Unknown instance id for entity type"));
    map.insert(104, ErrorInfo::new("Identifier already in use"));
    map.insert(105, ErrorInfo::new("Unknown source field or variable"));
    map.insert(106, ErrorInfo::new("Entity type name collides with an identifier"));
    map.insert(107, ErrorInfo::new("Definition kind is not evaluatable"));

    // Evaluation errors (0200-0299)
    map.insert(200, ErrorInfo::new("Unsupported operand type"));
    map.insert(201, ErrorInfo::new("Division by zero"));
    map.insert(202, ErrorInfo::new("Aggregate over an empty sequence"));
    map.insert(203, ErrorInfo::new("Values are not orderable"));
    map.insert(204, ErrorInfo::new("Integer overflow"));

    map
});

/// QTB0001: Unexpected token
pub const QTB0001: ErrorCode = ErrorCode::new(1);
/// QTB0002: Unexpected end of input
pub const QTB0002: ErrorCode = ErrorCode::new(2);
/// QTB0003: Unterminated string literal
pub const QTB0003: ErrorCode = ErrorCode::new(3);
/// QTB0004: Invalid number format
pub const QTB0004: ErrorCode = ErrorCode::new(4);
/// QTB0005: Unknown identifier
pub const QTB0005: ErrorCode = ErrorCode::new(5);
/// QTB0006: Unknown entity type in field accessor argument
pub const QTB0006: ErrorCode = ErrorCode::new(6);
/// QTB0007: Wrong number of arguments
pub const QTB0007: ErrorCode = ErrorCode::new(7);
/// QTB0008: Unknown function or method
pub const QTB0008: ErrorCode = ErrorCode::new(8);
/// QTB0009: Expression always raises
pub const QTB0009: ErrorCode = ErrorCode::new(9);
/// QTB0010: Expression too deeply nested
pub const QTB0010: ErrorCode = ErrorCode::new(10);
/// QTB0011: Expected expression
pub const QTB0011: ErrorCode = ErrorCode::new(11);
/// QTB0012: Keyword argument expected
pub const QTB0012: ErrorCode = ErrorCode::new(12);

/// QTB0100: Variable definition is missing
pub const QTB0100: ErrorCode = ErrorCode::new(100);
/// QTB0101: Variable definition has no groups
pub const QTB0101: ErrorCode = ErrorCode::new(101);
/// QTB0102: Duplicate group instance id
pub const QTB0102: ErrorCode = ErrorCode::new(102);
/// QTB0103: Unknown instance id for entity type
pub const QTB0103: ErrorCode = ErrorCode::new(103);
/// QTB0104: Identifier already in use
pub const QTB0104: ErrorCode = ErrorCode::new(104);
/// QTB0105: Unknown source field or variable
pub const QTB0105: ErrorCode = ErrorCode::new(105);
/// QTB0106: Entity type name collides with an identifier
pub const QTB0106: ErrorCode = ErrorCode::new(106);
/// QTB0107: Definition kind is not evaluatable
pub const QTB0107: ErrorCode = ErrorCode::new(107);

/// QTB0200: Unsupported operand type
pub const QTB0200: ErrorCode = ErrorCode::new(200);
/// QTB0201: Division by zero
pub const QTB0201: ErrorCode = ErrorCode::new(201);
/// QTB0202: Aggregate over an empty sequence
pub const QTB0202: ErrorCode = ErrorCode::new(202);
/// QTB0203: Values are not orderable
pub const QTB0203: ErrorCode = ErrorCode::new(203);
/// QTB0204: Integer overflow
pub const QTB0204: ErrorCode = ErrorCode::new(204);
