//! Parser for the quantab expression language using Winnow
//!
//! Recursive descent with precedence climbing. Parsing is pure: the same
//! source text always yields the same tree. A fixed nesting-depth guard
//! rejects pathologically deep expressions at parse time, independent of
//! any response data.

mod combinators;
mod expression;

pub use combinators::MAX_DEPTH;

use combinators::new_input;
use expression::expression_parser;
use quantab_ast::{Expression, Spanned};
use quantab_diagnostics::{
    EngineError, Result, SourceLocation, QTB0001, QTB0002, QTB0010, QTB0011,
};
use winnow::prelude::*;
use winnow::combinator::eof;
use winnow::error::ContextError;

/// Parse a single expression, requiring the whole input to be consumed
pub fn parse_expression(source: &str) -> Result<Spanned<Expression>> {
    let mut input = new_input(source);

    let expr = match expression_parser(&mut input) {
        Ok(expr) => expr,
        Err(_) if input.state.depth_exceeded => {
            return Err(EngineError::parse(
                QTB0010,
                format!("Expression nests deeper than {MAX_DEPTH} levels"),
                source,
            ));
        }
        Err(_) => {
            let offset = source.len() - input.input.len();
            let (code, message) = if input.input.is_empty() {
                (QTB0002, "Unexpected end of input".to_string())
            } else if offset == 0 {
                (QTB0011, "Expected expression".to_string())
            } else {
                (QTB0001, format!("Unexpected token at offset {offset}"))
            };
            return Err(EngineError::parse_at(
                code,
                message,
                source,
                SourceLocation::from_span(quantab_diagnostics::Span::point(offset), source),
            ));
        }
    };

    let _ = combinators::ws(&mut input);
    if eof::<_, ContextError>.parse_next(&mut input).is_err() {
        let offset = source.len() - input.input.len();
        return Err(EngineError::parse_at(
            QTB0001,
            format!("Unexpected trailing input at offset {offset}"),
            source,
            SourceLocation::from_span(quantab_diagnostics::Span::point(offset), source),
        ));
    }

    Ok(expr)
}
