//! Expression parser using recursive descent with precedence climbing
//!
//! The grammar is a restricted subset of a dynamic scripting language;
//! precedence follows that language exactly (ternary < or < and < not <
//! comparison chains < additive < multiplicative < unary < power < postfix).

use crate::combinators::{
    identifier, integer, keyword, lit, padded_keyword, string_literal, ws, Input, PResult,
    MAX_DEPTH,
};
use quantab_ast::{
    AggregateCallExpr, AggregateFn, BinaryOp, BinaryOpExpr, BoolOp, BoolOpExpr, CompareExpr,
    CompareOp, ComprehensionExpr, DictExpr, EntityAccessExpr, EntityBinding, Expression,
    FieldAccessExpr, Identifier, IdentifierRef, ListExpr, Literal, MethodCallExpr, MethodKind,
    NotExpr, Spanned, TernaryExpr, UnaryOp, UnaryOpExpr,
};
use quantab_diagnostics::Span;
use winnow::combinator::opt;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::stream::Stream;

/// Helper to create dummy span (0, 0) - placeholder until proper span
/// tracking is needed by a consumer
fn dummy_span(inner: Expression) -> Spanned<Expression> {
    Spanned::new(inner, Span::new(0, 0))
}

fn cut<T>() -> PResult<T> {
    Err(ErrMode::Cut(ContextError::new()))
}

/// Parse an expression (entry point); enforces the nesting depth guard
pub fn expression_parser(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    if input.state.depth >= MAX_DEPTH {
        input.state.depth_exceeded = true;
        return cut();
    }
    input.state.depth += 1;
    let result = ternary_expression(input);
    input.state.depth -= 1;
    result
}

/// Parse a conditional expression (`then if cond else otherwise`)
fn ternary_expression(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    let then_expr = or_expression(input)?;

    if padded_keyword("if").parse_next(input).is_ok() {
        let condition = or_expression(input).map_err(ErrMode::cut)?;
        padded_keyword("else")
            .parse_next(input)
            .map_err(ErrMode::cut)?;
        let else_expr = expression_parser(input).map_err(ErrMode::cut)?;
        return Ok(dummy_span(Expression::Ternary(TernaryExpr {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })));
    }

    Ok(then_expr)
}

/// Parse an `or` chain
fn or_expression(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    let first = and_expression(input)?;
    if padded_keyword("or").parse_next(input).is_err() {
        return Ok(first);
    }

    let mut operands = vec![first, and_expression(input).map_err(ErrMode::cut)?];
    while padded_keyword("or").parse_next(input).is_ok() {
        operands.push(and_expression(input).map_err(ErrMode::cut)?);
    }
    Ok(dummy_span(Expression::BoolOp(BoolOpExpr {
        op: BoolOp::Or,
        operands,
    })))
}

/// Parse an `and` chain
fn and_expression(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    let first = not_expression(input)?;
    if padded_keyword("and").parse_next(input).is_err() {
        return Ok(first);
    }

    let mut operands = vec![first, not_expression(input).map_err(ErrMode::cut)?];
    while padded_keyword("and").parse_next(input).is_ok() {
        operands.push(not_expression(input).map_err(ErrMode::cut)?);
    }
    Ok(dummy_span(Expression::BoolOp(BoolOpExpr {
        op: BoolOp::And,
        operands,
    })))
}

/// Parse `not x` (guarded: `not` chains recurse)
fn not_expression(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    if padded_keyword("not").parse_next(input).is_ok() {
        if input.state.depth >= MAX_DEPTH {
            input.state.depth_exceeded = true;
            return cut();
        }
        input.state.depth += 1;
        let operand = not_expression(input).map_err(ErrMode::cut);
        input.state.depth -= 1;
        return Ok(dummy_span(Expression::Not(NotExpr {
            operand: Box::new(operand?),
        })));
    }
    comparison_expression(input)
}

/// Parse a comparison chain (`a < b <= c` stays one node)
fn comparison_expression(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    let first = additive_expression(input)?;
    let mut rest = Vec::new();

    loop {
        ws(input)?;
        let op = if lit("==").parse_next(input).is_ok() {
            Some(CompareOp::Equal)
        } else if lit("!=").parse_next(input).is_ok() {
            Some(CompareOp::NotEqual)
        } else if lit("<=").parse_next(input).is_ok() {
            Some(CompareOp::LessOrEqual)
        } else if lit(">=").parse_next(input).is_ok() {
            Some(CompareOp::GreaterOrEqual)
        } else if lit("<").parse_next(input).is_ok() {
            Some(CompareOp::Less)
        } else if lit(">").parse_next(input).is_ok() {
            Some(CompareOp::Greater)
        } else {
            None
        };

        match op {
            Some(op) => {
                ws(input)?;
                let right = additive_expression(input).map_err(ErrMode::cut)?;
                rest.push((op, right));
            }
            None => break,
        }
    }

    if rest.is_empty() {
        Ok(first)
    } else {
        Ok(dummy_span(Expression::Compare(CompareExpr {
            first: Box::new(first),
            rest,
        })))
    }
}

/// Parse additive expression (`+`, `-`)
fn additive_expression(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    let mut left = multiplicative_expression(input)?;

    loop {
        ws(input)?;
        let op = if lit("+").parse_next(input).is_ok() {
            Some(BinaryOp::Add)
        } else if lit("-").parse_next(input).is_ok() {
            Some(BinaryOp::Subtract)
        } else {
            None
        };

        match op {
            Some(op) => {
                ws(input)?;
                let right = multiplicative_expression(input).map_err(ErrMode::cut)?;
                left = dummy_span(Expression::BinaryOp(BinaryOpExpr {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                }));
            }
            None => break,
        }
    }

    Ok(left)
}

/// Parse multiplicative expression (`*`, `/`, `//`)
fn multiplicative_expression(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    let mut left = unary_expression(input)?;

    loop {
        ws(input)?;
        // `**` belongs to the power level and is consumed there; seeing it
        // here means the left operand ended, so stop
        if input.input.starts_with("**") {
            break;
        }
        let op = if lit("//").parse_next(input).is_ok() {
            Some(BinaryOp::FloorDivide)
        } else if lit("/").parse_next(input).is_ok() {
            Some(BinaryOp::Divide)
        } else if lit("*").parse_next(input).is_ok() {
            Some(BinaryOp::Multiply)
        } else {
            None
        };

        match op {
            Some(op) => {
                ws(input)?;
                let right = unary_expression(input).map_err(ErrMode::cut)?;
                left = dummy_span(Expression::BinaryOp(BinaryOpExpr {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                }));
            }
            None => break,
        }
    }

    Ok(left)
}

/// Parse unary expression (`-x`, `~x`; guarded: unary chains recurse)
fn unary_expression(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    ws(input)?;
    let op = if input.input.starts_with('-') {
        lit("-").parse_next(input)?;
        Some(UnaryOp::Negate)
    } else if input.input.starts_with('~') {
        lit("~").parse_next(input)?;
        Some(UnaryOp::Invert)
    } else {
        None
    };

    match op {
        Some(op) => {
            if input.state.depth >= MAX_DEPTH {
                input.state.depth_exceeded = true;
                return cut();
            }
            input.state.depth += 1;
            let operand = unary_expression(input).map_err(ErrMode::cut);
            input.state.depth -= 1;
            Ok(dummy_span(Expression::UnaryOp(UnaryOpExpr {
                op,
                operand: Box::new(operand?),
            })))
        }
        None => power_expression(input),
    }
}

/// Parse power expression (`x ** y`, right-associative, binds tighter than
/// unary on its left: `-2 ** 2` is `-(2 ** 2)`, `2 ** -1` parses)
fn power_expression(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    let base = postfix_expression(input)?;

    ws(input)?;
    if lit("**").parse_next(input).is_ok() {
        ws(input)?;
        let exponent = unary_expression(input).map_err(ErrMode::cut)?;
        return Ok(dummy_span(Expression::BinaryOp(BinaryOpExpr {
            left: Box::new(base),
            op: BinaryOp::Power,
            right: Box::new(exponent),
        })));
    }

    Ok(base)
}

/// Parse postfix trailers: method calls (`.count(...)`, `.get(...)`)
fn postfix_expression(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    let mut receiver = atom(input)?;

    loop {
        let checkpoint = input.checkpoint();
        ws(input)?;
        if lit(".").parse_next(input).is_err() {
            input.reset(&checkpoint);
            break;
        }
        ws(input)?;
        let name = match identifier(input) {
            Ok(name) => name,
            Err(_) => return cut(),
        };
        let Some(method) = MethodKind::from_name(&name) else {
            return cut();
        };
        let args = call_arguments(input)?;
        let valid = match method {
            MethodKind::Count => args.len() == 1,
            MethodKind::Get => args.len() == 1 || args.len() == 2,
        };
        if !valid {
            return cut();
        }
        receiver = dummy_span(Expression::MethodCall(MethodCallExpr {
            receiver: Box::new(receiver),
            method,
            args,
        }));
    }

    Ok(receiver)
}

/// Parse a plain positional argument list `(a, b, ...)`
fn call_arguments(input: &mut Input<'_>) -> PResult<Vec<Spanned<Expression>>> {
    ws(input)?;
    lit("(").parse_next(input).map_err(ErrMode::cut)?;
    ws(input)?;
    let mut args = Vec::new();
    if lit(")").parse_next(input).is_ok() {
        return Ok(args);
    }
    loop {
        args.push(expression_parser(input).map_err(ErrMode::cut)?);
        ws(input)?;
        if lit(",").parse_next(input).is_ok() {
            ws(input)?;
            continue;
        }
        lit(")").parse_next(input).map_err(ErrMode::cut)?;
        return Ok(args);
    }
}

/// Parse an atom: literal, list/dict display, parenthesised expression,
/// accessor form or identifier
fn atom(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    ws(input)?;

    if let Some(value) = opt(integer).parse_next(input)? {
        return Ok(dummy_span(Expression::Literal(Literal::Integer(value))));
    }
    if let Some(value) = opt(string_literal).parse_next(input)? {
        return Ok(dummy_span(Expression::Literal(Literal::String(value))));
    }
    if keyword("True").parse_next(input).is_ok() {
        return Ok(dummy_span(Expression::Literal(Literal::Boolean(true))));
    }
    if keyword("False").parse_next(input).is_ok() {
        return Ok(dummy_span(Expression::Literal(Literal::Boolean(false))));
    }
    if keyword("None").parse_next(input).is_ok() {
        return Ok(dummy_span(Expression::Literal(Literal::None)));
    }
    if input.input.starts_with('(') {
        return paren_or_generator(input);
    }
    if input.input.starts_with('[') {
        return list_display(input);
    }
    if input.input.starts_with('{') {
        return dict_display(input);
    }

    let name = identifier(input)?;

    // `response.<field>(...)` and `result.<type>` accessor forms
    if name == "response" && input.input.starts_with('.') {
        return field_access(input);
    }
    if name == "result" && input.input.starts_with('.') {
        lit(".").parse_next(input)?;
        let entity_type = identifier(input).map_err(ErrMode::cut)?;
        return Ok(dummy_span(Expression::EntityAccess(EntityAccessExpr {
            entity_type,
        })));
    }

    // A call target must be one of the built-in aggregates
    let checkpoint = input.checkpoint();
    ws(input)?;
    if input.input.starts_with('(') {
        let Some(function) = AggregateFn::from_name(&name) else {
            return cut();
        };
        return aggregate_call(input, function);
    }
    input.reset(&checkpoint);

    Ok(dummy_span(Expression::IdentifierRef(IdentifierRef {
        name: Identifier::new(name),
    })))
}

/// Parse the tail of `response.<field>(<entityType>=<expr>, ...)`
fn field_access(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    lit(".").parse_next(input)?;
    let field = identifier(input).map_err(ErrMode::cut)?;
    ws(input)?;
    lit("(").parse_next(input).map_err(ErrMode::cut)?;
    ws(input)?;

    let mut bindings = Vec::new();
    if lit(")").parse_next(input).is_ok() {
        return Ok(dummy_span(Expression::FieldAccess(FieldAccessExpr {
            field: Identifier::new(field),
            bindings,
        })));
    }
    loop {
        let entity_type = identifier(input).map_err(ErrMode::cut)?;
        ws(input)?;
        // The accessor takes keyword arguments only
        lit("=").parse_next(input).map_err(ErrMode::cut)?;
        if input.input.starts_with('=') {
            // `==` would be a comparison, not a binding
            return cut();
        }
        ws(input)?;
        let value = expression_parser(input).map_err(ErrMode::cut)?;
        bindings.push(EntityBinding {
            entity_type,
            value: Box::new(value),
        });
        ws(input)?;
        if lit(",").parse_next(input).is_ok() {
            ws(input)?;
            continue;
        }
        lit(")").parse_next(input).map_err(ErrMode::cut)?;
        return Ok(dummy_span(Expression::FieldAccess(FieldAccessExpr {
            field: Identifier::new(field),
            bindings,
        })));
    }
}

/// Parse `sum(...)`, `min(..., default=...)` and friends; the argument may
/// be a generator comprehension
fn aggregate_call(input: &mut Input<'_>, function: AggregateFn) -> PResult<Spanned<Expression>> {
    lit("(").parse_next(input).map_err(ErrMode::cut)?;
    ws(input)?;
    if input.input.starts_with(')') {
        // Zero arguments is an arity error for every aggregate
        return cut();
    }
    let first = expression_parser(input).map_err(ErrMode::cut)?;
    let arg = match comprehension_tail(input, first)? {
        Ok(comprehension) => dummy_span(Expression::Comprehension(comprehension)),
        Err(plain) => plain,
    };
    finish_aggregate_call(input, function, arg)
}

/// Shared tail of an aggregate call after its first argument
fn finish_aggregate_call(
    input: &mut Input<'_>,
    function: AggregateFn,
    arg: Spanned<Expression>,
) -> PResult<Spanned<Expression>> {
    ws(input)?;
    let mut default = None;
    if lit(",").parse_next(input).is_ok() {
        ws(input)?;
        let kw = identifier(input).map_err(ErrMode::cut)?;
        if kw != "default" || !function.accepts_default() {
            return cut();
        }
        ws(input)?;
        lit("=").parse_next(input).map_err(ErrMode::cut)?;
        ws(input)?;
        default = Some(Box::new(expression_parser(input).map_err(ErrMode::cut)?));
        ws(input)?;
    }
    lit(")").parse_next(input).map_err(ErrMode::cut)?;
    Ok(dummy_span(Expression::Aggregate(AggregateCallExpr {
        function,
        arg: Box::new(arg),
        default,
    })))
}

/// Try to parse `for <var> in <iterable> [if <filter>]` after an element
/// expression
///
/// Returns `Ok(Ok(comprehension))` when a `for` clause follows, otherwise
/// `Ok(Err(element))` with the element handed back untouched.
fn comprehension_tail(
    input: &mut Input<'_>,
    element: Spanned<Expression>,
) -> PResult<Result<ComprehensionExpr, Spanned<Expression>>> {
    if padded_keyword("for").parse_next(input).is_err() {
        return Ok(Err(element));
    }
    let var = identifier(input).map_err(ErrMode::cut)?;
    padded_keyword("in").parse_next(input).map_err(ErrMode::cut)?;
    let iterable = or_expression(input).map_err(ErrMode::cut)?;
    let filter = if padded_keyword("if").parse_next(input).is_ok() {
        Some(Box::new(or_expression(input).map_err(ErrMode::cut)?))
    } else {
        None
    };
    Ok(Ok(ComprehensionExpr {
        element: Box::new(element),
        var: Identifier::new(var),
        iterable: Box::new(iterable),
        filter,
    }))
}

/// Parse `( expression )` or a parenthesised generator
fn paren_or_generator(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    lit("(").parse_next(input)?;
    ws(input)?;
    let inner = expression_parser(input).map_err(ErrMode::cut)?;
    let inner = match comprehension_tail(input, inner)? {
        Ok(comprehension) => dummy_span(Expression::Comprehension(comprehension)),
        Err(plain) => plain,
    };
    ws(input)?;
    lit(")").parse_next(input).map_err(ErrMode::cut)?;
    Ok(inner)
}

/// Parse `[...]`: list display or list comprehension
fn list_display(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    lit("[").parse_next(input)?;
    ws(input)?;
    let mut elements = Vec::new();
    if lit("]").parse_next(input).is_ok() {
        return Ok(dummy_span(Expression::List(ListExpr { elements })));
    }

    let first = expression_parser(input).map_err(ErrMode::cut)?;
    let first = match comprehension_tail(input, first)? {
        Ok(comprehension) => {
            ws(input)?;
            lit("]").parse_next(input).map_err(ErrMode::cut)?;
            return Ok(dummy_span(Expression::Comprehension(comprehension)));
        }
        Err(plain) => plain,
    };

    elements.push(first);
    loop {
        ws(input)?;
        if lit(",").parse_next(input).is_ok() {
            ws(input)?;
            // Trailing comma
            if lit("]").parse_next(input).is_ok() {
                return Ok(dummy_span(Expression::List(ListExpr { elements })));
            }
            elements.push(expression_parser(input).map_err(ErrMode::cut)?);
            continue;
        }
        lit("]").parse_next(input).map_err(ErrMode::cut)?;
        return Ok(dummy_span(Expression::List(ListExpr { elements })));
    }
}

/// Parse `{...}`: dict display
fn dict_display(input: &mut Input<'_>) -> PResult<Spanned<Expression>> {
    lit("{").parse_next(input)?;
    ws(input)?;
    let mut entries = Vec::new();
    if lit("}").parse_next(input).is_ok() {
        return Ok(dummy_span(Expression::Dict(DictExpr { entries })));
    }
    loop {
        let key = expression_parser(input).map_err(ErrMode::cut)?;
        ws(input)?;
        lit(":").parse_next(input).map_err(ErrMode::cut)?;
        ws(input)?;
        let value = expression_parser(input).map_err(ErrMode::cut)?;
        entries.push((key, value));
        ws(input)?;
        if lit(",").parse_next(input).is_ok() {
            ws(input)?;
            if lit("}").parse_next(input).is_ok() {
                return Ok(dummy_span(Expression::Dict(DictExpr { entries })));
            }
            continue;
        }
        lit("}").parse_next(input).map_err(ErrMode::cut)?;
        return Ok(dummy_span(Expression::Dict(DictExpr { entries })));
    }
}
