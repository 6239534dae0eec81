//! Parser integration tests

use pretty_assertions::assert_eq;
use quantab_ast::{
    AggregateFn, BinaryOp, BoolOp, CompareOp, Expression, Literal, MethodKind, UnaryOp,
};
use quantab_parser::{parse_expression, MAX_DEPTH};
use quantab_diagnostics::{QTB0009, QTB0010};
use rstest::rstest;

fn parse(source: &str) -> Expression {
    parse_expression(source)
        .unwrap_or_else(|err| panic!("failed to parse {source:?}: {err}"))
        .inner
}

#[rstest]
#[case("42", Literal::Integer(42))]
#[case("True", Literal::Boolean(true))]
#[case("False", Literal::Boolean(false))]
#[case("None", Literal::None)]
#[case("'hi'", Literal::String("hi".into()))]
#[case("\"hi\"", Literal::String("hi".into()))]
fn test_literals(#[case] source: &str, #[case] expected: Literal) {
    match parse(source) {
        Expression::Literal(literal) => assert_eq!(literal, expected),
        other => panic!("expected literal, got {other:?}"),
    }
}

#[test]
fn test_addition_binds_looser_than_multiplication() {
    // 1 + 2 * 3 parses as 1 + (2 * 3)
    match parse("1 + 2 * 3") {
        Expression::BinaryOp(add) => {
            assert_eq!(add.op, BinaryOp::Add);
            match &add.right.inner {
                Expression::BinaryOp(mul) => assert_eq!(mul.op, BinaryOp::Multiply),
                other => panic!("expected nested multiply, got {other:?}"),
            }
        }
        other => panic!("expected add, got {other:?}"),
    }
}

#[test]
fn test_power_is_right_associative() {
    // 2 ** 3 ** 2 parses as 2 ** (3 ** 2)
    match parse("2 ** 3 ** 2") {
        Expression::BinaryOp(outer) => {
            assert_eq!(outer.op, BinaryOp::Power);
            match &outer.right.inner {
                Expression::BinaryOp(inner) => assert_eq!(inner.op, BinaryOp::Power),
                other => panic!("expected nested power, got {other:?}"),
            }
        }
        other => panic!("expected power, got {other:?}"),
    }
}

#[test]
fn test_floor_divide_is_not_two_divides() {
    match parse("7 // 2") {
        Expression::BinaryOp(div) => assert_eq!(div.op, BinaryOp::FloorDivide),
        other => panic!("expected floor divide, got {other:?}"),
    }
}

#[test]
fn test_unary_operators() {
    match parse("-~x") {
        Expression::UnaryOp(neg) => {
            assert_eq!(neg.op, UnaryOp::Negate);
            match &neg.operand.inner {
                Expression::UnaryOp(inv) => assert_eq!(inv.op, UnaryOp::Invert),
                other => panic!("expected invert, got {other:?}"),
            }
        }
        other => panic!("expected negate, got {other:?}"),
    }
}

#[test]
fn test_comparison_chain_stays_flat() {
    match parse("1 < x <= 10") {
        Expression::Compare(chain) => {
            let ops: Vec<CompareOp> = chain.rest.iter().map(|(op, _)| *op).collect();
            assert_eq!(ops, vec![CompareOp::Less, CompareOp::LessOrEqual]);
        }
        other => panic!("expected comparison chain, got {other:?}"),
    }
}

#[test]
fn test_bool_chain_stays_flat() {
    match parse("a and b and c") {
        Expression::BoolOp(chain) => {
            assert_eq!(chain.op, BoolOp::And);
            assert_eq!(chain.operands.len(), 3);
        }
        other => panic!("expected bool chain, got {other:?}"),
    }
}

#[test]
fn test_or_binds_looser_than_and() {
    // a or b and c parses as a or (b and c)
    match parse("a or b and c") {
        Expression::BoolOp(chain) => {
            assert_eq!(chain.op, BoolOp::Or);
            assert_eq!(chain.operands.len(), 2);
            assert!(matches!(&chain.operands[1].inner, Expression::BoolOp(inner) if inner.op == BoolOp::And));
        }
        other => panic!("expected or chain, got {other:?}"),
    }
}

#[test]
fn test_ternary() {
    match parse("1 if x else 2") {
        Expression::Ternary(ternary) => {
            assert!(matches!(&ternary.condition.inner, Expression::IdentifierRef(_)));
        }
        other => panic!("expected ternary, got {other:?}"),
    }
}

#[test]
fn test_list_and_dict_displays() {
    match parse("[1, 2, 3]") {
        Expression::List(list) => assert_eq!(list.elements.len(), 3),
        other => panic!("expected list, got {other:?}"),
    }
    match parse("{1: 'a', 2: 'b'}") {
        Expression::Dict(dict) => assert_eq!(dict.entries.len(), 2),
        other => panic!("expected dict, got {other:?}"),
    }
}

#[test]
fn test_list_comprehension_with_filter() {
    match parse("[x * 2 for x in xs if x != 2]") {
        Expression::Comprehension(comp) => {
            assert_eq!(comp.var.name, "x");
            assert!(comp.filter.is_some());
        }
        other => panic!("expected comprehension, got {other:?}"),
    }
}

#[test]
fn test_generator_inside_aggregate() {
    match parse("sum(x for x in xs)") {
        Expression::Aggregate(call) => {
            assert_eq!(call.function, AggregateFn::Sum);
            assert!(matches!(&call.arg.inner, Expression::Comprehension(_)));
        }
        other => panic!("expected aggregate, got {other:?}"),
    }
}

#[test]
fn test_min_with_default_keyword() {
    match parse("min(xs, default=0)") {
        Expression::Aggregate(call) => {
            assert_eq!(call.function, AggregateFn::Min);
            assert!(call.default.is_some());
        }
        other => panic!("expected aggregate, got {other:?}"),
    }
}

#[test]
fn test_default_keyword_rejected_on_sum() {
    assert!(parse_expression("sum(xs, default=0)").is_err());
}

#[test]
fn test_field_accessor_with_bindings() {
    match parse("response.rating(brand=result.brand, occasion=1)") {
        Expression::FieldAccess(access) => {
            assert_eq!(access.field.name, "rating");
            assert_eq!(access.bindings.len(), 2);
            assert_eq!(access.bindings[0].entity_type, "brand");
            assert!(matches!(
                &access.bindings[0].value.inner,
                Expression::EntityAccess(e) if e.entity_type == "brand"
            ));
        }
        other => panic!("expected field access, got {other:?}"),
    }
}

#[test]
fn test_bare_field_accessor() {
    match parse("response.brand_used()") {
        Expression::FieldAccess(access) => assert!(access.bindings.is_empty()),
        other => panic!("expected field access, got {other:?}"),
    }
}

#[test]
fn test_entity_accessor() {
    match parse("result.brand") {
        Expression::EntityAccess(access) => assert_eq!(access.entity_type, "brand"),
        other => panic!("expected entity access, got {other:?}"),
    }
}

#[test]
fn test_method_calls() {
    match parse("xs.count(2)") {
        Expression::MethodCall(call) => {
            assert_eq!(call.method, MethodKind::Count);
            assert_eq!(call.args.len(), 1);
        }
        other => panic!("expected method call, got {other:?}"),
    }
    match parse("d.get(1, 'x')") {
        Expression::MethodCall(call) => {
            assert_eq!(call.method, MethodKind::Get);
            assert_eq!(call.args.len(), 2);
        }
        other => panic!("expected method call, got {other:?}"),
    }
}

#[rstest]
#[case("xs.count()")]
#[case("xs.count(1, 2)")]
#[case("d.get()")]
#[case("xs.flatten()")]
#[case("avg(xs)")]
fn test_bad_calls_are_rejected(#[case] source: &str) {
    assert!(parse_expression(source).is_err(), "{source:?} should not parse");
}

#[rstest]
#[case("1 +")]
#[case("(1")]
#[case("[1, 2")]
#[case("{1: }")]
#[case("'open")]
#[case("1 1")]
#[case("")]
fn test_malformed_input(#[case] source: &str) {
    let err = parse_expression(source).unwrap_err();
    assert!(err.is_parse(), "{source:?} should fail with a parse error");
    assert_ne!(err.code(), QTB0009);
}

#[test]
fn test_depth_guard() {
    let deep = format!("{}1", "-".repeat(MAX_DEPTH + 8));
    let err = parse_expression(&deep).unwrap_err();
    assert_eq!(err.code(), QTB0010);

    let parens = format!("{}1{}", "(".repeat(MAX_DEPTH + 8), ")".repeat(MAX_DEPTH + 8));
    let err = parse_expression(&parens).unwrap_err();
    assert_eq!(err.code(), QTB0010);

    // Depth just under the limit is fine
    let shallow = format!("{}1{}", "(".repeat(MAX_DEPTH - 4), ")".repeat(MAX_DEPTH - 4));
    assert!(parse_expression(&shallow).is_ok());
}

#[test]
fn test_keywords_are_not_identifiers() {
    assert!(parse_expression("for").is_err());
    // ...but identifiers may start with a keyword
    match parse("iffy") {
        Expression::IdentifierRef(reference) => assert_eq!(reference.name.name, "iffy"),
        other => panic!("expected identifier, got {other:?}"),
    }
}

#[test]
fn test_parse_is_deterministic() {
    let a = format!("{:?}", parse("sum(x for x in xs if x > 1) + min([1, 2], default=0)"));
    let b = format!("{:?}", parse("sum(x for x in xs if x > 1) + min([1, 2], default=0)"));
    assert_eq!(a, b);
}
