//! Tree-walking evaluation of resolved expression trees
//!
//! The same walker serves two callers: runtime evaluation against a
//! response, and constant folding, which runs it without a response and
//! treats any data access as "not constant".

use crate::error::{EvalError, EvalResult};
use crate::ir::{FieldNode, Node, ResolvedSource};
use crate::value::{self, Value};
use crate::variable::CompiledVariable;
use quantab_ast::{AggregateFn, BoolOp, MethodKind};
use quantab_model::{EntityValueCombination, Response};

/// What the walker may read while evaluating
pub(crate) enum Mode<'a> {
    /// Evaluate against a response at an entity-value combination
    Runtime {
        response: &'a Response,
        combination: &'a EntityValueCombination,
    },
    /// Compile-time folding: field and entity access is not constant
    Const,
}

/// Comprehension loop bindings, innermost last
pub(crate) type Env = Vec<(String, Value)>;

pub(crate) fn evaluate(node: &Node, mode: &Mode<'_>, env: &mut Env) -> EvalResult<Value> {
    match node {
        Node::Const(value) => Ok(value.clone()),
        Node::Field(field) => match mode {
            Mode::Runtime {
                response,
                combination,
            } => evaluate_field(field, response, combination, mode, env),
            Mode::Const => Err(EvalError::NotConst),
        },
        Node::Entity(entity_type) => match mode {
            Mode::Runtime { combination, .. } => Ok(combination
                .value_for(entity_type)
                .map_or(Value::Null, Value::Int)),
            Mode::Const => Err(EvalError::NotConst),
        },
        Node::Loop(name) => {
            match env
                .iter()
                .rev()
                .find(|(var, _)| var.eq_ignore_ascii_case(name))
            {
                Some((_, value)) => Ok(value.clone()),
                // Folding walks elements outside their loop
                None => match mode {
                    Mode::Const => Err(EvalError::NotConst),
                    Mode::Runtime { .. } => {
                        Err(EvalError::Type(format!("unbound loop variable '{name}'")))
                    }
                },
            }
        }

        Node::Binary { op, left, right } => {
            let left = evaluate(left, mode, env)?;
            let right = evaluate(right, mode, env)?;
            value::binary(*op, &left, &right)
        }
        Node::Unary { op, operand } => {
            let operand = evaluate(operand, mode, env)?;
            value::unary(*op, &operand)
        }
        Node::Bool { op, operands } => {
            // Returns the deciding operand itself, not a coerced boolean
            let mut last = Value::Null;
            for (i, operand) in operands.iter().enumerate() {
                last = evaluate(operand, mode, env)?;
                let decided = match op {
                    BoolOp::And => !last.is_truthy(),
                    BoolOp::Or => last.is_truthy(),
                };
                if decided && i + 1 < operands.len() {
                    return Ok(last);
                }
            }
            Ok(last)
        }
        Node::Not(operand) => {
            let operand = evaluate(operand, mode, env)?;
            Ok(Value::Bool(!operand.is_truthy()))
        }
        Node::Compare { first, rest } => {
            let mut left = evaluate(first, mode, env)?;
            for (op, node) in rest {
                let right = evaluate(node, mode, env)?;
                if !value::compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Node::Ternary {
            condition,
            then_node,
            else_node,
        } => {
            if evaluate(condition, mode, env)?.is_truthy() {
                evaluate(then_node, mode, env)
            } else {
                evaluate(else_node, mode, env)
            }
        }

        Node::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(evaluate(item, mode, env)?);
            }
            Ok(Value::List(out))
        }
        Node::Dict(entries) => {
            let mut out = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                out.push((evaluate(key, mode, env)?, evaluate(value, mode, env)?));
            }
            Ok(Value::Dict(out))
        }
        Node::Comprehension {
            element,
            var,
            iterable,
            filter,
        } => {
            let iterable = evaluate(iterable, mode, env)?;
            let items = value::iterate(&iterable)?;
            let mut out = Vec::new();
            for item in items {
                env.push((var.clone(), item));
                let step = comprehension_step(element, filter.as_deref(), mode, env);
                env.pop();
                if let Some(value) = step? {
                    out.push(value);
                }
            }
            Ok(Value::List(out))
        }

        Node::Aggregate {
            function,
            arg,
            default,
        } => {
            let arg = evaluate(arg, mode, env)?;
            if *function == AggregateFn::Len {
                return value::length_of(&arg).map(Value::Int);
            }
            let items = value::iterate(&arg)?;
            if items.is_empty()
                && let Some(default) = default
            {
                return evaluate(default, mode, env);
            }
            match function {
                AggregateFn::Sum => value::sum(&items),
                AggregateFn::Any => Ok(Value::Bool(items.iter().any(Value::is_truthy))),
                AggregateFn::Min => value::extreme("min", &items, false),
                AggregateFn::Max => value::extreme("max", &items, true),
                AggregateFn::Len => unreachable!("handled above"),
            }
        }
        Node::Method {
            receiver,
            method,
            args,
        } => {
            let receiver = evaluate(receiver, mode, env)?;
            let mut arg_values = Vec::with_capacity(args.len());
            for arg in args {
                arg_values.push(evaluate(arg, mode, env)?);
            }
            match method {
                MethodKind::Count => match &receiver {
                    Value::List(items) => {
                        let needle = &arg_values[0];
                        let count = items.iter().filter(|item| item.loose_eq(needle)).count();
                        Ok(Value::Int(count as i64))
                    }
                    other => Err(EvalError::Type(format!(
                        "'{}' has no method 'count'",
                        other.type_name()
                    ))),
                },
                MethodKind::Get => match &receiver {
                    Value::Dict(entries) => {
                        let key = &arg_values[0];
                        Ok(entries
                            .iter()
                            .find(|(k, _)| k.loose_eq(key))
                            .map(|(_, v)| v.clone())
                            .unwrap_or_else(|| {
                                arg_values.get(1).cloned().unwrap_or(Value::Null)
                            }))
                    }
                    other => Err(EvalError::Type(format!(
                        "'{}' has no method 'get'",
                        other.type_name()
                    ))),
                },
            }
        }
    }
}

fn comprehension_step(
    element: &Node,
    filter: Option<&Node>,
    mode: &Mode<'_>,
    env: &mut Env,
) -> EvalResult<Option<Value>> {
    if let Some(filter) = filter
        && !evaluate(filter, mode, env)?.is_truthy()
    {
        return Ok(None);
    }
    evaluate(element, mode, env).map(Some)
}

/// Evaluate a field or variable reference against a response
///
/// The effective combination starts from the implicit bindings (bare
/// references inherit the evaluation combination for every type the source
/// carries) and is overridden by the accessor's explicit arguments. An
/// argument bound to a list expands into a union over the listed ids; an
/// argument that evaluates to `None` leaves the type unbound.
fn evaluate_field(
    field: &FieldNode,
    response: &Response,
    combination: &EntityValueCombination,
    mode: &Mode<'_>,
    env: &mut Env,
) -> EvalResult<Value> {
    let mut effective = EntityValueCombination::empty();
    if field.implicit {
        for entity_type in field.source.bindable_entity_types() {
            if let Some(id) = combination.value_for(entity_type) {
                effective.bind(entity_type, id);
            }
        }
    }

    let mut list_bindings: Vec<(&str, Vec<i64>)> = Vec::new();
    for (entity_type, value_node) in &field.bindings {
        match evaluate(value_node, mode, env)? {
            Value::Null => {}
            Value::List(items) => {
                let mut ids = Vec::with_capacity(items.len());
                for item in items {
                    ids.push(item.as_number().ok_or_else(|| {
                        EvalError::Type(format!(
                            "'{}' cannot select a {} instance",
                            item.type_name(),
                            entity_type
                        ))
                    })?);
                }
                list_bindings.push((entity_type, ids));
            }
            other => {
                let id = other.as_number().ok_or_else(|| {
                    EvalError::Type(format!(
                        "'{}' cannot select a {} instance",
                        other.type_name(),
                        entity_type
                    ))
                })?;
                effective.bind(entity_type.clone(), id);
            }
        }
    }

    let combinations = expand_combinations(effective, &list_bindings);

    match &field.source {
        ResolvedSource::Field(descriptor) => {
            let mut out = Vec::new();
            for combo in &combinations {
                out.extend(
                    response
                        .answers(&descriptor.name, combo)
                        .into_iter()
                        .map(Value::Int),
                );
            }
            Ok(Value::List(out))
        }
        ResolvedSource::Variable(variable) => match variable.as_ref() {
            CompiledVariable::Boolean(boolean) => Ok(Value::Bool(
                combinations
                    .first()
                    .is_some_and(|combo| boolean.evaluate(response, combo)),
            )),
            CompiledVariable::Integer(integer) => {
                let mut ids: Vec<i64> = Vec::new();
                for combo in &combinations {
                    ids.extend(integer.satisfied_instance_ids(response, combo));
                }
                ids.sort_unstable();
                ids.dedup();
                Ok(Value::List(ids.into_iter().map(Value::Int).collect()))
            }
        },
    }
}

/// Cartesian expansion of list-bound entity types over a base combination
fn expand_combinations(
    base: EntityValueCombination,
    list_bindings: &[(&str, Vec<i64>)],
) -> Vec<EntityValueCombination> {
    let mut combinations = vec![base];
    for (entity_type, ids) in list_bindings {
        combinations = combinations
            .iter()
            .flat_map(|combo| {
                ids.iter()
                    .map(move |id| combo.clone().with(*entity_type, *id))
            })
            .collect();
    }
    combinations
}
