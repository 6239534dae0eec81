//! Expression compilation: name resolution, constant folding, analysis
//!
//! Compilation resolves every identifier against the field catalog and the
//! declaration registry, folds constant sub-expressions (rejecting any that
//! provably raise), re-checks the nesting depth and collects the dependency
//! analysis the aggregation layer consumes.

use crate::error::EvalError;
use crate::expression::{ExpressionCore, FieldDependency};
use crate::interpreter::{evaluate, Mode};
use crate::ir::{FieldNode, Node, ResolvedSource};
use crate::registry::VariableRegistry;
use crate::value::Value;
use quantab_ast::{BoolOp, Expression, Literal};
use quantab_diagnostics::{EngineError, Result, QTB0005, QTB0006, QTB0009, QTB0010};
use quantab_model::FieldCatalog;
use quantab_parser::{parse_expression, MAX_DEPTH};

pub(crate) struct ExpressionCompiler<'a> {
    pub fields: &'a dyn FieldCatalog,
    pub registry: &'a VariableRegistry,
}

#[derive(Default)]
struct Analysis {
    dependencies: Vec<FieldDependency>,
    user_entity_combination: Vec<String>,
}

impl Analysis {
    fn add_dependency(&mut self, source: &ResolvedSource) {
        let name = source.name();
        if self
            .dependencies
            .iter()
            .any(|d| d.name.eq_ignore_ascii_case(name))
        {
            return;
        }
        self.dependencies.push(FieldDependency {
            name: name.to_string(),
            entity_types: source
                .bindable_entity_types()
                .iter()
                .map(|t| t.to_string())
                .collect(),
            is_variable: matches!(source, ResolvedSource::Variable(_)),
        });
    }

    fn add_user_entity_type(&mut self, entity_type: &str) {
        if !self
            .user_entity_combination
            .iter()
            .any(|t| t.eq_ignore_ascii_case(entity_type))
        {
            self.user_entity_combination.push(entity_type.to_string());
        }
    }
}

impl ExpressionCompiler<'_> {
    /// Compile expression text into a resolved, folded tree with analysis
    pub(crate) fn compile(&self, source: &str) -> Result<ExpressionCore> {
        let ast = parse_expression(source)?;

        let mut analysis = Analysis::default();
        let mut scope = Vec::new();
        let node = self.resolve(&ast.inner, &mut scope, &mut analysis, source)?;

        let node = fold(node).map_err(|err| {
            EngineError::parse(QTB0009, format!("Expression always raises: {err}"), source)
        })?;

        if node.depth() > MAX_DEPTH {
            return Err(EngineError::parse(
                QTB0010,
                format!("Expression nests deeper than {MAX_DEPTH} levels"),
                source,
            ));
        }

        Ok(ExpressionCore {
            source: source.to_string(),
            root: node,
            dependencies: analysis.dependencies,
            user_entity_combination: analysis.user_entity_combination,
        })
    }

    fn lookup_source(&self, name: &str) -> Option<ResolvedSource> {
        if let Some(field) = self.fields.field(name) {
            return Some(ResolvedSource::Field(field));
        }
        self.registry.get(name).map(ResolvedSource::Variable)
    }

    fn resolve(
        &self,
        expr: &Expression,
        scope: &mut Vec<String>,
        analysis: &mut Analysis,
        source_text: &str,
    ) -> Result<Node> {
        match expr {
            Expression::Literal(literal) => Ok(Node::Const(match literal {
                Literal::None => Value::Null,
                Literal::Boolean(b) => Value::Bool(*b),
                Literal::Integer(i) => Value::Int(*i),
                Literal::String(s) => Value::Str(s.clone()),
            })),

            Expression::IdentifierRef(reference) => {
                let name = &reference.name;
                if scope.iter().any(|var| var.eq_ignore_ascii_case(&name.name)) {
                    return Ok(Node::Loop(name.name.clone()));
                }
                let source = self.lookup_source(&name.name).ok_or_else(|| {
                    EngineError::parse(
                        QTB0005,
                        format!("Unknown identifier '{name}'"),
                        source_text,
                    )
                })?;
                analysis.add_dependency(&source);
                Ok(Node::Field(FieldNode {
                    source,
                    bindings: Vec::new(),
                    implicit: true,
                }))
            }

            Expression::FieldAccess(access) => {
                let source = self.lookup_source(&access.field.name).ok_or_else(|| {
                    EngineError::parse(
                        QTB0005,
                        format!("Unknown field or variable '{}'", access.field),
                        source_text,
                    )
                })?;
                analysis.add_dependency(&source);

                let mut bindings = Vec::with_capacity(access.bindings.len());
                for binding in &access.bindings {
                    let carried = source
                        .bindable_entity_types()
                        .iter()
                        .any(|t| t.eq_ignore_ascii_case(&binding.entity_type));
                    if !carried {
                        return Err(EngineError::parse(
                            QTB0006,
                            format!(
                                "'{}' is not associated with entity type '{}'",
                                source.name(),
                                binding.entity_type
                            ),
                            source_text,
                        ));
                    }
                    if contains_entity_access(&binding.value.inner) {
                        analysis.add_user_entity_type(&binding.entity_type);
                    }
                    let value = self.resolve(&binding.value.inner, scope, analysis, source_text)?;
                    bindings.push((binding.entity_type.clone(), value));
                }

                Ok(Node::Field(FieldNode {
                    source,
                    bindings,
                    implicit: false,
                }))
            }

            Expression::EntityAccess(access) => Ok(Node::Entity(access.entity_type.clone())),

            Expression::BinaryOp(binary) => Ok(Node::Binary {
                op: binary.op,
                left: Box::new(self.resolve(&binary.left.inner, scope, analysis, source_text)?),
                right: Box::new(self.resolve(&binary.right.inner, scope, analysis, source_text)?),
            }),
            Expression::UnaryOp(unary) => Ok(Node::Unary {
                op: unary.op,
                operand: Box::new(self.resolve(
                    &unary.operand.inner,
                    scope,
                    analysis,
                    source_text,
                )?),
            }),
            Expression::BoolOp(chain) => {
                let mut operands = Vec::with_capacity(chain.operands.len());
                for operand in &chain.operands {
                    operands.push(self.resolve(&operand.inner, scope, analysis, source_text)?);
                }
                Ok(Node::Bool {
                    op: chain.op,
                    operands,
                })
            }
            Expression::Not(not) => Ok(Node::Not(Box::new(self.resolve(
                &not.operand.inner,
                scope,
                analysis,
                source_text,
            )?))),
            Expression::Compare(compare) => {
                let first =
                    Box::new(self.resolve(&compare.first.inner, scope, analysis, source_text)?);
                let mut rest = Vec::with_capacity(compare.rest.len());
                for (op, operand) in &compare.rest {
                    rest.push((
                        *op,
                        self.resolve(&operand.inner, scope, analysis, source_text)?,
                    ));
                }
                Ok(Node::Compare { first, rest })
            }
            Expression::Ternary(ternary) => Ok(Node::Ternary {
                condition: Box::new(self.resolve(
                    &ternary.condition.inner,
                    scope,
                    analysis,
                    source_text,
                )?),
                then_node: Box::new(self.resolve(
                    &ternary.then_expr.inner,
                    scope,
                    analysis,
                    source_text,
                )?),
                else_node: Box::new(self.resolve(
                    &ternary.else_expr.inner,
                    scope,
                    analysis,
                    source_text,
                )?),
            }),

            Expression::List(list) => {
                let mut items = Vec::with_capacity(list.elements.len());
                for element in &list.elements {
                    items.push(self.resolve(&element.inner, scope, analysis, source_text)?);
                }
                Ok(Node::List(items))
            }
            Expression::Dict(dict) => {
                let mut entries = Vec::with_capacity(dict.entries.len());
                for (key, value) in &dict.entries {
                    entries.push((
                        self.resolve(&key.inner, scope, analysis, source_text)?,
                        self.resolve(&value.inner, scope, analysis, source_text)?,
                    ));
                }
                Ok(Node::Dict(entries))
            }
            Expression::Comprehension(comprehension) => {
                let iterable = Box::new(self.resolve(
                    &comprehension.iterable.inner,
                    scope,
                    analysis,
                    source_text,
                )?);
                scope.push(comprehension.var.name.clone());
                let element =
                    self.resolve(&comprehension.element.inner, scope, analysis, source_text);
                let filter = comprehension
                    .filter
                    .as_ref()
                    .map(|f| self.resolve(&f.inner, scope, analysis, source_text))
                    .transpose();
                scope.pop();
                Ok(Node::Comprehension {
                    element: Box::new(element?),
                    var: comprehension.var.name.clone(),
                    iterable,
                    filter: filter?.map(Box::new),
                })
            }

            Expression::Aggregate(aggregate) => Ok(Node::Aggregate {
                function: aggregate.function,
                arg: Box::new(self.resolve(
                    &aggregate.arg.inner,
                    scope,
                    analysis,
                    source_text,
                )?),
                default: aggregate
                    .default
                    .as_ref()
                    .map(|d| self.resolve(&d.inner, scope, analysis, source_text))
                    .transpose()?
                    .map(Box::new),
            }),
            Expression::MethodCall(call) => {
                let receiver =
                    Box::new(self.resolve(&call.receiver.inner, scope, analysis, source_text)?);
                let mut args = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    args.push(self.resolve(&arg.inner, scope, analysis, source_text)?);
                }
                Ok(Node::Method {
                    receiver,
                    method: call.method,
                    args,
                })
            }
        }
    }
}

/// Whether the expression contains a `result.<type>` accessor anywhere
fn contains_entity_access(expr: &Expression) -> bool {
    match expr {
        Expression::EntityAccess(_) => true,
        Expression::Literal(_) | Expression::IdentifierRef(_) => false,
        Expression::FieldAccess(access) => access
            .bindings
            .iter()
            .any(|b| contains_entity_access(&b.value.inner)),
        Expression::BinaryOp(b) => {
            contains_entity_access(&b.left.inner) || contains_entity_access(&b.right.inner)
        }
        Expression::UnaryOp(u) => contains_entity_access(&u.operand.inner),
        Expression::Not(n) => contains_entity_access(&n.operand.inner),
        Expression::BoolOp(chain) => chain
            .operands
            .iter()
            .any(|o| contains_entity_access(&o.inner)),
        Expression::Compare(c) => {
            contains_entity_access(&c.first.inner)
                || c.rest.iter().any(|(_, e)| contains_entity_access(&e.inner))
        }
        Expression::Ternary(t) => {
            contains_entity_access(&t.condition.inner)
                || contains_entity_access(&t.then_expr.inner)
                || contains_entity_access(&t.else_expr.inner)
        }
        Expression::List(l) => l.elements.iter().any(|e| contains_entity_access(&e.inner)),
        Expression::Dict(d) => d
            .entries
            .iter()
            .any(|(k, v)| contains_entity_access(&k.inner) || contains_entity_access(&v.inner)),
        Expression::Comprehension(c) => {
            contains_entity_access(&c.element.inner)
                || contains_entity_access(&c.iterable.inner)
                || c.filter
                    .as_ref()
                    .is_some_and(|f| contains_entity_access(&f.inner))
        }
        Expression::Aggregate(a) => {
            contains_entity_access(&a.arg.inner)
                || a.default
                    .as_ref()
                    .is_some_and(|d| contains_entity_access(&d.inner))
        }
        Expression::MethodCall(m) => {
            contains_entity_access(&m.receiver.inner)
                || m.args.iter().any(|a| contains_entity_access(&a.inner))
        }
    }
}

/// Fold constant sub-expressions, rejecting provable raises
///
/// A sub-expression only fails the fold when it evaluates unconditionally:
/// the right side of `and`/`or`, ternary branches, comprehension bodies and
/// aggregate defaults may still raise at runtime (where the error resolves
/// to an absent value), because whether they run depends on data.
pub(crate) fn fold(node: Node) -> std::result::Result<Node, EvalError> {
    fold_node(node, true)
}

fn fold_node(node: Node, strict: bool) -> std::result::Result<Node, EvalError> {
    match evaluate(&node, &Mode::Const, &mut Vec::new()) {
        Ok(value) => return Ok(Node::Const(value)),
        Err(EvalError::NotConst) => {}
        Err(err) if strict => return Err(err),
        // Reached conditionally: leave the raise to runtime
        Err(_) => return Ok(node),
    }

    Ok(match node {
        leaf @ (Node::Const(_) | Node::Entity(_) | Node::Loop(_)) => leaf,
        Node::Field(field) => {
            let mut bindings = Vec::with_capacity(field.bindings.len());
            for (entity_type, value) in field.bindings {
                bindings.push((entity_type, fold_node(value, strict)?));
            }
            Node::Field(FieldNode {
                source: field.source,
                bindings,
                implicit: field.implicit,
            })
        }
        Node::Binary { op, left, right } => Node::Binary {
            op,
            left: Box::new(fold_node(*left, strict)?),
            right: Box::new(fold_node(*right, strict)?),
        },
        Node::Unary { op, operand } => Node::Unary {
            op,
            operand: Box::new(fold_node(*operand, strict)?),
        },
        Node::Bool { op, operands } => fold_bool(op, operands, strict)?,
        Node::Not(operand) => Node::Not(Box::new(fold_node(*operand, strict)?)),
        Node::Compare { first, rest } => {
            let first = Box::new(fold_node(*first, strict)?);
            let mut folded = Vec::with_capacity(rest.len());
            for (i, (op, operand)) in rest.into_iter().enumerate() {
                // Only the first comparison is unconditionally evaluated
                folded.push((op, fold_node(operand, strict && i == 0)?));
            }
            Node::Compare {
                first,
                rest: folded,
            }
        }
        Node::Ternary {
            condition,
            then_node,
            else_node,
        } => {
            let condition = fold_node(*condition, strict)?;
            if let Node::Const(value) = &condition {
                // The losing branch never runs
                let chosen = if value.is_truthy() {
                    *then_node
                } else {
                    *else_node
                };
                return fold_node(chosen, strict);
            }
            Node::Ternary {
                condition: Box::new(condition),
                then_node: Box::new(fold_node(*then_node, false)?),
                else_node: Box::new(fold_node(*else_node, false)?),
            }
        }
        Node::List(items) => Node::List(
            items
                .into_iter()
                .map(|item| fold_node(item, strict))
                .collect::<std::result::Result<_, _>>()?,
        ),
        Node::Dict(entries) => Node::Dict(
            entries
                .into_iter()
                .map(|(k, v)| Ok((fold_node(k, strict)?, fold_node(v, strict)?)))
                .collect::<std::result::Result<Vec<_>, EvalError>>()?,
        ),
        Node::Comprehension {
            element,
            var,
            iterable,
            filter,
        } => Node::Comprehension {
            element: Box::new(fold_node(*element, false)?),
            var,
            iterable: Box::new(fold_node(*iterable, strict)?),
            filter: filter
                .map(|f| fold_node(*f, false))
                .transpose()?
                .map(Box::new),
        },
        Node::Aggregate {
            function,
            arg,
            default,
        } => Node::Aggregate {
            function,
            arg: Box::new(fold_node(*arg, strict)?),
            default: default
                .map(|d| fold_node(*d, false))
                .transpose()?
                .map(Box::new),
        },
        Node::Method {
            receiver,
            method,
            args,
        } => Node::Method {
            receiver: Box::new(fold_node(*receiver, strict)?),
            method,
            args: args
                .into_iter()
                .map(|arg| fold_node(arg, strict))
                .collect::<std::result::Result<_, _>>()?,
        },
    })
}

/// Fold an `and`/`or` chain, truncating at the first constant decider
fn fold_bool(
    op: BoolOp,
    operands: Vec<Node>,
    strict: bool,
) -> std::result::Result<Node, EvalError> {
    let mut folded = Vec::with_capacity(operands.len());
    for (i, operand) in operands.into_iter().enumerate() {
        let operand = fold_node(operand, strict && i == 0)?;
        let decided = match &operand {
            Node::Const(value) => match op {
                BoolOp::And => !value.is_truthy(),
                BoolOp::Or => value.is_truthy(),
            },
            _ => false,
        };
        folded.push(operand);
        if decided {
            break;
        }
    }
    if folded.len() == 1 {
        Ok(folded.pop().unwrap_or(Node::Const(Value::Null)))
    } else {
        Ok(Node::Bool { op, operands: folded })
    }
}
