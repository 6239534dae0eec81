//! Compiled variables: validation, fast-path analysis, evaluation
//!
//! A declared variable compiles either to a boolean predicate (expression
//! and single-group definitions) or to an integer variable over a target
//! entity type (grouped family). Grouped variables whose groups all reduce
//! to instance-list membership over one source compile to an inverted
//! value→group index; everything else takes the generic per-group path.

use crate::compile::ExpressionCompiler;
use crate::expression::BooleanExpression;
use crate::ir::ResolvedSource;
use crate::registry::VariableRegistry;
use crate::value::Value;
use chrono::{DateTime, Utc};
use quantab_diagnostics::{
    EngineError, Result, QTB0101, QTB0102, QTB0103, QTB0104, QTB0105, QTB0106, QTB0107,
};
use quantab_model::{
    CompositeSeparator, EntityRepository, EntityValueCombination, FieldCatalog,
    InstanceListComponent, RangeOperator, Response, SetOperator, VariableComponent,
    VariableConfiguration, VariableDefinition, VariableGrouping,
};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A compiled, immutable variable
#[derive(Debug)]
pub enum CompiledVariable {
    /// Boolean predicate over responses
    Boolean(BooleanVariable),
    /// Grouped variable over a target entity type
    Integer(IntegerVariable),
}

impl CompiledVariable {
    /// The declared identifier
    pub fn identifier(&self) -> &str {
        match self {
            Self::Boolean(v) => &v.identifier,
            Self::Integer(v) => &v.identifier,
        }
    }

    /// The target entity type, for integer variables
    pub fn entity_type(&self) -> Option<&str> {
        match self {
            Self::Boolean(_) => None,
            Self::Integer(v) => Some(&v.entity_type),
        }
    }

    /// Whether the variable denotes a base (denominator) population
    pub fn is_base(&self) -> bool {
        match self {
            Self::Boolean(v) => v.is_base,
            Self::Integer(v) => v.is_base,
        }
    }

    /// Whether the indexed instance-list path was selected
    pub fn is_fast_path(&self) -> bool {
        match self {
            Self::Boolean(_) => false,
            Self::Integer(v) => v.is_fast_path(),
        }
    }

    /// The integer form, if this is a grouped variable
    pub fn as_integer(&self) -> Option<&IntegerVariable> {
        match self {
            Self::Integer(v) => Some(v),
            Self::Boolean(_) => None,
        }
    }

    /// The boolean form, if this is a predicate variable
    pub fn as_boolean(&self) -> Option<&BooleanVariable> {
        match self {
            Self::Boolean(v) => Some(v),
            Self::Integer(_) => None,
        }
    }

    /// Bind the combination once for repeated per-response evaluation
    pub fn create_for_entity_values(
        self: &Arc<Self>,
        combination: &EntityValueCombination,
    ) -> VariableEvaluator {
        VariableEvaluator {
            variable: Arc::clone(self),
            combination: combination.clone(),
        }
    }
}

/// A [`CompiledVariable`] bound to a fixed entity-value combination
#[derive(Debug, Clone)]
pub struct VariableEvaluator {
    variable: Arc<CompiledVariable>,
    combination: EntityValueCombination,
}

impl VariableEvaluator {
    /// Evaluate against one response
    ///
    /// Integer variables yield the list of satisfied target ids (restricted
    /// by the combination's binding of the target type, if any); boolean
    /// variables yield a bool.
    pub fn evaluate(&self, response: &Response) -> Value {
        match self.variable.as_ref() {
            CompiledVariable::Boolean(boolean) => {
                Value::Bool(boolean.evaluate(response, &self.combination))
            }
            CompiledVariable::Integer(integer) => Value::List(
                integer
                    .satisfied_instance_ids(response, &self.combination)
                    .into_iter()
                    .map(Value::Int)
                    .collect(),
            ),
        }
    }
}

/// A variable that evaluates to a boolean per response
#[derive(Debug)]
pub struct BooleanVariable {
    identifier: String,
    is_base: bool,
    predicate: BooleanPredicate,
}

#[derive(Debug)]
enum BooleanPredicate {
    Expression(BooleanExpression),
    Component(CompiledComponent),
}

impl BooleanVariable {
    /// Evaluate the predicate for one response at one combination
    pub fn evaluate(&self, response: &Response, combination: &EntityValueCombination) -> bool {
        match &self.predicate {
            BooleanPredicate::Expression(expression) => {
                expression.evaluate(response, combination)
            }
            BooleanPredicate::Component(component) => component.matches(response, combination),
        }
    }

    /// The compiled expression, when the definition was expression-based
    pub fn expression(&self) -> Option<&BooleanExpression> {
        match &self.predicate {
            BooleanPredicate::Expression(expression) => Some(expression),
            BooleanPredicate::Component(_) => None,
        }
    }
}

/// A grouped variable over a target entity type
#[derive(Debug)]
pub struct IntegerVariable {
    identifier: String,
    entity_type: String,
    is_base: bool,
    backend: IntegerBackend,
}

#[derive(Debug)]
enum IntegerBackend {
    /// Precomputed answer-value → group-ids index
    Indexed(InstanceListVariable),
    /// Per-group predicate evaluation
    Groups(Vec<CompiledGroup>),
}

#[derive(Debug)]
struct CompiledGroup {
    instance_id: i64,
    predicate: CompiledComponent,
}

/// The fast-path form: membership resolved through a value index
#[derive(Debug)]
pub struct InstanceListVariable {
    source: ResolvedSource,
    /// Answer value → target group ids it satisfies
    index: HashMap<i64, SmallVec<[i64; 2]>>,
}

impl IntegerVariable {
    /// The target entity type the groups belong to
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Whether the indexed instance-list path was selected
    pub fn is_fast_path(&self) -> bool {
        matches!(self.backend, IntegerBackend::Indexed(_))
    }

    /// The target ids of the groups the response satisfies, ascending
    ///
    /// The combination constrains source fetches; binding the variable's own
    /// target type additionally restricts the result to that id.
    pub fn satisfied_instance_ids(
        &self,
        response: &Response,
        combination: &EntityValueCombination,
    ) -> Vec<i64> {
        let mut ids: Vec<i64> = match &self.backend {
            IntegerBackend::Indexed(indexed) => {
                let answers = indexed.source.answers(response, combination);
                answers
                    .iter()
                    .filter_map(|answer| indexed.index.get(answer))
                    .flat_map(|groups| groups.iter().copied())
                    .collect()
            }
            IntegerBackend::Groups(groups) => groups
                .iter()
                .filter(|group| group.predicate.matches(response, combination))
                .map(|group| group.instance_id)
                .collect(),
        };
        ids.sort_unstable();
        ids.dedup();
        if let Some(bound) = combination.value_for(&self.entity_type) {
            ids.retain(|id| *id == bound);
        }
        ids
    }

    /// Per-response evaluator restricted to target ids accepted by the
    /// predicate
    pub fn create_for_single_entity<'a>(
        &'a self,
        predicate: impl Fn(i64) -> bool + 'a,
    ) -> impl Fn(&Response) -> Vec<i64> + 'a {
        move |response| {
            self.satisfied_instance_ids(response, &EntityValueCombination::empty())
                .into_iter()
                .filter(|id| predicate(*id))
                .collect()
        }
    }
}

/// A compiled component predicate
#[derive(Debug)]
pub(crate) enum CompiledComponent {
    InstanceList {
        source: ResolvedSource,
        ids: HashSet<i64>,
        operator: SetOperator,
        /// Registered answer domain, snapshotted at compile time; `Not`
        /// only considers answers inside it, like the indexed path
        domain: Option<HashSet<i64>>,
    },
    Range {
        source: ResolvedSource,
        operator: RangeOperator,
        min: Option<i64>,
        max: Option<i64>,
        exact: HashSet<i64>,
    },
    DateRange {
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    },
    SurveyId {
        ids: HashSet<i64>,
    },
    Composite {
        children: Vec<CompiledComponent>,
        separator: CompositeSeparator,
    },
}

impl CompiledComponent {
    pub(crate) fn matches(
        &self,
        response: &Response,
        combination: &EntityValueCombination,
    ) -> bool {
        match self {
            Self::InstanceList {
                source,
                ids,
                operator,
                domain,
            } => {
                let answers = source.answers(response, combination);
                match operator {
                    SetOperator::Or => answers.iter().any(|a| ids.contains(a)),
                    SetOperator::And => ids.iter().all(|id| answers.contains(id)),
                    SetOperator::Not => {
                        let mut considered = answers
                            .iter()
                            .filter(|a| domain.as_ref().is_none_or(|d| d.contains(*a)))
                            .peekable();
                        considered.peek().is_some() && considered.all(|a| !ids.contains(a))
                    }
                }
            }
            Self::Range {
                source,
                operator,
                min,
                max,
                exact,
            } => source
                .answers(response, combination)
                .iter()
                .any(|answer| match operator {
                    RangeOperator::Between => {
                        min.is_none_or(|min| *answer >= min)
                            && max.is_none_or(|max| *answer <= max)
                    }
                    RangeOperator::GreaterOrEqual => min.is_none_or(|min| *answer >= min),
                    RangeOperator::LessOrEqual => max.is_none_or(|max| *answer <= max),
                    RangeOperator::Equal => exact.contains(answer),
                }),
            Self::DateRange { from, to } => {
                from.is_none_or(|from| response.completed_at >= from)
                    && to.is_none_or(|to| response.completed_at <= to)
            }
            Self::SurveyId { ids } => ids.contains(&response.survey_id),
            Self::Composite {
                children,
                separator,
            } => match separator {
                CompositeSeparator::And => {
                    children.iter().all(|child| child.matches(response, combination))
                }
                CompositeSeparator::Or => {
                    children.iter().any(|child| child.matches(response, combination))
                }
            },
        }
    }
}

/// Validates and compiles variable configurations
pub(crate) struct VariableCompiler<'a> {
    pub fields: &'a dyn FieldCatalog,
    pub registry: &'a VariableRegistry,
    pub entities: &'a dyn EntityRepository,
}

impl VariableCompiler<'_> {
    pub(crate) fn compile(&self, config: &VariableConfiguration) -> Result<CompiledVariable> {
        if self.fields.contains(&config.identifier) {
            return Err(EngineError::validation_for(
                QTB0104,
                format!("'{}' is already a field name", config.identifier),
                &config.identifier,
            ));
        }

        match &config.definition {
            VariableDefinition::FieldExpression { expression }
            | VariableDefinition::BaseFieldExpression { expression } => {
                let compiler = ExpressionCompiler {
                    fields: self.fields,
                    registry: self.registry,
                };
                let compiled = BooleanExpression::new(compiler.compile(expression)?);
                Ok(CompiledVariable::Boolean(BooleanVariable {
                    identifier: config.identifier.clone(),
                    is_base: config.definition.is_base(),
                    predicate: BooleanPredicate::Expression(compiled),
                }))
            }
            VariableDefinition::Grouped {
                to_entity_type,
                groups,
            }
            | VariableDefinition::BaseGrouped {
                to_entity_type,
                groups,
            } => self.compile_grouped(config, to_entity_type, groups),
            VariableDefinition::SingleGroup { component } => {
                Ok(CompiledVariable::Boolean(BooleanVariable {
                    identifier: config.identifier.clone(),
                    is_base: false,
                    predicate: BooleanPredicate::Component(self.compile_component(
                        component,
                        &config.identifier,
                    )?),
                }))
            }
            VariableDefinition::Question => Err(EngineError::validation_for(
                QTB0107,
                "Question definitions are not evaluatable",
                &config.identifier,
            )),
        }
    }

    fn compile_grouped(
        &self,
        config: &VariableConfiguration,
        to_entity_type: &str,
        groups: &[VariableGrouping],
    ) -> Result<CompiledVariable> {
        if groups.is_empty() {
            return Err(EngineError::validation_for(
                QTB0101,
                "A grouped variable needs at least one group",
                &config.identifier,
            ));
        }

        let mut seen = HashSet::new();
        for group in groups {
            if !seen.insert(group.instance_id) {
                return Err(EngineError::validation_for(
                    QTB0102,
                    format!("Duplicate group instance id {}", group.instance_id),
                    &config.identifier,
                ));
            }
        }

        if self.fields.contains(to_entity_type) {
            return Err(EngineError::validation_for(
                QTB0106,
                format!("Entity type '{to_entity_type}' collides with a field name"),
                &config.identifier,
            ));
        }
        if let Some(other) = self.registry.get(to_entity_type)
            && !other.identifier().eq_ignore_ascii_case(&config.identifier)
        {
            return Err(EngineError::validation_for(
                QTB0106,
                format!("Entity type '{to_entity_type}' collides with a declared variable"),
                &config.identifier,
            ));
        }

        let backend = match self.try_fast_path(groups)? {
            Some(indexed) => IntegerBackend::Indexed(indexed),
            None => {
                let mut compiled = Vec::with_capacity(groups.len());
                for group in groups {
                    compiled.push(CompiledGroup {
                        instance_id: group.instance_id,
                        predicate: self
                            .compile_component(&group.component, &config.identifier)?,
                    });
                }
                IntegerBackend::Groups(compiled)
            }
        };

        Ok(CompiledVariable::Integer(IntegerVariable {
            identifier: config.identifier.clone(),
            entity_type: to_entity_type.to_string(),
            is_base: config.definition.is_base(),
            backend,
        }))
    }

    fn resolve_source(&self, name: &str, identifier: &str) -> Result<ResolvedSource> {
        if let Some(field) = self.fields.field(name) {
            return Ok(ResolvedSource::Field(field));
        }
        if let Some(variable) = self.registry.get(name) {
            if variable.as_integer().is_some() {
                return Ok(ResolvedSource::Variable(variable));
            }
            return Err(EngineError::validation_for(
                QTB0105,
                format!("'{name}' is a boolean variable and has no answer values"),
                identifier,
            ));
        }
        Err(EngineError::validation_for(
            QTB0105,
            format!("Unknown source field or variable '{name}'"),
            identifier,
        ))
    }

    /// Validate listed instance ids against the source's answer domain
    ///
    /// The domain type may not exist yet (free numeric fields, lazily
    /// created types); only ids on a known type are checked.
    fn validate_instance_ids(
        &self,
        component: &InstanceListComponent,
        source: &ResolvedSource,
        identifier: &str,
    ) -> Result<()> {
        let domain = component
            .result_entity_type
            .as_deref()
            .or_else(|| source.answer_domain());
        let Some(domain) = domain else {
            return Ok(());
        };
        if self.entities.entity_type(domain).is_none() {
            return Ok(());
        }
        for id in &component.instance_ids {
            if !self.entities.instance_exists(domain, *id) {
                return Err(EngineError::validation_for(
                    QTB0103,
                    format!("No instance {id} on entity type '{domain}'"),
                    identifier,
                ));
            }
        }
        Ok(())
    }

    /// The registered instance ids of the component's answer domain, when
    /// the domain type is known to the repository
    fn registered_domain(
        &self,
        component: &InstanceListComponent,
        source: &ResolvedSource,
    ) -> Option<HashSet<i64>> {
        let domain = component
            .result_entity_type
            .as_deref()
            .or_else(|| source.answer_domain())?;
        self.entities.entity_type(domain)?;
        Some(
            self.entities
                .instances_of(domain)
                .iter()
                .map(|instance| instance.id)
                .collect(),
        )
    }

    fn compile_component(
        &self,
        component: &VariableComponent,
        identifier: &str,
    ) -> Result<CompiledComponent> {
        match component {
            VariableComponent::InstanceList(list) => {
                let source = self.resolve_source(&list.source, identifier)?;
                self.validate_instance_ids(list, &source, identifier)?;
                let domain = match list.operator {
                    SetOperator::Not => self.registered_domain(list, &source),
                    SetOperator::Or | SetOperator::And => None,
                };
                Ok(CompiledComponent::InstanceList {
                    source,
                    ids: list.instance_ids.iter().copied().collect(),
                    operator: list.operator,
                    domain,
                })
            }
            VariableComponent::InclusiveRange(range) => {
                let source = self.resolve_source(&range.source, identifier)?;
                Ok(CompiledComponent::Range {
                    source,
                    operator: range.operator,
                    min: range.min,
                    max: range.max,
                    exact: range.exact_values.iter().copied().collect(),
                })
            }
            VariableComponent::DateRange(range) => Ok(CompiledComponent::DateRange {
                from: range.from,
                to: range.to,
            }),
            VariableComponent::SurveyId(survey) => Ok(CompiledComponent::SurveyId {
                ids: survey.survey_ids.iter().copied().collect(),
            }),
            VariableComponent::Composite(composite) => {
                let mut children = Vec::with_capacity(composite.children.len());
                for child in &composite.children {
                    children.push(self.compile_component(child, identifier)?);
                }
                Ok(CompiledComponent::Composite {
                    children,
                    separator: composite.separator,
                })
            }
        }
    }

    /// Fast-path selection
    ///
    /// All groups must be single instance-list components over the same
    /// source, and each group must be one of: any number of `Or` ids,
    /// exactly one `And` id, or `Not` over a single-choice source field
    /// with an enumerable answer domain. The result is an answer-value →
    /// group-ids index; `Not` groups enumerate the domain at compile time.
    fn try_fast_path(&self, groups: &[VariableGrouping]) -> Result<Option<InstanceListVariable>> {
        let mut lists = Vec::with_capacity(groups.len());
        for group in groups {
            match group.component.as_single_instance_list() {
                Some(list) => lists.push((group.instance_id, list)),
                None => return Ok(None),
            }
        }

        let source_name = &lists[0].1.source;
        if !lists
            .iter()
            .all(|(_, list)| list.source.eq_ignore_ascii_case(source_name))
        {
            return Ok(None);
        }

        // Source resolution and id validation errors are real failures even
        // when the shape would otherwise fall back to the slow path
        let source = match self.resolve_source(source_name, source_name) {
            Ok(source) => source,
            Err(_) => return Ok(None),
        };
        let domain = source.answer_domain();
        for (_, list) in &lists {
            self.validate_instance_ids(list, &source, source_name)?;
            // A domain override off the source's own answer type changes
            // what the listed ids mean; keep that on the generic path
            if let Some(requested) = &list.result_entity_type
                && !domain.is_some_and(|d| d.eq_ignore_ascii_case(requested))
            {
                return Ok(None);
            }
        }

        let mut index: HashMap<i64, SmallVec<[i64; 2]>> = HashMap::new();
        for (target_id, list) in &lists {
            match list.operator {
                SetOperator::Or => {
                    for id in &list.instance_ids {
                        index.entry(*id).or_default().push(*target_id);
                    }
                }
                SetOperator::And => {
                    if list.instance_ids.len() != 1 {
                        return Ok(None);
                    }
                    index
                        .entry(list.instance_ids[0])
                        .or_default()
                        .push(*target_id);
                }
                SetOperator::Not => {
                    if !source.is_single_choice_field() {
                        return Ok(None);
                    }
                    let Some(domain) = domain else {
                        return Ok(None);
                    };
                    let instances = self.entities.instances_of(domain);
                    if instances.is_empty() {
                        return Ok(None);
                    }
                    let excluded: HashSet<i64> = list.instance_ids.iter().copied().collect();
                    for instance in instances {
                        if !excluded.contains(&instance.id) {
                            index.entry(instance.id).or_default().push(*target_id);
                        }
                    }
                }
            }
        }

        Ok(Some(InstanceListVariable { source, index }))
    }
}
