//! Variable configurations: definitions, groupings and components
//!
//! Definitions and components form two sum types (originally a class
//! hierarchy); the compiler dispatches over them with exhaustive matches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, derived computation that behaves like a field to later
/// expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableConfiguration {
    /// Unique identifier (case-insensitive; must not collide with a field
    /// or metric name)
    pub identifier: String,
    /// Display name
    pub name: String,
    /// The definition
    pub definition: VariableDefinition,
}

impl VariableConfiguration {
    /// Create a new configuration
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        definition: VariableDefinition,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            definition,
        }
    }

    /// The case-folded registry key
    pub fn key(&self) -> String {
        self.identifier.to_ascii_lowercase()
    }
}

/// The polymorphic variable definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum VariableDefinition {
    /// Raw textual expression, evaluated as a boolean condition
    FieldExpression {
        /// Expression text in the restricted scripting grammar
        expression: String,
    },
    /// Generated base (denominator population) expression
    BaseFieldExpression {
        /// Expression text
        expression: String,
    },
    /// Groups over a target entity type, each defined by a component
    Grouped {
        /// Identifier of the entity type the groups belong to
        to_entity_type: String,
        /// Ordered groups
        groups: Vec<VariableGrouping>,
    },
    /// Grouped definition used as a base (denominator) variable
    BaseGrouped {
        /// Identifier of the entity type the groups belong to
        to_entity_type: String,
        /// Ordered groups
        groups: Vec<VariableGrouping>,
    },
    /// A single unnamed group: a bare boolean predicate
    SingleGroup {
        /// The predicate component
        component: VariableComponent,
    },
    /// Question container: carries survey-design metadata only and is
    /// excluded from the evaluation engine
    Question,
}

impl VariableDefinition {
    /// Whether the engine can compile this definition
    pub fn is_evaluatable(&self) -> bool {
        !matches!(self, Self::Question)
    }

    /// The groups, for grouped-family definitions
    pub fn groups(&self) -> Option<&[VariableGrouping]> {
        match self {
            Self::Grouped { groups, .. } | Self::BaseGrouped { groups, .. } => Some(groups),
            _ => None,
        }
    }

    /// Mutable access to the groups, for grouped-family definitions
    pub fn groups_mut(&mut self) -> Option<&mut Vec<VariableGrouping>> {
        match self {
            Self::Grouped { groups, .. } | Self::BaseGrouped { groups, .. } => Some(groups),
            _ => None,
        }
    }

    /// The target entity type, for grouped-family definitions
    pub fn to_entity_type(&self) -> Option<&str> {
        match self {
            Self::Grouped { to_entity_type, .. } | Self::BaseGrouped { to_entity_type, .. } => {
                Some(to_entity_type)
            }
            _ => None,
        }
    }

    /// Whether this definition denotes a base (denominator) population
    pub fn is_base(&self) -> bool {
        matches!(
            self,
            Self::BaseFieldExpression { .. } | Self::BaseGrouped { .. }
        )
    }
}

/// One named group of a grouped definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableGrouping {
    /// Target instance id on the definition's entity type (unique within
    /// the definition's group list)
    pub instance_id: i64,
    /// Group display name
    pub name: String,
    /// The membership predicate
    pub component: VariableComponent,
}

impl VariableGrouping {
    /// Create a new grouping
    pub fn new(instance_id: i64, name: impl Into<String>, component: VariableComponent) -> Self {
        Self {
            instance_id,
            name: name.into(),
            component,
        }
    }
}

/// Set operator of an instance-list component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetOperator {
    /// Some listed instance appears among the answers
    Or,
    /// Every listed instance appears among the answers
    And,
    /// Answers exist and none of them is a listed instance
    Not,
}

/// Comparison operator of an inclusive-range component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeOperator {
    /// `min <= answer <= max`
    Between,
    /// `answer >= min`
    GreaterOrEqual,
    /// `answer <= max`
    LessOrEqual,
    /// `answer` equals one of the exact values
    Equal,
}

/// Connective of a composite component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompositeSeparator {
    /// All children must match
    And,
    /// Any child must match
    Or,
}

/// The polymorphic component predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum VariableComponent {
    /// Membership of the answers in a listed instance-id set
    InstanceList(InstanceListComponent),
    /// Numeric range test over the answers
    InclusiveRange(InclusiveRangeComponent),
    /// Response completion timestamp inside a date range
    DateRange(DateRangeComponent),
    /// Response belongs to one of the listed surveys
    SurveyId(SurveyIdComponent),
    /// Children joined by And/Or
    Composite(CompositeComponent),
}

/// Instance-list component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceListComponent {
    /// Name of the source field or declared variable
    pub source: String,
    /// Listed instance ids (answer domain of the source)
    pub instance_ids: Vec<i64>,
    /// Set operator
    pub operator: SetOperator,
    /// Optional restriction of the answer domain to one entity type
    pub result_entity_type: Option<String>,
}

impl InstanceListComponent {
    /// Create a new instance-list component
    pub fn new(
        source: impl Into<String>,
        instance_ids: impl IntoIterator<Item = i64>,
        operator: SetOperator,
    ) -> Self {
        Self {
            source: source.into(),
            instance_ids: instance_ids.into_iter().collect(),
            operator,
            result_entity_type: None,
        }
    }

    /// Builder-style answer-domain restriction
    pub fn with_result_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.result_entity_type = Some(entity_type.into());
        self
    }
}

/// Inclusive numeric range component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InclusiveRangeComponent {
    /// Name of the source field
    pub source: String,
    /// Lower bound (inclusive)
    pub min: Option<i64>,
    /// Upper bound (inclusive)
    pub max: Option<i64>,
    /// Exact values (used with [`RangeOperator::Equal`])
    pub exact_values: Vec<i64>,
    /// Comparison operator
    pub operator: RangeOperator,
}

impl InclusiveRangeComponent {
    /// `min <= answer <= max`
    pub fn between(source: impl Into<String>, min: i64, max: i64) -> Self {
        Self {
            source: source.into(),
            min: Some(min),
            max: Some(max),
            exact_values: Vec::new(),
            operator: RangeOperator::Between,
        }
    }

    /// `answer` equals one of the exact values
    pub fn equal(source: impl Into<String>, exact_values: impl IntoIterator<Item = i64>) -> Self {
        Self {
            source: source.into(),
            min: None,
            max: None,
            exact_values: exact_values.into_iter().collect(),
            operator: RangeOperator::Equal,
        }
    }
}

/// Date range component over the response completion timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRangeComponent {
    /// Inclusive start, unbounded when absent
    pub from: Option<DateTime<Utc>>,
    /// Inclusive end, unbounded when absent
    pub to: Option<DateTime<Utc>>,
}

/// Survey-id component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyIdComponent {
    /// Matching survey ids
    pub survey_ids: Vec<i64>,
}

/// Composite component joining children with one connective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeComponent {
    /// Child components
    pub children: Vec<VariableComponent>,
    /// Connective
    pub separator: CompositeSeparator,
}

impl VariableComponent {
    /// Iterate this component and all nested children depth-first
    pub fn walk(&self) -> Vec<&VariableComponent> {
        let mut out = vec![self];
        if let Self::Composite(composite) = self {
            for child in &composite.children {
                out.extend(child.walk());
            }
        }
        out
    }

    /// The single instance-list component, when this is exactly one
    pub fn as_single_instance_list(&self) -> Option<&InstanceListComponent> {
        match self {
            Self::InstanceList(component) => Some(component),
            _ => None,
        }
    }
}
