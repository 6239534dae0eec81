//! Raw response records

use crate::EntityValueCombination;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The raw answers recorded for one field at one entity coordinate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// Entity coordinates the answers were recorded under (one value per
    /// entity type the field is associated with; empty for plain fields)
    pub coordinates: EntityValueCombination,
    /// Raw integer answer values
    pub values: Vec<i64>,
}

impl AnswerRecord {
    /// Create a new record
    pub fn new(coordinates: EntityValueCombination, values: Vec<i64>) -> Self {
        Self {
            coordinates,
            values,
        }
    }

    /// Whether the record's coordinates agree with a query combination
    ///
    /// A record matches when every entity type bound by both sides carries
    /// the same instance id; types bound on only one side do not constrain.
    pub fn matches(&self, combination: &EntityValueCombination) -> bool {
        self.coordinates.iter().all(|coordinate| {
            combination
                .value_for(&coordinate.entity_type)
                .is_none_or(|bound| bound == coordinate.instance_id)
        })
    }
}

/// One raw survey response
///
/// Responses are supplied by the (external) import pipeline; the engine
/// only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Id of the survey wave the response belongs to
    pub survey_id: i64,
    /// Completion timestamp
    pub completed_at: DateTime<Utc>,
    /// Answer records keyed by case-folded field name
    answers: HashMap<String, Vec<AnswerRecord>>,
}

impl Response {
    /// Create an empty response
    pub fn new(survey_id: i64, completed_at: DateTime<Utc>) -> Self {
        Self {
            survey_id,
            completed_at,
            answers: HashMap::new(),
        }
    }

    /// Record answers for a field at an entity coordinate
    pub fn record(
        &mut self,
        field: &str,
        coordinates: EntityValueCombination,
        values: impl IntoIterator<Item = i64>,
    ) {
        self.answers
            .entry(field.to_ascii_lowercase())
            .or_default()
            .push(AnswerRecord::new(coordinates, values.into_iter().collect()));
    }

    /// Builder-style `record`
    pub fn with_answers(
        mut self,
        field: &str,
        coordinates: EntityValueCombination,
        values: impl IntoIterator<Item = i64>,
    ) -> Self {
        self.record(field, coordinates, values);
        self
    }

    /// All answer values for a field, filtered by a combination
    ///
    /// Types the combination leaves unbound aggregate across every recorded
    /// coordinate, so an unbound query sees the answers of all instances.
    pub fn answers(&self, field: &str, combination: &EntityValueCombination) -> Vec<i64> {
        match self.answers.get(&field.to_ascii_lowercase()) {
            Some(records) => records
                .iter()
                .filter(|r| r.matches(combination))
                .flat_map(|r| r.values.iter().copied())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Whether the response recorded anything at all for a field
    pub fn has_answers(&self, field: &str) -> bool {
        self.answers
            .get(&field.to_ascii_lowercase())
            .is_some_and(|records| records.iter().any(|r| !r.values.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn response() -> Response {
        Response::new(1, Utc::now())
            .with_answers(
                "rating",
                EntityValueCombination::empty().with("brand", 1),
                [4],
            )
            .with_answers(
                "rating",
                EntityValueCombination::empty().with("brand", 2),
                [7],
            )
    }

    #[test]
    fn test_bound_combination_filters() {
        let r = response();
        let bound = EntityValueCombination::empty().with("brand", 2);
        assert_eq!(r.answers("rating", &bound), vec![7]);
        assert_eq!(r.answers("Rating", &bound), vec![7]);
    }

    #[test]
    fn test_unbound_combination_aggregates() {
        let r = response();
        let mut all = r.answers("rating", &EntityValueCombination::empty());
        all.sort_unstable();
        assert_eq!(all, vec![4, 7]);
    }

    #[test]
    fn test_missing_field_yields_nothing() {
        let r = response();
        assert!(r.answers("unknown", &EntityValueCombination::empty()).is_empty());
        assert!(!r.has_answers("unknown"));
    }
}
