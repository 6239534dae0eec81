//! Variable declaration, fast-path selection and evaluation tests

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use quantab_diagnostics::{QTB0101, QTB0102, QTB0103, QTB0104, QTB0105, QTB0106};
use quantab_eval::{Engine, Value};
use quantab_model::{
    ChoiceKind, CompositeComponent, CompositeSeparator, DateRangeComponent, EntityInstance,
    EntityRepository, EntityValueCombination, InMemoryEntityRepository, InMemoryFieldCatalog,
    InclusiveRangeComponent, InstanceListComponent, Response, ResponseFieldDescriptor,
    SetOperator, SurveyIdComponent, VariableComponent, VariableConfiguration,
    VariableDefinition, VariableGrouping,
};
use std::collections::HashSet;
use std::sync::Arc;

fn engine() -> Engine {
    let catalog = InMemoryFieldCatalog::new();
    catalog.insert(
        ResponseFieldDescriptor::new("brand_used", ChoiceKind::Multi).with_entity_type("brand"),
    );
    catalog.insert(
        ResponseFieldDescriptor::new("fav_brand", ChoiceKind::Single).with_entity_type("brand"),
    );
    catalog.insert(ResponseFieldDescriptor::new("age", ChoiceKind::Single));

    let repo = InMemoryEntityRepository::new();
    repo.get_or_create_type("brand", "Brand", "Brands");
    for (id, name) in [(1, "Alpha"), (2, "Beta"), (3, "Gamma")] {
        repo.upsert_instance("brand", EntityInstance::new(id, name, name));
    }

    Engine::new(Arc::new(catalog), Arc::new(repo))
}

fn or_group(id: i64, name: &str, source: &str, ids: impl IntoIterator<Item = i64>) -> VariableGrouping {
    VariableGrouping::new(
        id,
        name,
        VariableComponent::InstanceList(InstanceListComponent::new(source, ids, SetOperator::Or)),
    )
}

fn grouped(identifier: &str, to: &str, groups: Vec<VariableGrouping>) -> VariableConfiguration {
    VariableConfiguration::new(
        identifier,
        identifier,
        VariableDefinition::Grouped {
            to_entity_type: to.into(),
            groups,
        },
    )
}

fn brands_response(brands: impl IntoIterator<Item = i64>) -> Response {
    Response::new(1, Utc::now()).with_answers(
        "brand_used",
        EntityValueCombination::empty(),
        brands,
    )
}

fn satisfied(engine: &Engine, identifier: &str, response: &Response) -> Vec<i64> {
    engine
        .get_declared_variable_or_null(identifier)
        .unwrap_or_else(|| panic!("variable '{identifier}' not declared"))
        .as_integer()
        .unwrap_or_else(|| panic!("variable '{identifier}' is not grouped"))
        .satisfied_instance_ids(response, &EntityValueCombination::empty())
}

#[test]
fn test_or_groups_take_the_fast_path() {
    let engine = engine();
    engine
        .declare_or_update_variable(grouped(
            "colas",
            "net",
            vec![or_group(1, "A", "brand_used", [1, 2]), or_group(2, "B", "brand_used", [3])],
        ))
        .unwrap();

    let var = engine.get_declared_variable_or_null("Colas").unwrap();
    assert!(var.is_fast_path());
    assert_eq!(var.entity_type(), Some("net"));

    assert_eq!(satisfied(&engine, "colas", &brands_response([2])), vec![1]);
    assert_eq!(satisfied(&engine, "colas", &brands_response([2, 3])), vec![1, 2]);
    assert_eq!(satisfied(&engine, "colas", &brands_response([])), Vec::<i64>::new());
}

#[test]
fn test_single_and_id_is_fast_multiple_are_slow() {
    let engine = engine();
    let and_group = |id, ids: Vec<i64>| {
        VariableGrouping::new(
            id,
            "g",
            VariableComponent::InstanceList(InstanceListComponent::new(
                "brand_used",
                ids,
                SetOperator::And,
            )),
        )
    };

    engine
        .declare_or_update_variable(grouped("one_and", "net_a", vec![and_group(1, vec![2])]))
        .unwrap();
    assert!(engine.get_declared_variable_or_null("one_and").unwrap().is_fast_path());

    engine
        .declare_or_update_variable(grouped("two_and", "net_b", vec![and_group(1, vec![1, 2])]))
        .unwrap();
    let slow = engine.get_declared_variable_or_null("two_and").unwrap();
    assert!(!slow.is_fast_path());

    // And requires every listed id among the answers
    assert_eq!(satisfied(&engine, "two_and", &brands_response([1, 2, 3])), vec![1]);
    assert_eq!(satisfied(&engine, "two_and", &brands_response([1])), Vec::<i64>::new());
}

#[test]
fn test_not_over_single_choice_is_fast() {
    let engine = engine();
    let not_group = VariableGrouping::new(
        1,
        "Others",
        VariableComponent::InstanceList(InstanceListComponent::new(
            "fav_brand",
            [1],
            SetOperator::Not,
        )),
    );
    engine
        .declare_or_update_variable(grouped("non_alpha", "net", vec![not_group]))
        .unwrap();
    assert!(engine.get_declared_variable_or_null("non_alpha").unwrap().is_fast_path());

    let favourite = |brand: i64| {
        Response::new(1, Utc::now()).with_answers(
            "fav_brand",
            EntityValueCombination::empty(),
            [brand],
        )
    };
    assert_eq!(satisfied(&engine, "non_alpha", &favourite(2)), vec![1]);
    assert_eq!(satisfied(&engine, "non_alpha", &favourite(1)), Vec::<i64>::new());
    // No answer recorded: Not does not match
    assert_eq!(
        satisfied(&engine, "non_alpha", &Response::new(1, Utc::now())),
        Vec::<i64>::new()
    );
}

#[test]
fn test_not_over_multi_choice_is_slow() {
    let engine = engine();
    let not_group = VariableGrouping::new(
        1,
        "Others",
        VariableComponent::InstanceList(InstanceListComponent::new(
            "brand_used",
            [1],
            SetOperator::Not,
        )),
    );
    engine
        .declare_or_update_variable(grouped("non_alpha", "net", vec![not_group]))
        .unwrap();
    assert!(!engine.get_declared_variable_or_null("non_alpha").unwrap().is_fast_path());

    assert_eq!(satisfied(&engine, "non_alpha", &brands_response([2, 3])), vec![1]);
    assert_eq!(satisfied(&engine, "non_alpha", &brands_response([1, 2])), Vec::<i64>::new());
    assert_eq!(satisfied(&engine, "non_alpha", &brands_response([])), Vec::<i64>::new());

    // Answers that are not registered brand instances do not count
    assert_eq!(satisfied(&engine, "non_alpha", &brands_response([99])), Vec::<i64>::new());
    assert_eq!(satisfied(&engine, "non_alpha", &brands_response([2, 99])), vec![1]);
}

#[test]
fn test_not_paths_agree_on_unregistered_answers() {
    let engine = engine();
    let component = VariableComponent::InstanceList(InstanceListComponent::new(
        "fav_brand",
        [1],
        SetOperator::Not,
    ));
    engine
        .declare_or_update_variable(grouped(
            "indexed_not",
            "net_f",
            vec![VariableGrouping::new(1, "Others", component.clone())],
        ))
        .unwrap();
    engine
        .declare_or_update_variable(grouped(
            "generic_not",
            "net_s",
            vec![VariableGrouping::new(1, "Others", slowed(component))],
        ))
        .unwrap();
    assert!(engine.get_declared_variable_or_null("indexed_not").unwrap().is_fast_path());
    assert!(!engine.get_declared_variable_or_null("generic_not").unwrap().is_fast_path());

    let favourite = |brand: i64| {
        Response::new(1, Utc::now()).with_answers(
            "fav_brand",
            EntityValueCombination::empty(),
            [brand],
        )
    };
    // 99 is not a registered brand instance
    assert_eq!(satisfied(&engine, "indexed_not", &favourite(99)), Vec::<i64>::new());
    assert_eq!(satisfied(&engine, "generic_not", &favourite(99)), Vec::<i64>::new());
    assert_eq!(satisfied(&engine, "indexed_not", &favourite(2)), vec![1]);
    assert_eq!(satisfied(&engine, "generic_not", &favourite(2)), vec![1]);
}

#[test]
fn test_range_date_survey_and_composite_are_slow() {
    let engine = engine();
    let component = VariableComponent::Composite(CompositeComponent {
        children: vec![
            VariableComponent::InclusiveRange(InclusiveRangeComponent::between("age", 18, 34)),
            VariableComponent::SurveyId(SurveyIdComponent { survey_ids: vec![1, 2] }),
            VariableComponent::DateRange(DateRangeComponent {
                from: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
                to: None,
            }),
        ],
        separator: CompositeSeparator::And,
    });
    engine
        .declare_or_update_variable(grouped(
            "young",
            "agegroup",
            vec![VariableGrouping::new(1, "18-34", component)],
        ))
        .unwrap();
    assert!(!engine.get_declared_variable_or_null("young").unwrap().is_fast_path());

    let response = |age: i64, survey: i64, year: i32| {
        Response::new(survey, Utc.with_ymd_and_hms(year, 6, 1, 0, 0, 0).unwrap()).with_answers(
            "age",
            EntityValueCombination::empty(),
            [age],
        )
    };
    assert_eq!(satisfied(&engine, "young", &response(25, 1, 2026)), vec![1]);
    assert_eq!(satisfied(&engine, "young", &response(40, 1, 2026)), Vec::<i64>::new());
    assert_eq!(satisfied(&engine, "young", &response(25, 9, 2026)), Vec::<i64>::new());
    assert_eq!(satisfied(&engine, "young", &response(25, 1, 2025)), Vec::<i64>::new());
}

#[test]
fn test_validation_failures_leave_the_registry_untouched() {
    let engine = engine();
    engine
        .declare_or_update_variable(grouped(
            "colas",
            "net",
            vec![or_group(1, "A", "brand_used", [1])],
        ))
        .unwrap();

    // Duplicate group ids
    let err = engine
        .declare_or_update_variable(grouped(
            "colas",
            "net",
            vec![or_group(1, "A", "brand_used", [1]), or_group(1, "B", "brand_used", [2])],
        ))
        .unwrap_err();
    assert_eq!(err.code(), QTB0102);

    // The earlier declaration still stands
    assert_eq!(satisfied(&engine, "colas", &brands_response([1])), vec![1]);
    let ids: Vec<i64> = engine.entities().instances_of("net").iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![1]);
}

#[test]
fn test_validation_errors() {
    let engine = engine();

    let err = engine
        .declare_or_update_variable(grouped("empty", "net", vec![]))
        .unwrap_err();
    assert_eq!(err.code(), QTB0101);

    let err = engine
        .declare_or_update_variable(grouped(
            "ghost",
            "net",
            vec![or_group(1, "A", "no_such_field", [1])],
        ))
        .unwrap_err();
    assert_eq!(err.code(), QTB0105);

    // Listed ids must exist on the source's answer entity type
    let err = engine
        .declare_or_update_variable(grouped(
            "bad_ids",
            "net",
            vec![or_group(1, "A", "brand_used", [99])],
        ))
        .unwrap_err();
    assert_eq!(err.code(), QTB0103);

    // Identifier collides with a field
    let err = engine
        .declare_or_update_variable(grouped(
            "brand_used",
            "net",
            vec![or_group(1, "A", "fav_brand", [1])],
        ))
        .unwrap_err();
    assert_eq!(err.code(), QTB0104);

    // Target entity type collides with a field
    let err = engine
        .declare_or_update_variable(grouped(
            "nets",
            "age",
            vec![or_group(1, "A", "brand_used", [1])],
        ))
        .unwrap_err();
    assert_eq!(err.code(), QTB0106);

    assert!(err.is_validation());
    assert!(engine.get_declared_variable_or_null("nets").is_none());
}

#[test]
fn test_entity_type_collision_with_other_variable() {
    let engine = engine();
    engine
        .declare_or_update_variable(grouped(
            "colas",
            "net",
            vec![or_group(1, "A", "brand_used", [1])],
        ))
        .unwrap();

    let err = engine
        .declare_or_update_variable(grouped(
            "sodas",
            "colas",
            vec![or_group(1, "A", "brand_used", [2])],
        ))
        .unwrap_err();
    assert_eq!(err.code(), QTB0106);

    // Self-redeclaration with the same target type is fine
    engine
        .declare_or_update_variable(grouped(
            "colas",
            "net",
            vec![or_group(1, "A", "brand_used", [1, 2])],
        ))
        .unwrap();
}

#[test]
fn test_question_definitions_are_skipped() {
    let engine = engine();
    engine
        .declare_or_update_variable(VariableConfiguration::new(
            "q1",
            "Question 1",
            VariableDefinition::Question,
        ))
        .unwrap();
    assert!(engine.get_declared_variable_or_null("q1").is_none());
}

#[test]
fn test_expression_variable_is_boolean() {
    let engine = engine();
    engine
        .declare_or_update_variable(VariableConfiguration::new(
            "heavy_user",
            "Heavy user",
            VariableDefinition::FieldExpression {
                expression: "len(brand_used) >= 2".into(),
            },
        ))
        .unwrap();

    let var = engine.get_declared_variable_or_null("heavy_user").unwrap();
    let boolean = var.as_boolean().unwrap();
    assert!(boolean.evaluate(&brands_response([1, 2]), &EntityValueCombination::empty()));
    assert!(!boolean.evaluate(&brands_response([1]), &EntityValueCombination::empty()));
    assert!(!var.is_fast_path());
}

#[test]
fn test_single_group_variable_is_boolean() {
    let engine = engine();
    engine
        .declare_or_update_variable(VariableConfiguration::new(
            "alpha_fan",
            "Alpha fan",
            VariableDefinition::SingleGroup {
                component: VariableComponent::InstanceList(InstanceListComponent::new(
                    "brand_used",
                    [1],
                    SetOperator::Or,
                )),
            },
        ))
        .unwrap();

    let var = engine.get_declared_variable_or_null("alpha_fan").unwrap();
    assert!(var.as_boolean().unwrap().evaluate(
        &brands_response([1, 3]),
        &EntityValueCombination::empty()
    ));
}

#[test]
fn test_base_variants_are_flagged() {
    let engine = engine();
    engine
        .declare_or_update_variable(VariableConfiguration::new(
            "everyone",
            "Everyone",
            VariableDefinition::BaseGrouped {
                to_entity_type: "population".into(),
                groups: vec![or_group(1, "All", "brand_used", [1, 2, 3])],
            },
        ))
        .unwrap();
    assert!(engine.get_declared_variable_or_null("everyone").unwrap().is_base());
}

#[test]
fn test_redeclare_diffs_entity_instances() {
    let engine = engine();
    engine
        .declare_or_update_variable(grouped(
            "colas",
            "net",
            vec![or_group(1, "A", "brand_used", [1]), or_group(2, "B", "brand_used", [2])],
        ))
        .unwrap();

    engine
        .declare_or_update_variable(grouped(
            "colas",
            "net",
            vec![or_group(2, "B", "brand_used", [2]), or_group(3, "C", "brand_used", [3])],
        ))
        .unwrap();

    let ids: Vec<i64> = engine.entities().instances_of("net").iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn test_declare_is_idempotent() {
    let engine = engine();
    let config = grouped(
        "colas",
        "net",
        vec![or_group(1, "A", "brand_used", [1, 2])],
    );
    engine.declare_or_update_variable(config.clone()).unwrap();
    engine.declare_or_update_variable(config).unwrap();

    let ids: Vec<i64> = engine.entities().instances_of("net").iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![1]);
    assert_eq!(satisfied(&engine, "colas", &brands_response([2])), vec![1]);
}

#[test]
fn test_variables_chain_through_the_registry() {
    let engine = engine();
    engine
        .declare_or_update_variable(grouped(
            "colas",
            "net",
            vec![or_group(1, "A", "brand_used", [1, 2])],
        ))
        .unwrap();

    // A variable can source another variable's satisfied ids
    engine
        .declare_or_update_variable(grouped(
            "cola_users",
            "usergroup",
            vec![or_group(10, "Users", "colas", [1])],
        ))
        .unwrap();
    assert_eq!(satisfied(&engine, "cola_users", &brands_response([2])), vec![10]);
    assert_eq!(
        satisfied(&engine, "cola_users", &brands_response([3])),
        Vec::<i64>::new()
    );

    // Expressions resolve declared variables like fields
    let expr = engine.parse_user_boolean_expression("any(colas)").unwrap();
    assert!(expr.evaluate(&brands_response([1]), &EntityValueCombination::empty()));
    assert!(!expr.evaluate(&brands_response([3]), &EntityValueCombination::empty()));
}

#[test]
fn test_redeclare_does_not_mutate_captured_handles() {
    let engine = engine();
    engine
        .declare_or_update_variable(grouped(
            "colas",
            "net",
            vec![or_group(1, "A", "brand_used", [1])],
        ))
        .unwrap();
    let expr = engine.parse_user_boolean_expression("any(colas)").unwrap();
    let response = brands_response([3]);
    assert!(!expr.evaluate(&response, &EntityValueCombination::empty()));

    engine
        .declare_or_update_variable(grouped(
            "colas",
            "net",
            vec![or_group(1, "A", "brand_used", [3])],
        ))
        .unwrap();

    // The earlier parse keeps the definitions it captured
    assert!(!expr.evaluate(&response, &EntityValueCombination::empty()));
    let reparsed = engine.parse_user_boolean_expression("any(colas)").unwrap();
    assert!(reparsed.evaluate(&response, &EntityValueCombination::empty()));
}

#[test]
fn test_create_for_entity_values_restricts_to_bound_target() {
    let engine = engine();
    engine
        .declare_or_update_variable(grouped(
            "colas",
            "net",
            vec![or_group(1, "A", "brand_used", [1]), or_group(2, "B", "brand_used", [2])],
        ))
        .unwrap();
    let var = engine.get_declared_variable_or_null("colas").unwrap();
    let response = brands_response([1, 2]);

    let all = var.create_for_entity_values(&EntityValueCombination::empty());
    assert_eq!(all.evaluate(&response), Value::List(vec![Value::Int(1), Value::Int(2)]));

    let only_two = var.create_for_entity_values(&EntityValueCombination::empty().with("net", 2));
    assert_eq!(only_two.evaluate(&response), Value::List(vec![Value::Int(2)]));
}

#[test]
fn test_create_for_single_entity() {
    let engine = engine();
    engine
        .declare_or_update_variable(grouped(
            "colas",
            "net",
            vec![or_group(1, "A", "brand_used", [1]), or_group(2, "B", "brand_used", [2])],
        ))
        .unwrap();
    let var = engine.get_declared_variable_or_null("colas").unwrap();
    let integer = var.as_integer().unwrap();

    let evaluator = integer.create_for_single_entity(|id| id == 2);
    assert_eq!(evaluator(&brands_response([1, 2])), vec![2]);
    assert_eq!(evaluator(&brands_response([1])), Vec::<i64>::new());
}

#[test]
fn test_concurrent_add_group_allocates_distinct_ids() {
    let engine = Arc::new(engine());
    engine
        .declare_or_update_variable(grouped(
            "colas",
            "net",
            vec![or_group(1, "A", "brand_used", [1]), or_group(2, "B", "brand_used", [2])],
        ))
        .unwrap();

    let threads = 8;
    let mut ids = Vec::new();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let engine = Arc::clone(&engine);
                scope.spawn(move || {
                    engine
                        .add_group(
                            "colas",
                            &format!("extra-{i}"),
                            VariableComponent::InstanceList(InstanceListComponent::new(
                                "brand_used",
                                [3],
                                SetOperator::Or,
                            )),
                        )
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            ids.push(handle.join().unwrap());
        }
    });

    let distinct: HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(distinct.len(), threads);
    assert!(!distinct.contains(&1) && !distinct.contains(&2));

    let groups = engine
        .get_declared_variable_or_null("colas")
        .unwrap()
        .as_integer()
        .map(|_| engine.entities().instances_of("net").len())
        .unwrap();
    assert_eq!(groups, 2 + threads);
}

/// Wrap a component in a single-child composite: same semantics, but the
/// shape no longer qualifies for the indexed path
fn slowed(component: VariableComponent) -> VariableComponent {
    VariableComponent::Composite(CompositeComponent {
        children: vec![component],
        separator: CompositeSeparator::And,
    })
}

proptest! {
    #[test]
    fn fast_and_slow_paths_agree(
        group_ids in proptest::collection::vec(
            proptest::collection::btree_set(1i64..=3, 1..=3),
            1..=3,
        ),
        answers in proptest::collection::btree_set(1i64..=5, 0..=4),
    ) {
        let engine = engine();

        let fast_groups: Vec<VariableGrouping> = group_ids
            .iter()
            .enumerate()
            .map(|(i, ids)| or_group(i as i64 + 1, "g", "brand_used", ids.iter().copied()))
            .collect();
        let slow_groups: Vec<VariableGrouping> = fast_groups
            .iter()
            .map(|g| VariableGrouping::new(g.instance_id, &g.name, slowed(g.component.clone())))
            .collect();

        engine.declare_or_update_variable(grouped("fast_var", "net_f", fast_groups)).unwrap();
        engine.declare_or_update_variable(grouped("slow_var", "net_s", slow_groups)).unwrap();

        prop_assert!(engine.get_declared_variable_or_null("fast_var").unwrap().is_fast_path());
        prop_assert!(!engine.get_declared_variable_or_null("slow_var").unwrap().is_fast_path());

        let response = brands_response(answers.iter().copied());
        prop_assert_eq!(
            satisfied(&engine, "fast_var", &response),
            satisfied(&engine, "slow_var", &response)
        );
    }

    #[test]
    fn fast_not_agrees_with_slow_not(
        excluded in proptest::collection::btree_set(1i64..=3, 1..=2),
        // 4 and 5 are never registered as brand instances
        answer in proptest::option::of(1i64..=5),
    ) {
        let engine = engine();
        let component = VariableComponent::InstanceList(InstanceListComponent::new(
            "fav_brand",
            excluded.iter().copied(),
            SetOperator::Not,
        ));

        engine.declare_or_update_variable(grouped(
            "fast_not", "net_f",
            vec![VariableGrouping::new(1, "g", component.clone())],
        )).unwrap();
        engine.declare_or_update_variable(grouped(
            "slow_not", "net_s",
            vec![VariableGrouping::new(1, "g", slowed(component))],
        )).unwrap();

        prop_assert!(engine.get_declared_variable_or_null("fast_not").unwrap().is_fast_path());

        let mut response = Response::new(1, Utc::now());
        if let Some(answer) = answer {
            response.record("fav_brand", EntityValueCombination::empty(), [answer]);
        }
        prop_assert_eq!(
            satisfied(&engine, "fast_not", &response),
            satisfied(&engine, "slow_not", &response)
        );
    }

    #[test]
    fn bound_evaluator_views_agree(
        group_ids in proptest::collection::vec(
            proptest::collection::btree_set(1i64..=3, 1..=3),
            1..=3,
        ),
        answers in proptest::collection::btree_set(1i64..=3, 0..=3),
        target in 1i64..=4,
    ) {
        let engine = engine();
        let groups: Vec<VariableGrouping> = group_ids
            .iter()
            .enumerate()
            .map(|(i, ids)| or_group(i as i64 + 1, "g", "brand_used", ids.iter().copied()))
            .collect();
        engine.declare_or_update_variable(grouped("colas", "net", groups)).unwrap();

        let var = engine.get_declared_variable_or_null("colas").unwrap();
        let integer = var.as_integer().unwrap();
        let response = brands_response(answers.iter().copied());

        // The combination-bound and predicate-bound views restrict the
        // same underlying satisfied set
        let bound = EntityValueCombination::empty().with("net", target);
        let expected: Vec<Value> = integer
            .satisfied_instance_ids(&response, &bound)
            .into_iter()
            .map(Value::Int)
            .collect();
        prop_assert_eq!(
            var.create_for_entity_values(&bound).evaluate(&response),
            Value::List(expected.clone())
        );

        let single = integer.create_for_single_entity(|id| id == target);
        let single_ids: Vec<Value> = single(&response).into_iter().map(Value::Int).collect();
        prop_assert_eq!(single_ids, expected);
    }
}
