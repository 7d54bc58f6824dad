//! Per-role task definitions, raw results, and their evaluation

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use spacetimedb::SpacetimeType;

use crate::error::TaskError;
use crate::scoring::{self, AxisImpact};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskItem {
    pub id: String,
    pub label: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChoiceOption {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub axis_impact: AxisImpact,
}

/// One role's task for one chapter
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub title: String,
    pub instruction: String,
    #[serde(default)]
    pub hint: Option<String>,
    pub kind: TaskKind,
}

/// Keyed by type name, `{"numeric": {...}}`. Externally tagged so serde never
/// buffers the body; buffered numbers break under `arbitrary_precision`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Reorder a flat list
    Ordering {
        items: Vec<TaskItem>,
        correct_order: Vec<String>,
        #[serde(default)]
        axis_impact: AxisImpact,
    },
    /// Drop items into ordered zones; `correct_order[i]` belongs in zone `i`
    Layout {
        items: Vec<TaskItem>,
        zones: Vec<TaskItem>,
        correct_order: Vec<String>,
        #[serde(default)]
        axis_impact: AxisImpact,
    },
    /// Estimate a number from the supporting series
    Numeric {
        #[serde(default)]
        reference_data: Vec<f64>,
        expected: f64,
        tolerance: f64,
        #[serde(default)]
        axis_impact: AxisImpact,
    },
    Choice {
        options: Vec<ChoiceOption>,
    },
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Ordering { .. } => "ordering",
            TaskKind::Layout { .. } => "layout",
            TaskKind::Numeric { .. } => "numeric",
            TaskKind::Choice { .. } => "choice",
        }
    }
}

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct ZonePlacement {
    pub zone_id: String,
    pub item_ids: Vec<String>,
}

/// Raw answer as submitted by a player, stored verbatim on the log row
#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub enum TaskResult {
    Ordering(Vec<String>),
    Layout(Vec<ZonePlacement>),
    Numeric(f64),
    Choice(String),
}

impl TaskResult {
    pub fn name(&self) -> &'static str {
        match self {
            TaskResult::Ordering(_) => "ordering",
            TaskResult::Layout(_) => "layout",
            TaskResult::Numeric(_) => "numeric",
            TaskResult::Choice(_) => "choice",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Correctness ratio; choices always count as 1
    pub ratio: f64,
    pub impact: AxisImpact,
}

fn placements_by_zone(placements: &[ZonePlacement]) -> BTreeMap<String, Vec<String>> {
    let mut by_zone: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for p in placements {
        by_zone.entry(p.zone_id.clone()).or_default().extend(p.item_ids.iter().cloned());
    }
    by_zone
}

/// Submission preconditions. Nothing is scored or logged for a rejected result.
pub fn validate(def: &TaskDefinition, result: &TaskResult) -> Result<(), TaskError> {
    match (&def.kind, result) {
        (TaskKind::Ordering { items, .. }, TaskResult::Ordering(order)) => {
            let expected: BTreeSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
            let mut seen = BTreeSet::new();
            for id in order {
                if !expected.contains(id.as_str()) {
                    return Err(TaskError::UnknownItem(id.clone()));
                }
                if !seen.insert(id.as_str()) {
                    return Err(TaskError::NotAPermutation);
                }
            }
            if seen.len() != expected.len() {
                return Err(TaskError::NotAPermutation);
            }
            Ok(())
        }
        (TaskKind::Layout { items, zones, .. }, TaskResult::Layout(placements)) => {
            let zone_ids: BTreeSet<&str> = zones.iter().map(|z| z.id.as_str()).collect();
            let item_ids: BTreeSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
            let mut placed = BTreeSet::new();
            for p in placements {
                if !zone_ids.contains(p.zone_id.as_str()) {
                    return Err(TaskError::UnknownZone(p.zone_id.clone()));
                }
                for id in &p.item_ids {
                    if !item_ids.contains(id.as_str()) {
                        return Err(TaskError::UnknownItem(id.clone()));
                    }
                    placed.insert(id.as_str());
                }
            }
            let left_in_palette = item_ids.len() - placed.len();
            if left_in_palette > 0 {
                return Err(TaskError::PaletteNotEmpty(left_in_palette));
            }
            Ok(())
        }
        (TaskKind::Numeric { .. }, TaskResult::Numeric(value)) => {
            if !value.is_finite() {
                return Err(TaskError::NonNumeric);
            }
            if *value < 0.0 {
                return Err(TaskError::NegativeValue(*value));
            }
            Ok(())
        }
        (TaskKind::Choice { options }, TaskResult::Choice(option_id)) => {
            if options.iter().any(|o| &o.id == option_id) {
                Ok(())
            } else {
                Err(TaskError::UnknownOption(option_id.clone()))
            }
        }
        (kind, result) => Err(TaskError::KindMismatch { task: kind.name(), result: result.name() }),
    }
}

/// Validate, score, then apply the hint multiplier once if the hint was revealed
pub fn evaluate(
    def: &TaskDefinition,
    result: &TaskResult,
    hint_used: bool,
    hint_multiplier: f64,
) -> Result<Evaluation, TaskError> {
    validate(def, result)?;

    let (ratio, impact) = match (&def.kind, result) {
        (TaskKind::Ordering { correct_order, axis_impact, .. }, TaskResult::Ordering(order)) => {
            let ratio = scoring::ordering_ratio(order, correct_order);
            (ratio, scoring::scale(axis_impact, ratio))
        }
        (TaskKind::Layout { zones, correct_order, axis_impact, .. }, TaskResult::Layout(placements)) => {
            let zone_ids: Vec<String> = zones.iter().map(|z| z.id.clone()).collect();
            let ratio = scoring::layout_ratio(&zone_ids, &placements_by_zone(placements), correct_order);
            (ratio, scoring::scale(axis_impact, ratio))
        }
        (TaskKind::Numeric { expected, tolerance, axis_impact, .. }, TaskResult::Numeric(value)) => {
            let ratio = scoring::numeric_ratio(*value, *expected, *tolerance);
            (ratio, scoring::scale(axis_impact, ratio))
        }
        (TaskKind::Choice { options }, TaskResult::Choice(option_id)) => {
            let impact = options
                .iter()
                .find(|o| &o.id == option_id)
                .map(|o| o.axis_impact.clone())
                .unwrap_or_default();
            (1.0, impact)
        }
        (kind, result) => {
            return Err(TaskError::KindMismatch { task: kind.name(), result: result.name() });
        }
    };

    let impact = if hint_used {
        scoring::apply_hint_penalty(&impact, hint_multiplier)
    } else {
        impact
    };
    Ok(Evaluation { ratio, impact })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(ids: &[&str]) -> Vec<TaskItem> {
        ids.iter().map(|id| TaskItem { id: id.to_string(), label: id.to_uppercase() }).collect()
    }

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn impact(pairs: &[(&str, f64)]) -> AxisImpact {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn task(kind: TaskKind) -> TaskDefinition {
        TaskDefinition {
            title: "Test".into(),
            instruction: "Do the thing".into(),
            hint: None,
            kind,
        }
    }

    fn ordering() -> TaskDefinition {
        task(TaskKind::Ordering {
            items: items(&["a", "b", "c", "d"]),
            correct_order: strings(&["a", "b", "c", "d"]),
            axis_impact: impact(&[("Precision", 10.0)]),
        })
    }

    fn layout() -> TaskDefinition {
        task(TaskKind::Layout {
            items: items(&["a", "b", "c", "d"]),
            zones: items(&["z0", "z1", "z2", "z3"]),
            correct_order: strings(&["a", "b", "c", "d"]),
            axis_impact: impact(&[("Stability", 5.0)]),
        })
    }

    fn numeric() -> TaskDefinition {
        task(TaskKind::Numeric {
            reference_data: vec![10.0, 12.0, 14.0],
            expected: 16.0,
            tolerance: 4.0,
            axis_impact: impact(&[("Speed", 8.0)]),
        })
    }

    fn choice() -> TaskDefinition {
        task(TaskKind::Choice {
            options: vec![
                ChoiceOption { id: "fast".into(), label: "Fast".into(), axis_impact: impact(&[("Speed", 3.0)]) },
                ChoiceOption { id: "safe".into(), label: "Safe".into(), axis_impact: impact(&[("Stability", 3.0)]) },
            ],
        })
    }

    fn placement(zone: &str, ids: &[&str]) -> ZonePlacement {
        ZonePlacement { zone_id: zone.into(), item_ids: strings(ids) }
    }

    #[test]
    fn test_ordering_evaluation() {
        let eval = evaluate(&ordering(), &TaskResult::Ordering(strings(&["a", "b", "d", "c"])), false, 0.7).unwrap();
        assert_eq!(eval.ratio, 0.5);
        assert_eq!(eval.impact["Precision"], 5.0);
    }

    #[test]
    fn test_ordering_must_be_permutation() {
        let def = ordering();
        assert_eq!(
            validate(&def, &TaskResult::Ordering(strings(&["a", "a", "b", "c"]))),
            Err(TaskError::NotAPermutation)
        );
        assert_eq!(
            validate(&def, &TaskResult::Ordering(strings(&["a", "b", "c"]))),
            Err(TaskError::NotAPermutation)
        );
        assert_eq!(
            validate(&def, &TaskResult::Ordering(strings(&["a", "b", "c", "x"]))),
            Err(TaskError::UnknownItem("x".into()))
        );
    }

    #[test]
    fn test_layout_palette_must_be_empty() {
        let result = TaskResult::Layout(vec![placement("z0", &["a"]), placement("z1", &["b", "c"])]);
        assert_eq!(validate(&layout(), &result), Err(TaskError::PaletteNotEmpty(1)));
    }

    #[test]
    fn test_layout_rejects_unknown_zone() {
        let result = TaskResult::Layout(vec![placement("z9", &["a", "b", "c", "d"])]);
        assert_eq!(validate(&layout(), &result), Err(TaskError::UnknownZone("z9".into())));
    }

    #[test]
    fn test_layout_evaluation() {
        let perfect = TaskResult::Layout(vec![
            placement("z0", &["a"]),
            placement("z1", &["b"]),
            placement("z2", &["c"]),
            placement("z3", &["d"]),
        ]);
        assert_eq!(evaluate(&layout(), &perfect, false, 0.7).unwrap().ratio, 1.0);

        let crowded = TaskResult::Layout(vec![placement("z1", &["a", "b", "c", "d"])]);
        let eval = evaluate(&layout(), &crowded, false, 0.7).unwrap();
        // distances 1 + 0 + 1 + 2 = 4 of 10
        assert!((eval.ratio - 0.6).abs() < 1e-9);
        assert!((eval.impact["Stability"] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_numeric_rejects_bad_input() {
        assert_eq!(validate(&numeric(), &TaskResult::Numeric(-1.0)), Err(TaskError::NegativeValue(-1.0)));
        assert_eq!(validate(&numeric(), &TaskResult::Numeric(f64::NAN)), Err(TaskError::NonNumeric));
    }

    #[test]
    fn test_numeric_evaluation_with_hint() {
        let eval = evaluate(&numeric(), &TaskResult::Numeric(14.0), true, 0.7).unwrap();
        assert_eq!(eval.ratio, 0.5);
        assert!((eval.impact["Speed"] - 2.8).abs() < 1e-9);
    }

    #[test]
    fn test_choice_uses_option_impact_verbatim() {
        let eval = evaluate(&choice(), &TaskResult::Choice("safe".into()), false, 0.7).unwrap();
        assert_eq!(eval.impact, impact(&[("Stability", 3.0)]));
        assert_eq!(
            validate(&choice(), &TaskResult::Choice("maybe".into())),
            Err(TaskError::UnknownOption("maybe".into()))
        );
    }

    #[test]
    fn test_kind_mismatch() {
        assert_eq!(
            validate(&choice(), &TaskResult::Numeric(1.0)),
            Err(TaskError::KindMismatch { task: "choice", result: "numeric" })
        );
    }

    #[test]
    fn test_empty_impact_table_yields_empty_vector() {
        let def = task(TaskKind::Numeric {
            reference_data: vec![],
            expected: 1.0,
            tolerance: 1.0,
            axis_impact: AxisImpact::new(),
        });
        let eval = evaluate(&def, &TaskResult::Numeric(1.0), true, 0.7).unwrap();
        assert!(eval.impact.is_empty());
    }

    #[test]
    fn test_definition_parses_from_json() {
        let json = r#"{
            "title": "Crowd estimate",
            "instruction": "How many?",
            "kind": {"numeric": {
                "reference_data": [1, 2, 3],
                "expected": 4,
                "tolerance": 2,
                "axis_impact": {"Precision": 6}
            }}
        }"#;
        let def: TaskDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.kind.name(), "numeric");
        assert_eq!(def.hint, None);
        match def.kind {
            TaskKind::Numeric { expected, tolerance, .. } => {
                assert_eq!(expected, 4.0);
                assert_eq!(tolerance, 2.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fractional_numbers_parse() {
        let json = r#"{
            "title": "Queue drift",
            "instruction": "Where does it settle?",
            "hint": "Average the last two",
            "kind": {"numeric": {
                "reference_data": [1.5, 2.5, 2.0],
                "expected": 2.25,
                "tolerance": 0.5,
                "axis_impact": {"Precision": 0.7, "Speed": 1.5}
            }}
        }"#;
        let def: TaskDefinition = serde_json::from_str(json).unwrap();
        match &def.kind {
            TaskKind::Numeric { reference_data, expected, tolerance, axis_impact } => {
                assert_eq!(reference_data, &vec![1.5, 2.5, 2.0]);
                assert_eq!(*expected, 2.25);
                assert_eq!(*tolerance, 0.5);
                assert_eq!(axis_impact["Precision"], 0.7);
            }
            other => panic!("unexpected {:?}", other),
        }

        let choice = r#"{"title": "t", "instruction": "i", "kind": {"choice": {"options": [
            {"id": "a", "label": "A", "axis_impact": {"Speed": 2.5}},
            {"id": "b", "label": "B", "axis_impact": {"Stability": 0.25}}
        ]}}}"#;
        let def: TaskDefinition = serde_json::from_str(choice).unwrap();
        let eval = evaluate(&def, &TaskResult::Choice("b".into()), false, 0.7).unwrap();
        assert_eq!(eval.impact["Stability"], 0.25);
    }
}
