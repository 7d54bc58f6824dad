//! Scenario content: the arc × chapter grid of per-role tasks plus each
//! arc's group questions. Parsed from JSON and validated once at load.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::GameConfig;
use crate::error::ContentError;
use crate::group::GroupQuestion;
use crate::persona::Axis;
use crate::rotation::{Role, ROLES};
use crate::scoring::AxisImpact;
use crate::task::{ChoiceOption, TaskDefinition, TaskItem, TaskKind};

/// Content bundled with the module and seeded at init
pub const REFERENCE_SCENARIOS: &str = include_str!("../content/reference_scenarios.json");

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub story: String,
    pub tasks: BTreeMap<Role, TaskDefinition>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArcContent {
    pub name: String,
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub group_questions: Vec<GroupQuestion>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScenarioBook {
    pub arcs: Vec<ArcContent>,
}

impl ScenarioBook {
    /// Parse and validate against the grid in `config`
    pub fn from_json(json: &str, config: &GameConfig) -> Result<Self, ContentError> {
        let book: ScenarioBook = serde_json::from_str(json)?;
        book.validate(config)?;
        Ok(book)
    }

    pub fn reference(config: &GameConfig) -> Result<Self, ContentError> {
        Self::from_json(REFERENCE_SCENARIOS, config)
    }

    pub fn chapter(&self, arc_index: u32, chapter_index: u32) -> Option<&Chapter> {
        self.arcs.get(arc_index as usize)?.chapters.get(chapter_index as usize)
    }

    pub fn task(&self, arc_index: u32, chapter_index: u32, role: Role) -> Option<&TaskDefinition> {
        self.chapter(arc_index, chapter_index)?.tasks.get(&role)
    }

    pub fn group_questions(&self, arc_index: u32) -> &[GroupQuestion] {
        self.arcs
            .get(arc_index as usize)
            .map(|a| a.group_questions.as_slice())
            .unwrap_or(&[])
    }

    pub fn validate(&self, config: &GameConfig) -> Result<(), ContentError> {
        if self.arcs.len() != config.num_arcs as usize {
            return Err(ContentError::invalid(
                "book",
                format!("expected {} arcs, found {}", config.num_arcs, self.arcs.len()),
            ));
        }

        let mut chapter_ids = BTreeSet::new();
        for (arc_index, arc) in self.arcs.iter().enumerate() {
            let arc_loc = format!("arc {}", arc_index);
            if arc.chapters.len() != config.chapters_per_arc as usize {
                return Err(ContentError::invalid(
                    &arc_loc,
                    format!("expected {} chapters, found {}", config.chapters_per_arc, arc.chapters.len()),
                ));
            }

            for (chapter_index, chapter) in arc.chapters.iter().enumerate() {
                let loc = format!("{} chapter {}", arc_loc, chapter_index);
                require_text(&loc, "id", &chapter.id)?;
                if !chapter_ids.insert(chapter.id.as_str()) {
                    return Err(ContentError::invalid(&loc, format!("duplicate chapter id {}", chapter.id)));
                }
                for role in ROLES {
                    let task = chapter.tasks.get(&role).ok_or_else(|| {
                        ContentError::invalid(&loc, format!("no task for role {}", role.key()))
                    })?;
                    validate_task(&format!("{} {}", loc, role.key()), task)?;
                }
            }

            for (q_index, question) in arc.group_questions.iter().enumerate() {
                validate_group_question(&format!("{} group question {}", arc_loc, q_index), question)?;
            }
        }
        Ok(())
    }
}

fn require_text(loc: &str, field: &str, value: &str) -> Result<(), ContentError> {
    if value.trim().is_empty() {
        return Err(ContentError::invalid(loc, format!("{} must not be empty", field)));
    }
    Ok(())
}

fn validate_impact(loc: &str, impact: &AxisImpact, known_axes_only: bool) -> Result<(), ContentError> {
    for (axis, value) in impact {
        if !value.is_finite() {
            return Err(ContentError::invalid(loc, format!("impact on {} is not a finite number", axis)));
        }
        if known_axes_only && Axis::from_name(axis).is_none() {
            return Err(ContentError::invalid(loc, format!("unknown axis {}", axis)));
        }
    }
    Ok(())
}

fn validate_items(loc: &str, what: &str, items: &[TaskItem]) -> Result<BTreeSet<String>, ContentError> {
    if items.is_empty() {
        return Err(ContentError::invalid(loc, format!("needs at least one {}", what)));
    }
    let mut ids = BTreeSet::new();
    for item in items {
        require_text(loc, &format!("{} id", what), &item.id)?;
        require_text(loc, &format!("{} label", what), &item.label)?;
        if !ids.insert(item.id.clone()) {
            return Err(ContentError::invalid(loc, format!("duplicate {} id {}", what, item.id)));
        }
    }
    Ok(ids)
}

fn validate_correct_order(loc: &str, known: &BTreeSet<String>, order: &[String]) -> Result<(), ContentError> {
    if order.is_empty() {
        return Err(ContentError::invalid(loc, "correct_order must not be empty"));
    }
    let mut seen = BTreeSet::new();
    for id in order {
        if !known.contains(id) {
            return Err(ContentError::invalid(loc, format!("correct_order names unknown item {}", id)));
        }
        if !seen.insert(id) {
            return Err(ContentError::invalid(loc, format!("correct_order repeats {}", id)));
        }
    }
    Ok(())
}

fn validate_options(loc: &str, options: &[ChoiceOption], known_axes_only: bool) -> Result<(), ContentError> {
    if options.len() < 2 {
        return Err(ContentError::invalid(loc, "needs at least two options"));
    }
    let mut ids = BTreeSet::new();
    for option in options {
        require_text(loc, "option id", &option.id)?;
        require_text(loc, "option label", &option.label)?;
        if !ids.insert(option.id.as_str()) {
            return Err(ContentError::invalid(loc, format!("duplicate option id {}", option.id)));
        }
        if option.axis_impact.is_empty() {
            return Err(ContentError::invalid(loc, format!("option {} has no axis impact", option.id)));
        }
        validate_impact(&format!("{} option {}", loc, option.id), &option.axis_impact, known_axes_only)?;
    }
    Ok(())
}

fn validate_task(loc: &str, task: &TaskDefinition) -> Result<(), ContentError> {
    require_text(loc, "title", &task.title)?;
    match &task.kind {
        TaskKind::Ordering { items, correct_order, axis_impact } => {
            let ids = validate_items(loc, "item", items)?;
            validate_correct_order(loc, &ids, correct_order)?;
            validate_impact(loc, axis_impact, false)
        }
        TaskKind::Layout { items, zones, correct_order, axis_impact } => {
            let ids = validate_items(loc, "item", items)?;
            validate_items(loc, "zone", zones)?;
            validate_correct_order(loc, &ids, correct_order)?;
            if correct_order.len() > zones.len() {
                return Err(ContentError::invalid(loc, "correct_order is longer than the zone list"));
            }
            validate_impact(loc, axis_impact, false)
        }
        TaskKind::Numeric { expected, tolerance, axis_impact, .. } => {
            if !expected.is_finite() {
                return Err(ContentError::invalid(loc, "expected must be a finite number"));
            }
            if !(tolerance.is_finite() && *tolerance > 0.0) {
                return Err(ContentError::invalid(loc, "tolerance must be a positive number"));
            }
            validate_impact(loc, axis_impact, false)
        }
        TaskKind::Choice { options } => validate_options(loc, options, false),
    }
}

fn validate_group_question(loc: &str, question: &GroupQuestion) -> Result<(), ContentError> {
    require_text(loc, "id", &question.id)?;
    require_text(loc, "title", &question.title)?;
    if question.wager_options.is_empty() {
        return Err(ContentError::invalid(loc, "needs at least one wager option"));
    }
    if question.wager_options.contains(&0) {
        return Err(ContentError::invalid(loc, "wager options must be positive integers"));
    }
    validate_options(loc, &question.options, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> GameConfig {
        GameConfig { num_arcs: 1, chapters_per_arc: 1, ..GameConfig::default() }
    }

    fn choice_task() -> &'static str {
        r#"{"title": "Pick", "instruction": "Choose one", "kind": {"choice": {
            "options": [
                {"id": "a", "label": "A", "axis_impact": {"Speed": 2}},
                {"id": "b", "label": "B", "axis_impact": {"Stability": 2}}
            ]}}}"#
    }

    fn book_json(group_question: &str) -> String {
        format!(
            r#"{{"arcs": [{{"name": "Arc", "chapters": [{{"id": "c1", "title": "One", "tasks": {{
                "software-engineer": {task},
                "data-scientist": {task},
                "cloud-engineer": {task}
            }}}}], "group_questions": [{gq}]}}]}}"#,
            task = choice_task(),
            gq = group_question
        )
    }

    const GOOD_QUESTION: &str = r#"{"id": "g1", "title": "Call", "prompt": "Decide",
        "wager_options": [1, 2, 3],
        "options": [
            {"id": "x", "label": "X", "axis_impact": {"Speed": 4}},
            {"id": "y", "label": "Y", "axis_impact": {"Collaboration": 4}}
        ]}"#;

    #[test]
    fn test_reference_content_is_valid() {
        let config = GameConfig::default();
        let book = ScenarioBook::reference(&config).unwrap();
        assert_eq!(book.arcs.len(), 3);
        for arc in 0..3 {
            for chapter in 0..4 {
                for role in ROLES {
                    assert!(book.task(arc, chapter, role).is_some(), "{} {} {:?}", arc, chapter, role);
                }
            }
            assert!(!book.group_questions(arc).is_empty());
        }
        assert!(book.task(3, 0, Role::SoftwareEngineer).is_none());
        assert!(book.group_questions(7).is_empty());
    }

    #[test]
    fn test_small_book_parses() {
        let book = ScenarioBook::from_json(&book_json(GOOD_QUESTION), &small_config()).unwrap();
        assert_eq!(book.group_questions(0)[0].wager_options, vec![1, 2, 3]);
    }

    #[test]
    fn test_grid_must_match_config() {
        let err = ScenarioBook::from_json(&book_json(GOOD_QUESTION), &GameConfig::default()).unwrap_err();
        assert!(err.to_string().contains("expected 3 arcs"));
    }

    #[test]
    fn test_missing_role_rejected() {
        let json = format!(
            r#"{{"arcs": [{{"name": "Arc", "chapters": [{{"id": "c1", "title": "One", "tasks": {{
                "software-engineer": {task}
            }}}}]}}]}}"#,
            task = choice_task()
        );
        let err = ScenarioBook::from_json(&json, &small_config()).unwrap_err();
        assert!(err.to_string().contains("no task for role data-scientist"));
    }

    #[test]
    fn test_unknown_role_key_is_a_parse_error() {
        let json = r#"{"arcs": [{"name": "Arc", "chapters": [{"id": "c1", "title": "One",
            "tasks": {"astronaut": {"title": "t", "instruction": "i", "kind": {"numeric": {"expected": 1, "tolerance": 1}}}}}]}]}"#;
        assert!(matches!(ScenarioBook::from_json(json, &small_config()), Err(ContentError::Parse(_))));
    }

    #[test]
    fn test_group_question_rules() {
        let zero_wager = GOOD_QUESTION.replace("[1, 2, 3]", "[0, 2]");
        assert!(ScenarioBook::from_json(&book_json(&zero_wager), &small_config()).is_err());

        let no_wagers = GOOD_QUESTION.replace("[1, 2, 3]", "[]");
        assert!(ScenarioBook::from_json(&book_json(&no_wagers), &small_config()).is_err());

        let bad_axis = GOOD_QUESTION.replace("\"Collaboration\"", "\"Charisma\"");
        let err = ScenarioBook::from_json(&book_json(&bad_axis), &small_config()).unwrap_err();
        assert!(err.to_string().contains("unknown axis Charisma"));

        let dup_ids = GOOD_QUESTION.replace("\"id\": \"y\"", "\"id\": \"x\"");
        assert!(ScenarioBook::from_json(&book_json(&dup_ids), &small_config()).is_err());

        let empty_impact = GOOD_QUESTION.replace("{\"Speed\": 4}", "{}");
        assert!(ScenarioBook::from_json(&book_json(&empty_impact), &small_config()).is_err());
    }

    #[test]
    fn test_numeric_tolerance_must_be_positive() {
        let task = TaskDefinition {
            title: "Guess".into(),
            instruction: "How many".into(),
            hint: None,
            kind: TaskKind::Numeric { reference_data: vec![], expected: 3.0, tolerance: 0.0, axis_impact: AxisImpact::new() },
        };
        assert!(validate_task("here", &task).is_err());
    }

    #[test]
    fn test_layout_correct_order_fits_zones() {
        let item = |id: &str| TaskItem { id: id.into(), label: id.into() };
        let task = TaskDefinition {
            title: "Place".into(),
            instruction: "Drag".into(),
            hint: None,
            kind: TaskKind::Layout {
                items: vec![item("a"), item("b"), item("c")],
                zones: vec![item("z0"), item("z1")],
                correct_order: vec!["a".into(), "b".into(), "c".into()],
                axis_impact: AxisImpact::new(),
            },
        };
        let err = validate_task("here", &task).unwrap_err();
        assert!(err.to_string().contains("longer than the zone list"));
    }
}
