//! Persona profile, identity archetype and vocation recommendation

use std::collections::BTreeMap;

use spacetimedb::SpacetimeType;

use crate::rotation::{Role, FALLBACK_ROLE};
use crate::scoring::{magnitude, AxisImpact};

/// The eight fixed persona axes, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Axis {
    Innovation,
    Stability,
    Speed,
    Precision,
    CostConscious,
    PerformanceFirst,
    Autonomy,
    Collaboration,
}

impl Axis {
    pub const ALL: [Axis; 8] = [
        Axis::Innovation,
        Axis::Stability,
        Axis::Speed,
        Axis::Precision,
        Axis::CostConscious,
        Axis::PerformanceFirst,
        Axis::Autonomy,
        Axis::Collaboration,
    ];

    /// Name used as the key in axis-impact tables
    pub fn name(self) -> &'static str {
        match self {
            Axis::Innovation => "Innovation",
            Axis::Stability => "Stability",
            Axis::Speed => "Speed",
            Axis::Precision => "Precision",
            Axis::CostConscious => "Cost-Conscious",
            Axis::PerformanceFirst => "Performance-First",
            Axis::Autonomy => "Autonomy",
            Axis::Collaboration => "Collaboration",
        }
    }

    pub fn from_name(name: &str) -> Option<Axis> {
        Axis::ALL.into_iter().find(|a| a.name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Neutral midpoint every axis starts at
pub const NEUTRAL_SCORE: u32 = 50;

/// Normalized 0..=100 score per fixed axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonaProfile {
    scores: [u32; 8],
}

impl PersonaProfile {
    pub fn neutral() -> Self {
        PersonaProfile { scores: [NEUTRAL_SCORE; 8] }
    }

    pub fn score(&self, axis: Axis) -> u32 {
        self.scores[axis.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Axis, u32)> + '_ {
        Axis::ALL.into_iter().map(move |a| (a, self.score(a)))
    }

    /// Axes ordered by score, highest first; ties keep display order
    pub fn ranked_axes(&self) -> Vec<(Axis, u32)> {
        let mut ranked: Vec<_> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    pub fn to_axis_scores(&self) -> Vec<AxisScore> {
        self.iter()
            .map(|(axis, score)| AxisScore { axis: axis.name().to_string(), score })
            .collect()
    }
}

/// Stored form of one profile entry
#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct AxisScore {
    pub axis: String,
    pub score: u32,
}

/// Sum every impact axis-wise, then scale each fixed axis against the single
/// most extreme fixed-axis total: `round(total / max_abs * 50 + 50)`.
pub fn compute_persona_profile<'a, I>(impacts: I) -> PersonaProfile
where
    I: IntoIterator<Item = &'a AxisImpact>,
{
    let mut totals = [0.0f64; 8];
    for impact in impacts {
        for (name, value) in impact {
            if let Some(axis) = Axis::from_name(name) {
                if value.is_finite() {
                    totals[axis.index()] += value;
                }
            }
        }
    }

    let max_abs = totals.iter().fold(1.0f64, |m, t| m.max(t.abs()));

    let mut scores = [NEUTRAL_SCORE; 8];
    for (score, total) in scores.iter_mut().zip(totals) {
        *score = ((total / max_abs) * 50.0 + 50.0).round().clamp(0.0, 100.0) as u32;
    }
    PersonaProfile { scores }
}

/// Cumulative impact magnitude per role; negative swings count as engagement too
pub fn compute_per_role_scores<'a, I>(logs: I) -> BTreeMap<Role, f64>
where
    I: IntoIterator<Item = (Role, &'a AxisImpact)>,
{
    let mut scores = BTreeMap::new();
    for (role, impact) in logs {
        *scores.entry(role).or_insert(0.0) += magnitude(impact);
    }
    scores
}

#[derive(Debug, PartialEq, Eq)]
pub struct Archetype {
    pub name: &'static str,
    pub description: &'static str,
    pub axes: &'static [Axis],
}

pub const ARCHETYPES: [Archetype; 10] = [
    Archetype {
        name: "The Visionary Architect",
        description: "Big ideas and independent work energise you. You chase the long-range picture and like being first to try a new approach.",
        axes: &[Axis::Innovation, Axis::Autonomy],
    },
    Archetype {
        name: "The Precision Engineer",
        description: "Reliability and exactness come first. You are methodical and make sure every part holds up under load.",
        axes: &[Axis::Stability, Axis::Precision],
    },
    Archetype {
        name: "The Rapid Deployer",
        description: "You push for throughput and quick decisions, trimming every workflow until it moves at full speed.",
        axes: &[Axis::Speed, Axis::PerformanceFirst],
    },
    Archetype {
        name: "The Strategic Coordinator",
        description: "You keep the budget and the team pulling in the same direction, spending resources where the group gets the most out of them.",
        axes: &[Axis::CostConscious, Axis::Collaboration],
    },
    Archetype {
        name: "The Creative Collaborator",
        description: "Ideas get better when you work them out with others. Group brainstorming is where you do your best thinking.",
        axes: &[Axis::Innovation, Axis::Collaboration],
    },
    Archetype {
        name: "The Pragmatic Steward",
        description: "You favour dependable results at a sensible cost and keep projects on budget and on schedule.",
        axes: &[Axis::Stability, Axis::CostConscious],
    },
    Archetype {
        name: "The Performance Tactician",
        description: "Accuracy and speed both matter to you. You tune for the exact answer without giving up throughput.",
        axes: &[Axis::Precision, Axis::PerformanceFirst],
    },
    Archetype {
        name: "The Cutting-Edge Sprinter",
        description: "You hunt for the next performance edge and prototype quickly to get there first.",
        axes: &[Axis::Innovation, Axis::PerformanceFirst],
    },
    Archetype {
        name: "The Steadfast Soloist",
        description: "Give you a stable environment and some quiet and you will deliver consistently on your own.",
        axes: &[Axis::Autonomy, Axis::Stability],
    },
    Archetype {
        name: "The Agile Team Player",
        description: "Short feedback loops with teammates let you ship fast and stay in sync.",
        axes: &[Axis::Speed, Axis::Collaboration],
    },
];

pub const BALANCED_ARCHETYPE: Archetype = Archetype {
    name: "The Balanced Integrator",
    description: "No single tendency dominates. You adapt to whatever the team needs most at the time.",
    axes: &[],
};

/// Pick the archetype for a profile.
///
/// An exact match on the top two axes wins, then the first archetype containing
/// the top axis. Ties rank in display order, so a flat profile still resolves.
pub fn identity_match(profile: &PersonaProfile) -> &'static Archetype {
    let ranked = profile.ranked_axes();
    let top = ranked[0].0;
    let second = ranked[1].0;

    let pair = ARCHETYPES
        .iter()
        .find(|a| a.axes.len() == 2 && a.axes.contains(&top) && a.axes.contains(&second));
    if let Some(archetype) = pair {
        return archetype;
    }

    ARCHETYPES
        .iter()
        .find(|a| a.axes.contains(&top))
        .unwrap_or(&BALANCED_ARCHETYPE)
}

/// Stored form of a per-role vocation score
#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct RoleScore {
    pub role: Role,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vocation {
    pub best_role: Role,
    /// Every role present in the input, highest score first, rounded to 2 dp
    pub breakdown: Vec<RoleScore>,
}

impl Vocation {
    pub fn label(&self) -> &'static str {
        self.best_role.vocation_label()
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn vocation_recommendation(role_scores: &BTreeMap<Role, f64>) -> Vocation {
    let mut breakdown: Vec<RoleScore> = role_scores
        .iter()
        .map(|(role, score)| RoleScore { role: *role, score: round2(*score) })
        .collect();
    breakdown.sort_by(|a, b| b.score.total_cmp(&a.score));

    let best_role = breakdown.first().map(|r| r.role).unwrap_or(FALLBACK_ROLE);
    Vocation { best_role, breakdown }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impact(pairs: &[(&str, f64)]) -> AxisImpact {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_axis_names_round_trip() {
        for axis in Axis::ALL {
            assert_eq!(Axis::from_name(axis.name()), Some(axis));
        }
        assert_eq!(Axis::from_name("Charisma"), None);
    }

    #[test]
    fn test_empty_profile_is_neutral() {
        let profile = compute_persona_profile(&Vec::<AxisImpact>::new());
        assert_eq!(profile, PersonaProfile::neutral());
        assert!(profile.iter().all(|(_, s)| s == 50));
        assert_eq!(profile.to_axis_scores().len(), 8);
    }

    #[test]
    fn test_extreme_axis_hits_bounds() {
        let impacts = vec![impact(&[("Speed", 8.0), ("Precision", -8.0)])];
        let profile = compute_persona_profile(&impacts);
        assert_eq!(profile.score(Axis::Speed), 100);
        assert_eq!(profile.score(Axis::Precision), 0);
        assert_eq!(profile.score(Axis::Innovation), 50);
        assert_eq!(profile.score(Axis::Collaboration), 50);
    }

    #[test]
    fn test_profile_scales_against_most_extreme_axis() {
        let impacts = vec![
            impact(&[("Speed", 4.0)]),
            impact(&[("Speed", 4.0), ("Autonomy", 2.0)]),
        ];
        let profile = compute_persona_profile(&impacts);
        assert_eq!(profile.score(Axis::Speed), 100);
        // 2 / 8 * 50 + 50 = 62.5 rounds up
        assert_eq!(profile.score(Axis::Autonomy), 63);
    }

    #[test]
    fn test_small_totals_are_not_inflated() {
        let profile = compute_persona_profile(&[impact(&[("Speed", 0.5)])]);
        // max_abs floors at 1
        assert_eq!(profile.score(Axis::Speed), 75);
    }

    #[test]
    fn test_unknown_axes_ignored_by_profile() {
        let profile = compute_persona_profile(&[impact(&[("Charisma", 100.0), ("Speed", 2.0)])]);
        assert_eq!(profile.score(Axis::Speed), 100);
    }

    #[test]
    fn test_per_role_scores_sum_magnitudes() {
        let a = impact(&[("Speed", 3.0), ("Stability", -2.0)]);
        let b = impact(&[("Innovation", -1.5)]);
        let scores = compute_per_role_scores(vec![
            (Role::SoftwareEngineer, &a),
            (Role::SoftwareEngineer, &b),
            (Role::CloudEngineer, &b),
        ]);
        assert_eq!(scores[&Role::SoftwareEngineer], 6.5);
        assert_eq!(scores[&Role::CloudEngineer], 1.5);
        assert!(!scores.contains_key(&Role::DataScientist));
    }

    #[test]
    fn test_every_archetype_is_reachable() {
        for archetype in ARCHETYPES.iter() {
            let pairs: Vec<(&str, f64)> = archetype.axes.iter().map(|a| (a.name(), 10.0)).collect();
            let profile = compute_persona_profile(&[impact(&pairs)]);
            assert_eq!(identity_match(&profile).name, archetype.name);
        }
    }

    #[test]
    fn test_neutral_profile_resolves_through_display_order() {
        // Innovation and Stability tie on top and are not a pair
        assert_eq!(identity_match(&PersonaProfile::neutral()).name, "The Visionary Architect");
    }

    #[test]
    fn test_identity_falls_back_to_top_axis() {
        // Speed + Precision is not a signature pair; first archetype with Speed wins
        let profile = compute_persona_profile(&[impact(&[("Speed", 10.0), ("Precision", 5.0)])]);
        assert_eq!(identity_match(&profile).name, "The Rapid Deployer");
    }

    #[test]
    fn test_identity_pair_is_order_independent() {
        let profile = compute_persona_profile(&[impact(&[("Collaboration", 10.0), ("Innovation", 6.0)])]);
        assert_eq!(identity_match(&profile).name, "The Creative Collaborator");
    }

    #[test]
    fn test_negative_only_profile_uses_remaining_top_axis() {
        let profile = compute_persona_profile(&[impact(&[("Speed", -4.0)])]);
        assert_eq!(profile.score(Axis::Speed), 0);
        assert_eq!(identity_match(&profile).name, "The Visionary Architect");
    }

    #[test]
    fn test_vocation_recommendation() {
        let mut scores = BTreeMap::new();
        scores.insert(Role::SoftwareEngineer, 2.004);
        scores.insert(Role::DataScientist, 7.555);
        scores.insert(Role::CloudEngineer, 3.0);
        let vocation = vocation_recommendation(&scores);
        assert_eq!(vocation.best_role, Role::DataScientist);
        assert_eq!(vocation.label(), "Data Science & AI");
        let ordered: Vec<Role> = vocation.breakdown.iter().map(|r| r.role).collect();
        assert_eq!(ordered, vec![Role::DataScientist, Role::CloudEngineer, Role::SoftwareEngineer]);
        assert_eq!(vocation.breakdown[2].score, 2.0);
    }

    #[test]
    fn test_vocation_fallback_when_empty() {
        let vocation = vocation_recommendation(&BTreeMap::new());
        assert_eq!(vocation.best_role, FALLBACK_ROLE);
        assert!(vocation.breakdown.is_empty());
    }
}
