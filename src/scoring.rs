//! Correctness ratios and axis-impact arithmetic
//!
//! Every function here is total: degenerate inputs (empty correct order,
//! zero tolerance, NaN) resolve to a ratio of 0 or an empty vector.

use std::collections::BTreeMap;

use spacetimedb::SpacetimeType;

/// Axis name → signed delta. Unknown axis names pass through untouched.
pub type AxisImpact = BTreeMap<String, f64>;

/// Stored form of one axis-impact entry (tables can't hold maps)
#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct AxisValue {
    pub axis: String,
    pub value: f64,
}

pub fn to_axis_values(impact: &AxisImpact) -> Vec<AxisValue> {
    impact
        .iter()
        .map(|(axis, value)| AxisValue { axis: axis.clone(), value: *value })
        .collect()
}

/// Later duplicates of the same axis are summed
pub fn from_axis_values(values: &[AxisValue]) -> AxisImpact {
    let mut impact = AxisImpact::new();
    for v in values {
        *impact.entry(v.axis.clone()).or_insert(0.0) += v.value;
    }
    impact
}

/// Multiply every axis of `base` by `ratio`
pub fn scale(base: &AxisImpact, ratio: f64) -> AxisImpact {
    base.iter().map(|(axis, value)| (axis.clone(), value * ratio)).collect()
}

/// Fraction of positions where the submitted id matches the correct id exactly
pub fn ordering_ratio(submitted: &[String], correct: &[String]) -> f64 {
    if correct.is_empty() {
        return 0.0;
    }
    let hits = correct
        .iter()
        .enumerate()
        .filter(|(i, id)| submitted.get(*i) == Some(*id))
        .count();
    hits as f64 / correct.len() as f64
}

/// Worst achievable total distance with `zone_count` ordered zones
pub fn layout_max_distance(zone_count: usize) -> usize {
    if zone_count == 0 {
        return 0;
    }
    let last = zone_count - 1;
    (0..zone_count).map(|i| i.max(last - i)).sum()
}

/// Distance-based partial credit for a zone assignment.
///
/// `zone_ids` is the ordered zone list; `placements` maps zone id → items.
/// Item `correct_order[i]` belongs in zone index `i`. An item never placed
/// counts as sitting in the last zone. If an item was placed in several
/// zones the last one in zone order wins.
pub fn layout_ratio(
    zone_ids: &[String],
    placements: &BTreeMap<String, Vec<String>>,
    correct_order: &[String],
) -> f64 {
    if correct_order.is_empty() {
        return 0.0;
    }
    let zone_count = zone_ids.len();

    let mut assigned: BTreeMap<&str, usize> = BTreeMap::new();
    for (zone_index, zone_id) in zone_ids.iter().enumerate() {
        if let Some(items) = placements.get(zone_id) {
            for item in items {
                assigned.insert(item.as_str(), zone_index);
            }
        }
    }

    let last_zone = zone_count.saturating_sub(1) as i64;
    let total_distance: i64 = correct_order
        .iter()
        .enumerate()
        .map(|(correct_index, item)| {
            let correct_index = correct_index as i64;
            match assigned.get(item.as_str()) {
                Some(&zone_index) => (zone_index as i64 - correct_index).abs(),
                None => (last_zone - correct_index).abs(),
            }
        })
        .sum();

    let max_distance = layout_max_distance(zone_count);
    if max_distance == 0 {
        return if total_distance == 0 { 1.0 } else { 0.0 };
    }
    (1.0 - total_distance as f64 / max_distance as f64).clamp(0.0, 1.0)
}

/// Linear credit: 1 at the expected value, 0 at `tolerance` away and beyond
pub fn numeric_ratio(submitted: f64, expected: f64, tolerance: f64) -> f64 {
    if !submitted.is_finite() || !expected.is_finite() || tolerance.is_nan() {
        return 0.0;
    }
    let diff = (submitted - expected).abs();
    if tolerance <= 0.0 {
        return if diff == 0.0 { 1.0 } else { 0.0 };
    }
    ((tolerance - diff) / tolerance).clamp(0.0, 1.0)
}

/// Applied once per submission, after ratio scaling
pub fn apply_hint_penalty(impact: &AxisImpact, multiplier: f64) -> AxisImpact {
    scale(impact, multiplier)
}

/// Group-subgame impact: chosen option's base impact times the wager
pub fn wager_impact(base: &AxisImpact, wager: u32) -> AxisImpact {
    scale(base, wager as f64)
}

/// Sum of absolute values across every axis
pub fn magnitude(impact: &AxisImpact) -> f64 {
    impact.values().map(|v| v.abs()).sum()
}
