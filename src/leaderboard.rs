//! Score projection for the global and per-team leaderboards

use chrono::{DateTime, Utc};
use spacetimedb::Timestamp;

use crate::persona::round2;

/// Scope every finished player is ranked in
pub const GLOBAL_SCOPE: &str = "global";

/// Leaderboard scopes a finished game writes to: always global, plus the team
pub fn scopes_for(team_name: Option<&str>) -> Vec<String> {
    let mut scopes = vec![GLOBAL_SCOPE.to_string()];
    if let Some(team) = team_name.map(str::trim).filter(|t| !t.is_empty()) {
        if team != GLOBAL_SCOPE {
            scopes.push(team.to_string());
        }
    }
    scopes
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreLine {
    pub player_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub player_id: String,
    pub score: f64,
    /// 1-based; equal scores share a position and the next one skips
    pub position: u32,
}

/// Highest score first, player id for stable ordering. Every line is ranked;
/// the display limit is applied on read by [`top_by_position`].
pub fn rank_entries(mut lines: Vec<ScoreLine>) -> Vec<Ranked> {
    lines.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.player_id.cmp(&b.player_id))
    });

    let mut ranked: Vec<Ranked> = Vec::with_capacity(lines.len());
    for (i, line) in lines.into_iter().enumerate() {
        let position = match ranked.last() {
            Some(prev) if prev.score == line.score => prev.position,
            _ => (i + 1) as u32,
        };
        ranked.push(Ranked { player_id: line.player_id, score: line.score, position });
    }
    ranked
}

/// Best `limit` rows by stored position
pub fn top_by_position<T, F>(mut rows: Vec<T>, position: F, limit: usize) -> Vec<T>
where
    F: Fn(&T) -> u32,
{
    rows.sort_by_key(|r| position(r));
    rows.truncate(limit);
    rows
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamAggregate {
    pub total: f64,
    pub player_count: u32,
    pub average: f64,
}

pub fn team_aggregate(scores: &[f64]) -> Option<TeamAggregate> {
    if scores.is_empty() {
        return None;
    }
    let total: f64 = scores.iter().sum();
    let player_count = scores.len() as u32;
    Some(TeamAggregate {
        total: round2(total),
        player_count,
        average: round2(total / player_count as f64),
    })
}

/// UTC calendar date shown next to each entry, e.g. `2024-03-09`
pub fn finished_on_label(at: Timestamp) -> String {
    DateTime::<Utc>::from_timestamp_micros(at.to_micros_since_unix_epoch())
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
