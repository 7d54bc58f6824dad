//! End-of-game aggregation over a lobby's log entries

use crate::group::TEAM_PLAYER_ID;
use crate::persona::{
    compute_per_role_scores, compute_persona_profile, identity_match, round2, vocation_recommendation,
    Archetype, PersonaProfile, Vocation,
};
use crate::rotation::Role;
use crate::scoring::AxisImpact;
use crate::lobby_state::LobbyPlayer;

/// The parts of a log entry the aggregation reads
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedImpact {
    pub player_id: String,
    /// `None` on team entries
    pub role: Option<Role>,
    pub impact: AxisImpact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerResult {
    pub player_id: String,
    pub display_name: String,
    pub profile: PersonaProfile,
    pub identity: &'static Archetype,
    pub vocation: Vocation,
    /// Sum of the per-role scores, 2 dp
    pub total_score: f64,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamResult {
    pub profile: PersonaProfile,
    pub identity: &'static Archetype,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GameResults {
    /// Roster order; players who missed a chapter are left out
    pub players: Vec<PlayerResult>,
    pub team: Option<TeamResult>,
}

/// `None` until the player has a log entry for each of `chapters` chapters.
/// A skipped chapter leaves no entry, so confirmed dropouts get no result.
pub fn player_result(player: &LobbyPlayer, logs: &[LoggedImpact], chapters: usize) -> Option<PlayerResult> {
    let own: Vec<&LoggedImpact> = logs.iter().filter(|l| l.player_id == player.id).collect();
    if own.is_empty() || own.len() < chapters {
        return None;
    }

    let profile = compute_persona_profile(own.iter().map(|l| &l.impact));
    let role_scores = compute_per_role_scores(own.iter().filter_map(|l| l.role.map(|r| (r, &l.impact))));
    let total_score = round2(role_scores.values().sum());
    let vocation = vocation_recommendation(&role_scores);

    Some(PlayerResult {
        player_id: player.id.clone(),
        display_name: player.display_name.clone(),
        identity: identity_match(&profile),
        profile,
        vocation,
        total_score,
        entries: own.len(),
    })
}

pub fn team_result(logs: &[LoggedImpact]) -> Option<TeamResult> {
    let team: Vec<&AxisImpact> = logs
        .iter()
        .filter(|l| l.player_id == TEAM_PLAYER_ID)
        .map(|l| &l.impact)
        .collect();
    if team.is_empty() {
        return None;
    }
    let profile = compute_persona_profile(team.iter().copied());
    Some(TeamResult { identity: identity_match(&profile), profile, entries: team.len() })
}

/// `logs` in insertion order, for one lobby
pub fn compute_results(roster: &[LobbyPlayer], logs: &[LoggedImpact], chapters: usize) -> GameResults {
    GameResults {
        players: roster.iter().filter_map(|p| player_result(p, logs, chapters)).collect(),
        team: team_result(logs),
    }
}
