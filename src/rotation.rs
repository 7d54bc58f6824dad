//! Role rotation and chapter/arc progression arithmetic

use serde::{Deserialize, Serialize};
use spacetimedb::SpacetimeType;

use crate::config::GameConfig;
use crate::lobby_state::LobbyPlayer;

/// Professional role a player takes for one chapter
#[derive(
    SpacetimeType, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    SoftwareEngineer,
    DataScientist,
    CloudEngineer,
}

/// Rotation order. `ROLES[(player_index + rotation_offset) % ROLES.len()]`
pub const ROLES: [Role; 3] = [Role::SoftwareEngineer, Role::DataScientist, Role::CloudEngineer];

/// Vocation recommended when a player has no scored logs
pub const FALLBACK_ROLE: Role = Role::SoftwareEngineer;

impl Role {
    /// Stable key used in scenario content and log rows
    pub fn key(self) -> &'static str {
        match self {
            Role::SoftwareEngineer => "software-engineer",
            Role::DataScientist => "data-scientist",
            Role::CloudEngineer => "cloud-engineer",
        }
    }

    pub fn from_key(key: &str) -> Option<Role> {
        ROLES.into_iter().find(|r| r.key() == key)
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::SoftwareEngineer => "Software Engineer",
            Role::DataScientist => "Data Engineer",
            Role::CloudEngineer => "Cloud Engineer",
        }
    }

    pub fn subtitle(self) -> &'static str {
        match self {
            Role::SoftwareEngineer => "System Crafter",
            Role::DataScientist => "Insight Architect",
            Role::CloudEngineer => "Infrastructure Guardian",
        }
    }

    /// `Data Engineer (Insight Architect)`
    pub fn display(self) -> String {
        format!("{} ({})", self.label(), self.subtitle())
    }

    /// Career-track name shown on the results screen
    pub fn vocation_label(self) -> &'static str {
        match self {
            Role::SoftwareEngineer => "Software Engineer",
            Role::DataScientist => "Data Science & AI",
            Role::CloudEngineer => "Cloud Engineer",
        }
    }
}

/// Cached player → role map for the current chapter
#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct RoleAssignment {
    pub player_id: String,
    pub role: Role,
}

pub fn role_for(player_index: usize, rotation_offset: u32) -> Role {
    ROLES[(player_index + rotation_offset as usize) % ROLES.len()]
}

pub fn role_assignment(players: &[LobbyPlayer], rotation_offset: u32) -> Vec<RoleAssignment> {
    players
        .iter()
        .enumerate()
        .map(|(i, p)| RoleAssignment { player_id: p.id.clone(), role: role_for(i, rotation_offset) })
        .collect()
}

/// True when every listed player has an answer. Vacuously true for no players;
/// answers from ids outside the list are ignored.
pub fn all_players_answered<S: AsRef<str>>(round_answers: &[String], player_ids: &[S]) -> bool {
    player_ids
        .iter()
        .all(|id| round_answers.iter().any(|a| a == id.as_ref()))
}

/// Position on the arc × chapter grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterPosition {
    pub arc_index: u32,
    pub chapter_index: u32,
    pub rotation_offset: u32,
    pub finished: bool,
}

impl ChapterPosition {
    pub fn start() -> Self {
        ChapterPosition { arc_index: 0, chapter_index: 0, rotation_offset: 0, finished: false }
    }
}

/// Step one chapter forward. Crossing an arc boundary bumps the rotation;
/// stepping off the final chapter marks the game finished and freezes indices.
pub fn next_chapter_state(pos: ChapterPosition, config: &GameConfig) -> ChapterPosition {
    if pos.finished {
        return pos;
    }
    if pos.chapter_index < config.last_chapter_index() {
        return ChapterPosition { chapter_index: pos.chapter_index + 1, ..pos };
    }
    if pos.arc_index < config.last_arc_index() {
        return ChapterPosition {
            arc_index: pos.arc_index + 1,
            chapter_index: 0,
            rotation_offset: pos.rotation_offset + 1,
            finished: false,
        };
    }
    ChapterPosition { finished: true, ..pos }
}

/// Roster index of the group facilitator for an arc
pub fn facilitator_index(arc_index: u32, player_count: usize) -> Option<usize> {
    if player_count == 0 {
        return None;
    }
    Some(arc_index as usize % player_count)
}

pub fn is_group_phase_required(player_count: usize, config: &GameConfig) -> bool {
    player_count >= config.min_group_players as usize
}

/// Share of chapters already completed, 0..=100
pub fn progress_percent(pos: ChapterPosition, config: &GameConfig) -> u32 {
    let total = config.total_chapters();
    if pos.finished || total == 0 {
        return 100;
    }
    let done = pos.arc_index * config.chapters_per_arc + pos.chapter_index;
    (done * 100 / total).min(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(n: usize) -> Vec<LobbyPlayer> {
        (0..n)
            .map(|i| LobbyPlayer { id: format!("p{}", i), display_name: format!("Player {}", i) })
            .collect()
    }

    #[test]
    fn test_role_keys_round_trip() {
        for role in ROLES {
            assert_eq!(Role::from_key(role.key()), Some(role));
        }
        assert_eq!(Role::from_key("astronaut"), None);
    }

    #[test]
    fn test_rotation_is_cyclic_shift() {
        assert_eq!(role_for(0, 0), Role::SoftwareEngineer);
        assert_eq!(role_for(1, 0), Role::DataScientist);
        assert_eq!(role_for(2, 0), Role::CloudEngineer);

        assert_eq!(role_for(0, 1), Role::DataScientist);
        assert_eq!(role_for(1, 1), Role::CloudEngineer);
        assert_eq!(role_for(2, 1), Role::SoftwareEngineer);

        // more players than roles wrap around
        assert_eq!(role_for(3, 0), Role::SoftwareEngineer);
        assert_eq!(role_for(4, 2), Role::SoftwareEngineer);
        assert_eq!(role_for(5, 2), Role::DataScientist);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::SoftwareEngineer.display(), "Software Engineer (System Crafter)");
        assert_eq!(Role::DataScientist.display(), "Data Engineer (Insight Architect)");
        assert_eq!(Role::CloudEngineer.display(), "Cloud Engineer (Infrastructure Guardian)");
        assert_eq!(Role::from_key("data-scientist"), Some(Role::DataScientist));
    }

    #[test]
    fn test_role_assignment_follows_roster_order() {
        let assignment = role_assignment(&roster(2), 2);
        assert_eq!(assignment[0], RoleAssignment { player_id: "p0".into(), role: Role::CloudEngineer });
        assert_eq!(assignment[1], RoleAssignment { player_id: "p1".into(), role: Role::SoftwareEngineer });
    }

    #[test]
    fn test_all_players_answered() {
        let none: Vec<String> = vec![];
        assert!(all_players_answered(&none, &none));

        let answers = vec!["p0".to_string(), "ghost".to_string()];
        assert!(all_players_answered(&answers, &["p0"]));
        assert!(!all_players_answered(&answers, &["p0", "p1"]));
    }

    #[test]
    fn test_full_game_takes_total_minus_one_advances() {
        let config = GameConfig::default();
        let mut pos = ChapterPosition::start();
        let mut advances = 0;
        let mut arc_crossings = 0;
        loop {
            let next = next_chapter_state(pos, &config);
            if next.finished {
                assert_eq!((next.arc_index, next.chapter_index), (pos.arc_index, pos.chapter_index));
                break;
            }
            if next.rotation_offset != pos.rotation_offset {
                assert_eq!(next.rotation_offset, pos.rotation_offset + 1);
                arc_crossings += 1;
            }
            pos = next;
            advances += 1;
        }
        assert_eq!(advances, config.total_chapters() - 1);
        assert_eq!(arc_crossings, config.num_arcs - 1);
    }

    #[test]
    fn test_reaches_final_chapter_after_total_minus_one_advances() {
        let config = GameConfig::default();
        let mut pos = ChapterPosition::start();
        for _ in 0..config.total_chapters() - 1 {
            pos = next_chapter_state(pos, &config);
            assert!(!pos.finished);
        }
        assert_eq!((pos.arc_index, pos.chapter_index, pos.rotation_offset), (2, 3, 2));
        let done = next_chapter_state(pos, &config);
        assert!(done.finished);
        assert_eq!(next_chapter_state(done, &config), done);
    }

    #[test]
    fn test_custom_grid() {
        let config = GameConfig { num_arcs: 1, chapters_per_arc: 1, ..GameConfig::default() };
        let done = next_chapter_state(ChapterPosition::start(), &config);
        assert!(done.finished);
        assert_eq!(done.rotation_offset, 0);
    }

    #[test]
    fn test_facilitator_rotates_by_arc() {
        assert_eq!(facilitator_index(0, 3), Some(0));
        assert_eq!(facilitator_index(1, 3), Some(1));
        assert_eq!(facilitator_index(2, 2), Some(0));
        assert_eq!(facilitator_index(1, 0), None);
    }

    #[test]
    fn test_group_phase_needs_two_players() {
        let config = GameConfig::default();
        assert!(!is_group_phase_required(1, &config));
        assert!(is_group_phase_required(2, &config));
    }

    #[test]
    fn test_progress_percent() {
        let config = GameConfig::default();
        assert_eq!(progress_percent(ChapterPosition::start(), &config), 0);
        let mid = ChapterPosition { arc_index: 1, chapter_index: 2, rotation_offset: 1, finished: false };
        assert_eq!(progress_percent(mid, &config), 50);
    }
}
