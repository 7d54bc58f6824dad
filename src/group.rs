//! End-of-arc group wager subgame
//!
//! One facilitator per arc locks a wager, picks an answer, then steps the
//! team through the reveal. The facilitator check lives in the session
//! reducer; these functions only move the per-question scratch state.

use serde::{Deserialize, Serialize};
use spacetimedb::SpacetimeType;

use crate::error::SessionError;
use crate::scoring::{wager_impact, AxisImpact};
use crate::task::ChoiceOption;

/// Player id recorded on the team-wide log entry
pub const TEAM_PLAYER_ID: &str = "__team__";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GroupQuestion {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub story: String,
    /// Shown to the facilitator only
    pub prompt: String,
    pub wager_options: Vec<u32>,
    pub options: Vec<ChoiceOption>,
}

impl GroupQuestion {
    pub fn option(&self, option_id: &str) -> Option<&ChoiceOption> {
        self.options.iter().find(|o| o.id == option_id)
    }
}

/// Scratch state for the question currently being played
#[derive(SpacetimeType, Debug, Clone, PartialEq, Default)]
pub struct GroupRound {
    pub question_index: u32,
    pub wager: Option<u32>,
    pub wager_locked: bool,
    pub answer_submitted: bool,
    pub answer_option_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStep {
    Wager,
    Answer,
    Reveal,
}

impl GroupRound {
    pub fn step(&self) -> GroupStep {
        if self.answer_submitted {
            GroupStep::Reveal
        } else if self.wager_locked {
            GroupStep::Answer
        } else {
            GroupStep::Wager
        }
    }

    /// Earlier question → replay (Ok(false)); later question → error
    fn check_question(&self, question_index: u32) -> Result<bool, SessionError> {
        if question_index < self.question_index {
            return Ok(false);
        }
        if question_index > self.question_index {
            return Err(SessionError::StaleGroupQuestion {
                submitted: question_index,
                current: self.question_index,
            });
        }
        Ok(true)
    }
}

/// What advancing past the reveal does
#[derive(Debug, Clone, PartialEq)]
pub enum GroupAdvance {
    Unchanged,
    NextQuestion(GroupRound),
    /// Last question of the arc is done; the held arc transition can run
    Done,
}

/// Lock the wager. `Ok(None)` means the call was a replay.
pub fn lock_wager(
    round: &GroupRound,
    question_index: u32,
    wager: u32,
    offered: &[u32],
) -> Result<Option<GroupRound>, SessionError> {
    if !round.check_question(question_index)? {
        return Ok(None);
    }
    if round.wager_locked {
        return match round.wager {
            Some(locked) if locked == wager => Ok(None),
            Some(locked) => Err(SessionError::WagerAlreadyLocked(locked)),
            None => Err(SessionError::WagerNotLocked),
        };
    }
    if !offered.contains(&wager) {
        return Err(SessionError::WagerNotOffered(wager));
    }
    Ok(Some(GroupRound { wager: Some(wager), wager_locked: true, ..round.clone() }))
}

/// Record the team's chosen option. `Ok(None)` means the call was a replay.
pub fn submit_answer(
    round: &GroupRound,
    question_index: u32,
    option_id: &str,
    question: &GroupQuestion,
) -> Result<Option<GroupRound>, SessionError> {
    if !round.check_question(question_index)? {
        return Ok(None);
    }
    if round.answer_submitted {
        return match &round.answer_option_id {
            Some(chosen) if chosen == option_id => Ok(None),
            Some(chosen) => Err(SessionError::AnswerAlreadySubmitted(chosen.clone())),
            None => Err(SessionError::AnswerNotSubmitted),
        };
    }
    if !round.wager_locked {
        return Err(SessionError::WagerNotLocked);
    }
    if question.option(option_id).is_none() {
        return Err(SessionError::UnknownOption(option_id.to_string()));
    }
    Ok(Some(GroupRound {
        answer_submitted: true,
        answer_option_id: Some(option_id.to_string()),
        ..round.clone()
    }))
}

pub fn advance(
    round: &GroupRound,
    question_index: u32,
    question_count: u32,
) -> Result<GroupAdvance, SessionError> {
    if !round.check_question(question_index)? {
        return Ok(GroupAdvance::Unchanged);
    }
    if !round.answer_submitted {
        return Err(SessionError::AnswerNotSubmitted);
    }
    let next = round.question_index + 1;
    if next < question_count {
        Ok(GroupAdvance::NextQuestion(GroupRound { question_index: next, ..GroupRound::default() }))
    } else {
        Ok(GroupAdvance::Done)
    }
}

/// Chosen option's base impact multiplied by the wager
pub fn wagered_impact(option: &ChoiceOption, wager: u32) -> AxisImpact {
    wager_impact(&option.axis_impact, wager)
}

/// Deterministic key for the single team entry of one group question
pub fn group_log_key(lobby_id: &str, arc_index: u32, question_index: u32) -> String {
    format!("{}/{}/{}-g{}", lobby_id, TEAM_PLAYER_ID, arc_index, question_index)
}
