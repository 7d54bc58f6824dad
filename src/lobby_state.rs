//! Shared lobby state and the pure transition function
//!
//! Every mutation of a lobby goes through [`apply`]: the reducer layer loads
//! the stored state, applies one event for one actor, and writes the result
//! back in the same transaction. Host and facilitator actions carry the
//! chapter or question they were issued from, so a retried action against a
//! lobby that has already moved on comes back as [`Effect::Unchanged`].

use std::fmt;
use std::time::Duration;

use spacetimedb::{SpacetimeType, Timestamp};

use crate::config::GameConfig;
use crate::error::SessionError;
use crate::group::{self, GroupAdvance, GroupQuestion, GroupRound};
use crate::policy::{self, FailoverAction, StallAction};
use crate::rotation::{self, ChapterPosition, Role, RoleAssignment};

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct LobbyPlayer {
    pub id: String,
    pub display_name: String,
}

#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Individual,
    Group,
}

/// Arc and chapter a submission or host action refers to
#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterKey {
    pub arc_index: u32,
    pub chapter_index: u32,
}

impl ChapterKey {
    pub fn new(arc_index: u32, chapter_index: u32) -> Self {
        ChapterKey { arc_index, chapter_index }
    }
}

impl fmt::Display for ChapterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.arc_index, self.chapter_index)
    }
}

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct SessionState {
    /// Bumped on every applied change
    pub version: u64,

    /// Join order. `players[0]` is the host, `players[1]` the successor.
    pub players: Vec<LobbyPlayer>,

    pub started: bool,
    pub finished: bool,

    pub arc_index: u32,
    pub chapter_index: u32,
    pub rotation_offset: u32,

    /// Cached at each chapter change so a host promotion mid-chapter
    /// doesn't reshuffle roles
    pub current_roles: Vec<RoleAssignment>,

    /// Players who have answered the current chapter
    pub round_answers: Vec<String>,

    pub phase: Phase,

    /// Present only while `phase == Group`
    pub group: Option<GroupRound>,

    pub team_name: Option<String>,

    /// Players force-skipped at least once; their later stalls auto-skip
    pub confirmed_dropouts: Vec<String>,

    /// First answer of the current chapter (starts the stall timer)
    pub answers_opened_at: Option<Timestamp>,

    /// Last answer of the current chapter (starts the failover timer)
    pub all_answered_at: Option<Timestamp>,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState {
            version: 0,
            players: Vec::new(),
            started: false,
            finished: false,
            arc_index: 0,
            chapter_index: 0,
            rotation_offset: 0,
            current_roles: Vec::new(),
            round_answers: Vec::new(),
            phase: Phase::Individual,
            group: None,
            team_name: None,
            confirmed_dropouts: Vec::new(),
            answers_opened_at: None,
            all_answered_at: None,
        }
    }
}

impl SessionState {
    pub fn chapter_key(&self) -> ChapterKey {
        ChapterKey::new(self.arc_index, self.chapter_index)
    }

    fn position(&self) -> ChapterPosition {
        ChapterPosition {
            arc_index: self.arc_index,
            chapter_index: self.chapter_index,
            rotation_offset: self.rotation_offset,
            finished: self.finished,
        }
    }

    pub fn is_member(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p.id == player_id)
    }

    pub fn host(&self) -> Option<&LobbyPlayer> {
        self.players.first()
    }

    pub fn is_host(&self, player_id: &str) -> bool {
        self.host().is_some_and(|h| h.id == player_id)
    }

    pub fn successor(&self) -> Option<&LobbyPlayer> {
        self.players.get(1)
    }

    pub fn facilitator(&self) -> Option<&LobbyPlayer> {
        rotation::facilitator_index(self.arc_index, self.players.len()).map(|i| &self.players[i])
    }

    pub fn has_answered(&self, player_id: &str) -> bool {
        self.round_answers.iter().any(|a| a == player_id)
    }

    /// Needs at least one player; spectators never count
    pub fn all_answered(&self) -> bool {
        let ids: Vec<&str> = self.players.iter().map(|p| p.id.as_str()).collect();
        !ids.is_empty() && rotation::all_players_answered(&self.round_answers, ids.as_slice())
    }

    pub fn pending_players(&self) -> Vec<String> {
        self.players
            .iter()
            .filter(|p| !self.has_answered(&p.id))
            .map(|p| p.id.clone())
            .collect()
    }

    /// Individual phase with answers in and only confirmed dropouts still
    /// pending: the server should arm its auto-skip timer
    pub fn awaits_only_dropouts(&self) -> bool {
        if !self.started || self.finished || self.phase != Phase::Individual || self.round_answers.is_empty() {
            return false;
        }
        let pending = self.pending_players();
        policy::only_dropouts_pending(pending.as_slice(), &self.confirmed_dropouts)
    }

    /// Cached role for the current chapter, falling back to the rotation formula
    pub fn role_of(&self, player_id: &str) -> Option<Role> {
        if let Some(a) = self.current_roles.iter().find(|a| a.player_id == player_id) {
            return Some(a.role);
        }
        let index = self.players.iter().position(|p| p.id == player_id)?;
        Some(rotation::role_for(index, self.rotation_offset))
    }

    fn move_to(&mut self, next: ChapterPosition) {
        self.arc_index = next.arc_index;
        self.chapter_index = next.chapter_index;
        self.rotation_offset = next.rotation_offset;
        self.round_answers.clear();
        self.current_roles = rotation::role_assignment(&self.players, self.rotation_offset);
        self.phase = Phase::Individual;
        self.group = None;
        self.answers_opened_at = None;
        self.all_answered_at = None;
    }

    fn finish(&mut self) {
        self.finished = true;
        self.round_answers.clear();
        self.phase = Phase::Individual;
        self.group = None;
        self.answers_opened_at = None;
        self.all_answered_at = None;
    }

    fn mark_answered(&mut self, player_id: &str, now: Timestamp) {
        if !self.has_answered(player_id) {
            self.round_answers.push(player_id.to_string());
        }
        if self.answers_opened_at.is_none() {
            self.answers_opened_at = Some(now);
        }
        if self.all_answered() && self.all_answered_at.is_none() {
            self.all_answered_at = Some(now);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Join { display_name: String },
    Start { team_name: Option<String> },
    SubmitAnswer { chapter: ChapterKey },
    AdvanceChapter { from: ChapterKey },
    /// Host forces every pending player to answered
    SkipPending { chapter: ChapterKey },
    /// Scheduler-issued skip; only allowed when every pending player is a known dropout
    AutoSkipDropouts { chapter: ChapterKey },
    PromoteSelf,
    LockWager { question_index: u32, wager: u32 },
    SubmitGroupAnswer { question_index: u32, option_id: String },
    AdvanceGroup { question_index: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Unchanged,
    Joined,
    /// Joined after start; read-only observer
    Spectating,
    Started,
    Answered { all_answered: bool },
    ChapterAdvanced,
    EnteredGroupPhase,
    Finished,
    Skipped(Vec<String>),
    Promoted { previous_host: String },
    WagerLocked(u32),
    GroupAnswered { option_id: String, wager: u32 },
    GroupQuestionAdvanced,
}

impl Effect {
    fn changes_state(&self) -> bool {
        !matches!(self, Effect::Unchanged | Effect::Spectating)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub state: SessionState,
    pub effect: Effect,
}

/// Everything a transition needs besides the state itself
pub struct Env<'a> {
    pub config: &'a GameConfig,
    pub now: Timestamp,
    /// Group questions for the lobby's current arc
    pub group_questions: &'a [GroupQuestion],
}

impl Env<'_> {
    fn since(&self, earlier: Option<Timestamp>) -> Option<Duration> {
        earlier.map(|t| self.now.duration_since(t).unwrap_or(Duration::ZERO))
    }
}

pub fn apply(
    state: &SessionState,
    actor: &str,
    event: SessionEvent,
    env: &Env,
) -> Result<Applied, SessionError> {
    let mut next = state.clone();
    let effect = match event {
        SessionEvent::Join { display_name } => join(&mut next, actor, display_name),
        SessionEvent::Start { team_name } => start(&mut next, actor, team_name)?,
        SessionEvent::SubmitAnswer { chapter } => submit_answer(&mut next, actor, chapter, env)?,
        SessionEvent::AdvanceChapter { from } => advance_chapter(&mut next, actor, from, env)?,
        SessionEvent::SkipPending { chapter } => skip_pending(&mut next, Some(actor), chapter, env)?,
        SessionEvent::AutoSkipDropouts { chapter } => skip_pending(&mut next, None, chapter, env)?,
        SessionEvent::PromoteSelf => promote_self(&mut next, actor, env)?,
        SessionEvent::LockWager { question_index, wager } => {
            lock_wager(&mut next, actor, question_index, wager, env)?
        }
        SessionEvent::SubmitGroupAnswer { question_index, option_id } => {
            submit_group_answer(&mut next, actor, question_index, &option_id, env)?
        }
        SessionEvent::AdvanceGroup { question_index } => {
            advance_group(&mut next, actor, question_index, env)?
        }
    };

    if !effect.changes_state() {
        return Ok(Applied { state: state.clone(), effect });
    }
    next.version = state.version + 1;
    Ok(Applied { state: next, effect })
}

fn require_member(state: &SessionState, actor: &str) -> Result<(), SessionError> {
    if state.is_member(actor) {
        Ok(())
    } else {
        Err(SessionError::NotMember(actor.to_string()))
    }
}

fn require_in_play(state: &SessionState) -> Result<(), SessionError> {
    if !state.started {
        return Err(SessionError::NotStarted);
    }
    if state.finished {
        return Err(SessionError::AlreadyFinished);
    }
    Ok(())
}

fn require_host(state: &SessionState, actor: &str, action: &'static str) -> Result<(), SessionError> {
    require_member(state, actor)?;
    if state.is_host(actor) {
        Ok(())
    } else {
        Err(SessionError::NotHost(action))
    }
}

fn join(state: &mut SessionState, actor: &str, display_name: String) -> Effect {
    if state.is_member(actor) {
        return Effect::Unchanged;
    }
    if state.started {
        return Effect::Spectating;
    }
    state.players.push(LobbyPlayer { id: actor.to_string(), display_name });
    Effect::Joined
}

fn start(state: &mut SessionState, actor: &str, team_name: Option<String>) -> Result<Effect, SessionError> {
    if state.players.is_empty() {
        return Err(SessionError::EmptyLobby);
    }
    require_host(state, actor, "start the game")?;
    if state.started {
        return Ok(Effect::Unchanged);
    }

    state.started = true;
    state.finished = false;
    state.team_name = team_name
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    state.confirmed_dropouts.clear();
    state.move_to(ChapterPosition::start());
    Ok(Effect::Started)
}

fn submit_answer(
    state: &mut SessionState,
    actor: &str,
    chapter: ChapterKey,
    env: &Env,
) -> Result<Effect, SessionError> {
    require_in_play(state)?;
    require_member(state, actor)?;
    if chapter != state.chapter_key() {
        return Err(SessionError::StaleChapter {
            submitted: chapter.to_string(),
            current: state.chapter_key().to_string(),
        });
    }
    if state.has_answered(actor) {
        return Ok(Effect::Unchanged);
    }
    if state.phase != Phase::Individual {
        return Err(SessionError::WrongPhase("individual"));
    }

    state.mark_answered(actor, env.now);
    Ok(Effect::Answered { all_answered: state.all_answered() })
}

fn advance_chapter(
    state: &mut SessionState,
    actor: &str,
    from: ChapterKey,
    env: &Env,
) -> Result<Effect, SessionError> {
    if !state.started {
        return Err(SessionError::NotStarted);
    }
    require_host(state, actor, "advance the chapter")?;
    // a retry of an advance that already landed
    if state.finished || from != state.chapter_key() || state.phase == Phase::Group {
        return Ok(Effect::Unchanged);
    }
    if !state.all_answered() {
        return Err(SessionError::NotAllAnswered);
    }

    let next = rotation::next_chapter_state(state.position(), env.config);
    if next.finished {
        state.finish();
        return Ok(Effect::Finished);
    }

    let leaving_arc = next.arc_index != state.arc_index;
    if leaving_arc
        && rotation::is_group_phase_required(state.players.len(), env.config)
        && !env.group_questions.is_empty()
    {
        state.phase = Phase::Group;
        state.group = Some(GroupRound::default());
        return Ok(Effect::EnteredGroupPhase);
    }

    state.move_to(next);
    Ok(Effect::ChapterAdvanced)
}

/// `actor` is `None` for the scheduler, which may only skip confirmed dropouts
fn skip_pending(
    state: &mut SessionState,
    actor: Option<&str>,
    chapter: ChapterKey,
    env: &Env,
) -> Result<Effect, SessionError> {
    require_in_play(state)?;
    if let Some(actor) = actor {
        require_host(state, actor, "skip pending players")?;
    }
    if chapter != state.chapter_key() || state.phase != Phase::Individual {
        return Ok(Effect::Unchanged);
    }
    let pending = state.pending_players();
    if pending.is_empty() {
        return Ok(Effect::Unchanged);
    }
    let elapsed = env.since(state.answers_opened_at).ok_or(SessionError::NoAnswersYet)?;

    match policy::stall_action(elapsed, pending.as_slice(), &state.confirmed_dropouts, env.config) {
        StallAction::Idle => return Ok(Effect::Unchanged),
        StallAction::Wait { remaining } => {
            return Err(SessionError::StallNotElapsed { remaining_secs: policy::remaining_secs(remaining) });
        }
        StallAction::OfferSkip if actor.is_none() => return Err(SessionError::UnconfirmedPending),
        StallAction::OfferSkip | StallAction::AutoSkip => {}
    }

    for id in &pending {
        state.mark_answered(id, env.now);
        if !state.confirmed_dropouts.contains(id) {
            state.confirmed_dropouts.push(id.clone());
        }
    }
    Ok(Effect::Skipped(pending))
}

fn promote_self(state: &mut SessionState, actor: &str, env: &Env) -> Result<Effect, SessionError> {
    require_in_play(state)?;
    require_member(state, actor)?;
    if state.is_host(actor) {
        return Ok(Effect::Unchanged);
    }
    if state.successor().map(|p| p.id.as_str()) != Some(actor) {
        return Err(SessionError::NotSuccessor);
    }
    if !state.all_answered() {
        return Err(SessionError::NotAllAnswered);
    }
    let elapsed = env.since(state.all_answered_at).unwrap_or(Duration::ZERO);
    if let FailoverAction::Wait { remaining } = policy::failover_action(elapsed, env.config) {
        return Err(SessionError::FailoverNotElapsed { remaining_secs: policy::remaining_secs(remaining) });
    }

    let previous_host = state.players[0].id.clone();
    let index = state.players.iter().position(|p| p.id == actor).ok_or(SessionError::NotSuccessor)?;
    let me = state.players.remove(index);
    state.players.insert(0, me);
    Ok(Effect::Promoted { previous_host })
}

/// Group actions need the group phase and the arc's facilitator
fn group_context<'a>(
    state: &SessionState,
    actor: &str,
    action: &'static str,
    env: &Env<'a>,
) -> Result<(GroupRound, &'a GroupQuestion), SessionError> {
    require_in_play(state)?;
    require_member(state, actor)?;
    let round = match (&state.phase, &state.group) {
        (Phase::Group, Some(round)) => round.clone(),
        _ => return Err(SessionError::WrongPhase("group")),
    };
    if state.facilitator().map(|p| p.id.as_str()) != Some(actor) {
        return Err(SessionError::NotFacilitator(action));
    }
    let question = env
        .group_questions
        .get(round.question_index as usize)
        .ok_or(SessionError::WrongPhase("group"))?;
    Ok((round, question))
}

fn lock_wager(
    state: &mut SessionState,
    actor: &str,
    question_index: u32,
    wager: u32,
    env: &Env,
) -> Result<Effect, SessionError> {
    let (round, question) = group_context(state, actor, "lock the wager", env)?;
    match group::lock_wager(&round, question_index, wager, &question.wager_options)? {
        Some(locked) => {
            state.group = Some(locked);
            Ok(Effect::WagerLocked(wager))
        }
        None => Ok(Effect::Unchanged),
    }
}

fn submit_group_answer(
    state: &mut SessionState,
    actor: &str,
    question_index: u32,
    option_id: &str,
    env: &Env,
) -> Result<Effect, SessionError> {
    let (round, question) = group_context(state, actor, "answer for the team", env)?;
    match group::submit_answer(&round, question_index, option_id, question)? {
        Some(answered) => {
            let wager = answered.wager.ok_or(SessionError::WagerNotLocked)?;
            state.group = Some(answered);
            Ok(Effect::GroupAnswered { option_id: option_id.to_string(), wager })
        }
        None => Ok(Effect::Unchanged),
    }
}

fn advance_group(
    state: &mut SessionState,
    actor: &str,
    question_index: u32,
    env: &Env,
) -> Result<Effect, SessionError> {
    let (round, _) = group_context(state, actor, "advance the group question", env)?;
    match group::advance(&round, question_index, env.group_questions.len() as u32)? {
        GroupAdvance::Unchanged => Ok(Effect::Unchanged),
        GroupAdvance::NextQuestion(next_round) => {
            state.group = Some(next_round);
            Ok(Effect::GroupQuestionAdvanced)
        }
        GroupAdvance::Done => {
            let next = rotation::next_chapter_state(state.position(), env.config);
            if next.finished {
                state.finish();
                Ok(Effect::Finished)
            } else {
                state.move_to(next);
                Ok(Effect::ChapterAdvanced)
            }
        }
    }
}

/// Deterministic key for a player's single log entry in one chapter
pub fn chapter_log_key(lobby_id: &str, player_id: &str, chapter: ChapterKey) -> String {
    format!("{}/{}/{}", lobby_id, player_id, chapter)
}
