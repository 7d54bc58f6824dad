use spacetimedb::{
    reducer, table, view, Identity, ReducerContext, ScheduleAt, Table, Timestamp,
};

pub mod config;
pub mod error;
pub mod group;
pub mod leaderboard;
pub mod lobby_state;
pub mod persona;
pub mod policy;
pub mod results;
pub mod rotation;
pub mod scenario;
pub mod scoring;
pub mod task;

// Admin reducers for content and config
mod content;

use config::GameConfig;
use group::TEAM_PLAYER_ID;
use lobby_state::{Applied, ChapterKey, Effect, Env, SessionEvent, SessionState};
use persona::{AxisScore, RoleScore};
use rotation::Role;
use scenario::{ScenarioBook, REFERENCE_SCENARIOS};
use scoring::AxisValue;
use task::TaskResult;

// ==================== CONSTANTS ====================

/// Single-row tables use this primary key
const SINGLETON_ID: u32 = 0;

/// Actor id the scheduler uses when it applies an event
const SCHEDULER_ACTOR: &str = "scheduler";

const MAX_DISPLAY_NAME_LEN: usize = 32;
const MAX_TEAM_NAME_LEN: usize = 40;

// ==================== TABLES ====================

/// Links an ephemeral connection to a stable player id
/// PRIVATE: written only by the gateway through create_session
#[table(name = session)]
pub struct Session {
    #[primary_key]
    pub connection_id: Identity,

    /// Stable player id, verified by the gateway
    pub player_id: String,

    pub connected_at: Timestamp,
}

/// PRIVATE: clients read their own row through the my_player view
#[table(name = player)]
#[derive(Clone)]
pub struct Player {
    #[primary_key]
    pub id: String,

    pub display_name: String,

    pub last_seen: Timestamp,

    /// Lobby this player last joined
    pub in_lobby_id: Option<String>,
}

// ==================== VIEWS ====================

/// The caller's own player row: SELECT * FROM my_player
#[view(name = my_player, public)]
fn my_player(ctx: &spacetimedb::ViewContext) -> Option<Player> {
    let session = ctx.db.session().connection_id().find(ctx.sender)?;
    ctx.db.player().id().find(&session.player_id)
}

/// Global ranking cut to `leaderboard_limit`: SELECT * FROM global_leaderboard
/// Team scopes read `score_entry` with `position <= leaderboard_limit`.
#[view(name = global_leaderboard, public)]
fn global_leaderboard(ctx: &spacetimedb::ViewContext) -> Vec<ScoreEntry> {
    let limit = ctx
        .db
        .game_config()
        .id()
        .find(&SINGLETON_ID)
        .map(|row| row.config.leaderboard_limit)
        .unwrap_or_else(|| GameConfig::default().leaderboard_limit);
    let global = leaderboard::GLOBAL_SCOPE.to_string();
    let rows: Vec<ScoreEntry> = ctx.db.score_entry().scope().filter(&global).collect();
    leaderboard::top_by_position(rows, |e| e.position, limit as usize)
}

/// Identities allowed to call admin reducers (gateway, module owner)
#[table(name = authorized_worker)]
pub struct AuthorizedWorker {
    #[primary_key]
    pub identity: Identity,
}

/// One shared game session. Clients subscribe to their lobby row.
#[table(name = lobby, public)]
#[derive(Clone)]
pub struct Lobby {
    /// Short join code
    #[primary_key]
    pub id: String,

    pub state: SessionState,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Append-only record of one scored submission
/// One per (player, chapter), or one per (team, group question)
#[table(name = log_entry, public)]
pub struct LogEntry {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    /// `lobby/player/arc-chapter` or `lobby/__team__/arc-gQ`
    #[unique]
    pub entry_key: String,

    #[index(btree)]
    pub lobby_id: String,

    /// `__team__` for group answers
    pub player_id: String,

    /// None for team entries
    pub role: Option<Role>,

    /// Chapter id, or group question id for team entries
    pub scenario_id: String,

    pub arc_index: u32,
    pub chapter_index: u32,
    pub group_question_index: Option<u32>,

    /// Raw submission; team entries store the chosen option as `Choice`
    pub result: TaskResult,

    /// Correctness ratio the impact was scaled by
    pub ratio: f64,

    pub wager: Option<u32>,

    /// Player who answered for the team
    pub facilitator_id: Option<String>,

    pub axis_impact: Vec<AxisValue>,
    pub hint_used: bool,
    pub created_at: Timestamp,
}

/// Single row holding the active config
#[table(name = game_config, public)]
pub struct GameConfigRow {
    #[primary_key]
    pub id: u32,
    pub config: GameConfig,
    pub updated_at: Timestamp,
}

/// Single row holding the validated scenario JSON clients render from
#[table(name = scenario_book, public)]
pub struct ScenarioBookRow {
    #[primary_key]
    pub id: u32,
    pub json: String,
    pub loaded_at: Timestamp,
}

/// Final persona per player (and one `__team__` row) for a finished lobby
#[table(name = persona_result, public)]
pub struct PersonaResult {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub lobby_id: String,

    pub player_id: String,
    pub display_name: String,
    pub axis_scores: Vec<AxisScore>,
    pub identity: String,
    pub identity_description: String,

    /// None on the team row
    pub best_role: Option<Role>,
    pub vocation: Option<String>,
    pub role_scores: Vec<RoleScore>,

    pub total_score: f64,
    pub entry_count: u32,
    pub created_at: Timestamp,
}

/// Leaderboard rows, one per (scope, player)
#[table(name = score_entry, public)]
pub struct ScoreEntry {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    /// `global` or a team name
    #[index(btree)]
    pub scope: String,

    pub player_id: String,
    pub display_name: String,
    pub score: f64,

    /// 1-based, tie-aware
    pub position: u32,

    pub lobby_id: String,
    pub finished_at: Timestamp,

    /// UTC date, e.g. 2024-03-09
    pub finished_on: String,
}

/// Aggregate per team scope
#[table(name = team_score, public)]
pub struct TeamScore {
    #[primary_key]
    pub team_name: String,
    pub total_score: f64,
    pub player_count: u32,
    pub average_score: f64,
    pub updated_at: Timestamp,
}

/// One-shot timer that skips confirmed dropouts after `dropout_stall_secs`
#[table(name = dropout_skip_schedule, scheduled(auto_skip_dropouts))]
pub struct DropoutSkipSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    pub lobby_id: String,
    pub chapter: ChapterKey,

    pub scheduled_at: ScheduleAt,
}

// ==================== HELPERS ====================

fn is_authorized(ctx: &ReducerContext) -> bool {
    ctx.db.authorized_worker().identity().find(&ctx.sender).is_some()
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Player behind the calling connection
fn get_player(ctx: &ReducerContext) -> Result<Player, String> {
    let session = ctx
        .db
        .session()
        .connection_id()
        .find(&ctx.sender)
        .ok_or("No session found".to_string())?;

    ctx.db
        .player()
        .id()
        .find(&session.player_id)
        .ok_or("Player not found - call connect first".to_string())
}

fn load_config(ctx: &ReducerContext) -> GameConfig {
    ctx.db
        .game_config()
        .id()
        .find(&SINGLETON_ID)
        .map(|row| row.config)
        .unwrap_or_default()
}

fn load_book(ctx: &ReducerContext, config: &GameConfig) -> Result<ScenarioBook, String> {
    let row = ctx
        .db
        .scenario_book()
        .id()
        .find(&SINGLETON_ID)
        .ok_or("No scenarios loaded".to_string())?;
    ScenarioBook::from_json(&row.json, config).map_err(|e| {
        log::error!("[CONTENT] stored book failed to load: {}", e);
        e.to_string()
    })
}

fn normalize_lobby_id(lobby_id: &str) -> String {
    lobby_id.trim().to_uppercase()
}

fn find_lobby(ctx: &ReducerContext, lobby_id: &str) -> Result<Lobby, String> {
    let id = normalize_lobby_id(lobby_id);
    ctx.db
        .lobby()
        .id()
        .find(&id)
        .ok_or_else(|| format!("Lobby {} not found", id))
}

/// Run one event through the pure state machine. Nothing is written.
fn transition(
    lobby: &Lobby,
    actor: &str,
    event: SessionEvent,
    config: &GameConfig,
    book: &ScenarioBook,
    now: Timestamp,
) -> Result<Applied, String> {
    let env = Env {
        config,
        now,
        group_questions: book.group_questions(lobby.state.arc_index),
    };
    lobby_state::apply(&lobby.state, actor, event, &env).map_err(|e| {
        log::warn!("[LOBBY] rejected lobby:{} player:{} reason:{}", lobby.id, short(actor), e);
        e.to_string()
    })
}

/// Persist a changed state; unchanged results are not written
fn save_lobby(ctx: &ReducerContext, mut lobby: Lobby, applied: &Applied) -> Lobby {
    if applied.state.version != lobby.state.version {
        lobby.state = applied.state.clone();
        lobby.updated_at = ctx.timestamp;
        ctx.db.lobby().id().update(lobby.clone());
    }
    lobby
}

/// Load, apply, save. For events with no side effects beyond the lobby row.
fn apply_event(ctx: &ReducerContext, lobby_id: &str, actor: &str, event: SessionEvent) -> Result<(Lobby, Effect), String> {
    let config = load_config(ctx);
    let book = load_book(ctx, &config)?;
    let lobby = find_lobby(ctx, lobby_id)?;
    let applied = transition(&lobby, actor, event, &config, &book, ctx.timestamp)?;
    let lobby = save_lobby(ctx, lobby, &applied);
    if applied.effect == Effect::Finished {
        finalize_lobby(ctx, &lobby, &config);
    }
    Ok((lobby, applied.effect))
}

/// Arm the auto-skip timer when everyone still pending is a confirmed dropout
fn schedule_dropout_skip(ctx: &ReducerContext, lobby: &Lobby, config: &GameConfig) {
    let state = &lobby.state;
    if !state.awaits_only_dropouts() {
        return;
    }
    let pending = state.pending_players();

    let chapter = state.chapter_key();
    let already_armed = ctx
        .db
        .dropout_skip_schedule()
        .iter()
        .any(|s| s.lobby_id == lobby.id && s.chapter == chapter);
    if already_armed {
        return;
    }

    let fire_at = ctx.timestamp + std::time::Duration::from_secs(config.dropout_stall_secs);
    ctx.db.dropout_skip_schedule().insert(DropoutSkipSchedule {
        id: 0, // auto_inc
        lobby_id: lobby.id.clone(),
        chapter,
        scheduled_at: ScheduleAt::Time(fire_at.into()),
    });
    log::info!(
        "[DROPOUT] auto-skip armed lobby:{} chapter:{} pending:{} in_secs:{}",
        lobby.id,
        chapter,
        pending.len(),
        config.dropout_stall_secs
    );
}

fn cancel_dropout_skips(ctx: &ReducerContext, lobby_id: &str) {
    let stale: Vec<u64> = ctx
        .db
        .dropout_skip_schedule()
        .iter()
        .filter(|s| s.lobby_id == lobby_id)
        .map(|s| s.id)
        .collect();
    for id in stale {
        ctx.db.dropout_skip_schedule().id().delete(&id);
    }
}

fn log_effect(lobby: &Lobby, actor: &str, effect: &Effect) {
    let state = &lobby.state;
    match effect {
        Effect::Unchanged => {
            log::debug!("[LOBBY] replay ignored lobby:{} player:{}", lobby.id, short(actor));
        }
        Effect::ChapterAdvanced => log::info!(
            "[LOBBY] advanced lobby:{} arc:{} chapter:{} rotation:{} players:{}",
            lobby.id,
            state.arc_index,
            state.chapter_index,
            state.rotation_offset,
            state.players.len()
        ),
        Effect::EnteredGroupPhase => log::info!(
            "[GROUP] started lobby:{} arc:{} facilitator:{}",
            lobby.id,
            state.arc_index,
            state.facilitator().map(|p| short(&p.id)).unwrap_or("-")
        ),
        Effect::Finished => log::info!("[LOBBY] finished lobby:{} players:{}", lobby.id, state.players.len()),
        other => log::info!("[LOBBY] {:?} lobby:{} player:{} v:{}", other, lobby.id, short(actor), state.version),
    }

    if matches!(effect, Effect::Started | Effect::ChapterAdvanced) {
        for assignment in &state.current_roles {
            log::debug!(
                "[LOBBY] role lobby:{} player:{} role:{} as:\"{}\"",
                lobby.id,
                short(&assignment.player_id),
                assignment.role.key(),
                assignment.role.display()
            );
        }
    }
}

// ==================== REDUCERS ====================

/// Create a verified session for a client identity
/// Called by the gateway after it has verified the player's token
#[reducer]
pub fn create_session(ctx: &ReducerContext, client_identity: String, player_id: String) -> Result<(), String> {
    if !is_authorized(ctx) {
        log::warn!("[SESSION] unauthorized create_session by {}", ctx.sender);
        return Err("Unauthorized: only the gateway can create sessions".to_string());
    }

    let identity = Identity::from_hex(&client_identity).map_err(|e| format!("Invalid identity hex: {}", e))?;

    // same player reconnecting, or the same connection re-used
    let stale_sessions: Vec<_> = ctx
        .db
        .session()
        .iter()
        .filter(|s| s.player_id == player_id || s.connection_id == identity)
        .map(|s| s.connection_id)
        .collect();
    for conn_id in stale_sessions {
        ctx.db.session().connection_id().delete(&conn_id);
    }

    ctx.db.session().insert(Session {
        connection_id: identity,
        player_id: player_id.clone(),
        connected_at: ctx.timestamp,
    });

    log::info!("[SESSION] created player:{} ws:{}", short(&player_id), short(&client_identity));
    Ok(())
}

/// Upsert the caller's player row
#[reducer]
pub fn connect(ctx: &ReducerContext, display_name: String) -> Result<(), String> {
    let session = ctx
        .db
        .session()
        .connection_id()
        .find(&ctx.sender)
        .ok_or("Session not found - verify with gateway first".to_string())?;

    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err("Display name must not be empty".to_string());
    }
    let display_name: String = display_name.chars().take(MAX_DISPLAY_NAME_LEN).collect();

    match ctx.db.player().id().find(&session.player_id) {
        Some(mut existing) => {
            existing.display_name = display_name;
            existing.last_seen = ctx.timestamp;
            ctx.db.player().id().update(existing);
        }
        None => {
            ctx.db.player().insert(Player {
                id: session.player_id.clone(),
                display_name,
                last_seen: ctx.timestamp,
                in_lobby_id: None,
            });
            log::info!("[SESSION] new player:{}", short(&session.player_id));
        }
    }
    Ok(())
}

/// Drop the connection mapping. Lobbies are untouched; stalls go through the skip protocol.
#[reducer(client_disconnected)]
pub fn on_disconnect(ctx: &ReducerContext) {
    if let Some(session) = ctx.db.session().connection_id().find(&ctx.sender) {
        let session_secs = ctx
            .timestamp
            .duration_since(session.connected_at)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let in_lobby = ctx
            .db
            .player()
            .id()
            .find(&session.player_id)
            .and_then(|p| p.in_lobby_id);
        log::info!(
            "[DISCONNECT] player:{} session_min:{:.1} lobby:{}",
            short(&session.player_id),
            session_secs as f32 / 60.0,
            in_lobby.as_deref().unwrap_or("-")
        );
        ctx.db.session().connection_id().delete(&ctx.sender);
    }
}

/// Random 4-character join code
fn generate_lobby_code(ctx: &ReducerContext) -> String {
    use spacetimedb::rand::Rng;
    // no I, O, 0, 1
    const CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = ctx.rng();
    (0..4).map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char).collect()
}

fn join_or_create(ctx: &ReducerContext, player: Player, lobby_id: String) -> Result<(), String> {
    let config = load_config(ctx);
    let book = load_book(ctx, &config)?;

    let lobby = match ctx.db.lobby().id().find(&lobby_id) {
        Some(existing) => existing,
        None => {
            log::info!("[LOBBY] created lobby:{} host:{}", lobby_id, short(&player.id));
            ctx.db.lobby().insert(Lobby {
                id: lobby_id.clone(),
                state: SessionState::default(),
                created_at: ctx.timestamp,
                updated_at: ctx.timestamp,
            })
        }
    };

    let event = SessionEvent::Join { display_name: player.display_name.clone() };
    let applied = transition(&lobby, &player.id, event, &config, &book, ctx.timestamp)?;
    let lobby = save_lobby(ctx, lobby, &applied);
    log_effect(&lobby, &player.id, &applied.effect);

    let mut player = player;
    player.in_lobby_id = Some(lobby_id);
    player.last_seen = ctx.timestamp;
    ctx.db.player().id().update(player);
    Ok(())
}

/// Open a fresh lobby with a generated code; the caller becomes host
#[reducer]
pub fn create_lobby(ctx: &ReducerContext) -> Result<(), String> {
    let player = get_player(ctx)?;
    let mut code = generate_lobby_code(ctx);
    while ctx.db.lobby().id().find(&code).is_some() {
        code = generate_lobby_code(ctx);
    }
    join_or_create(ctx, player, code)
}

/// Join by code, creating the lobby if it doesn't exist yet.
/// Joining a started lobby makes the caller a spectator.
#[reducer]
pub fn join_lobby(ctx: &ReducerContext, lobby_id: String) -> Result<(), String> {
    let player = get_player(ctx)?;
    let lobby_id = normalize_lobby_id(&lobby_id);
    if lobby_id.is_empty() {
        return Err("Lobby code must not be empty".to_string());
    }
    join_or_create(ctx, player, lobby_id)
}

/// Host starts the game, optionally naming the team for the leaderboard
#[reducer]
pub fn start_game(ctx: &ReducerContext, lobby_id: String, team_name: Option<String>) -> Result<(), String> {
    let player = get_player(ctx)?;
    let team_name = team_name.map(|t| t.chars().take(MAX_TEAM_NAME_LEN).collect::<String>());
    let (lobby, effect) = apply_event(ctx, &lobby_id, &player.id, SessionEvent::Start { team_name })?;
    if effect == Effect::Started {
        log::info!(
            "[LOBBY] started lobby:{} players:{} team:{}",
            lobby.id,
            lobby.state.players.len(),
            lobby.state.team_name.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Score and log one task submission, then mark the player answered.
/// Both happen in this transaction or not at all.
#[reducer]
pub fn submit_task(
    ctx: &ReducerContext,
    lobby_id: String,
    chapter: ChapterKey,
    result: TaskResult,
    hint_used: bool,
) -> Result<(), String> {
    let player = get_player(ctx)?;
    let config = load_config(ctx);
    let book = load_book(ctx, &config)?;
    let lobby = find_lobby(ctx, &lobby_id)?;

    let applied = transition(
        &lobby,
        &player.id,
        SessionEvent::SubmitAnswer { chapter },
        &config,
        &book,
        ctx.timestamp,
    )?;
    if applied.effect == Effect::Unchanged {
        log::debug!("[TASK] duplicate submission lobby:{} player:{}", lobby.id, short(&player.id));
        return Ok(());
    }

    let role = lobby
        .state
        .role_of(&player.id)
        .ok_or_else(|| format!("No role for player {}", player.id))?;

    match book.task(chapter.arc_index, chapter.chapter_index, role) {
        Some(def) => {
            let evaluation = task::evaluate(def, &result, hint_used, config.hint_multiplier).map_err(|e| {
                log::warn!(
                    "[TASK] rejected lobby:{} player:{} chapter:{} reason:{}",
                    lobby.id,
                    short(&player.id),
                    chapter,
                    e
                );
                e.to_string()
            })?;

            let entry_key = lobby_state::chapter_log_key(&lobby.id, &player.id, chapter);
            if ctx.db.log_entry().entry_key().find(&entry_key).is_some() {
                log::error!("[TASK] log entry {} exists for an unanswered player", entry_key);
            } else {
                let scenario_id = book
                    .chapter(chapter.arc_index, chapter.chapter_index)
                    .map(|c| c.id.clone())
                    .unwrap_or_default();
                ctx.db.log_entry().insert(LogEntry {
                    id: 0, // auto_inc
                    entry_key,
                    lobby_id: lobby.id.clone(),
                    player_id: player.id.clone(),
                    role: Some(role),
                    scenario_id,
                    arc_index: chapter.arc_index,
                    chapter_index: chapter.chapter_index,
                    group_question_index: None,
                    result,
                    ratio: evaluation.ratio,
                    wager: None,
                    facilitator_id: None,
                    axis_impact: scoring::to_axis_values(&evaluation.impact),
                    hint_used,
                    created_at: ctx.timestamp,
                });
            }
            log::info!(
                "[TASK] submitted lobby:{} player:{} chapter:{} role:{} kind:{} ratio:{:.2} hint:{}",
                lobby.id,
                short(&player.id),
                chapter,
                role.key(),
                def.kind.name(),
                evaluation.ratio,
                hint_used
            );
        }
        None => {
            log::warn!(
                "[TASK] no task for role:{} chapter:{} lobby:{}; completing without a log",
                role.key(),
                chapter,
                lobby.id
            );
        }
    }

    let lobby = save_lobby(ctx, lobby, &applied);
    if let Effect::Answered { all_answered } = applied.effect {
        if all_answered {
            log::info!("[LOBBY] all answered lobby:{} chapter:{}", lobby.id, chapter);
        } else {
            schedule_dropout_skip(ctx, &lobby, &config);
        }
    }
    Ok(())
}

/// Host moves the lobby on from `from` once everyone has answered
#[reducer]
pub fn advance_chapter(ctx: &ReducerContext, lobby_id: String, from: ChapterKey) -> Result<(), String> {
    let player = get_player(ctx)?;
    let (lobby, effect) = apply_event(ctx, &lobby_id, &player.id, SessionEvent::AdvanceChapter { from })?;
    if effect != Effect::Unchanged {
        cancel_dropout_skips(ctx, &lobby.id);
    }
    log_effect(&lobby, &player.id, &effect);
    Ok(())
}

/// Host marks every pending player answered once the stall delay has passed
#[reducer]
pub fn skip_pending_players(ctx: &ReducerContext, lobby_id: String, chapter: ChapterKey) -> Result<(), String> {
    let player = get_player(ctx)?;
    let (lobby, effect) = apply_event(ctx, &lobby_id, &player.id, SessionEvent::SkipPending { chapter })?;
    if let Effect::Skipped(skipped) = &effect {
        log::info!(
            "[DROPOUT] host skipped lobby:{} chapter:{} players:{}",
            lobby.id,
            chapter,
            skipped.iter().map(|p| short(p)).collect::<Vec<_>>().join(",")
        );
    }
    Ok(())
}

/// Successor takes over when the host sits on an all-answered chapter
#[reducer]
pub fn promote_to_host(ctx: &ReducerContext, lobby_id: String) -> Result<(), String> {
    let player = get_player(ctx)?;
    let (lobby, effect) = apply_event(ctx, &lobby_id, &player.id, SessionEvent::PromoteSelf)?;
    if let Effect::Promoted { previous_host } = &effect {
        log::info!(
            "[HOST] promoted lobby:{} new:{} previous:{}",
            lobby.id,
            short(&player.id),
            short(previous_host)
        );
    }
    Ok(())
}

/// Facilitator locks the team's wager for the current group question
#[reducer]
pub fn lock_group_wager(ctx: &ReducerContext, lobby_id: String, question_index: u32, wager: u32) -> Result<(), String> {
    let player = get_player(ctx)?;
    let (lobby, effect) = apply_event(
        ctx,
        &lobby_id,
        &player.id,
        SessionEvent::LockWager { question_index, wager },
    )?;
    if effect != Effect::Unchanged {
        log::info!("[GROUP] wager locked lobby:{} question:{} wager:{}", lobby.id, question_index, wager);
    }
    Ok(())
}

/// Facilitator answers for the team; writes the single team log entry
#[reducer]
pub fn submit_group_answer(
    ctx: &ReducerContext,
    lobby_id: String,
    question_index: u32,
    option_id: String,
) -> Result<(), String> {
    let player = get_player(ctx)?;
    let config = load_config(ctx);
    let book = load_book(ctx, &config)?;
    let lobby = find_lobby(ctx, &lobby_id)?;

    let event = SessionEvent::SubmitGroupAnswer { question_index, option_id: option_id.clone() };
    let applied = transition(&lobby, &player.id, event, &config, &book, ctx.timestamp)?;
    let wager = match applied.effect {
        Effect::GroupAnswered { wager, .. } => wager,
        _ => return Ok(()),
    };

    let arc_index = lobby.state.arc_index;
    let question = book
        .group_questions(arc_index)
        .get(question_index as usize)
        .ok_or_else(|| format!("No group question {} in arc {}", question_index, arc_index))?;
    let option = question
        .option(&option_id)
        .ok_or_else(|| format!("Unknown option {}", option_id))?;
    let impact = group::wagered_impact(option, wager);

    let entry_key = group::group_log_key(&lobby.id, arc_index, question_index);
    if ctx.db.log_entry().entry_key().find(&entry_key).is_some() {
        log::error!("[GROUP] team entry {} already exists", entry_key);
    } else {
        ctx.db.log_entry().insert(LogEntry {
            id: 0, // auto_inc
            entry_key,
            lobby_id: lobby.id.clone(),
            player_id: TEAM_PLAYER_ID.to_string(),
            role: None,
            scenario_id: question.id.clone(),
            arc_index,
            chapter_index: lobby.state.chapter_index,
            group_question_index: Some(question_index),
            result: TaskResult::Choice(option_id.clone()),
            ratio: 1.0,
            wager: Some(wager),
            facilitator_id: Some(player.id.clone()),
            axis_impact: scoring::to_axis_values(&impact),
            hint_used: false,
            created_at: ctx.timestamp,
        });
    }

    let lobby = save_lobby(ctx, lobby, &applied);
    log::info!(
        "[GROUP] answered lobby:{} arc:{} question:{} option:{} wager:{}",
        lobby.id,
        arc_index,
        question_index,
        option_id,
        wager
    );
    Ok(())
}

/// Facilitator moves past the reveal; after the last question the arc transition runs
#[reducer]
pub fn advance_group_question(ctx: &ReducerContext, lobby_id: String, question_index: u32) -> Result<(), String> {
    let player = get_player(ctx)?;
    let (lobby, effect) = apply_event(ctx, &lobby_id, &player.id, SessionEvent::AdvanceGroup { question_index })?;
    log_effect(&lobby, &player.id, &effect);
    Ok(())
}

/// Skip confirmed dropouts once their stall delay has run out (scheduled)
#[reducer]
pub fn auto_skip_dropouts(ctx: &ReducerContext, schedule: DropoutSkipSchedule) {
    // Only allow scheduler to call this, not clients
    if ctx.sender != ctx.identity() {
        log::warn!("Client {} attempted to call auto_skip_dropouts", ctx.sender);
        return;
    }

    let event = SessionEvent::AutoSkipDropouts { chapter: schedule.chapter };
    match apply_event(ctx, &schedule.lobby_id, SCHEDULER_ACTOR, event) {
        Ok((lobby, Effect::Skipped(skipped))) => {
            log::info!(
                "[DROPOUT] auto-skipped lobby:{} chapter:{} players:{}",
                lobby.id,
                schedule.chapter,
                skipped.len()
            );
        }
        Ok(_) => {
            log::debug!("[DROPOUT] nothing to skip lobby:{} chapter:{}", schedule.lobby_id, schedule.chapter);
        }
        // a player answered in the meantime, or someone unconfirmed is pending
        Err(e) => {
            log::debug!("[DROPOUT] auto-skip declined lobby:{} reason:{}", schedule.lobby_id, e);
        }
    }
}

// ==================== RESULTS & LEADERBOARD ====================

/// Compute persona results and leaderboard rows for a lobby that just finished
fn finalize_lobby(ctx: &ReducerContext, lobby: &Lobby, config: &GameConfig) {
    cancel_dropout_skips(ctx, &lobby.id);

    let mut rows: Vec<LogEntry> = ctx.db.log_entry().lobby_id().filter(&lobby.id).collect();
    rows.sort_by_key(|r| r.id);
    let logs: Vec<results::LoggedImpact> = rows
        .iter()
        .map(|r| results::LoggedImpact {
            player_id: r.player_id.clone(),
            role: r.role,
            impact: scoring::from_axis_values(&r.axis_impact),
        })
        .collect();

    let game = results::compute_results(&lobby.state.players, &logs, config.total_chapters() as usize);

    // recomputation replaces earlier rows for this lobby
    let stale: Vec<u64> = ctx.db.persona_result().lobby_id().filter(&lobby.id).map(|r| r.id).collect();
    for id in stale {
        ctx.db.persona_result().id().delete(&id);
    }

    for result in &game.players {
        ctx.db.persona_result().insert(PersonaResult {
            id: 0, // auto_inc
            lobby_id: lobby.id.clone(),
            player_id: result.player_id.clone(),
            display_name: result.display_name.clone(),
            axis_scores: result.profile.to_axis_scores(),
            identity: result.identity.name.to_string(),
            identity_description: result.identity.description.to_string(),
            best_role: Some(result.vocation.best_role),
            vocation: Some(result.vocation.label().to_string()),
            role_scores: result.vocation.breakdown.clone(),
            total_score: result.total_score,
            entry_count: result.entries as u32,
            created_at: ctx.timestamp,
        });
    }

    if let Some(team) = &game.team {
        ctx.db.persona_result().insert(PersonaResult {
            id: 0, // auto_inc
            lobby_id: lobby.id.clone(),
            player_id: TEAM_PLAYER_ID.to_string(),
            display_name: lobby.state.team_name.clone().unwrap_or_else(|| "Team".to_string()),
            axis_scores: team.profile.to_axis_scores(),
            identity: team.identity.name.to_string(),
            identity_description: team.identity.description.to_string(),
            best_role: None,
            vocation: None,
            role_scores: Vec::new(),
            total_score: 0.0,
            entry_count: team.entries as u32,
            created_at: ctx.timestamp,
        });
    }

    let missing = lobby.state.players.len() - game.players.len();
    log::info!(
        "[RESULTS] computed lobby:{} players:{} incomplete:{} team:{}",
        lobby.id,
        game.players.len(),
        missing,
        game.team.is_some()
    );

    let finished_on = leaderboard::finished_on_label(ctx.timestamp);
    let team_scope = lobby.state.team_name.as_deref();
    for scope in leaderboard::scopes_for(team_scope) {
        for result in &game.players {
            upsert_score(ctx, &scope, lobby, result, &finished_on);
        }
        refresh_leaderboard(ctx, &scope, config);
    }
}

/// One row per (scope, player); a newer game replaces the older score
fn upsert_score(
    ctx: &ReducerContext,
    scope: &String,
    lobby: &Lobby,
    result: &results::PlayerResult,
    finished_on: &str,
) {
    let existing = ctx
        .db
        .score_entry()
        .scope()
        .filter(scope)
        .find(|e| e.player_id == result.player_id);

    let entry = ScoreEntry {
        id: 0,
        scope: scope.clone(),
        player_id: result.player_id.clone(),
        display_name: result.display_name.clone(),
        score: result.total_score,
        position: 0,
        lobby_id: lobby.id.clone(),
        finished_at: ctx.timestamp,
        finished_on: finished_on.to_string(),
    };

    match existing {
        Some(old) => {
            ctx.db.score_entry().id().update(ScoreEntry { id: old.id, ..entry });
        }
        None => {
            ctx.db.score_entry().insert(entry);
        }
    }
}

/// Rewrite positions for every row in one scope and refresh the team aggregate.
/// Rows are never dropped; the display limit applies on read.
fn refresh_leaderboard(ctx: &ReducerContext, scope: &String, config: &GameConfig) {
    let entries: Vec<ScoreEntry> = ctx.db.score_entry().scope().filter(scope).collect();

    if scope != leaderboard::GLOBAL_SCOPE {
        let scores: Vec<f64> = entries.iter().map(|e| e.score).collect();
        if let Some(agg) = leaderboard::team_aggregate(&scores) {
            let row = TeamScore {
                team_name: scope.clone(),
                total_score: agg.total,
                player_count: agg.player_count,
                average_score: agg.average,
                updated_at: ctx.timestamp,
            };
            if ctx.db.team_score().team_name().find(scope).is_some() {
                ctx.db.team_score().team_name().update(row);
            } else {
                ctx.db.team_score().insert(row);
            }
        }
    }

    let lines = entries
        .iter()
        .map(|e| leaderboard::ScoreLine { player_id: e.player_id.clone(), score: e.score })
        .collect();
    let ranked = leaderboard::rank_entries(lines);

    for entry in entries {
        if let Some(r) = ranked.iter().find(|r| r.player_id == entry.player_id) {
            if r.position != entry.position {
                ctx.db.score_entry().id().update(ScoreEntry { position: r.position, ..entry });
            }
        }
    }

    let shown = ranked.len().min(config.leaderboard_limit as usize);
    log::info!("[LEADERBOARD] refreshed scope:{} entries:{} shown:{}", scope, ranked.len(), shown);
}

// ==================== INIT ====================

/// Seed the owner as an authorized worker, the default config and the bundled scenarios
#[reducer(init)]
pub fn init(ctx: &ReducerContext) {
    // In init, ctx.sender is the module owner identity
    if ctx.db.authorized_worker().identity().find(&ctx.sender).is_none() {
        ctx.db.authorized_worker().insert(AuthorizedWorker { identity: ctx.sender });
    }

    if ctx.db.game_config().id().find(&SINGLETON_ID).is_none() {
        ctx.db.game_config().insert(GameConfigRow {
            id: SINGLETON_ID,
            config: GameConfig::default(),
            updated_at: ctx.timestamp,
        });
    }

    if ctx.db.scenario_book().id().find(&SINGLETON_ID).is_none() {
        match ScenarioBook::reference(&load_config(ctx)) {
            Ok(book) => {
                ctx.db.scenario_book().insert(ScenarioBookRow {
                    id: SINGLETON_ID,
                    json: REFERENCE_SCENARIOS.to_string(),
                    loaded_at: ctx.timestamp,
                });
                log::info!("[CONTENT] seeded reference scenarios arcs:{}", book.arcs.len());
            }
            Err(e) => log::error!("[CONTENT] bundled scenarios are invalid: {}", e),
        }
    }

    log::info!("Chapter Crew module initialized");
}
