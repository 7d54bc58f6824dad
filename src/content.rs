// Admin reducers for replacing game content and tuning
// Both accept a JSON document, validate it fully, and only then swap the stored row

use spacetimedb::{reducer, ReducerContext, Table};

use crate::config::GameConfig;
use crate::scenario::ScenarioBook;
use crate::{game_config, scenario_book, GameConfigRow, ScenarioBookRow, SINGLETON_ID};
use crate::{is_authorized, load_config};

/// Replace the scenario book. Lobbies pick it up on their next action.
/// Protected by authorization check - only authorized workers can call this
#[reducer]
pub fn load_scenarios(ctx: &ReducerContext, json_data: String) -> Result<(), String> {
    if !is_authorized(ctx) {
        log::warn!("Unauthorized load_scenarios attempt by {}", ctx.sender);
        return Err("Unauthorized".to_string());
    }

    let config = load_config(ctx);
    let book = ScenarioBook::from_json(&json_data, &config).map_err(|e| {
        log::warn!("[CONTENT] rejected scenarios: {}", e);
        e.to_string()
    })?;

    let row = ScenarioBookRow { id: SINGLETON_ID, json: json_data, loaded_at: ctx.timestamp };
    if ctx.db.scenario_book().id().find(&SINGLETON_ID).is_some() {
        ctx.db.scenario_book().id().update(row);
    } else {
        ctx.db.scenario_book().insert(row);
    }

    let questions: usize = book.arcs.iter().map(|a| a.group_questions.len()).sum();
    log::info!(
        "[CONTENT] loaded scenarios arcs:{} chapters:{} group_questions:{}",
        book.arcs.len(),
        config.total_chapters(),
        questions
    );
    Ok(())
}

/// Replace the game config. The stored scenario book must still fit the new grid.
/// Protected by authorization check - only authorized workers can call this
#[reducer]
pub fn set_game_config(ctx: &ReducerContext, json_data: String) -> Result<(), String> {
    if !is_authorized(ctx) {
        log::warn!("Unauthorized set_game_config attempt by {}", ctx.sender);
        return Err("Unauthorized".to_string());
    }

    let config = GameConfig::from_json(&json_data).map_err(|e| {
        log::warn!("[CONFIG] rejected config: {}", e);
        e.to_string()
    })?;

    if let Some(stored) = ctx.db.scenario_book().id().find(&SINGLETON_ID) {
        ScenarioBook::from_json(&stored.json, &config).map_err(|e| {
            log::warn!("[CONFIG] rejected config, stored scenarios no longer fit: {}", e);
            format!("Stored scenarios do not fit this config: {}", e)
        })?;
    }

    log::info!(
        "[CONFIG] updated arcs:{} chapters_per_arc:{} first_stall:{}s dropout_stall:{}s failover:{}s hint:{}",
        config.num_arcs,
        config.chapters_per_arc,
        config.first_stall_secs,
        config.dropout_stall_secs,
        config.host_failover_secs,
        config.hint_multiplier
    );

    let row = GameConfigRow { id: SINGLETON_ID, config, updated_at: ctx.timestamp };
    if ctx.db.game_config().id().find(&SINGLETON_ID).is_some() {
        ctx.db.game_config().id().update(row);
    } else {
        ctx.db.game_config().insert(row);
    }
    Ok(())
}
