//! Stall and host-failover timing policy
//!
//! Clients run these on their own countdown to decide which button to show;
//! the server runs them again with its own clock before honouring a skip or
//! promote request.

use std::time::Duration;

use crate::config::GameConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallAction {
    /// Nobody answered yet, or nobody is pending
    Idle,
    Wait { remaining: Duration },
    /// Host may force-skip the pending players
    OfferSkip,
    /// Every pending player is a confirmed dropout; skip without asking
    AutoSkip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverAction {
    Wait { remaining: Duration },
    OfferPromote,
}

/// Decide what to do about players who haven't answered.
///
/// `elapsed` runs from the first answer of the chapter. Pending players who
/// are all confirmed dropouts get the short delay and are skipped
/// automatically; anyone stalling for the first time needs the host to act.
pub fn stall_action<S: AsRef<str>>(
    elapsed: Duration,
    pending: &[S],
    confirmed_dropouts: &[String],
    config: &GameConfig,
) -> StallAction {
    if pending.is_empty() {
        return StallAction::Idle;
    }
    let all_known = only_dropouts_pending(pending, confirmed_dropouts);

    let delay = if all_known {
        Duration::from_secs(config.dropout_stall_secs)
    } else {
        Duration::from_secs(config.first_stall_secs)
    };

    if elapsed < delay {
        return StallAction::Wait { remaining: delay - elapsed };
    }
    if all_known {
        StallAction::AutoSkip
    } else {
        StallAction::OfferSkip
    }
}

/// Someone is pending and every pending player is a confirmed dropout.
/// This is the condition for arming the server-side auto-skip timer.
pub fn only_dropouts_pending<S: AsRef<str>>(pending: &[S], confirmed_dropouts: &[String]) -> bool {
    !pending.is_empty()
        && pending
            .iter()
            .all(|p| confirmed_dropouts.iter().any(|d| d == p.as_ref()))
}

/// `elapsed` runs from the moment the last player answered
pub fn failover_action(elapsed: Duration, config: &GameConfig) -> FailoverAction {
    let delay = Duration::from_secs(config.host_failover_secs);
    if elapsed < delay {
        FailoverAction::Wait { remaining: delay - elapsed }
    } else {
        FailoverAction::OfferPromote
    }
}

/// Whole seconds left, rounded up, for error messages
pub fn remaining_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 { secs + 1 } else { secs }
}
