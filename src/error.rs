//! Error types for the game module
//!
//! Reducers hand these back to the calling client as strings; the typed
//! enums exist so the pure core can be tested against exact failure cases.

use thiserror::Error;

/// Rejections from the session state machine
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("player {0} is not in this lobby")]
    NotMember(String),

    #[error("only the host can {0}")]
    NotHost(&'static str),

    #[error("only the facilitator can {0}")]
    NotFacilitator(&'static str),

    #[error("only the host successor can take over as host")]
    NotSuccessor,

    #[error("game has not started")]
    NotStarted,

    #[error("game already finished")]
    AlreadyFinished,

    #[error("submission is for chapter {submitted} but the lobby is at {current}")]
    StaleChapter { submitted: String, current: String },

    #[error("action is for group question {submitted} but the lobby is at {current}")]
    StaleGroupQuestion { submitted: u32, current: u32 },

    #[error("not every player has answered")]
    NotAllAnswered,

    #[error("lobby is not in the {0} phase")]
    WrongPhase(&'static str),

    #[error("nobody has answered this chapter yet")]
    NoAnswersYet,

    #[error("skip is not available for another {remaining_secs}s")]
    StallNotElapsed { remaining_secs: u64 },

    #[error("pending players include someone not yet confirmed as a dropout")]
    UnconfirmedPending,

    #[error("host takeover is not available for another {remaining_secs}s")]
    FailoverNotElapsed { remaining_secs: u64 },

    #[error("lobby has no players")]
    EmptyLobby,

    #[error("wager {0} is not one of the offered options")]
    WagerNotOffered(u32),

    #[error("wager has not been locked")]
    WagerNotLocked,

    #[error("wager is already locked at {0}")]
    WagerAlreadyLocked(u32),

    #[error("unknown option {0}")]
    UnknownOption(String),

    #[error("group answer already submitted as {0}")]
    AnswerAlreadySubmitted(String),

    #[error("group answer has not been submitted")]
    AnswerNotSubmitted,
}

/// Invalid raw task results, rejected before scoring
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TaskError {
    #[error("{task} task cannot accept a {result} result")]
    KindMismatch {
        task: &'static str,
        result: &'static str,
    },

    #[error("numeric answer must be a finite number")]
    NonNumeric,

    #[error("numeric answer must not be negative (got {0})")]
    NegativeValue(f64),

    #[error("{0} item(s) still in the palette")]
    PaletteNotEmpty(usize),

    #[error("unknown item {0}")]
    UnknownItem(String),

    #[error("unknown zone {0}")]
    UnknownZone(String),

    #[error("ordering must list every item exactly once")]
    NotAPermutation,

    #[error("unknown option {0}")]
    UnknownOption(String),
}

/// Scenario content that failed to parse or validate
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("scenario JSON is malformed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{location}: {reason}")]
    Invalid { location: String, reason: String },
}

impl ContentError {
    pub fn invalid(location: impl Into<String>, reason: impl Into<String>) -> Self {
        ContentError::Invalid {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config JSON is malformed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{field} {reason}")]
    Invalid { field: &'static str, reason: String },
}
