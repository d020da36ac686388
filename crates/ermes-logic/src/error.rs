//! Error types for level loading and rejected player actions.

use std::path::PathBuf;
use thiserror::Error;

use crate::level::LevelIssue;
use crate::presenter::DialogAction;

/// Content errors: a level descriptor could not be produced.
#[derive(Debug, Error)]
pub enum LevelError {
    /// No descriptor exists for this level id.
    #[error("level {level} not found")]
    NotFound { level: u32 },

    /// The descriptor parsed but failed validation.
    #[error("level {level} is malformed: {}", format_issues(.issues))]
    Malformed { level: u32, issues: Vec<LevelIssue> },

    #[error("level {level} could not be parsed: {source}")]
    Parse {
        level: u32,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LevelError {
    /// True when the level simply does not exist (end of campaign), as
    /// opposed to existing but being broken.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

fn format_issues(issues: &[LevelIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A player action that was refused. Rejections never change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no level is loaded")]
    NoLevelLoaded,
    #[error("the mission is not active")]
    MissionInactive,
    #[error("the introduction is still running")]
    IntroActive,
    #[error("a sequence is already running")]
    AlreadySimulating,
    #[error("direct piloting has not been started")]
    NotPiloting,
    #[error("no command has been programmed")]
    EmptyProgram,
    #[error("analysis conditions are not met")]
    AnalysisNotReady,
    #[error("the campaign is complete")]
    CampaignComplete,
    #[error("this level is not played in segments")]
    NotSegmented,
    #[error("the open dialog does not offer {0:?}")]
    NotOffered(DialogAction),
}
