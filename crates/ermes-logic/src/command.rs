//! Player commands understood by the rover.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single rover command, as issued directly or queued in a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    #[serde(rename = "cmd_forward")]
    Forward,
    #[serde(rename = "cmd_turn_left")]
    TurnLeft,
    #[serde(rename = "cmd_turn_right")]
    TurnRight,
}

impl Command {
    pub const ALL: [Command; 3] = [Self::Forward, Self::TurnLeft, Self::TurnRight];

    /// Human-readable label used in status lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Forward => "Forward",
            Self::TurnLeft => "Turn left",
            Self::TurnRight => "Turn right",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
