//! Mission logic for the Ermes rover training campaign.
//!
//! A player pilots a rover on a rectangular grid, picks up data fragments,
//! and brings them back to the base. Levels are data: each one picks a
//! gameplay mode (direct piloting, one program per fragment, or a single
//! program for the whole mission). Everything here is independent of any
//! renderer; a front end plugs in through the [`presenter`] traits.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`analysis`] | Post-mission fragment analysis text and its fallbacks |
//! | [`command`] | The three rover commands and their labels |
//! | [`config`] | Session tunables (start level, pacing, seed) and validation |
//! | [`error`] | Level loading errors and command rejections |
//! | [`fragment`] | Fragment placement (fixed/random) and collision pickup |
//! | [`grid`] | Grid coordinates, bounds, and the four headings |
//! | [`level`] | Level descriptors, validation, and level providers |
//! | [`mission`] | Mission state machine, sequence execution, checkpoints |
//! | [`presenter`] | Presenter and dialog boundaries, headless and recording front ends |
//! | [`rover`] | Rover movement, blocked moves at the border, and trail |

pub mod analysis;
pub mod command;
pub mod config;
pub mod error;
pub mod fragment;
pub mod grid;
pub mod level;
pub mod mission;
pub mod presenter;
pub mod rover;

pub use command::Command;
pub use config::SessionConfig;
pub use error::{LevelError, Rejection};
pub use level::{BuiltinLevels, DirectoryLevels, GameplayMode, LevelDescriptor, LevelSource, MemoryLevels};
pub use mission::{GameState, MissionPhase, MissionSession};
