//! Level descriptors: the static, read-only configuration of a mission.
//!
//! Descriptors are JSON documents (camelCase keys) supplied by a
//! [`LevelSource`]. Every descriptor is validated before the mission state
//! machine sees it; validation collects all problems at once rather than
//! stopping at the first.
//!
//! ```
//! use ermes_logic::level::{BuiltinLevels, GameplayMode, LevelSource};
//!
//! let level = BuiltinLevels.fetch(1).unwrap();
//! assert_eq!(level.gameplay_mode, GameplayMode::DirectControl);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::LevelError;
use crate::fragment::FragmentConfig;
use crate::grid::{GridPos, GridSize};
use crate::rover::RoverConfig;

// ============================================================================
// DESCRIPTOR
// ============================================================================

/// How the player drives the rover on this level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameplayMode {
    /// Each command is applied immediately.
    DirectControl,
    /// One programmed sequence per segment target, with checkpoints.
    SequencePerFragment,
    /// One programmed sequence for the whole mission.
    FullSequence,
}

impl fmt::Display for GameplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DirectControl => "directControl",
            Self::SequencePerFragment => "sequencePerFragment",
            Self::FullSequence => "fullSequence",
        })
    }
}

/// One leg objective of a `sequencePerFragment` level.
///
/// Written as `"lab"` or `"fragment_<index>"` where the index refers to
/// placement order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SegmentTarget {
    Lab,
    Fragment(usize),
}

impl TryFrom<String> for SegmentTarget {
    type Error = String;

    fn try_from(token: String) -> Result<Self, Self::Error> {
        if token == "lab" {
            return Ok(Self::Lab);
        }
        token
            .strip_prefix("fragment_")
            .and_then(|n| n.parse().ok())
            .map(Self::Fragment)
            .ok_or_else(|| format!("unknown segment target {token:?}"))
    }
}

impl From<SegmentTarget> for String {
    fn from(target: SegmentTarget) -> Self {
        match target {
            SegmentTarget::Lab => "lab".to_string(),
            SegmentTarget::Fragment(i) => format!("fragment_{i}"),
        }
    }
}

/// Who is speaking in a dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Elya,
    Isaac,
    Console,
    #[serde(other)]
    Default,
}

impl Speaker {
    pub fn title(self) -> &'static str {
        match self {
            Self::Elya => "Message from Elya",
            Self::Isaac => "Isaac's log",
            Self::Console => "Ermes console",
            Self::Default => "Message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogLine {
    pub speaker: Speaker,
    pub message: String,
}

/// Player-facing completion texts. Placeholders: `{missing}`,
/// `{fragmentNumber}`, `{nextTarget}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompletionMessages {
    pub success: String,
    pub lab_missing_fragments: String,
    pub objective_not_met: String,
    pub checkpoint_reached: String,
}

impl Default for CompletionMessages {
    fn default() -> Self {
        Self {
            success: "Mission accomplished!".to_string(),
            lab_missing_fragments: "Back at the lab, but {missing} fragment(s) are still missing."
                .to_string(),
            objective_not_met: "Objective not met. Check your sequence.".to_string(),
            checkpoint_reached:
                "Fragment {fragmentNumber} collected! Checkpoint. Program the sequence towards {nextTarget}."
                    .to_string(),
        }
    }
}

impl CompletionMessages {
    pub fn missing_fragments(&self, missing: usize) -> String {
        fill_template(&self.lab_missing_fragments, &[("missing", &missing.to_string())])
    }

    pub fn checkpoint(&self, fragment_number: u32, next_target: &str) -> String {
        fill_template(
            &self.checkpoint_reached,
            &[
                ("fragmentNumber", &fragment_number.to_string()),
                ("nextTarget", next_target),
            ],
        )
    }
}

/// Replace every `{key}` in `template` with its value.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

/// Static configuration of one level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelDescriptor {
    pub level_id: u32,
    pub grid_width: i32,
    pub grid_height: i32,
    pub total_fragments_required: usize,
    pub lab_position: GridPos,
    pub initial_rover_config: RoverConfig,
    pub fragment_config: FragmentConfig,
    pub gameplay_mode: GameplayMode,
    #[serde(default)]
    pub mission_title: Option<String>,
    #[serde(default)]
    pub mission_objective: Option<String>,
    /// Text shown by the fallback analysis.
    #[serde(default)]
    pub analysis_text: Option<String>,
    #[serde(default)]
    pub intro_dialogs: Vec<DialogLine>,
    #[serde(default)]
    pub completion_messages: CompletionMessages,
    /// Only meaningful for `sequencePerFragment`.
    #[serde(default)]
    pub segment_targets: Vec<SegmentTarget>,
}

impl LevelDescriptor {
    pub fn grid(&self) -> GridSize {
        GridSize::new(self.grid_width, self.grid_height)
    }

    /// Cells random placement must never use: rover start and the base.
    pub fn reserved_cells(&self) -> [GridPos; 2] {
        [self.initial_rover_config.position(), self.lab_position]
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

/// A single problem found in a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelIssue {
    /// Grid width or height not positive.
    EmptyGrid { width: i32, height: i32 },
    BaseOutOfBounds(GridPos),
    RoverOutOfBounds(GridPos),
    /// A fixed fragment position lies outside the grid.
    FragmentOutOfBounds(GridPos),
    /// `sequencePerFragment` without any segment target.
    MissingSegmentTargets,
    /// A segment target names a fragment index the level never places.
    UnknownSegmentFragment(usize),
    /// The descriptor declares a different id from the one requested.
    IdMismatch { requested: u32, declared: u32 },
}

impl fmt::Display for LevelIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyGrid { width, height } => write!(f, "grid {width}x{height} is empty"),
            Self::BaseOutOfBounds(p) => write!(f, "lab position ({p}) is outside the grid"),
            Self::RoverOutOfBounds(p) => write!(f, "rover start ({p}) is outside the grid"),
            Self::FragmentOutOfBounds(p) => write!(f, "fragment ({p}) is outside the grid"),
            Self::MissingSegmentTargets => {
                write!(f, "sequencePerFragment level has no segment targets")
            }
            Self::UnknownSegmentFragment(i) => {
                write!(f, "segment target fragment_{i} does not exist")
            }
            Self::IdMismatch { requested, declared } => {
                write!(f, "requested level {requested} but descriptor declares {declared}")
            }
        }
    }
}

/// Validate a descriptor, returning all issues found.
pub fn validate_level(level: &LevelDescriptor) -> Vec<LevelIssue> {
    let mut issues = Vec::new();
    let grid = level.grid();

    if grid.cell_count() == 0 {
        issues.push(LevelIssue::EmptyGrid {
            width: level.grid_width,
            height: level.grid_height,
        });
        return issues;
    }
    if !grid.contains(level.lab_position) {
        issues.push(LevelIssue::BaseOutOfBounds(level.lab_position));
    }
    let start = level.initial_rover_config.position();
    if !grid.contains(start) {
        issues.push(LevelIssue::RoverOutOfBounds(start));
    }
    if let FragmentConfig::Fixed { positions, .. } = &level.fragment_config {
        for &p in positions.iter().filter(|p| !grid.contains(**p)) {
            issues.push(LevelIssue::FragmentOutOfBounds(p));
        }
    }

    if level.gameplay_mode == GameplayMode::SequencePerFragment {
        if level.segment_targets.is_empty() {
            issues.push(LevelIssue::MissingSegmentTargets);
        }
        let requested = level.fragment_config.requested();
        for target in &level.segment_targets {
            if let SegmentTarget::Fragment(i) = *target {
                if i >= requested {
                    issues.push(LevelIssue::UnknownSegmentFragment(i));
                }
            }
        }
    }

    issues
}

/// Parse and validate a JSON descriptor for `level`.
pub fn parse_level(level: u32, json: &str) -> Result<LevelDescriptor, LevelError> {
    let descriptor: LevelDescriptor =
        serde_json::from_str(json).map_err(|source| LevelError::Parse { level, source })?;
    check_level(level, descriptor)
}

/// Validate a descriptor requested as `level`, including its declared id.
pub fn check_level(
    level: u32,
    descriptor: LevelDescriptor,
) -> Result<LevelDescriptor, LevelError> {
    let mut issues = validate_level(&descriptor);
    if descriptor.level_id != level {
        issues.push(LevelIssue::IdMismatch {
            requested: level,
            declared: descriptor.level_id,
        });
    }
    if issues.is_empty() {
        Ok(descriptor)
    } else {
        Err(LevelError::Malformed { level, issues })
    }
}

// ============================================================================
// PROVIDERS
// ============================================================================

/// Supplies level descriptors by id.
pub trait LevelSource {
    fn fetch(&self, level: u32) -> Result<LevelDescriptor, LevelError>;
}

impl<T: LevelSource + ?Sized> LevelSource for Box<T> {
    fn fetch(&self, level: u32) -> Result<LevelDescriptor, LevelError> {
        (**self).fetch(level)
    }
}

/// The campaign bundled with the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLevels;

const BUILTIN_LEVELS: &[&str] = &[
    include_str!("../../../data/levels/level1.json"),
    include_str!("../../../data/levels/level2.json"),
    include_str!("../../../data/levels/level3.json"),
];

impl BuiltinLevels {
    pub fn count() -> u32 {
        BUILTIN_LEVELS.len() as u32
    }
}

impl LevelSource for BuiltinLevels {
    fn fetch(&self, level: u32) -> Result<LevelDescriptor, LevelError> {
        let json = level
            .checked_sub(1)
            .and_then(|i| BUILTIN_LEVELS.get(i as usize))
            .ok_or(LevelError::NotFound { level })?;
        parse_level(level, json)
    }
}

/// Reads `level{N}.json` files from a directory.
#[derive(Debug, Clone)]
pub struct DirectoryLevels {
    dir: PathBuf,
}

impl DirectoryLevels {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, level: u32) -> PathBuf {
        self.dir.join(format!("level{level}.json"))
    }
}

impl LevelSource for DirectoryLevels {
    fn fetch(&self, level: u32) -> Result<LevelDescriptor, LevelError> {
        let path = self.path_for(level);
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LevelError::NotFound { level })
            }
            Err(source) => return Err(LevelError::Io { path, source }),
        };
        parse_level(level, &json)
    }
}

#[derive(Debug, Clone)]
enum StoredLevel {
    Built(LevelDescriptor),
    Json(String),
}

/// In-memory descriptors, keyed by id. Handy for tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct MemoryLevels {
    levels: HashMap<u32, StoredLevel>,
}

impl MemoryLevels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an already-built descriptor under its own id.
    pub fn with_level(mut self, level: &LevelDescriptor) -> Self {
        self.levels.insert(level.level_id, StoredLevel::Built(level.clone()));
        self
    }

    /// Store raw JSON under `id`, valid or not.
    pub fn with_json(mut self, id: u32, json: impl Into<String>) -> Self {
        self.levels.insert(id, StoredLevel::Json(json.into()));
        self
    }
}

impl LevelSource for MemoryLevels {
    fn fetch(&self, level: u32) -> Result<LevelDescriptor, LevelError> {
        match self.levels.get(&level) {
            Some(StoredLevel::Built(descriptor)) => check_level(level, descriptor.clone()),
            Some(StoredLevel::Json(json)) => parse_level(level, json),
            None => Err(LevelError::NotFound { level }),
        }
    }
}
