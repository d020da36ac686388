//! Fragment analysis shown once a level is complete.
//!
//! The text can come from any collaborator (a remote text generator, a
//! script). [`ScriptedAnalysis`] is the built-in, always-available source
//! and also the fallback when another source has nothing to say.

use crate::level::LevelDescriptor;

/// Default reports, indexed by level id - 1.
const DEFAULT_REPORTS: &[&str] = &[
    "Excellent work, Isaac! The fragments seem to give off some kind of energy. Ermes is picking it up. Keep testing.",
    "Fascinating. The incoming data is getting more complex. These Spheres... they are not inert.",
    "Every fragment amplifies the signal. I think I can make out a structure, a message... We need more!",
    "The tests are conclusive. Ermes is ready for more complex missions. The mystery of the Spheres remains.",
];

const GENERIC_REPORT: &str = "Fragment analysis complete. No specific data for this level.";

/// Produces the post-mission analysis text.
pub trait AnalysisSource {
    /// `None` means the source is unavailable; the scripted text is used.
    fn analyze(&mut self, level: &LevelDescriptor) -> Option<String>;
}

/// Level text, then the per-level default, then a generic line.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedAnalysis;

impl AnalysisSource for ScriptedAnalysis {
    fn analyze(&mut self, level: &LevelDescriptor) -> Option<String> {
        Some(scripted_report(level))
    }
}

pub fn scripted_report(level: &LevelDescriptor) -> String {
    if let Some(text) = &level.analysis_text {
        return text.clone();
    }
    level
        .level_id
        .checked_sub(1)
        .and_then(|i| DEFAULT_REPORTS.get(i as usize))
        .unwrap_or(&GENERIC_REPORT)
        .to_string()
}
