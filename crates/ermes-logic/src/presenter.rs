//! Boundary with the presentation layer.
//!
//! The mission state machine never renders anything. It pushes state to a
//! [`Presenter`] (grid, rover, fragments, status line, counters, control
//! enablement) and typed requests to a [`DialogSurface`]. Dialog buttons do
//! not carry callbacks: each option names a [`DialogAction`] that the caller
//! feeds back through `MissionSession::choose`.
//!
//! Every hook has a no-op default so an adapter implements only what it
//! draws.

use crate::fragment::Fragment;
use crate::grid::{GridPos, GridSize, Heading};
use crate::level::Speaker;
use crate::mission::GameState;
use crate::rover::Rover;

/// Everything needed to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a> {
    pub rover: &'a Rover,
    pub fragments: &'a [Fragment],
    pub base: GridPos,
}

/// Receives state to render.
pub trait Presenter {
    /// A new level was loaded with this grid.
    fn initialize_grid(&mut self, _grid: GridSize) {}
    /// The drawing surface changed size; no state implications.
    fn resize(&mut self, _grid: GridSize) {}
    fn draw(&mut self, _scene: &Scene<'_>) {}
    fn update_status(&mut self, _message: &str) {}
    fn update_fragment_count(&mut self, _collected: usize, _required: usize) {}
    /// A fragment was just picked up.
    fn fragment_collected(&mut self, _fragment: &Fragment, _collected: usize, _required: usize) {}
    /// Enablement of the command surface changed.
    fn update_controls(&mut self, _state: &GameState) {}
    /// The pending program was emptied.
    fn clear_program(&mut self) {}
}

/// What a dialog option does when picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogAction {
    /// Show the next intro line, or start the mission after the last one.
    ContinueIntro,
    ResetSegment,
    ResetLevel,
    /// Move on to the next level after analysis.
    NextMission,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogOption {
    pub label: String,
    pub action: DialogAction,
}

impl DialogOption {
    pub fn new(label: impl Into<String>, action: DialogAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// A typed show-request for the narration surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogRequest {
    pub speaker: Speaker,
    pub title: String,
    pub message: String,
    /// Empty means a plain acknowledgement.
    pub options: Vec<DialogOption>,
}

impl DialogRequest {
    pub fn new(speaker: Speaker, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            speaker,
            title: title.into(),
            message: message.into(),
            options: Vec::new(),
        }
    }

    pub fn with_option(mut self, label: impl Into<String>, action: DialogAction) -> Self {
        self.options.push(DialogOption::new(label, action));
        self
    }

    pub fn offers(&self, action: DialogAction) -> bool {
        self.options.iter().any(|o| o.action == action)
    }
}

/// Receives dialog show/hide requests.
pub trait DialogSurface {
    fn show_dialog(&mut self, _request: DialogRequest) {}
    fn hide_dialog(&mut self) {}
}

/// A full front end: presenter plus dialog surface.
pub trait Frontend: Presenter + DialogSurface {}

impl<T: Presenter + DialogSurface> Frontend for T {}

/// Front end that renders nothing and only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Headless;

impl Presenter for Headless {
    fn update_status(&mut self, message: &str) {
        log::debug!("status: {}", message);
    }
}

impl DialogSurface for Headless {
    fn show_dialog(&mut self, request: DialogRequest) {
        log::debug!("dialog [{}]: {}", request.title, request.message);
    }
}

/// One recorded front-end notification.
#[derive(Debug, Clone, PartialEq)]
pub enum FrontendEvent {
    GridInitialized(GridSize),
    Resized(GridSize),
    Drawn {
        rover: GridPos,
        heading: Heading,
        trail_len: usize,
        uncollected: usize,
    },
    Status(String),
    FragmentCount { collected: usize, required: usize },
    FragmentCollected { display_id: u32, at: GridPos },
    Controls(GameState),
    ProgramCleared,
    DialogShown(DialogRequest),
    DialogHidden,
}

/// Front end that records every notification in order.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    pub events: Vec<FrontendEvent>,
    /// The dialog currently on screen, if any.
    pub open_dialog: Option<DialogRequest>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|e| match e {
            FrontendEvent::Status(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn last_status(&self) -> Option<&str> {
        self.statuses().last()
    }

    pub fn dialogs(&self) -> impl Iterator<Item = &DialogRequest> {
        self.events.iter().filter_map(|e| match e {
            FrontendEvent::DialogShown(d) => Some(d),
            _ => None,
        })
    }

    pub fn last_dialog(&self) -> Option<&DialogRequest> {
        self.dialogs().last()
    }

    pub fn last_controls(&self) -> Option<&GameState> {
        self.events.iter().rev().find_map(|e| match e {
            FrontendEvent::Controls(s) => Some(s),
            _ => None,
        })
    }

    pub fn draw_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, FrontendEvent::Drawn { .. }))
            .count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Presenter for Transcript {
    fn initialize_grid(&mut self, grid: GridSize) {
        self.events.push(FrontendEvent::GridInitialized(grid));
    }

    fn resize(&mut self, grid: GridSize) {
        self.events.push(FrontendEvent::Resized(grid));
    }

    fn draw(&mut self, scene: &Scene<'_>) {
        self.events.push(FrontendEvent::Drawn {
            rover: scene.rover.pos,
            heading: scene.rover.heading,
            trail_len: scene.rover.trail.len(),
            uncollected: scene.fragments.iter().filter(|f| !f.collected).count(),
        });
    }

    fn update_status(&mut self, message: &str) {
        self.events.push(FrontendEvent::Status(message.to_string()));
    }

    fn update_fragment_count(&mut self, collected: usize, required: usize) {
        self.events
            .push(FrontendEvent::FragmentCount { collected, required });
    }

    fn fragment_collected(&mut self, fragment: &Fragment, _collected: usize, _required: usize) {
        self.events.push(FrontendEvent::FragmentCollected {
            display_id: fragment.display_id,
            at: fragment.pos,
        });
    }

    fn update_controls(&mut self, state: &GameState) {
        self.events.push(FrontendEvent::Controls(state.clone()));
    }

    fn clear_program(&mut self) {
        self.events.push(FrontendEvent::ProgramCleared);
    }
}

impl DialogSurface for Transcript {
    fn show_dialog(&mut self, request: DialogRequest) {
        self.open_dialog = Some(request.clone());
        self.events.push(FrontendEvent::DialogShown(request));
    }

    fn hide_dialog(&mut self) {
        self.open_dialog = None;
        self.events.push(FrontendEvent::DialogHidden);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialog_builder_collects_options() {
        let d = DialogRequest::new(Speaker::Console, "Reset", "Which one?")
            .with_option("Current segment", DialogAction::ResetSegment)
            .with_option("Whole level", DialogAction::ResetLevel);
        assert!(d.offers(DialogAction::ResetLevel));
        assert!(!d.offers(DialogAction::NextMission));
        assert_eq!(d.options[0].label, "Current segment");
    }

    #[test]
    fn transcript_tracks_open_dialog() {
        let mut t = Transcript::new();
        t.update_status("one");
        t.show_dialog(DialogRequest::new(Speaker::Elya, "Hi", "there"));
        t.update_status("two");
        assert_eq!(t.last_status(), Some("two"));
        assert_eq!(t.open_dialog.as_ref().map(|d| d.title.as_str()), Some("Hi"));
        t.hide_dialog();
        assert!(t.open_dialog.is_none());
        assert_eq!(t.last_dialog().map(|d| d.message.as_str()), Some("there"));
        t.clear();
        assert!(t.events.is_empty());
    }
}
