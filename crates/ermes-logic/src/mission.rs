//! Mission state machine: level lifecycle, command execution, segments and
//! checkpoints.
//!
//! A [`MissionSession`] owns everything about the level being played: the
//! descriptor, the rover, the fragments, the checkpoint list, and the
//! simulating flag. Nothing is global, so any number of sessions can coexist.
//!
//! # Phases
//!
//! ```text
//! Uninitialized ─load─▶ AwaitingIntro ─advance_intro…─▶ Idle ⇄ Simulating
//!                                                        │
//!                                                        ▼
//!                              CampaignComplete ◀─ MissionComplete
//! ```
//!
//! `AwaitingIntro` is skipped when the level has no intro dialog.
//!
//! # Sequence playback
//!
//! [`MissionSession::start_execution`] is async. After each replayed command
//! it sleeps for the configured step delay, then checks the simulating flag.
//! Clearing that flag through a [`SimulationHandle`] while the sequence runs
//! stops playback at the next resume point, without a completion check.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::analysis::{scripted_report, AnalysisSource, ScriptedAnalysis};
use crate::command::Command;
use crate::config::SessionConfig;
use crate::error::{LevelError, Rejection};
use crate::fragment::{self, Fragment, FragmentId};
use crate::level::{DialogLine, GameplayMode, LevelDescriptor, LevelSource, SegmentTarget, Speaker};
use crate::presenter::{DialogAction, DialogRequest, Frontend, Scene};
use crate::rover::Rover;

// ============================================================================
// PUBLIC STATE
// ============================================================================

/// Immutable snapshot taken when a non-final segment target is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Index of the segment this checkpoint closes.
    pub segment_index: usize,
    /// Owned deep copy of the rover at that moment.
    pub rover: Rover,
    pub collected_count: usize,
    pub collected_ids: BTreeSet<FragmentId>,
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionPhase {
    Uninitialized,
    AwaitingIntro,
    Idle,
    Simulating,
    MissionComplete,
    CampaignComplete,
}

/// What the command surface needs to decide which controls are enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub phase: MissionPhase,
    pub mission_active: bool,
    pub simulating: bool,
    pub collected_fragments: usize,
    pub total_fragments_required: usize,
    pub gameplay_mode: Option<GameplayMode>,
    pub current_segment_index: usize,
    /// Number of segments, for modes that have them.
    pub segment_count: Option<usize>,
    pub ready_for_analysis: bool,
    pub intro_active: bool,
}

/// Shared view of the simulating flag.
///
/// Cloning shares the flag. [`interrupt`](Self::interrupt) is how code
/// outside a running sequence asks it to stop.
#[derive(Debug, Clone, Default)]
pub struct SimulationHandle(Arc<AtomicBool>);

impl SimulationHandle {
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag. A running sequence stops at its next resume point.
    pub fn interrupt(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    fn set_running(&self, running: bool) {
        self.0.store(running, Ordering::SeqCst);
    }
}

/// Result of a single applied command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    /// False when a forward move hit the grid border.
    pub applied: bool,
    pub collected: Option<FragmentId>,
}

/// Result of a completion evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Mission won.
    Success,
    /// At the base with this many fragments missing.
    MissingFragments(usize),
    /// Segment target reached; the session moved on to this segment index.
    Checkpoint { next_segment: usize },
    /// Objective not met; the player may reprogram.
    NotMet,
    /// Direct control away from the base: nothing to report.
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Direct control: the command ran immediately.
    Applied {
        step: StepReport,
        completion: Option<Completion>,
    },
    /// Sequence modes: the command was appended to the pending program.
    Queued { pending: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Direct control: piloting is now enabled.
    PilotingStarted,
    /// Every command ran and completion was evaluated.
    Finished { executed: usize, completion: Completion },
    /// The simulating flag was cleared mid-sequence; no completion check.
    Interrupted { executed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// A segment-or-level dialog is open; answer it with `choose`.
    ChoiceOffered,
    LevelReloaded,
    /// The descriptor could not be fetched again; the session is unchanged
    /// and the error is on the dialog surface.
    ReloadFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelAdvance {
    Loaded(u32),
    /// No further level exists.
    CampaignComplete,
}

// ============================================================================
// MODE DISPATCH
// ============================================================================

/// Per-mode rules, selected once when a level is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Playbook {
    /// Commands apply immediately; completion after every command.
    Direct,
    /// One program per segment target; rewinds to the last checkpoint.
    Segmented,
    /// One program for the whole mission; rewinds to the level start.
    SingleRun,
}

/// State a sequence replay starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rewind {
    LastCheckpoint,
    LevelStart,
}

impl Playbook {
    fn for_mode(mode: GameplayMode) -> Self {
        match mode {
            GameplayMode::DirectControl => Self::Direct,
            GameplayMode::SequencePerFragment => Self::Segmented,
            GameplayMode::FullSequence => Self::SingleRun,
        }
    }

    fn is_direct(self) -> bool {
        self == Self::Direct
    }

    fn rewind(self) -> Option<Rewind> {
        match self {
            Self::Direct => None,
            Self::Segmented => Some(Rewind::LastCheckpoint),
            Self::SingleRun => Some(Rewind::LevelStart),
        }
    }

    fn segment_count(self, level: &LevelDescriptor) -> Option<usize> {
        match self {
            Self::Direct => None,
            Self::Segmented => Some(level.segment_targets.len()),
            Self::SingleRun => Some(1),
        }
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Per-level state, rebuilt wholesale on every load.
#[derive(Debug)]
struct Mission {
    level: LevelDescriptor,
    playbook: Playbook,
    rover: Rover,
    fragments: Vec<Fragment>,
    collected: usize,
    active: bool,
    segment_index: usize,
    checkpoints: Vec<Checkpoint>,
    /// Front line is the one on screen.
    intro: VecDeque<DialogLine>,
    program: Vec<Command>,
    placement_shortfall: usize,
}

impl Mission {
    fn at_base(&self) -> bool {
        self.rover.pos == self.level.lab_position
    }

    fn required(&self) -> usize {
        self.level.total_fragments_required
    }

    fn has_enough(&self) -> bool {
        self.collected >= self.required()
    }

    fn intro_active(&self) -> bool {
        !self.intro.is_empty()
    }

    fn rewind_to_start(&mut self) {
        self.rover = Rover::new(&self.level.initial_rover_config);
        fragment::reset_collected(&mut self.fragments);
        self.collected = 0;
    }

    /// Rewind to the last checkpoint, or the level start if there is none.
    fn rewind_to_checkpoint(&mut self) {
        match self.checkpoints.last() {
            Some(cp) => {
                self.rover = cp.rover.clone();
                fragment::restore_collected(&mut self.fragments, &cp.collected_ids);
                self.collected = cp.collected_count;
            }
            None => self.rewind_to_start(),
        }
        self.rover.reset_trail();
    }

    fn fragment_label(&self, index: usize) -> String {
        match self.fragments.get(index) {
            Some(f) => format!("Fragment {}", f.display_id),
            None => format!("Unknown fragment {}", index + 1),
        }
    }

    fn describe_target(&self, target: SegmentTarget) -> String {
        match target {
            SegmentTarget::Lab => "the Lab".to_string(),
            SegmentTarget::Fragment(i) => self.fragment_label(i),
        }
    }

    /// Status line for the current segment, if any remains.
    fn segment_objective(&self) -> Option<String> {
        let target = *self.level.segment_targets.get(self.segment_index)?;
        let description = match target {
            SegmentTarget::Fragment(i) => match self.fragments.get(i) {
                Some(f) => format!("Fragment {} (at {})", f.display_id, f.pos),
                None => self.fragment_label(i),
            },
            SegmentTarget::Lab => self.describe_target(target),
        };
        Some(format!("Program the sequence towards {description}."))
    }

    fn take_checkpoint(&mut self) {
        self.checkpoints.push(Checkpoint {
            segment_index: self.segment_index,
            rover: self.rover.clone(),
            collected_count: self.collected,
            collected_ids: fragment::collected_ids(&self.fragments),
        });
    }
}

/// A playable session: one campaign, one level at a time.
pub struct MissionSession<F: Frontend> {
    levels: Box<dyn LevelSource>,
    analyst: Box<dyn AnalysisSource>,
    frontend: F,
    config: SessionConfig,
    rng: StdRng,
    level_id: u32,
    mission: Option<Mission>,
    simulating: SimulationHandle,
    campaign_complete: bool,
    /// Actions offered by the dialog currently open.
    offered: Vec<DialogAction>,
}

impl<F: Frontend> MissionSession<F> {
    pub fn new(levels: impl LevelSource + 'static, frontend: F, config: SessionConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            levels: Box::new(levels),
            analyst: Box::new(ScriptedAnalysis),
            frontend,
            level_id: config.start_level,
            config,
            rng,
            mission: None,
            simulating: SimulationHandle::default(),
            campaign_complete: false,
            offered: Vec::new(),
        }
    }

    /// Replace the analysis collaborator.
    pub fn with_analyst(mut self, analyst: impl AnalysisSource + 'static) -> Self {
        self.analyst = Box::new(analyst);
        self
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn frontend_mut(&mut self) -> &mut F {
        &mut self.frontend
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn level_id(&self) -> u32 {
        self.level_id
    }

    pub fn level(&self) -> Option<&LevelDescriptor> {
        self.mission.as_ref().map(|m| &m.level)
    }

    pub fn rover(&self) -> Option<&Rover> {
        self.mission.as_ref().map(|m| &m.rover)
    }

    pub fn fragments(&self) -> &[Fragment] {
        self.mission
            .as_ref()
            .map(|m| m.fragments.as_slice())
            .unwrap_or_default()
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        self.mission
            .as_ref()
            .map(|m| m.checkpoints.as_slice())
            .unwrap_or_default()
    }

    /// Commands queued but not yet executed.
    pub fn program(&self) -> &[Command] {
        self.mission
            .as_ref()
            .map(|m| m.program.as_slice())
            .unwrap_or_default()
    }

    pub fn collected(&self) -> usize {
        self.mission.as_ref().map_or(0, |m| m.collected)
    }

    /// Fragments the placement engine could not fit on the last load.
    pub fn placement_shortfall(&self) -> usize {
        self.mission.as_ref().map_or(0, |m| m.placement_shortfall)
    }

    pub fn is_mission_active(&self) -> bool {
        self.mission.as_ref().is_some_and(|m| m.active)
    }

    pub fn is_simulating(&self) -> bool {
        self.simulating.is_running()
    }

    pub fn simulation_handle(&self) -> SimulationHandle {
        self.simulating.clone()
    }

    pub fn phase(&self) -> MissionPhase {
        let Some(m) = &self.mission else {
            return MissionPhase::Uninitialized;
        };
        if self.campaign_complete {
            MissionPhase::CampaignComplete
        } else if m.intro_active() {
            MissionPhase::AwaitingIntro
        } else if !m.active {
            MissionPhase::MissionComplete
        } else if self.is_simulating() {
            MissionPhase::Simulating
        } else {
            MissionPhase::Idle
        }
    }

    /// True once the mission is over and every objective holds: rover on
    /// the base, enough fragments, and every segment done.
    pub fn ready_for_analysis(&self) -> bool {
        let Some(m) = &self.mission else {
            return false;
        };
        if m.active || m.intro_active() || self.campaign_complete {
            return false;
        }
        let segments_done = match m.playbook {
            Playbook::Segmented => m.segment_index >= m.level.segment_targets.len(),
            _ => true,
        };
        m.at_base() && m.has_enough() && segments_done
    }

    pub fn state(&self) -> GameState {
        let m = self.mission.as_ref();
        GameState {
            phase: self.phase(),
            mission_active: self.is_mission_active(),
            simulating: self.is_simulating(),
            collected_fragments: self.collected(),
            total_fragments_required: m.map_or(0, |m| m.required()),
            gameplay_mode: m.map(|m| m.level.gameplay_mode),
            current_segment_index: m.map_or(0, |m| m.segment_index),
            segment_count: m.and_then(|m| m.playbook.segment_count(&m.level)),
            ready_for_analysis: self.ready_for_analysis(),
            intro_active: m.is_some_and(|m| m.intro_active()),
        }
    }

    // ── Level lifecycle ─────────────────────────────────────────────────

    /// Load the configured start level.
    pub fn start(&mut self) -> Result<(), LevelError> {
        self.load(self.config.start_level)
    }

    /// Load a level, replacing all mission state.
    ///
    /// On failure the error is shown on the dialog surface and the session
    /// is left exactly as it was.
    pub fn load(&mut self, level_id: u32) -> Result<(), LevelError> {
        log::info!("Loading level {}", level_id);
        match self.levels.fetch(level_id) {
            Ok(level) => {
                self.install(level_id, level);
                Ok(())
            }
            Err(e) => {
                self.report_load_error(level_id, &e);
                Err(e)
            }
        }
    }

    fn report_load_error(&mut self, level_id: u32, error: &LevelError) {
        log::error!("Failed to load level {}: {}", level_id, error);
        self.open_dialog(DialogRequest::new(
            Speaker::Console,
            "Critical loading error",
            format!("Unable to load level {level_id}. Detail: {error}."),
        ));
    }

    fn install(&mut self, level_id: u32, level: LevelDescriptor) {
        self.simulating.set_running(false);

        let rover = Rover::new(&level.initial_rover_config);
        let placement = fragment::place_fragments(
            &level.fragment_config,
            level.grid(),
            &level.reserved_cells(),
            &mut self.rng,
        );

        let mission = Mission {
            playbook: Playbook::for_mode(level.gameplay_mode),
            rover,
            placement_shortfall: placement.shortfall(),
            fragments: placement.fragments,
            collected: 0,
            active: false,
            segment_index: 0,
            checkpoints: Vec::new(),
            intro: level.intro_dialogs.iter().cloned().collect(),
            program: Vec::new(),
            level,
        };
        log::info!(
            "Level {} ready: mode {}, {} fragments, {} intro lines",
            level_id,
            mission.level.gameplay_mode,
            mission.fragments.len(),
            mission.intro.len()
        );

        self.level_id = level_id;
        self.campaign_complete = false;
        self.frontend.initialize_grid(mission.level.grid());
        self.mission = Some(mission);
        self.redraw();
        self.push_fragment_count();
        self.frontend.clear_program();
        self.push_controls();

        let first_line = self.mission.as_ref().and_then(|m| m.intro.front().cloned());
        match first_line {
            Some(line) => self.show_intro_line(&line),
            None => self.activate(),
        }
    }

    fn show_intro_line(&mut self, line: &DialogLine) {
        let last = self.mission.as_ref().is_some_and(|m| m.intro.len() == 1);
        let label = if last { "Start mission" } else { "Next..." };
        self.open_dialog(
            DialogRequest::new(line.speaker, line.speaker.title(), line.message.clone())
                .with_option(label, DialogAction::ContinueIntro),
        );
    }

    /// Dismiss the current intro line; after the last one the mission starts.
    pub fn advance_intro(&mut self) -> Result<(), Rejection> {
        let m = self.mission.as_mut().ok_or(Rejection::NoLevelLoaded)?;
        if m.intro.pop_front().is_none() {
            return Ok(());
        }
        let next = m.intro.front().cloned();
        self.close_dialog();
        match next {
            Some(line) => self.show_intro_line(&line),
            None => self.activate(),
        }
        self.push_controls();
        Ok(())
    }

    fn activate(&mut self) {
        let Some(m) = self.mission.as_mut() else {
            return;
        };
        m.active = true;
        let status = match m.playbook {
            Playbook::Segmented => m.segment_objective(),
            _ => None,
        }
        .or_else(|| m.level.mission_objective.clone())
        .unwrap_or_else(|| format!("Level {}. Ready.", self.level_id));
        log::info!("Mission {} activated", self.level_id);
        self.frontend.update_status(&status);
        self.push_controls();
    }

    /// Move on to the next level. Running out of levels completes the
    /// campaign; a broken next level is a load error.
    pub fn advance_level(&mut self) -> Result<LevelAdvance, LevelError> {
        let next = self.level_id + 1;
        log::info!("Advancing from level {} to {}", self.level_id, next);
        match self.levels.fetch(next) {
            Ok(level) => {
                self.install(next, level);
                Ok(LevelAdvance::Loaded(next))
            }
            Err(e) if e.is_not_found() => {
                log::info!("No level {}; campaign complete", next);
                self.complete_campaign();
                Ok(LevelAdvance::CampaignComplete)
            }
            Err(e) => {
                self.report_load_error(next, &e);
                Err(e)
            }
        }
    }

    fn complete_campaign(&mut self) {
        if let Some(m) = self.mission.as_mut() {
            m.active = false;
            m.program.clear();
        }
        self.simulating.set_running(false);
        self.campaign_complete = true;
        self.frontend.update_status("All missions complete! Well done!");
        self.open_dialog(DialogRequest::new(
            Speaker::Elya,
            "End of Mission Zero",
            "Congratulations, Commander! You have completed every Phase Zero mission. \
             Ermes is ready for longer and more complex explorations.",
        ));
        self.push_controls();
    }

    /// Redraw after the surface changed size.
    pub fn handle_resize(&mut self) {
        if let Some(m) = &self.mission {
            if m.active {
                self.frontend.resize(m.level.grid());
                self.redraw();
            }
        }
    }

    // ── Commands ────────────────────────────────────────────────────────

    fn check_can_command(&self) -> Result<&Mission, Rejection> {
        let m = self.mission.as_ref().ok_or(Rejection::NoLevelLoaded)?;
        if self.campaign_complete {
            return Err(Rejection::CampaignComplete);
        }
        if m.intro_active() {
            return Err(Rejection::IntroActive);
        }
        if !m.active {
            return Err(Rejection::MissionInactive);
        }
        Ok(m)
    }

    /// Issue one command from the command surface.
    ///
    /// In direct control it runs immediately (piloting must have been
    /// started). In sequence modes it is appended to the pending program.
    pub fn issue_command(&mut self, command: Command) -> Result<CommandOutcome, Rejection> {
        let direct = self.check_can_command()?.playbook.is_direct();
        let running = self.is_simulating();

        if direct {
            if !running {
                return Err(Rejection::NotPiloting);
            }
            let step = self.apply_command(command);
            let completion = step.applied.then(|| self.check_mission_completion());
            return Ok(CommandOutcome::Applied { step, completion });
        }

        if running {
            return Err(Rejection::AlreadySimulating);
        }
        let m = self.mission.as_mut().ok_or(Rejection::NoLevelLoaded)?;
        m.program.push(command);
        Ok(CommandOutcome::Queued {
            pending: m.program.len(),
        })
    }

    /// Drop the pending program.
    pub fn clear_program(&mut self) {
        if let Some(m) = self.mission.as_mut() {
            m.program.clear();
        }
        self.frontend.clear_program();
    }

    /// Run the pending program.
    pub async fn run_program(&mut self) -> Result<ExecutionOutcome, Rejection> {
        let program = self.program().to_vec();
        self.start_execution(program).await
    }

    /// Start execution.
    ///
    /// Direct control: enables piloting; `commands` is ignored. Sequence
    /// modes: rewinds to the segment's starting state, then replays the
    /// commands one by one with the configured pause between them.
    pub async fn start_execution(
        &mut self,
        commands: Vec<Command>,
    ) -> Result<ExecutionOutcome, Rejection> {
        let playbook = self.check_can_command()?.playbook;
        if self.is_simulating() {
            return Err(Rejection::AlreadySimulating);
        }

        if playbook.is_direct() {
            self.simulating.set_running(true);
            log::info!("Direct piloting started");
            self.frontend
                .update_status("Direct piloting active. Use the controls.");
            self.push_controls();
            return Ok(ExecutionOutcome::PilotingStarted);
        }

        if commands.is_empty() {
            self.open_dialog(DialogRequest::new(
                Speaker::Console,
                "Program error",
                "No command programmed for this sequence.",
            ));
            return Err(Rejection::EmptyProgram);
        }

        log::info!("Executing {} commands", commands.len());
        self.simulating.set_running(true);
        self.push_controls();
        self.frontend.update_status("Sequence simulation running...");

        if let Some(m) = self.mission.as_mut() {
            match playbook.rewind() {
                Some(Rewind::LastCheckpoint) => m.rewind_to_checkpoint(),
                Some(Rewind::LevelStart) => {
                    m.rewind_to_start();
                    m.rover.reset_trail();
                }
                None => {}
            }
        }
        self.push_fragment_count();
        self.redraw();

        let delay = self.config.step_delay();
        let mut executed = 0;
        for command in &commands {
            if !self.is_simulating() {
                break;
            }
            self.frontend
                .update_status(&format!("Executing: {}", command.label()));
            self.apply_command(*command);
            executed += 1;
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
        }

        let outcome = if self.is_simulating() {
            log::info!("Sequence finished, evaluating completion");
            let completion = match playbook {
                Playbook::Segmented => self.check_segment_completion(),
                _ => self.check_mission_completion(),
            };
            ExecutionOutcome::Finished {
                executed,
                completion,
            }
        } else {
            log::info!("Sequence interrupted after {} commands", executed);
            ExecutionOutcome::Interrupted { executed }
        };

        self.simulating.set_running(false);
        self.push_controls();
        Ok(outcome)
    }

    /// Apply one command to the rover, then run the collision check.
    fn apply_command(&mut self, command: Command) -> StepReport {
        let running = self.is_simulating();
        let Some(m) = self.mission.as_mut() else {
            return StepReport {
                applied: false,
                collected: None,
            };
        };

        let applied = match command {
            Command::Forward => m.rover.move_forward(m.level.grid()),
            Command::TurnLeft => {
                m.rover.turn_left();
                true
            }
            Command::TurnRight => {
                m.rover.turn_right();
                true
            }
        };

        if !applied {
            if m.playbook.is_direct() && running {
                self.frontend
                    .update_status("Border collision! Move cancelled.");
            } else {
                log::debug!("Forward blocked by the grid border at {}", m.rover.pos);
            }
            return StepReport {
                applied,
                collected: None,
            };
        }

        let collected = fragment::check_collision(m.rover.pos, &mut m.fragments);
        if let Some(id) = collected {
            m.collected = fragment::collected_count(&m.fragments);
            let required = m.required();
            if let Some(f) = m.fragments.iter().find(|f| f.id == id) {
                log::info!(
                    "Fragment {}/{} collected at ({})",
                    f.display_id,
                    required,
                    f.pos
                );
                self.frontend.fragment_collected(f, m.collected, required);
            }
            self.frontend.update_fragment_count(m.collected, required);
        }
        self.redraw();

        StepReport { applied, collected }
    }

    // ── Completion ──────────────────────────────────────────────────────

    /// Evaluate "back at the base with enough fragments".
    fn check_mission_completion(&mut self) -> Completion {
        let Some(m) = self.mission.as_ref() else {
            return Completion::NotMet;
        };
        let direct = m.playbook.is_direct();

        let completion = if m.at_base() && m.has_enough() {
            self.succeed();
            Completion::Success
        } else if m.at_base() {
            let missing = m.required() - m.collected;
            self.report_missing(missing, "Mission report");
            if !direct {
                self.simulating.set_running(false);
            }
            Completion::MissingFragments(missing)
        } else if direct {
            Completion::Continue
        } else {
            self.report_not_met();
            Completion::NotMet
        };
        self.push_controls();
        completion
    }

    /// Evaluate the current segment target of a `sequencePerFragment` level.
    fn check_segment_completion(&mut self) -> Completion {
        let Some(m) = self.mission.as_ref() else {
            return Completion::NotMet;
        };
        let target = m.level.segment_targets.get(m.segment_index).copied();
        log::info!("Checking segment {} ({:?})", m.segment_index, target);

        let completion = match target {
            Some(SegmentTarget::Lab) if m.at_base() => {
                if m.has_enough() {
                    if let Some(m) = self.mission.as_mut() {
                        m.segment_index += 1;
                    }
                    self.succeed();
                    Completion::Success
                } else {
                    let missing = m.required() - m.collected;
                    self.report_missing(missing, "Segment report");
                    self.simulating.set_running(false);
                    Completion::MissingFragments(missing)
                }
            }
            Some(SegmentTarget::Fragment(k))
                if m
                    .fragments
                    .get(k)
                    .is_some_and(|f| f.pos == m.rover.pos && f.collected) =>
            {
                self.reach_checkpoint(k)
            }
            _ => {
                self.report_not_met();
                Completion::NotMet
            }
        };
        self.push_controls();
        completion
    }

    fn reach_checkpoint(&mut self, fragment_index: usize) -> Completion {
        let Some(m) = self.mission.as_mut() else {
            return Completion::NotMet;
        };
        let fragment_number = m
            .fragments
            .get(fragment_index)
            .map_or(fragment_index as u32 + 1, |f| f.display_id);
        let next_target = m
            .level
            .segment_targets
            .get(m.segment_index + 1)
            .map_or_else(|| "the final destination".to_string(), |t| m.describe_target(*t));
        let message = m
            .level
            .completion_messages
            .checkpoint(fragment_number, &next_target);

        log::info!(
            "Checkpoint: segment {} done (fragment {})",
            m.segment_index,
            fragment_number
        );
        m.take_checkpoint();
        m.segment_index += 1;
        m.program.clear();
        let next_segment = m.segment_index;
        let follow_up = m
            .segment_objective()
            .unwrap_or_else(|| "All planned segments complete.".to_string());

        self.simulating.set_running(false);
        self.frontend.update_status(&message);
        self.open_dialog(DialogRequest::new(
            Speaker::Console,
            "Checkpoint!",
            message.clone(),
        ));
        self.frontend.clear_program();
        self.frontend.update_status(&follow_up);

        Completion::Checkpoint { next_segment }
    }

    fn succeed(&mut self) {
        let Some(m) = self.mission.as_mut() else {
            return;
        };
        m.active = false;
        let message = m.level.completion_messages.success.clone();
        self.simulating.set_running(false);
        log::info!("Mission {} accomplished", self.level_id);
        self.frontend.update_status(&message);
        self.open_dialog(DialogRequest::new(
            Speaker::Elya,
            format!("Mission {} accomplished!", self.level_id),
            message,
        ));
    }

    fn report_missing(&mut self, missing: usize, title: &str) {
        let Some(m) = self.mission.as_ref() else {
            return;
        };
        let message = m.level.completion_messages.missing_fragments(missing);
        log::info!("At the base with {} fragment(s) missing", missing);
        self.frontend.update_status(&message);
        self.open_dialog(DialogRequest::new(Speaker::Console, title, message));
    }

    fn report_not_met(&mut self) {
        let Some(m) = self.mission.as_ref() else {
            return;
        };
        log::info!("Objective not met");
        let message = m.level.completion_messages.objective_not_met.clone();
        self.frontend.update_status(&message);
        self.simulating.set_running(false);
    }

    // ── Resets ──────────────────────────────────────────────────────────

    /// Reset the program.
    ///
    /// On a `sequencePerFragment` level with a checkpoint recorded, offers
    /// the segment-or-level choice; otherwise reloads the level. The pending
    /// program is cleared either way.
    pub fn reset_program(&mut self) -> Result<ResetOutcome, Rejection> {
        let m = self.mission.as_ref().ok_or(Rejection::NoLevelLoaded)?;
        let offer_choice = m.playbook == Playbook::Segmented && !m.checkpoints.is_empty();
        let active = m.active;
        self.clear_program();
        if !active {
            log::warn!("Reset requested while the mission is not active");
            return Err(Rejection::MissionInactive);
        }

        if offer_choice {
            self.open_dialog(
                DialogRequest::new(
                    Speaker::Console,
                    "Reset confirmation",
                    "Reset the current segment or the whole level?",
                )
                .with_option("Current segment", DialogAction::ResetSegment)
                .with_option("Whole level", DialogAction::ResetLevel)
                .with_option("Cancel", DialogAction::Cancel),
            );
            return Ok(ResetOutcome::ChoiceOffered);
        }

        match self.reset_level() {
            Ok(()) => Ok(ResetOutcome::LevelReloaded),
            Err(_) => Ok(ResetOutcome::ReloadFailed),
        }
    }

    /// Rewind rover and fragments to the last checkpoint (or the level
    /// start) without reloading the level.
    pub fn reset_current_segment(&mut self) -> Result<(), Rejection> {
        let m = self.mission.as_mut().ok_or(Rejection::NoLevelLoaded)?;
        if self.campaign_complete {
            return Err(Rejection::CampaignComplete);
        }
        if !m.active {
            return Err(Rejection::MissionInactive);
        }
        if m.playbook != Playbook::Segmented {
            return Err(Rejection::NotSegmented);
        }
        self.simulating.set_running(false);
        m.rewind_to_checkpoint();
        m.program.clear();
        log::info!(
            "Segment {} reset ({} checkpoints)",
            m.segment_index,
            m.checkpoints.len()
        );
        let objective = m.segment_objective();

        self.frontend.clear_program();
        if let Some(objective) = objective {
            self.frontend.update_status(&objective);
        }
        self.redraw();
        self.push_fragment_count();
        self.push_controls();
        Ok(())
    }

    /// Reload the current level from its descriptor.
    pub fn reset_level(&mut self) -> Result<(), LevelError> {
        self.load(self.level_id)
    }

    /// Answer a dialog option. Only actions offered by the open dialog are
    /// accepted.
    pub fn choose(&mut self, action: DialogAction) -> Result<(), Rejection> {
        if !self.offered.contains(&action) {
            log::warn!("Dialog action {:?} was not offered", action);
            return Err(Rejection::NotOffered(action));
        }
        match action {
            DialogAction::ContinueIntro => return self.advance_intro(),
            DialogAction::ResetSegment => {
                self.close_dialog();
                self.reset_current_segment()?;
            }
            DialogAction::ResetLevel => {
                self.close_dialog();
                // Load errors are already on the dialog surface.
                let _ = self.reset_level();
            }
            DialogAction::NextMission => {
                self.close_dialog();
                let _ = self.advance_level();
            }
            DialogAction::Cancel => self.close_dialog(),
        }
        Ok(())
    }

    // ── Analysis ────────────────────────────────────────────────────────

    /// Produce the fragment analysis, offering the next mission.
    pub fn request_analysis(&mut self) -> Result<String, Rejection> {
        if self.mission.is_none() {
            return Err(Rejection::NoLevelLoaded);
        }
        if !self.ready_for_analysis() {
            self.open_dialog(DialogRequest::new(
                Speaker::Console,
                "Analysis impossible",
                "The conditions for analysis are not met (all fragments collected and back at the lab).",
            ));
            return Err(Rejection::AnalysisNotReady);
        }
        let Some(m) = self.mission.as_ref() else {
            return Err(Rejection::NoLevelLoaded);
        };

        self.frontend.update_status("Analysing fragments...");
        let report = self
            .analyst
            .analyze(&m.level)
            .unwrap_or_else(|| scripted_report(&m.level));
        log::info!("Analysis delivered for level {}", self.level_id);
        self.open_dialog(
            DialogRequest::new(
                Speaker::Elya,
                format!("Elya's report - Level {}", self.level_id),
                report.clone(),
            )
            .with_option("Next mission", DialogAction::NextMission),
        );
        Ok(report)
    }

    // ── Notifications ───────────────────────────────────────────────────

    fn open_dialog(&mut self, request: DialogRequest) {
        self.offered = request.options.iter().map(|o| o.action).collect();
        self.frontend.show_dialog(request);
    }

    fn close_dialog(&mut self) {
        self.offered.clear();
        self.frontend.hide_dialog();
    }

    fn redraw(&mut self) {
        if let Some(m) = &self.mission {
            self.frontend.draw(&Scene {
                rover: &m.rover,
                fragments: &m.fragments,
                base: m.level.lab_position,
            });
        }
    }

    fn push_fragment_count(&mut self) {
        if let Some(m) = &self.mission {
            self.frontend.update_fragment_count(m.collected, m.required());
        }
    }

    fn push_controls(&mut self) {
        let state = self.state();
        self.frontend.update_controls(&state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::FragmentConfig;
    use crate::grid::{GridPos, Heading};
    use crate::level::{CompletionMessages, MemoryLevels};
    use crate::presenter::{FrontendEvent, Transcript};
    use crate::rover::RoverConfig;

    fn level(mode: GameplayMode) -> LevelDescriptor {
        LevelDescriptor {
            level_id: 1,
            grid_width: 6,
            grid_height: 6,
            total_fragments_required: 2,
            lab_position: GridPos::new(5, 5),
            initial_rover_config: RoverConfig {
                x: 0,
                y: 0,
                angle: Heading::East,
                color: "#63B3ED".into(),
            },
            fragment_config: FragmentConfig::Fixed {
                positions: vec![GridPos::new(2, 0), GridPos::new(2, 2)],
                color: "#F6E05E".into(),
            },
            gameplay_mode: mode,
            mission_title: None,
            mission_objective: None,
            analysis_text: None,
            intro_dialogs: Vec::new(),
            completion_messages: CompletionMessages::default(),
            segment_targets: match mode {
                GameplayMode::SequencePerFragment => vec![
                    SegmentTarget::Fragment(0),
                    SegmentTarget::Fragment(1),
                    SegmentTarget::Lab,
                ],
                _ => Vec::new(),
            },
        }
    }

    fn session(level: &LevelDescriptor) -> MissionSession<Transcript> {
        let source = MemoryLevels::new().with_level(level);
        let mut s = MissionSession::new(
            source,
            Transcript::new(),
            SessionConfig::default().unpaced().with_seed(1),
        );
        s.start().unwrap();
        s
    }

    use crate::command::Command::{Forward as F, TurnLeft as L, TurnRight as R};

    #[test]
    fn uninitialized_until_loaded() {
        let s: MissionSession<Transcript> =
            MissionSession::new(MemoryLevels::new(), Transcript::new(), SessionConfig::default());
        assert_eq!(s.phase(), MissionPhase::Uninitialized);
        assert!(!s.ready_for_analysis());
        assert_eq!(s.state().gameplay_mode, None);
    }

    #[test]
    fn failed_load_keeps_previous_state() {
        let mut s = session(&level(GameplayMode::DirectControl));
        assert!(s.load(9).unwrap_err().is_not_found());
        assert_eq!(s.level_id(), 1);
        assert_eq!(s.phase(), MissionPhase::Idle);
        let dialog = s.frontend().last_dialog().unwrap();
        assert_eq!(dialog.title, "Critical loading error");
        assert!(dialog.message.contains("level 9"));
    }

    #[test]
    fn intro_gates_commands() {
        let mut lvl = level(GameplayMode::FullSequence);
        lvl.intro_dialogs = vec![
            DialogLine {
                speaker: Speaker::Elya,
                message: "one".into(),
            },
            DialogLine {
                speaker: Speaker::Isaac,
                message: "two".into(),
            },
        ];
        let mut s = session(&lvl);
        assert_eq!(s.phase(), MissionPhase::AwaitingIntro);
        assert!(s.state().intro_active);
        assert_eq!(s.issue_command(F), Err(Rejection::IntroActive));

        let first = s.frontend().open_dialog.clone().unwrap();
        assert_eq!(first.message, "one");
        assert_eq!(first.options[0].label, "Next...");

        s.choose(DialogAction::ContinueIntro).unwrap();
        let second = s.frontend().open_dialog.clone().unwrap();
        assert_eq!(second.message, "two");
        assert_eq!(second.options[0].label, "Start mission");
        assert!(!s.is_mission_active());

        s.advance_intro().unwrap();
        assert_eq!(s.phase(), MissionPhase::Idle);
        assert!(s.is_mission_active());
        assert!(s.frontend().open_dialog.is_none());
        assert!(matches!(s.issue_command(F), Ok(CommandOutcome::Queued { pending: 1 })));
    }

    #[test]
    fn direct_control_requires_piloting() {
        let mut s = session(&level(GameplayMode::DirectControl));
        assert_eq!(s.issue_command(F), Err(Rejection::NotPiloting));
    }

    #[tokio::test]
    async fn direct_control_border_collision_is_reported() {
        let mut s = session(&level(GameplayMode::DirectControl));
        assert_eq!(
            s.start_execution(Vec::new()).await,
            Ok(ExecutionOutcome::PilotingStarted)
        );
        assert_eq!(s.phase(), MissionPhase::Simulating);
        s.issue_command(L).unwrap(); // facing north at the top edge
        let outcome = s.issue_command(F).unwrap();
        assert_eq!(
            outcome,
            CommandOutcome::Applied {
                step: StepReport {
                    applied: false,
                    collected: None
                },
                completion: None
            }
        );
        assert_eq!(
            s.frontend().last_status(),
            Some("Border collision! Move cancelled.")
        );
        assert_eq!(s.rover().unwrap().pos, GridPos::new(0, 0));
    }

    #[tokio::test]
    async fn direct_control_collects_on_the_way() {
        let mut s = session(&level(GameplayMode::DirectControl));
        s.start_execution(Vec::new()).await.unwrap();
        s.issue_command(F).unwrap();
        let outcome = s.issue_command(F).unwrap();
        assert_eq!(
            outcome,
            CommandOutcome::Applied {
                step: StepReport {
                    applied: true,
                    collected: Some(FragmentId(0))
                },
                completion: Some(Completion::Continue)
            }
        );
        assert_eq!(s.collected(), 1);
        assert!(s.frontend().events.contains(&FrontendEvent::FragmentCollected {
            display_id: 1,
            at: GridPos::new(2, 0)
        }));
    }

    #[tokio::test]
    async fn sequence_mode_rejects_empty_program() {
        let mut s = session(&level(GameplayMode::FullSequence));
        assert_eq!(
            s.start_execution(Vec::new()).await,
            Err(Rejection::EmptyProgram)
        );
        assert_eq!(s.frontend().last_dialog().unwrap().title, "Program error");
        assert_eq!(s.phase(), MissionPhase::Idle);
    }

    #[tokio::test]
    async fn full_sequence_rewinds_each_run() {
        let mut s = session(&level(GameplayMode::FullSequence));
        let out = s.start_execution(vec![F, F]).await.unwrap();
        assert_eq!(
            out,
            ExecutionOutcome::Finished {
                executed: 2,
                completion: Completion::NotMet
            }
        );
        assert_eq!(s.collected(), 1);
        assert!(!s.is_simulating());

        // Second attempt starts again from (0,0) with nothing collected.
        s.start_execution(vec![F]).await.unwrap();
        assert_eq!(s.rover().unwrap().pos, GridPos::new(1, 0));
        assert_eq!(s.collected(), 0);
        assert_eq!(s.state().segment_count, Some(1));
    }

    #[tokio::test]
    async fn full_sequence_success() {
        let mut s = session(&level(GameplayMode::FullSequence));
        // (0,0)→(2,0) collect, down to (2,2) collect, then to (5,5).
        let program = vec![F, F, R, F, F, F, F, F, L, F, F, F];
        for c in &program {
            s.issue_command(*c).unwrap();
        }
        assert_eq!(s.program().len(), program.len());
        let out = s.run_program().await.unwrap();
        assert_eq!(
            out,
            ExecutionOutcome::Finished {
                executed: 12,
                completion: Completion::Success
            }
        );
        assert_eq!(s.phase(), MissionPhase::MissionComplete);
        assert!(s.ready_for_analysis());
        assert_eq!(s.issue_command(F), Err(Rejection::MissionInactive));
    }

    #[tokio::test]
    async fn segment_not_met_keeps_index() {
        let mut s = session(&level(GameplayMode::SequencePerFragment));
        let out = s.start_execution(vec![F]).await.unwrap();
        assert_eq!(
            out,
            ExecutionOutcome::Finished {
                executed: 1,
                completion: Completion::NotMet
            }
        );
        assert_eq!(s.state().current_segment_index, 0);
        assert!(s.checkpoints().is_empty());
        assert_eq!(
            s.frontend().last_status(),
            Some(CompletionMessages::default().objective_not_met.as_str())
        );
    }

    #[tokio::test]
    async fn passing_over_target_without_stopping_is_not_met() {
        let mut s = session(&level(GameplayMode::SequencePerFragment));
        let out = s.start_execution(vec![F, F, F]).await.unwrap();
        assert!(matches!(
            out,
            ExecutionOutcome::Finished {
                completion: Completion::NotMet,
                ..
            }
        ));
        // The fragment was still picked up during the run.
        assert_eq!(s.collected(), 1);
    }

    #[tokio::test]
    async fn reset_program_offers_choice_after_checkpoint() {
        let mut s = session(&level(GameplayMode::SequencePerFragment));
        assert_eq!(s.reset_program(), Ok(ResetOutcome::LevelReloaded));

        s.start_execution(vec![F, F]).await.unwrap();
        assert_eq!(s.checkpoints().len(), 1);
        s.issue_command(R).unwrap();
        assert_eq!(s.reset_program(), Ok(ResetOutcome::ChoiceOffered));
        assert!(s.program().is_empty());
        let dialog = s.frontend().open_dialog.clone().unwrap();
        assert!(dialog.offers(DialogAction::ResetSegment));
        assert!(dialog.offers(DialogAction::ResetLevel));

        s.choose(DialogAction::ResetLevel).unwrap();
        assert!(s.checkpoints().is_empty());
        assert_eq!(s.state().current_segment_index, 0);
    }

    #[tokio::test]
    async fn reset_segment_without_checkpoint_goes_to_level_start() {
        let mut s = session(&level(GameplayMode::SequencePerFragment));
        s.start_execution(vec![F, F, F]).await.unwrap();
        s.reset_current_segment().unwrap();
        assert_eq!(s.rover().unwrap().pos, GridPos::new(0, 0));
        assert_eq!(s.collected(), 0);
        assert!(s.fragments().iter().all(|f| !f.collected));
    }

    #[tokio::test]
    async fn dialog_actions_must_be_offered() {
        let mut s = session(&level(GameplayMode::SequencePerFragment));
        assert_eq!(
            s.choose(DialogAction::NextMission),
            Err(Rejection::NotOffered(DialogAction::NextMission))
        );
        assert_eq!(s.level_id(), 1);
        assert_eq!(s.phase(), MissionPhase::Idle);

        s.start_execution(vec![F, F]).await.unwrap();
        s.start_execution(vec![R, F, F]).await.unwrap();
        s.start_execution(vec![L, F, F, F, R, F, F, F]).await.unwrap();
        assert!(s.ready_for_analysis());

        assert_eq!(
            s.choose(DialogAction::ResetSegment),
            Err(Rejection::NotOffered(DialogAction::ResetSegment))
        );
        assert_eq!(s.reset_current_segment(), Err(Rejection::MissionInactive));
        assert_eq!(s.rover().unwrap().pos, GridPos::new(5, 5));
        assert_eq!(s.phase(), MissionPhase::MissionComplete);
        assert!(s.ready_for_analysis());
        s.request_analysis().unwrap();
        assert_eq!(
            s.choose(DialogAction::ResetLevel),
            Err(Rejection::NotOffered(DialogAction::ResetLevel))
        );
    }

    #[tokio::test]
    async fn answered_dialog_cannot_be_answered_again() {
        let mut s = session(&level(GameplayMode::SequencePerFragment));
        s.start_execution(vec![F, F]).await.unwrap();
        assert_eq!(s.reset_program(), Ok(ResetOutcome::ChoiceOffered));
        s.choose(DialogAction::Cancel).unwrap();
        assert_eq!(
            s.choose(DialogAction::ResetSegment),
            Err(Rejection::NotOffered(DialogAction::ResetSegment))
        );
        assert_eq!(s.checkpoints().len(), 1);
        assert_eq!(s.rover().unwrap().pos, GridPos::new(2, 0));
    }

    #[test]
    fn segment_reset_needs_a_segmented_level() {
        let mut s = session(&level(GameplayMode::FullSequence));
        assert_eq!(s.reset_current_segment(), Err(Rejection::NotSegmented));
    }

    #[tokio::test]
    async fn lab_segment_with_missing_fragment() {
        let mut lvl = level(GameplayMode::SequencePerFragment);
        lvl.segment_targets = vec![SegmentTarget::Fragment(0), SegmentTarget::Lab];
        let mut s = session(&lvl);
        s.start_execution(vec![F, F]).await.unwrap();
        // (2,0) → (5,5) avoiding (2,2): east to (5,0), then south.
        let out = s
            .start_execution(vec![F, F, F, R, F, F, F, F, F])
            .await
            .unwrap();
        assert_eq!(
            out,
            ExecutionOutcome::Finished {
                executed: 9,
                completion: Completion::MissingFragments(1)
            }
        );
        assert!(s.is_mission_active());
        assert!(!s.ready_for_analysis());
        assert_eq!(s.state().current_segment_index, 1);
    }

    #[test]
    fn analysis_rejected_before_completion() {
        let mut s = session(&level(GameplayMode::DirectControl));
        assert_eq!(s.request_analysis(), Err(Rejection::AnalysisNotReady));
        assert_eq!(
            s.frontend().last_dialog().unwrap().title,
            "Analysis impossible"
        );
        assert_eq!(s.phase(), MissionPhase::Idle);
    }

    struct Silent;

    impl AnalysisSource for Silent {
        fn analyze(&mut self, _level: &LevelDescriptor) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn analysis_falls_back_when_source_is_silent() {
        let lvl = level(GameplayMode::FullSequence);
        let source = MemoryLevels::new().with_level(&lvl);
        let mut s = MissionSession::new(
            source,
            Transcript::new(),
            SessionConfig::default().unpaced(),
        )
        .with_analyst(Silent);
        s.start().unwrap();
        s.start_execution(vec![F, F, R, F, F, F, F, F, L, F, F, F])
            .await
            .unwrap();
        let report = s.request_analysis().unwrap();
        assert_eq!(report, scripted_report(&lvl));
        assert!(s
            .frontend()
            .last_dialog()
            .unwrap()
            .offers(DialogAction::NextMission));
    }

    #[test]
    fn controls_follow_state() {
        let s = session(&level(GameplayMode::SequencePerFragment));
        let controls = s.frontend().last_controls().unwrap();
        assert_eq!(controls, &s.state());
        assert_eq!(controls.segment_count, Some(3));
        assert_eq!(
            controls.gameplay_mode,
            Some(GameplayMode::SequencePerFragment)
        );
        assert!(controls.mission_active);
    }

    #[test]
    fn resize_redraws_only_when_active() {
        let mut lvl = level(GameplayMode::DirectControl);
        lvl.intro_dialogs = vec![DialogLine {
            speaker: Speaker::Console,
            message: "boot".into(),
        }];
        let mut s = session(&lvl);
        let before = s.frontend().draw_count();
        s.handle_resize();
        assert_eq!(s.frontend().draw_count(), before);
        s.advance_intro().unwrap();
        s.handle_resize();
        assert_eq!(s.frontend().draw_count(), before + 1);
    }
}
