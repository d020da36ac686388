//! Ermes Headless Campaign Harness
//!
//! Loads every level, checks the descriptors, then plays the whole campaign
//! through the public session API with a simple route planner.
//! Runs entirely in-process, no rendering.
//!
//! Usage:
//!   cargo run -p ermes-simtest
//!   cargo run -p ermes-simtest -- --verbose --fast --seed 42
//!   cargo run -p ermes-simtest -- --levels data/levels --config session.json

use std::path::PathBuf;

use clap::Parser;
use ermes_logic::command::Command;
use ermes_logic::config::{validate_config, SessionConfig};
use ermes_logic::grid::{GridPos, Heading};
use ermes_logic::level::{validate_level, SegmentTarget};
use ermes_logic::mission::{ExecutionOutcome, LevelAdvance, MissionPhase, MissionSession};
use ermes_logic::presenter::Headless;
use ermes_logic::{BuiltinLevels, DirectoryLevels, GameplayMode, LevelSource, Rejection};

// ── Command line ────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "ermes-simtest")]
#[command(about = "Headless campaign harness for Ermes")]
struct Args {
    /// Print every check, and debug logs unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    /// Play sequences without pauses between steps
    #[arg(long)]
    fast: bool,

    /// Seed for random fragment placement
    #[arg(long, value_parser = clap::value_parser!(u64))]
    seed: Option<u64>,

    /// Read `level{N}.json` files from this directory instead of the bundled campaign
    #[arg(long, value_name = "DIR")]
    levels: Option<PathBuf>,

    /// Session config JSON file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<SessionConfig, String> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| format!("{}: {}", path.display(), e))?;
            serde_json::from_str(&json).map_err(|e| format!("{}: {}", path.display(), e))?
        }
        None => SessionConfig::default(),
    };
    if args.fast {
        config = config.unpaced();
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    let errors = validate_config(&config);
    if !errors.is_empty() {
        return Err(format!("invalid session config: {:?}", errors));
    }
    Ok(config)
}

fn level_source(args: &Args) -> Box<dyn LevelSource> {
    match &args.levels {
        Some(dir) => Box::new(DirectoryLevels::new(dir)),
        None => Box::new(BuiltinLevels),
    }
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    println!("=== Ermes Campaign Harness ===\n");
    let mut results = Vec::new();

    // 1. Level descriptors
    results.extend(validate_levels(&args));

    // 2. Command surface guards
    results.extend(validate_guards(&args, &config).await);

    // 3. Full campaign playthrough
    results.extend(play_campaign(&args, &config).await);

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || args.verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── 1. Level descriptors ────────────────────────────────────────────────

fn validate_levels(args: &Args) -> Vec<TestResult> {
    println!("--- Level Descriptors ---");
    let source = level_source(args);
    let mut results = Vec::new();

    let mut id = 1;
    loop {
        match source.fetch(id) {
            Ok(level) => {
                let issues = validate_level(&level);
                let placeable = level.fragment_config.requested() >= level.total_fragments_required;
                results.push(TestResult {
                    name: format!("level_{id}_valid"),
                    passed: issues.is_empty() && placeable,
                    detail: format!(
                        "{}x{} {}, {} fragment(s) required",
                        level.grid_width,
                        level.grid_height,
                        level.gameplay_mode,
                        level.total_fragments_required
                    ),
                });
                id += 1;
            }
            Err(e) if e.is_not_found() => break,
            Err(e) => {
                results.push(TestResult {
                    name: format!("level_{id}_valid"),
                    passed: false,
                    detail: e.to_string(),
                });
                break;
            }
        }
    }

    results.push(TestResult {
        name: "levels_present".into(),
        passed: id > 1,
        detail: format!("{} level(s) found", id - 1),
    });
    results
}

// ── 2. Guards ───────────────────────────────────────────────────────────

async fn validate_guards(args: &Args, config: &SessionConfig) -> Vec<TestResult> {
    println!("--- Command Guards ---");
    let mut results = Vec::new();
    let mut session = MissionSession::new(level_source(args), Headless, config.clone());

    results.push(TestResult {
        name: "uninitialized_rejects_commands".into(),
        passed: session.issue_command(Command::Forward) == Err(Rejection::NoLevelLoaded),
        detail: format!("phase {:?}", session.phase()),
    });

    if let Err(e) = session.start() {
        results.push(TestResult {
            name: "start_level_loads".into(),
            passed: false,
            detail: e.to_string(),
        });
        return results;
    }

    let intro = session.state().intro_active;
    results.push(TestResult {
        name: "intro_gates_commands".into(),
        passed: !intro || session.issue_command(Command::Forward) == Err(Rejection::IntroActive),
        detail: format!("intro active: {intro}"),
    });

    skip_intro(&mut session);
    results.push(TestResult {
        name: "analysis_needs_completion".into(),
        passed: session.request_analysis() == Err(Rejection::AnalysisNotReady),
        detail: format!("phase {:?}", session.phase()),
    });

    let mode = session.level().map(|l| l.gameplay_mode);
    let empty = session.start_execution(Vec::new()).await;
    let passed = match mode {
        Some(GameplayMode::DirectControl) => empty == Ok(ExecutionOutcome::PilotingStarted),
        _ => empty == Err(Rejection::EmptyProgram),
    };
    results.push(TestResult {
        name: "empty_execution".into(),
        passed,
        detail: format!("{:?} -> {:?}", mode, empty),
    });

    results
}

// ── 3. Campaign ─────────────────────────────────────────────────────────

async fn play_campaign(args: &Args, config: &SessionConfig) -> Vec<TestResult> {
    println!("--- Campaign ---");
    let mut results = Vec::new();
    let mut session = MissionSession::new(level_source(args), Headless, config.clone());

    if let Err(e) = session.start() {
        results.push(TestResult {
            name: "campaign_start".into(),
            passed: false,
            detail: e.to_string(),
        });
        return results;
    }

    loop {
        let id = session.level_id();
        skip_intro(&mut session);
        let played = autopilot(&mut session).await;
        let analysis = session.request_analysis();
        results.push(TestResult {
            name: format!("level_{id}_complete"),
            passed: played.is_ok() && analysis.is_ok(),
            detail: match (&played, &analysis) {
                (Ok(commands), Ok(_)) => format!("{} commands", commands),
                (Err(e), _) => e.clone(),
                (_, Err(e)) => e.to_string(),
            },
        });
        if played.is_err() || analysis.is_err() {
            return results;
        }

        match session.advance_level() {
            Ok(LevelAdvance::Loaded(next)) => log::info!("Level {} loaded", next),
            Ok(LevelAdvance::CampaignComplete) => break,
            Err(e) => {
                results.push(TestResult {
                    name: format!("level_{}_load", id + 1),
                    passed: false,
                    detail: e.to_string(),
                });
                return results;
            }
        }
    }

    results.push(TestResult {
        name: "campaign_complete".into(),
        passed: session.phase() == MissionPhase::CampaignComplete,
        detail: format!("finished after level {}", session.level_id()),
    });
    results
}

fn skip_intro(session: &mut MissionSession<Headless>) {
    while session.state().intro_active {
        if session.advance_intro().is_err() {
            break;
        }
    }
}

/// Play the loaded level to completion. Returns the number of commands used.
async fn autopilot(session: &mut MissionSession<Headless>) -> Result<usize, String> {
    let (mode, targets, base) = match session.level() {
        Some(level) => (
            level.gameplay_mode,
            level.segment_targets.clone(),
            level.lab_position,
        ),
        None => return Err("no level loaded".into()),
    };
    let (mut pos, mut heading) = match session.rover() {
        Some(rover) => (rover.pos, rover.heading),
        None => return Err("no rover".into()),
    };
    let fragments: Vec<GridPos> = session.fragments().iter().map(|f| f.pos).collect();
    let mut used = 0;

    match mode {
        GameplayMode::DirectControl => {
            session
                .start_execution(Vec::new())
                .await
                .map_err(|e| e.to_string())?;
            for stop in fragments.iter().copied().chain([base]) {
                let (commands, facing) = plan_route(pos, heading, stop);
                for command in commands {
                    session.issue_command(command).map_err(|e| e.to_string())?;
                    used += 1;
                }
                (pos, heading) = (stop, facing);
            }
        }
        GameplayMode::SequencePerFragment => {
            for target in targets {
                let stop = match target {
                    SegmentTarget::Lab => base,
                    SegmentTarget::Fragment(i) => *fragments
                        .get(i)
                        .ok_or_else(|| format!("segment targets missing fragment {i}"))?,
                };
                let (commands, facing) = plan_route(pos, heading, stop);
                used += commands.len();
                let outcome = session
                    .start_execution(commands)
                    .await
                    .map_err(|e| e.to_string())?;
                log::debug!("Segment towards {} -> {:?}", stop, outcome);
                (pos, heading) = (stop, facing);
            }
        }
        GameplayMode::FullSequence => {
            for stop in fragments.iter().copied().chain([base]) {
                let (commands, facing) = plan_route(pos, heading, stop);
                for command in commands {
                    session.issue_command(command).map_err(|e| e.to_string())?;
                }
                (pos, heading) = (stop, facing);
            }
            used = session.program().len();
            session.run_program().await.map_err(|e| e.to_string())?;
        }
    }

    if session.ready_for_analysis() {
        Ok(used)
    } else {
        Err(format!(
            "level {} not finished: {}/{} fragments, phase {:?}",
            session.level_id(),
            session.collected(),
            session.state().total_fragments_required,
            session.phase()
        ))
    }
}

/// Manhattan route: horizontal leg first, then vertical.
fn plan_route(from: GridPos, heading: Heading, to: GridPos) -> (Vec<Command>, Heading) {
    let mut commands = Vec::new();
    let mut facing = heading;
    let legs = [
        (to.x - from.x, Heading::East, Heading::West),
        (to.y - from.y, Heading::South, Heading::North),
    ];
    for (delta, ahead, back) in legs {
        if delta == 0 {
            continue;
        }
        let want = if delta > 0 { ahead } else { back };
        if facing.right() == want {
            commands.push(Command::TurnRight);
        } else if facing.left() == want {
            commands.push(Command::TurnLeft);
        } else if facing != want {
            commands.extend([Command::TurnRight, Command::TurnRight]);
        }
        facing = want;
        commands.extend(std::iter::repeat(Command::Forward).take(delta.unsigned_abs() as usize));
    }
    (commands, facing)
}
