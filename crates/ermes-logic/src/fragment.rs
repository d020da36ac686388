//! Fragment placement and collection.
//!
//! Fragments are placed once per level initialization, either at fixed
//! positions or by rejection sampling. Positions never change afterwards;
//! resets only clear the `collected` flag.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::grid::{GridPos, GridSize};

pub const DEFAULT_FRAGMENT_COLOR: &str = "#F6E05E";

fn default_fragment_color() -> String {
    DEFAULT_FRAGMENT_COLOR.to_string()
}

/// Stable internal fragment identifier (its placement index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(pub u32);

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frag-{}", self.0)
    }
}

/// How a level places its fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FragmentConfig {
    /// Uniformly random cells, avoiding `avoid` and each other.
    Random {
        count: usize,
        #[serde(default = "default_fragment_color")]
        color: String,
        #[serde(default)]
        avoid: Vec<GridPos>,
    },
    /// One fragment per listed position, in order.
    Fixed {
        positions: Vec<GridPos>,
        #[serde(default = "default_fragment_color")]
        color: String,
    },
}

impl FragmentConfig {
    /// Number of fragments this config asks for.
    pub fn requested(&self) -> usize {
        match self {
            Self::Random { count, .. } => *count,
            Self::Fixed { positions, .. } => positions.len(),
        }
    }
}

/// A collectible point on the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    /// 1-based number shown to the player.
    pub display_id: u32,
    pub pos: GridPos,
    pub collected: bool,
    pub color: String,
}

impl Fragment {
    fn new(index: usize, pos: GridPos, color: &str) -> Self {
        Self {
            id: FragmentId(index as u32),
            display_id: index as u32 + 1,
            pos,
            collected: false,
            color: color.to_string(),
        }
    }
}

/// Result of a placement run.
#[derive(Debug, Clone)]
pub struct Placement {
    pub fragments: Vec<Fragment>,
    pub requested: usize,
}

impl Placement {
    /// How many fragments could not be placed (random mode on crowded grids).
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.fragments.len())
    }

    pub fn is_short(&self) -> bool {
        self.shortfall() > 0
    }
}

/// Place fragments for a level.
///
/// `avoid` is merged with the config's own avoid list in random mode; fixed
/// positions are taken as written. Random sampling gives up after
/// `2 × width × height` attempts, so the result may hold fewer fragments
/// than requested; check [`Placement::is_short`].
pub fn place_fragments<R: Rng + ?Sized>(
    config: &FragmentConfig,
    grid: GridSize,
    avoid: &[GridPos],
    rng: &mut R,
) -> Placement {
    match config {
        FragmentConfig::Fixed { positions, color } => Placement {
            fragments: positions
                .iter()
                .enumerate()
                .map(|(i, &pos)| Fragment::new(i, pos, color))
                .collect(),
            requested: positions.len(),
        },
        FragmentConfig::Random {
            count,
            color,
            avoid: config_avoid,
        } => {
            let mut blocked: HashSet<GridPos> =
                avoid.iter().chain(config_avoid.iter()).copied().collect();
            let mut fragments = Vec::with_capacity((*count).min(grid.cell_count()));
            let max_attempts = grid.cell_count() * 2;
            let mut attempts = 0;

            while fragments.len() < *count && attempts < max_attempts {
                attempts += 1;
                let pos = GridPos::new(rng.gen_range(0..grid.width), rng.gen_range(0..grid.height));
                if blocked.insert(pos) {
                    fragments.push(Fragment::new(fragments.len(), pos, color));
                }
            }

            let placement = Placement {
                fragments,
                requested: *count,
            };
            if placement.is_short() {
                log::warn!(
                    "Could only place {}/{} random fragments after {} attempts",
                    placement.fragments.len(),
                    count,
                    attempts
                );
            }
            placement
        }
    }
}

/// Mark every fragment uncollected. Positions are untouched.
pub fn reset_collected(fragments: &mut [Fragment]) {
    for fragment in fragments {
        fragment.collected = false;
    }
}

/// Set `collected` from an explicit id set (checkpoint restore).
pub fn restore_collected(fragments: &mut [Fragment], collected: &BTreeSet<FragmentId>) {
    for fragment in fragments {
        fragment.collected = collected.contains(&fragment.id);
    }
}

pub fn collected_count(fragments: &[Fragment]) -> usize {
    fragments.iter().filter(|f| f.collected).count()
}

pub fn collected_ids(fragments: &[Fragment]) -> BTreeSet<FragmentId> {
    fragments
        .iter()
        .filter(|f| f.collected)
        .map(|f| f.id)
        .collect()
}

/// Collect the first uncollected fragment at `pos`, in creation order.
///
/// At most one fragment is collected per call.
pub fn check_collision(pos: GridPos, fragments: &mut [Fragment]) -> Option<FragmentId> {
    let fragment = fragments
        .iter_mut()
        .find(|f| !f.collected && f.pos == pos)?;
    fragment.collected = true;
    Some(fragment.id)
}
