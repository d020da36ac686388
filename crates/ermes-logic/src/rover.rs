//! Grid rover kinematics with a visited-cell trail.
//!
//! The rover never leaves the grid: a forward move that would cross the
//! border is refused and reported as `false` ("border collision"), leaving
//! the rover untouched. Turning always succeeds.

use serde::{Deserialize, Serialize};

use crate::grid::{GridPos, GridSize, Heading};

pub const DEFAULT_ROVER_COLOR: &str = "#63B3ED";

fn default_rover_color() -> String {
    DEFAULT_ROVER_COLOR.to_string()
}

/// Starting configuration of the rover, as written in a level descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoverConfig {
    pub x: i32,
    pub y: i32,
    /// Heading in degrees (0, 90, 180 or 270).
    pub angle: Heading,
    /// Presentation tag only.
    #[serde(default = "default_rover_color")]
    pub color: String,
}

impl RoverConfig {
    pub fn position(&self) -> GridPos {
        GridPos::new(self.x, self.y)
    }
}

/// Live rover state.
///
/// `Clone` is a full deep copy: checkpoints hold their own `Rover` and share
/// nothing with the live one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rover {
    pub pos: GridPos,
    pub heading: Heading,
    pub color: String,
    /// Visited cells in visit order. May contain duplicates.
    pub trail: Vec<GridPos>,
}

impl Rover {
    /// Create a rover at the configured start. Bounds are the caller's concern.
    pub fn new(config: &RoverConfig) -> Self {
        let pos = config.position();
        Self {
            pos,
            heading: config.angle,
            color: config.color.clone(),
            trail: vec![pos],
        }
    }

    pub fn position(&self) -> GridPos {
        self.pos
    }

    /// Advance one cell along the current heading.
    ///
    /// Returns `false` (and changes nothing) if the target cell is outside
    /// `grid`.
    pub fn move_forward(&mut self, grid: GridSize) -> bool {
        let target = self.pos.step(self.heading);
        if !grid.contains(target) {
            return false;
        }
        self.pos = target;
        self.trail.push(target);
        true
    }

    pub fn turn_left(&mut self) {
        self.heading = self.heading.left();
    }

    pub fn turn_right(&mut self) {
        self.heading = self.heading.right();
    }

    /// Truncate the trail to the current cell so a new segment starts clean.
    pub fn reset_trail(&mut self) {
        self.trail.clear();
        self.trail.push(self.pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(x: i32, y: i32, angle: Heading) -> RoverConfig {
        RoverConfig {
            x,
            y,
            angle,
            color: default_rover_color(),
        }
    }

    #[test]
    fn new_rover_has_single_trail_entry() {
        let rover = Rover::new(&config(2, 3, Heading::West));
        assert_eq!(rover.pos, GridPos::new(2, 3));
        assert_eq!(rover.heading, Heading::West);
        assert_eq!(rover.trail, vec![GridPos::new(2, 3)]);
    }

    #[test]
    fn forward_appends_to_trail() {
        let mut rover = Rover::new(&config(0, 0, Heading::East));
        let grid = GridSize::new(4, 4);
        assert!(rover.move_forward(grid));
        assert!(rover.move_forward(grid));
        assert_eq!(rover.pos, GridPos::new(2, 0));
        assert_eq!(
            rover.trail,
            vec![GridPos::new(0, 0), GridPos::new(1, 0), GridPos::new(2, 0)]
        );
    }

    #[test]
    fn border_collision_leaves_rover_unchanged() {
        let grid = GridSize::new(3, 3);
        let mut rover = Rover::new(&config(0, 0, Heading::North));
        let before = rover.clone();
        assert!(!rover.move_forward(grid));
        assert_eq!(rover, before);

        rover.turn_left(); // West
        assert!(!rover.move_forward(grid));
        assert_eq!(rover.pos, GridPos::new(0, 0));
        assert_eq!(rover.trail.len(), 1);
    }

    #[test]
    fn reset_trail_keeps_current_cell() {
        let mut rover = Rover::new(&config(0, 0, Heading::South));
        let grid = GridSize::new(5, 5);
        rover.move_forward(grid);
        rover.move_forward(grid);
        rover.reset_trail();
        assert_eq!(rover.trail, vec![GridPos::new(0, 2)]);
    }

    #[test]
    fn clone_is_independent() {
        let mut live = Rover::new(&config(1, 1, Heading::East));
        let snapshot = live.clone();
        live.move_forward(GridSize::new(5, 5));
        live.turn_right();
        assert_eq!(snapshot.pos, GridPos::new(1, 1));
        assert_eq!(snapshot.heading, Heading::East);
        assert_eq!(snapshot.trail.len(), 1);
    }

    #[test]
    fn config_color_defaults_when_missing() {
        let cfg: RoverConfig =
            serde_json::from_str(r#"{"x":0,"y":0,"angle":0,"trail":[]}"#).unwrap();
        assert_eq!(cfg.color, DEFAULT_ROVER_COLOR);
        assert_eq!(cfg.angle, Heading::East);
    }

    fn arb_step() -> impl Strategy<Value = u8> {
        0u8..3
    }

    proptest! {
        #[test]
        fn rover_stays_in_bounds(
            w in 1i32..10,
            h in 1i32..10,
            sx in 0i32..10,
            sy in 0i32..10,
            start in 0usize..4,
            steps in prop::collection::vec(arb_step(), 0..200),
        ) {
            let grid = GridSize::new(w, h);
            let mut rover = Rover::new(&config(sx % w, sy % h, Heading::ALL[start]));
            for step in steps {
                match step {
                    0 => { rover.move_forward(grid); }
                    1 => rover.turn_left(),
                    _ => rover.turn_right(),
                }
                prop_assert!(grid.contains(rover.pos));
            }
            prop_assert!(rover.trail.iter().all(|p| grid.contains(*p)));
        }

        #[test]
        fn turns_are_closed(start in 0usize..4) {
            let h = Heading::ALL[start];
            let mut rover = Rover::new(&config(0, 0, h));
            rover.turn_left();
            rover.turn_right();
            prop_assert_eq!(rover.heading, h);
            rover.turn_right();
            rover.turn_left();
            prop_assert_eq!(rover.heading, h);
            for _ in 0..4 {
                rover.turn_left();
            }
            prop_assert_eq!(rover.heading, h);
        }
    }
}
