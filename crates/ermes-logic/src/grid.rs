//! Integer grid primitives: cells, bounds and the discrete headings.
//!
//! Coordinates follow screen convention: `x` grows to the right, `y` grows
//! downwards. Headings are measured in degrees clockwise from "facing +x",
//! so 90° points down the screen.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A cell on the mission grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one step along `heading`.
    pub fn step(self, heading: Heading) -> Self {
        let (dx, dy) = heading.delta();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Grid dimensions. Valid cells are `[0, width) × [0, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub width: i32,
    pub height: i32,
}

impl GridSize {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.x < self.width && pos.y >= 0 && pos.y < self.height
    }

    /// Number of cells on the grid (zero for degenerate sizes).
    pub fn cell_count(&self) -> usize {
        if self.width <= 0 || self.height <= 0 {
            0
        } else {
            self.width as usize * self.height as usize
        }
    }
}

/// Discrete rover heading.
///
/// Serialized as its angle in degrees (`0`, `90`, `180`, `270`); any other
/// angle is rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Heading {
    /// 0°, facing +x.
    East,
    /// 90°, facing +y.
    South,
    /// 180°, facing -x.
    West,
    /// 270°, facing -y.
    North,
}

impl Heading {
    pub const ALL: [Heading; 4] = [Self::East, Self::South, Self::West, Self::North];

    pub fn degrees(self) -> u16 {
        match self {
            Self::East => 0,
            Self::South => 90,
            Self::West => 180,
            Self::North => 270,
        }
    }

    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Self::East),
            90 => Some(Self::South),
            180 => Some(Self::West),
            270 => Some(Self::North),
            _ => None,
        }
    }

    /// Unit step in grid coordinates.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::East => (1, 0),
            Self::South => (0, 1),
            Self::West => (-1, 0),
            Self::North => (0, -1),
        }
    }

    /// Rotate 90° counter-clockwise.
    pub fn left(self) -> Self {
        match self {
            Self::East => Self::North,
            Self::North => Self::West,
            Self::West => Self::South,
            Self::South => Self::East,
        }
    }

    /// Rotate 90° clockwise.
    pub fn right(self) -> Self {
        match self {
            Self::East => Self::South,
            Self::South => Self::West,
            Self::West => Self::North,
            Self::North => Self::East,
        }
    }
}

impl TryFrom<u16> for Heading {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        Self::from_degrees(degrees)
            .ok_or_else(|| format!("heading must be 0, 90, 180 or 270 degrees, got {degrees}"))
    }
}

impl From<Heading> for u16 {
    fn from(heading: Heading) -> Self {
        heading.degrees()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrees_roundtrip() {
        for h in Heading::ALL {
            assert_eq!(Heading::from_degrees(h.degrees()), Some(h));
        }
        assert_eq!(Heading::from_degrees(45), None);
        assert_eq!(Heading::from_degrees(360), None);
    }

    #[test]
    fn deltas_match_clockwise_convention() {
        assert_eq!(Heading::East.delta(), (1, 0));
        assert_eq!(Heading::South.delta(), (0, 1));
        assert_eq!(Heading::West.delta(), (-1, 0));
        assert_eq!(Heading::North.delta(), (0, -1));
    }

    #[test]
    fn right_adds_ninety_degrees() {
        for h in Heading::ALL {
            assert_eq!(h.right().degrees(), (h.degrees() + 90) % 360);
            assert_eq!(h.left().degrees(), (h.degrees() + 270) % 360);
        }
    }

    #[test]
    fn heading_parses_from_json_degrees() {
        let h: Heading = serde_json::from_str("270").unwrap();
        assert_eq!(h, Heading::North);
        assert!(serde_json::from_str::<Heading>("45").is_err());
        assert_eq!(serde_json::to_string(&Heading::South).unwrap(), "90");
    }

    #[test]
    fn grid_bounds() {
        let size = GridSize::new(6, 4);
        assert!(size.contains(GridPos::new(0, 0)));
        assert!(size.contains(GridPos::new(5, 3)));
        assert!(!size.contains(GridPos::new(6, 0)));
        assert!(!size.contains(GridPos::new(0, 4)));
        assert!(!size.contains(GridPos::new(-1, 2)));
        assert_eq!(size.cell_count(), 24);
        assert_eq!(GridSize::new(0, 5).cell_count(), 0);
    }

    #[test]
    fn step_moves_one_cell() {
        let p = GridPos::new(2, 2);
        assert_eq!(p.step(Heading::East), GridPos::new(3, 2));
        assert_eq!(p.step(Heading::North), GridPos::new(2, 1));
    }
}
