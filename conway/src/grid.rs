// grid.rs - Grid types for the multi-colour Game of Life

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the engine when it is handed an unusable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The dead marker doubles as a living colour, so cells could never be classified.
    #[error("living colour {0:#08x} collides with the death colour")]
    ColorCollision(i32),
}

/// Board dimensions, topology and palette.
///
/// Serialized with the camelCase field names used on the wire
/// (`rows`, `cols`, `isTorus`, `livingColor`, `deathColor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridConstraints {
    pub rows: usize,
    pub cols: usize,
    /// Opposite edges are neighbours when set.
    pub is_torus: bool,
    /// Neutral colour, also used when two species tie for a newborn cell.
    pub living_color: i32,
    pub death_color: i32,
}

impl Default for GridConstraints {
    fn default() -> Self {
        Self {
            rows: 64,
            cols: 64,
            is_torus: true,
            living_color: 0xFF_FF_FF,
            death_color: 0x00_00_00,
        }
    }
}

impl GridConstraints {
    /// A `rows` x `cols` board with the default palette and bounded edges.
    pub fn bounded(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            is_torus: false,
            ..Default::default()
        }
    }

    /// Same board, wrapping (or not) at the edges.
    pub fn with_torus(self, is_torus: bool) -> Self {
        Self { is_torus, ..self }
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Maps a buffer index to `(x, y)`, i.e. `(index % cols, index / cols)`.
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.cols, index / self.cols)
    }

    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.cols + x
    }

    /// Resolves the neighbour of `(x, y)` at `offset`, wrapping on a torus and
    /// discarding out-of-bounds positions otherwise.
    pub fn neighbour(&self, x: usize, y: usize, offset: (isize, isize)) -> Option<usize> {
        let (cols, rows) = (self.cols as isize, self.rows as isize);
        if cols == 0 || rows == 0 {
            return None;
        }

        let mut nx = x as isize + offset.0;
        let mut ny = y as isize + offset.1;
        if self.is_torus {
            nx = nx.rem_euclid(cols);
            ny = ny.rem_euclid(rows);
        }

        if nx < 0 || nx >= cols || ny < 0 || ny >= rows {
            return None;
        }
        Some(self.index(nx as usize, ny as usize))
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.living_color == self.death_color {
            return Err(EngineError::ColorCollision(self.living_color));
        }
        Ok(())
    }
}

/// The eight Moore-neighbourhood offsets as `(dx, dy)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighbourOffsets([(isize, isize); 8]);

impl Default for NeighbourOffsets {
    #[rustfmt::skip]
    fn default() -> Self {
        Self([
            (-1, -1), (0, -1), (1, -1),
            (-1,  0),          (1,  0),
            (-1,  1), (0,  1), (1,  1),
        ])
    }
}

impl NeighbourOffsets {
    pub fn iter(&self) -> impl Iterator<Item = (isize, isize)> + '_ {
        self.0.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coords_follow_row_major_layout() {
        let constraints = GridConstraints::bounded(3, 5);
        assert_eq!(constraints.coords(0), (0, 0));
        assert_eq!(constraints.coords(7), (2, 1));
        assert_eq!(constraints.index(2, 1), 7);
    }

    #[test]
    fn test_bounded_neighbour_is_discarded() {
        let constraints = GridConstraints::bounded(4, 4);
        assert_eq!(constraints.neighbour(0, 0, (-1, -1)), None);
        assert_eq!(constraints.neighbour(3, 3, (1, 0)), None);
        assert_eq!(constraints.neighbour(1, 1, (1, 1)), Some(10));
    }

    #[test]
    fn test_torus_neighbour_wraps_both_axes() {
        let constraints = GridConstraints::bounded(4, 6).with_torus(true);
        // (0,0) sees (cols-1, rows-1) diagonally
        assert_eq!(constraints.neighbour(0, 0, (-1, -1)), Some(constraints.index(5, 3)));
    }

    #[test]
    fn test_empty_grid_has_no_neighbours() {
        let constraints = GridConstraints::bounded(0, 0).with_torus(true);
        assert_eq!(constraints.neighbour(0, 0, (1, 1)), None);
    }

    #[test]
    fn test_colour_collision_is_rejected() {
        let constraints = GridConstraints {
            living_color: 7,
            death_color: 7,
            ..Default::default()
        };
        assert_eq!(constraints.validate(), Err(EngineError::ColorCollision(7)));
        assert!(GridConstraints::default().validate().is_ok());
    }

    #[test]
    fn test_offsets_exclude_centre() {
        let offsets = NeighbourOffsets::default();
        assert_eq!(offsets.iter().count(), 8);
        assert!(offsets.iter().all(|offset| offset != (0, 0)));
    }
}
