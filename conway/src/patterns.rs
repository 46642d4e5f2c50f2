// patterns.rs - Classic seed patterns, laid out as (row, col) offsets

use crate::grid::GridConstraints;

pub struct Pattern {
    pub name: &'static str,
    pub cells: &'static [(usize, usize)],
}

pub const PATTERNS: &[Pattern] = &[
    Pattern {
        name: "Glider",
        cells: &[(0, 1), (1, 2), (2, 0), (2, 1), (2, 2)],
    },
    Pattern {
        name: "Blinker",
        cells: &[(0, 0), (0, 1), (0, 2)],
    },
    Pattern {
        name: "Toad",
        cells: &[(0, 1), (0, 2), (0, 3), (1, 0), (1, 1), (1, 2)],
    },
    Pattern {
        name: "Beacon",
        cells: &[(0, 0), (0, 1), (1, 0), (1, 1), (2, 2), (2, 3), (3, 2), (3, 3)],
    },
    Pattern {
        name: "Pulsar",
        cells: &[
            // Top half
            (0, 2), (0, 3), (0, 4), (0, 8), (0, 9), (0, 10),
            (2, 0), (2, 5), (2, 7), (2, 12),
            (3, 0), (3, 5), (3, 7), (3, 12),
            (4, 0), (4, 5), (4, 7), (4, 12),
            (5, 2), (5, 3), (5, 4), (5, 8), (5, 9), (5, 10),
            // Bottom half (mirrored)
            (7, 2), (7, 3), (7, 4), (7, 8), (7, 9), (7, 10),
            (8, 0), (8, 5), (8, 7), (8, 12),
            (9, 0), (9, 5), (9, 7), (9, 12),
            (10, 0), (10, 5), (10, 7), (10, 12),
            (12, 2), (12, 3), (12, 4), (12, 8), (12, 9), (12, 10),
        ],
    },
    Pattern {
        name: "R-pentomino",
        cells: &[(0, 1), (0, 2), (1, 0), (1, 1), (2, 1)],
    },
    Pattern {
        name: "Gosper Glider Gun",
        cells: &[
            (4, 0), (4, 1), (5, 0), (5, 1),
            (4, 10), (5, 10), (6, 10), (3, 11), (7, 11), (2, 12), (8, 12),
            (2, 13), (8, 13), (5, 14), (3, 15), (7, 15), (4, 16), (5, 16),
            (6, 16), (5, 17), (2, 20), (3, 20), (4, 20), (2, 21), (3, 21),
            (4, 21), (1, 22), (5, 22), (0, 24), (1, 24), (5, 24), (6, 24),
            (2, 34), (3, 34), (2, 35), (3, 35),
        ],
    },
];

impl Pattern {
    /// Height and width of the pattern's bounding box.
    pub fn extent(&self) -> (usize, usize) {
        self.cells.iter().fold((0, 0), |(rows, cols), &(row, col)| {
            (rows.max(row + 1), cols.max(col + 1))
        })
    }

    /// A fresh board with the pattern centred on it, painted in the living colour.
    /// Cells that fall outside the board are dropped.
    pub fn stamp(&self, constraints: &GridConstraints) -> Vec<i32> {
        let mut state = vec![constraints.death_color; constraints.cell_count()];
        let (height, width) = self.extent();
        let top = constraints.rows.saturating_sub(height) / 2;
        let left = constraints.cols.saturating_sub(width) / 2;

        for &(row, col) in self.cells {
            let (y, x) = (top + row, left + col);
            if y < constraints.rows && x < constraints.cols {
                state[constraints.index(x, y)] = constraints.living_color;
            }
        }
        state
    }
}

pub fn find(name: &str) -> Option<&'static Pattern> {
    PATTERNS.iter().find(|pattern| pattern.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GridEngine;

    #[test]
    fn test_stamp_centres_pattern() {
        let constraints = GridConstraints::bounded(5, 5);
        let blinker = find("blinker").unwrap();
        let state = blinker.stamp(&constraints);

        let live: Vec<usize> = (0..state.len())
            .filter(|&index| state[index] != constraints.death_color)
            .collect();
        assert_eq!(live, vec![11, 12, 13]);
    }

    #[test]
    fn test_stamp_clips_oversized_pattern() {
        let constraints = GridConstraints::bounded(8, 8);
        let gun = find("Gosper Glider Gun").unwrap();
        let state = gun.stamp(&constraints);

        assert_eq!(state.len(), 64);
        assert!(state.iter().any(|&cell| cell == constraints.living_color));
    }

    #[test]
    fn test_pulsar_has_period_three() {
        let constraints = GridConstraints::bounded(17, 17);
        let mut engine = GridEngine::new(constraints);
        let start = find("Pulsar").unwrap().stamp(&constraints);
        engine.set_state(start.clone());

        engine.tick();
        assert_ne!(engine.state(), start.as_slice());
        engine.tick();
        engine.tick();
        assert_eq!(engine.state(), start.as_slice());
    }

    #[test]
    fn test_every_pattern_fits_default_board() {
        let constraints = GridConstraints::default();
        for pattern in PATTERNS {
            let (height, width) = pattern.extent();
            assert!(height <= constraints.rows && width <= constraints.cols, "{}", pattern.name);
        }
    }
}
