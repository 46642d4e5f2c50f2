// engine.rs - Double-buffered multi-colour Game of Life

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::grid::{EngineError, GridConstraints, NeighbourOffsets};
use crate::random::RandomSource;

/// Owns the two state buffers and computes generation transitions.
///
/// A cell holding `death_color` is dead; any other value is a live cell of
/// that colour. Newborn and surviving cells take the plurality colour of
/// their live neighbours, falling back to `living_color` on a tie.
#[derive(Debug, Clone)]
pub struct GridEngine<R = StdRng> {
    constraints: GridConstraints,
    buffers: [Vec<i32>; 2],
    in_use: usize,
    generation: u64,
    neighbours: NeighbourOffsets,
    rng: R,
}

impl GridEngine<StdRng> {
    pub fn new(constraints: GridConstraints) -> Self {
        Self::with_rng(constraints, StdRng::from_entropy())
    }
}

impl Default for GridEngine<StdRng> {
    fn default() -> Self {
        Self::new(GridConstraints::default())
    }
}

impl<R: RandomSource> GridEngine<R> {
    pub fn with_rng(constraints: GridConstraints, rng: R) -> Self {
        let mut engine = Self {
            constraints,
            buffers: [Vec::new(), Vec::new()],
            in_use: 0,
            generation: 0,
            neighbours: NeighbourOffsets::default(),
            rng,
        };
        engine.reset();
        engine
    }

    /// Reallocates both buffers as all-dead boards and rewinds the generation count.
    pub fn reset(&mut self) {
        let size = self.constraints.cell_count();
        let death = self.constraints.death_color;
        self.buffers = [vec![death; size], vec![death; size]];
        self.in_use = 0;
        self.generation = 0;
    }

    /// Drops `floor(0.3 * rows * cols)` living cells on random grid indices.
    ///
    /// Draws may collide, so the resulting density is at most 30%. Only the
    /// grid part of a buffer installed by `set_state` is touched.
    pub fn randomize(&mut self) {
        let living = self.constraints.living_color;
        let cells = self.constraints.cell_count();
        let range = cells.min(self.buffers[self.in_use].len());
        if range == 0 {
            return;
        }

        for _ in 0..cells * 3 / 10 {
            let index = self.rng.next_index(range);
            self.buffers[self.in_use][index] = living;
        }
    }

    /// Advances one generation, reading only the pre-tick buffer.
    pub fn tick(&mut self) {
        let next = (self.in_use + 1) % 2;
        let [front, back] = &mut self.buffers;
        let (source, destination) = if self.in_use == 0 {
            (&*front, back)
        } else {
            (&*back, front)
        };

        destination.clear();
        destination.extend(
            (0..source.len()).map(|index| next_cell_state(&self.constraints, &self.neighbours, source, index)),
        );

        self.in_use = next;
        self.generation += 1;
    }

    /// The live buffer. Callers wanting to keep it should copy it.
    pub fn state(&self) -> &[i32] {
        &self.buffers[self.in_use]
    }

    /// Replaces the live buffer, resizing the spare one to match.
    ///
    /// Constraints are left untouched; cells beyond `rows * cols` are not
    /// part of the grid and die on the next tick.
    pub fn set_state(&mut self, state: Vec<i32>) {
        let spare = (self.in_use + 1) % 2;
        self.buffers[spare] = vec![self.constraints.death_color; state.len()];
        self.buffers[self.in_use] = state;
    }

    pub fn constraints(&self) -> &GridConstraints {
        &self.constraints
    }

    /// Installs new constraints; any actual change reallocates (and clears) the board.
    pub fn set_constraints(&mut self, constraints: GridConstraints) -> Result<(), EngineError> {
        constraints.validate()?;
        if constraints != self.constraints {
            self.constraints = constraints;
            self.reset();
        }
        Ok(())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of cells not holding the death colour.
    pub fn population(&self) -> usize {
        let death = self.constraints.death_color;
        self.state().iter().filter(|&&cell| cell != death).count()
    }

    pub fn neighbours(&self) -> &NeighbourOffsets {
        &self.neighbours
    }
}

fn next_cell_state(
    constraints: &GridConstraints,
    neighbours: &NeighbourOffsets,
    source: &[i32],
    index: usize,
) -> i32 {
    if index >= constraints.cell_count() {
        return constraints.death_color;
    }

    let current_alive = source[index] != constraints.death_color;
    let (x, y) = constraints.coords(index);

    let mut tally = ColourTally::default();
    for offset in neighbours.iter() {
        if let Some(&colour) = constraints
            .neighbour(x, y, offset)
            .and_then(|neighbour| source.get(neighbour))
        {
            if colour != constraints.death_color {
                tally.add(colour);
            }
        }
    }

    #[rustfmt::skip]
    let next_alive = match (current_alive, tally.total()) {
        (true, 2) | (true, 3) => true, // Survival
        (false, 3)            => true, // Birth
        _                     => false, // Death or stays dead
    };

    if next_alive {
        tally
            .plurality(constraints.living_color)
            .unwrap_or(constraints.death_color)
    } else {
        constraints.death_color
    }
}

/// Per-colour counts of live neighbours; at most eight distinct entries.
#[derive(Debug, Default)]
struct ColourTally {
    entries: [(i32, u8); 8],
    len: usize,
}

impl ColourTally {
    fn add(&mut self, colour: i32) {
        let seen = &mut self.entries[..self.len];
        if let Some(entry) = seen.iter_mut().find(|(known, _)| *known == colour) {
            entry.1 += 1;
        } else {
            self.entries[self.len] = (colour, 1);
            self.len += 1;
        }
    }

    fn total(&self) -> u8 {
        self.entries[..self.len].iter().map(|&(_, count)| count).sum()
    }

    /// Most common colour, or `neutral` when the top two counts are equal.
    fn plurality(&self, neutral: i32) -> Option<i32> {
        let mut best: Option<(i32, u8)> = None;
        let mut runner_up = 0;

        for &(colour, count) in &self.entries[..self.len] {
            match best {
                Some((_, top)) if count > top => {
                    runner_up = top;
                    best = Some((colour, count));
                }
                Some(_) => runner_up = runner_up.max(count),
                None => best = Some((colour, count)),
            }
        }

        best.map(|(colour, top)| if top > runner_up { colour } else { neutral })
    }
}
