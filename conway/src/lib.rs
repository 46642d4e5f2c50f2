//! Multi-colour Conway's Game of Life.
//!
//! Cells hold a colour instead of a flag: the death colour marks an empty
//! cell and every other value is a living species. Births and survivals
//! follow B3/S23, and the new cell takes the most common colour among its
//! live neighbours (or the neutral living colour when the vote is tied).
//!
//! ```
//! use conway::{GridConstraints, GridEngine};
//!
//! let mut engine = GridEngine::new(GridConstraints::bounded(32, 32));
//! engine.randomize();
//! engine.tick();
//! assert_eq!(engine.generation(), 1);
//! ```

mod engine;
mod grid;
pub mod patterns;
mod random;
mod render;

pub use engine::GridEngine;
pub use grid::{EngineError, GridConstraints, NeighbourOffsets};
pub use patterns::{PATTERNS, Pattern};
pub use random::RandomSource;
pub use render::{Renderer, TextRenderer, color_hex, describe};
