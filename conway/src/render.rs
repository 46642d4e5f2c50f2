// render.rs - Presentation collaborator interface and a plain-text renderer

use crate::grid::GridConstraints;

/// Anything that can present a board snapshot.
///
/// `state[i]` is the cell at `(i % cols, i / cols)`.
pub trait Renderer {
    /// Called whenever the board dimensions may have changed.
    fn initialize(&mut self, _constraints: &GridConstraints) {}

    fn render(&mut self, state: &[i32], constraints: &GridConstraints);
}

/// Formats a cell colour as `#rrggbb`.
pub fn color_hex(color: i32) -> String {
    format!("#{:06x}", color & 0xFF_FF_FF)
}

/// Renders live cells as `#` and dead ones as `.`, one line per row.
#[derive(Debug, Default)]
pub struct TextRenderer {
    rows: usize,
    cols: usize,
    frame: String,
}

impl TextRenderer {
    /// The most recently rendered frame.
    pub fn frame(&self) -> &str {
        &self.frame
    }

    fn is_stale(&self, constraints: &GridConstraints) -> bool {
        constraints.rows != self.rows || constraints.cols != self.cols
    }
}

impl Renderer for TextRenderer {
    fn initialize(&mut self, constraints: &GridConstraints) {
        self.rows = constraints.rows;
        self.cols = constraints.cols;
        self.frame.clear();
    }

    fn render(&mut self, state: &[i32], constraints: &GridConstraints) {
        // Dimensions changed since initialize(); wait for the next one
        if self.is_stale(constraints) {
            return;
        }

        self.frame.clear();
        for row in state.chunks(self.cols.max(1)).take(self.rows) {
            for &cell in row {
                self.frame.push(if cell == constraints.death_color { '.' } else { '#' });
            }
            self.frame.push('\n');
        }
    }
}

/// Renders a one-line summary, handy for logs.
pub fn describe(state: &[i32], constraints: &GridConstraints) -> String {
    let live = state.iter().filter(|&&cell| cell != constraints.death_color).count();
    let topology = if constraints.is_torus { "torus" } else { "bounded" };
    format!("{}x{} {} live={}", constraints.cols, constraints.rows, topology, live)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_hex_pads_and_masks() {
        assert_eq!(color_hex(0xFF_FF_FF), "#ffffff");
        assert_eq!(color_hex(0x00_0A_0B), "#000a0b");
        assert_eq!(color_hex(-1), "#ffffff");
    }

    #[test]
    fn test_text_renderer_draws_rows() {
        let constraints = GridConstraints::bounded(2, 3);
        let mut renderer = TextRenderer::default();
        renderer.initialize(&constraints);
        renderer.render(&[0, 1, 0, 1, 0, 7], &constraints);

        assert_eq!(renderer.frame(), ".#.\n#.#\n");
    }

    #[test]
    fn test_text_renderer_skips_resized_board() {
        let mut renderer = TextRenderer::default();
        renderer.initialize(&GridConstraints::bounded(2, 2));
        renderer.render(&[1; 9], &GridConstraints::bounded(3, 3));

        assert!(renderer.frame().is_empty());
    }

    #[test]
    fn test_describe_counts_live_cells() {
        let constraints = GridConstraints::bounded(1, 4);
        assert_eq!(describe(&[0, 5, 5, 0], &constraints), "4x1 bounded live=2");
    }
}
