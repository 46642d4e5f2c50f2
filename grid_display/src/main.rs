// main.rs - Game of Life viewer driving a worker-hosted board
// The board lives on its own thread behind a BoardClient; ui.rs draws it

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use conway::{GridConstraints, PATTERNS, Renderer, TextRenderer, describe};
use conway_worker::{BoardClient, BoardService, BridgeError, render_board};
use eframe::egui;
use log::{error, info};
use thiserror::Error;

mod config;
mod ui;

use config::{ConfigError, LifeConfig};
use ui::BoardCanvas;

const CYCLE_WINDOW: usize = 10;

#[derive(Debug, Error)]
enum ViewerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Board(#[from] BridgeError),

    #[error("cannot start the async runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("window failed: {0}")]
    Window(String),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), ViewerError> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_PATH));
    let config = LifeConfig::load(&path)?;

    if config.display.headless_generations > 0 {
        return run_headless(&config);
    }

    let viewer = LifeViewer::new(&config)?;
    let side = config.display.cell_size * config.grid.cols.max(config.grid.rows) as f32;
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([side.max(480.0) + 40.0, side + 200.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Conway's Game of Life",
        options,
        Box::new(|_cc| Box::new(viewer)),
    )
    .map_err(|err| ViewerError::Window(err.to_string()))
}

/// Prints `headless_generations` frames of a random board to stdout.
fn run_headless(config: &LifeConfig) -> Result<(), ViewerError> {
    let runtime = tokio::runtime::Runtime::new()?;
    let delay = Duration::from_millis(config.display.frame_delay_ms);

    runtime.block_on(async {
        let board = BoardClient::spawn(config.grid, config.worker.clone())?;
        let mut renderer = TextRenderer::default();
        renderer.initialize(&config.grid);
        board.randomize().await?;

        for _ in 0..config.display.headless_generations {
            render_board(&board, &mut renderer).await?;
            println!("generation {}\n{}", board.generation().await?, renderer.frame());
            board.tick().await?;
            tokio::time::sleep(delay).await;
        }

        let state = board.state().await?;
        info!("finished: {}", describe(&state, &config.grid));
        Ok::<_, ViewerError>(())
    })
}

/// Remembers hashes of recent boards to notice when the simulation repeats.
#[derive(Debug, Default)]
struct CycleDetector {
    history: [u64; CYCLE_WINDOW],
    count: usize,
}

impl CycleDetector {
    /// Records `state` and reports whether it matched one of the last few.
    fn observe(&mut self, state: &[i32]) -> bool {
        let mut hasher = DefaultHasher::new();
        state.hash(&mut hasher);
        let hash = hasher.finish();

        let seen = self.history[..self.count.min(CYCLE_WINDOW)].contains(&hash);
        self.history[self.count % CYCLE_WINDOW] = hash;
        self.count += 1;
        seen
    }

    fn clear(&mut self) {
        self.count = 0;
    }
}

/// Viewer state. Board calls are blocked on from the frame callback.
pub struct LifeViewer {
    // Dropped before the runtime so the bridge shuts down while it still runs
    board: BoardClient,
    pub canvas: BoardCanvas,
    pub constraints: GridConstraints,
    pub is_running: bool,
    pub last_update: Instant,
    pub update_interval: Duration,
    pub generation: u64,
    pub selected_pattern: usize,
    pub status: Option<String>,
    cycles: CycleDetector,
    runtime: tokio::runtime::Runtime,
}

impl LifeViewer {
    fn new(config: &LifeConfig) -> Result<Self, ViewerError> {
        let runtime = tokio::runtime::Runtime::new()?;
        let board = {
            let _guard = runtime.enter();
            BoardClient::spawn(config.grid, config.worker.clone())?
        };

        let mut canvas = BoardCanvas::new(config.display.cell_size);
        canvas.initialize(&config.grid);

        let mut viewer = Self {
            board,
            canvas,
            constraints: config.grid,
            is_running: false,
            last_update: Instant::now(),
            update_interval: Duration::from_millis(config.display.frame_delay_ms.max(1)),
            generation: 0,
            selected_pattern: 0,
            status: None,
            cycles: CycleDetector::default(),
            runtime,
        };
        viewer.refresh();
        Ok(viewer)
    }

    /// Runs `op` on the board and then redraws from a fresh snapshot.
    fn with_board(&mut self, op: BoardOp) {
        let Self {
            board,
            canvas,
            runtime,
            ..
        } = self;
        let board = &*board;

        let outcome = runtime.block_on(async {
            op.apply(board).await?;
            render_board(board, canvas).await?;
            board.generation().await
        });

        match outcome {
            Ok(generation) => {
                self.generation = generation;
                self.status = None;
            }
            Err(err) => {
                error!("board call failed: {err}");
                self.is_running = false;
                self.status = Some(err.to_string());
            }
        }
    }

    pub fn refresh(&mut self) {
        self.with_board(BoardOp::Refresh);
    }

    pub fn step(&mut self) {
        self.with_board(BoardOp::Tick);
        if self.cycles.observe(self.canvas.state()) {
            info!("board repeats at generation {}; pausing", self.generation);
            self.is_running = false;
        }
    }

    pub fn reset(&mut self) {
        self.restart(BoardOp::Reset);
    }

    pub fn randomize(&mut self) {
        self.restart(BoardOp::Randomize);
    }

    pub fn apply_selected_pattern(&mut self) {
        if let Some(pattern) = PATTERNS.get(self.selected_pattern) {
            self.restart(BoardOp::Load(pattern.stamp(&self.constraints)));
        }
    }

    /// Switches topology; the engine clears the board when constraints change.
    pub fn set_torus(&mut self, is_torus: bool) {
        let constraints = self.constraints.with_torus(is_torus);
        self.constraints = constraints;
        self.canvas.initialize(&constraints);
        self.restart(BoardOp::Constrain(constraints));
    }

    /// Flips one cell between the living and death colours.
    pub fn toggle_cell(&mut self, index: usize) {
        let mut cells = self.canvas.state().to_vec();
        let Some(cell) = cells.get_mut(index) else {
            return;
        };
        *cell = if *cell == self.constraints.death_color {
            self.constraints.living_color
        } else {
            self.constraints.death_color
        };
        self.cycles.clear();
        self.with_board(BoardOp::Load(cells));
    }

    fn restart(&mut self, op: BoardOp) {
        self.is_running = false;
        self.cycles.clear();
        self.with_board(op);
    }
}

/// One user action against the board.
enum BoardOp {
    Refresh,
    Tick,
    Reset,
    /// Reset, then scatter random living cells.
    Randomize,
    Load(Vec<i32>),
    Constrain(GridConstraints),
}

impl BoardOp {
    async fn apply<B: BoardService>(self, board: &B) -> Result<(), BridgeError> {
        match self {
            BoardOp::Refresh => Ok(()),
            BoardOp::Tick => board.tick().await,
            BoardOp::Reset => board.reset().await,
            BoardOp::Randomize => {
                board.reset().await?;
                board.randomize().await
            }
            BoardOp::Load(cells) => board.set_state(cells).await,
            BoardOp::Constrain(constraints) => board.set_constraints(constraints).await,
        }
    }
}
