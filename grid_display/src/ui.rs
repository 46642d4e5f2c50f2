// ui.rs - egui front end for LifeViewer
// Cells are painted straight from the integer colours the board stores

use std::time::{Duration, Instant};

use conway::{GridConstraints, PATTERNS, Renderer};
use eframe::egui;
use egui::{Color32, Rect, Stroke, Vec2};

use crate::LifeViewer;

const SPACING: f32 = 0.5;

/// Converts a `0xRRGGBB` cell value to an egui colour.
pub fn cell_color(cell: i32) -> Color32 {
    let [_, r, g, b] = cell.to_be_bytes();
    Color32::from_rgb(r, g, b)
}

/// Latest board snapshot, kept for painting between board calls.
pub struct BoardCanvas {
    cell_size: f32,
    constraints: GridConstraints,
    state: Vec<i32>,
}

impl BoardCanvas {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            constraints: GridConstraints::default(),
            state: Vec::new(),
        }
    }

    pub fn state(&self) -> &[i32] {
        &self.state
    }

    pub fn population(&self) -> usize {
        let death = self.constraints.death_color;
        self.state.iter().filter(|&&cell| cell != death).count()
    }

    /// Paints the board and returns the index of a clicked cell, if any.
    pub fn paint(&self, ui: &mut egui::Ui) -> Option<usize> {
        let GridConstraints { rows, cols, .. } = self.constraints;
        let pitch = self.cell_size + SPACING;
        let total_size = Vec2::new(pitch * cols as f32, pitch * rows as f32);

        let (response, painter) = ui.allocate_painter(total_size, egui::Sense::click());
        let origin = response.rect.min;
        painter.rect_filled(response.rect, 0.0, Color32::from_gray(20));

        for (index, &cell) in self.state.iter().enumerate().take(rows * cols) {
            let (col, row) = (index % cols, index / cols);
            let rect = Rect::from_min_size(
                origin + Vec2::new(col as f32 * pitch, row as f32 * pitch),
                Vec2::splat(self.cell_size),
            );
            painter.rect_filled(rect, 1.0, cell_color(cell));
            if self.cell_size >= 6.0 {
                painter.rect_stroke(rect, 1.0, Stroke::new(0.2, Color32::from_gray(60)));
            }
        }

        if !response.clicked() {
            return None;
        }
        let offset = response.interact_pointer_pos()? - origin;
        let (col, row) = ((offset.x / pitch) as usize, (offset.y / pitch) as usize);
        (col < cols && row < rows).then(|| row * cols + col)
    }
}

impl Renderer for BoardCanvas {
    fn initialize(&mut self, constraints: &GridConstraints) {
        self.constraints = *constraints;
        self.state.clear();
    }

    fn render(&mut self, state: &[i32], constraints: &GridConstraints) {
        self.constraints = *constraints;
        self.state.clear();
        self.state.extend_from_slice(state);
    }
}

impl eframe::App for LifeViewer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.is_running && self.last_update.elapsed() >= self.update_interval {
            self.step();
            self.last_update = Instant::now();
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Conway's Game of Life");

            ui.horizontal(|ui| {
                let button_text = if self.is_running { "⏸ Pause" } else { "▶ Start" };
                if ui.button(button_text).clicked() {
                    self.is_running = !self.is_running;
                    self.last_update = Instant::now();
                }

                if ui.button("⏹ Reset").clicked() {
                    self.reset();
                }

                if ui.button("🎲 Random").clicked() {
                    self.randomize();
                }

                ui.separator();

                ui.label("Pattern:");
                egui::ComboBox::from_id_source("pattern_selector")
                    .selected_text(PATTERNS[self.selected_pattern].name)
                    .show_ui(ui, |ui| {
                        for (i, pattern) in PATTERNS.iter().enumerate() {
                            ui.selectable_value(&mut self.selected_pattern, i, pattern.name);
                        }
                    });

                if ui.button("Apply").clicked() {
                    self.apply_selected_pattern();
                }

                ui.separator();

                let mut is_torus = self.constraints.is_torus;
                if ui.checkbox(&mut is_torus, "Torus").changed() {
                    self.set_torus(is_torus);
                }
            });

            ui.horizontal(|ui| {
                ui.label("Speed:");
                let mut speed = 1000.0 / self.update_interval.as_millis().max(1) as f32;
                if ui.add(egui::Slider::new(&mut speed, 0.5..=60.0).suffix(" gen/sec")).changed() {
                    self.update_interval = Duration::from_millis((1000.0 / speed) as u64);
                }

                ui.separator();
                ui.label(format!("Generation: {}", self.generation));
            });

            if let Some(status) = &self.status {
                ui.colored_label(Color32::LIGHT_RED, status);
            }

            ui.separator();
            ui.label("Click cells to toggle them while paused.");

            if let Some(index) = self.canvas.paint(ui) {
                if !self.is_running {
                    self.toggle_cell(index);
                }
            }

            ui.separator();

            let total = self.constraints.cell_count().max(1);
            let live = self.canvas.population();
            ui.horizontal(|ui| {
                ui.label(format!("Live cells: {live}"));
                ui.label(format!("Dead cells: {}", total.saturating_sub(live)));
                ui.label(format!("Population: {:.1}%", live as f32 / total as f32 * 100.0));
            });
        });

        if self.is_running {
            ctx.request_repaint_after(self.update_interval);
        }
    }
}
