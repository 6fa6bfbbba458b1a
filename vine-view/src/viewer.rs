//! Interactive side-view vine viewer built with eframe/egui.
//!
//! The scene is a floor with a wall on its right. The camera looks along
//! `-Z`, so world `x`/`y` map to the screen and depth is flattened. This
//! module defines [`Viewer`], which owns the [`Simulation`] and the scene,
//! and implements [`eframe::App`] to drive and draw it.

use eframe::App;
use glam::{Quat, Vec2, Vec3};
use std::collections::{HashMap, HashSet};
use vine_core::{
    GroupObserver, GrowthConfig, ParticleParams, PlantId, PointLight, Simulation, StemMaterial,
    SurfaceMaterial, SurfaceQuery, TickReport, TriangleSurface, particle::Particle,
};

/// Fixed simulation step; several steps may run per frame.
const DT: f32 = 1.0 / 60.0;
const DEFAULT_LIGHT: Vec3 = Vec3::new(0.6, 1.6, 0.0);

/// What a click in the scene does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tool {
    Seed,
    Light,
}

/// One particle flattened onto the view plane.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Segment {
    from: Vec2,
    to: Vec2,
    width: f32,
    color: egui::Color32,
}

impl Segment {
    fn from_particle(p: &Particle) -> Self {
        let half = p.direction() * (p.height() * 0.5);
        let c = p.material.color().clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
        Self {
            from: (p.position - half).truncate(),
            to: (p.position + half).truncate(),
            width: p.dimensions.x,
            color: egui::Color32::from_rgb(c.x as u8, c.y as u8, c.z as u8),
        }
    }
}

/// Render cache rebuilt from simulation notifications, keyed by plant.
#[derive(Debug, Default)]
struct SegmentCache {
    plants: HashMap<PlantId, Vec<Segment>>,
    halted: HashSet<PlantId>,
}

impl SegmentCache {
    fn clear(&mut self) {
        self.plants.clear();
        self.halted.clear();
    }

    fn segment_count(&self) -> usize {
        self.plants.values().map(Vec::len).sum()
    }
}

impl GroupObserver for SegmentCache {
    fn on_group_updated(&mut self, plant: PlantId, particles: &[Particle]) {
        let segments = self.plants.entry(plant).or_default();
        segments.clear();
        segments.extend(particles.iter().map(Segment::from_particle));
    }

    fn on_plant_halted(&mut self, plant: PlantId) {
        log::warn!("{plant} halted, keeping its last frame");
        self.halted.insert(plant);
    }
}

/// Main application state for the interactive viewer.
///
/// [`Viewer`] glues together:
/// - The simulation core: [`Simulation`], the scene [`TriangleSurface`] and
///   the [`PointLight`].
/// - A [`SegmentCache`] filled through [`GroupObserver`] notifications.
/// - UI state (pan/zoom, active tool, stepping speed).
///
/// The typical per-frame update is:
/// 1. Handle UI interactions / input.
/// 2. If `running` is `true`, call [`Viewer::step_once`] `steps_per_frame`
///    times.
/// 3. Draw the surface, the light and every cached plant.
pub struct Viewer {
    sim: Simulation,
    surface: TriangleSurface,
    light: PointLight,
    cache: SegmentCache,
    last_report: TickReport,

    tool: Tool,
    running: bool,
    steps_per_frame: u32,
    zoom: f32,
    pan: egui::Vec2,
}

impl Viewer {
    /// Creates a viewer with one seed on the floor of the default scene.
    ///
    /// ### Errors
    /// Fails only if the scene surface cannot be built.
    pub fn new() -> vine_core::Result<Self> {
        let mut viewer = Self {
            sim: Simulation::from_entropy(),
            surface: scene()?,
            light: PointLight::new(DEFAULT_LIGHT),
            cache: SegmentCache::default(),
            last_report: TickReport::default(),
            tool: Tool::Seed,
            running: false,
            steps_per_frame: 2,
            zoom: 250.0,
            pan: egui::vec2(0.0, 200.0),
        };
        viewer.plant_at(Vec2::new(0.0, 0.0));
        Ok(viewer)
    }

    /// Removes every plant and stops auto-running. Settings and camera are
    /// kept.
    fn reset(&mut self) {
        self.sim.clear();
        self.cache.clear();
        self.last_report = TickReport::default();
        self.running = false;
    }

    /// Plants a seed on the surface point closest to `world`, growing along
    /// the surface normal.
    fn plant_at(&mut self, world: Vec2) -> PlantId {
        let query = world.extend(0.0);
        let tri = self.surface.closest_triangle(query);
        let position = tri.closest_point(query);
        let normal = tri.normal().unwrap_or(Vec3::Y);
        let orientation = Quat::from_rotation_arc(Vec3::Z, normal);

        self.sim
            .create_seed_particle(position, orientation, Box::new(StemMaterial::default()))
    }

    /// Advances the simulation by one fixed step and refreshes the cache.
    fn step_once(&mut self) {
        let report = self.sim.tick(DT, &self.surface, &self.light, &mut self.cache);
        if let Some(err) = &report.config_error {
            log::warn!("tick skipped: {err}");
            self.running = false;
        }
        self.last_report = report;
    }

    /// Converts a world-space position to screen-space.
    ///
    /// World coordinates are scaled by `zoom`, offset by `pan`, and then
    /// centered inside the given `rect`. The y-axis is flipped so that
    /// positive y goes up in world space.
    fn world_to_screen(&self, p: Vec2, rect: egui::Rect) -> egui::Pos2 {
        let center = rect.center();
        egui::pos2(
            center.x + p.x * self.zoom + self.pan.x,
            center.y - p.y * self.zoom + self.pan.y,
        )
    }

    /// Inverse of [`Viewer::world_to_screen`], up to rounding.
    fn screen_to_world(&self, p: egui::Pos2, rect: egui::Rect) -> Vec2 {
        let center = rect.center();
        let x = (p.x - center.x - self.pan.x) / self.zoom;
        let y = (center.y - p.y + self.pan.y) / self.zoom;
        Vec2::new(x, y)
    }

    fn labeled_drag_f32(
        ui: &mut egui::Ui,
        label: &str,
        value: &mut f32,
        range: std::ops::RangeInclusive<f32>,
        speed: f64,
    ) {
        ui.horizontal(|ui| {
            ui.label(label);
            ui.add(egui::DragValue::new(value).range(range).speed(speed));
        });
    }

    /// Builds the top panel UI (run controls, stepping, zoom).
    fn ui_top_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui
                    .button(if self.running { "⏸ Pause" } else { "▶ Run" })
                    .clicked()
                {
                    self.running = !self.running;
                }

                ui.add(
                    egui::DragValue::new(&mut self.steps_per_frame)
                        .prefix("steps/frame = ")
                        .range(1..=20),
                );

                if ui.button("Step").clicked() {
                    self.step_once();
                }

                if ui.button("Reset").clicked() {
                    self.reset();
                }

                ui.separator();
                ui.add(egui::Slider::new(&mut self.zoom, 20.0..=1000.0).text("Zoom"));
            });
        });
    }

    /// Builds the bottom status bar.
    fn ui_status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format!("t = {:.2} s", self.sim.elapsed()));
                ui.separator();
                ui.label(format!("plants = {}", self.sim.plants().len()));
                ui.label(format!("particles = {}", self.sim.particle_count()));
                ui.label(format!("drawn = {}", self.cache.segment_count()));
                ui.label(format!("halted = {}", self.cache.halted.len()));
                if let Some(err) = &self.last_report.config_error {
                    ui.colored_label(egui::Color32::RED, err.to_string());
                }
            });
        });
    }

    /// Builds the right-hand panel for growth options and tuning.
    fn ui_config_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("config_panel")
            .resizable(true)
            .default_width(240.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.heading("Growth");
                    let cfg = &mut self.sim.config;
                    Self::labeled_drag_f32(ui, "growth_rate:", &mut cfg.growth_rate, 0.0..=10.0, 0.05);
                    ui.checkbox(&mut cfg.lateral_branching, "lateral branching");
                    Self::labeled_drag_f32(
                        ui,
                        "branch probability:",
                        &mut cfg.lateral_branch_probability,
                        0.0..=10.0,
                        0.05,
                    );
                    Self::labeled_drag_f32(
                        ui,
                        "branch cooldown:",
                        &mut cfg.lateral_branch_cooldown,
                        0.0..=20.0,
                        0.1,
                    );
                    ui.checkbox(&mut cfg.shape_matching, "shape matching");
                    ui.checkbox(&mut cfg.rendering, "rendering");
                    if ui.button("Reset growth to default").clicked() {
                        *cfg = GrowthConfig::default();
                    }

                    ui.separator();
                    ui.heading("Particles");
                    let params = &mut self.sim.params;
                    Self::labeled_drag_f32(ui, "max_width:", &mut params.max_width, 0.005..=0.2, 0.001);
                    Self::labeled_drag_f32(ui, "max_height:", &mut params.max_height, 0.02..=1.0, 0.005);
                    Self::labeled_drag_f32(
                        ui,
                        "height rate:",
                        &mut params.height_growth_rate,
                        0.0..=1.0,
                        0.005,
                    );
                    Self::labeled_drag_f32(
                        ui,
                        "width rate:",
                        &mut params.width_growth_rate,
                        0.0..=1.0,
                        0.001,
                    );
                    Self::labeled_drag_f32(
                        ui,
                        "surface adaptation:",
                        &mut params.surface_adaptation_strength,
                        0.0..=20.0,
                        0.1,
                    );
                    Self::labeled_drag_f32(
                        ui,
                        "phototropism:",
                        &mut params.phototropism_strength,
                        0.0..=20.0,
                        0.1,
                    );
                    Self::labeled_drag_f32(ui, "stiffness:", &mut params.stiffness, 0.0..=1.0, 0.01);
                    Self::labeled_drag_f32(
                        ui,
                        "gravity.y:",
                        &mut params.gravity.y,
                        -20.0..=0.0,
                        0.1,
                    );
                    if ui.button("Reset particles to default").clicked() {
                        *params = ParticleParams::default();
                    }

                    ui.separator();
                    ui.heading("Light");
                    Self::labeled_drag_f32(ui, "x:", &mut self.light.position.x, -5.0..=5.0, 0.02);
                    Self::labeled_drag_f32(ui, "y:", &mut self.light.position.y, -1.0..=5.0, 0.02);
                    Self::labeled_drag_f32(ui, "z:", &mut self.light.position.z, -5.0..=5.0, 0.02);
                });
            });
    }

    /// Builds the small floating toolbar for choosing what a click does.
    fn ui_toolbar(&mut self, ctx: &egui::Context) {
        egui::Area::new("toolbar".into())
            .anchor(egui::Align2::LEFT_TOP, egui::vec2(10.0, 100.0))
            .movable(false)
            .show(ctx, |ui| {
                egui::Frame::new()
                    .fill(egui::Color32::from_rgba_unmultiplied(0, 0, 0, 32))
                    .show(ui, |ui| {
                        ui.vertical(|ui| {
                            if ui.selectable_label(self.tool == Tool::Seed, "◎ Seed").clicked() {
                                self.tool = Tool::Seed;
                            }
                            if ui.selectable_label(self.tool == Tool::Light, "☀ Light").clicked() {
                                self.tool = Tool::Light;
                            }
                        });
                    });
            });
    }

    /// Builds the central panel where the scene is drawn and interacted with.
    fn ui_central_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let response = ui.allocate_response(ui.available_size(), egui::Sense::click_and_drag());
            let rect = response.rect;
            let painter = ui.painter_at(rect);

            if response.dragged() {
                self.pan += response.drag_delta();
            }

            let hover_world = response.hover_pos().map(|p| self.screen_to_world(p, rect));

            if response.clicked()
                && let Some(world) = hover_world
            {
                match self.tool {
                    Tool::Seed => {
                        self.plant_at(world);
                    }
                    Tool::Light => {
                        self.light.position = world.extend(self.light.position.z);
                    }
                }
            }

            // Zoom around the mouse cursor.
            let scroll = ui.ctx().input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0 {
                let pointer_screen = response.hover_pos().unwrap_or(rect.center());
                let world_before = self.screen_to_world(pointer_screen, rect);

                let factor = (1.0 + scroll * 0.001).clamp(0.5, 2.0);
                self.zoom = (self.zoom * factor).clamp(20.0, 1000.0);

                let screen_after = self.world_to_screen(world_before, rect);
                self.pan += pointer_screen - screen_after;
            }

            // Surface edges. Both planes are seen edge-on, so this draws lines.
            let surface_stroke = egui::Stroke::new(1.0, egui::Color32::GRAY);
            for tri in self.surface.triangles() {
                let pts = [tri.a, tri.b, tri.c]
                    .map(|v| self.world_to_screen(v.truncate(), rect));
                painter.add(egui::Shape::closed_line(pts.to_vec(), surface_stroke));
            }

            // Plants.
            for (plant, segments) in &self.cache.plants {
                let halted = self.cache.halted.contains(plant);
                for s in segments {
                    let color = if halted { egui::Color32::DARK_RED } else { s.color };
                    let width = (s.width * self.zoom).max(1.0);
                    painter.line_segment(
                        [self.world_to_screen(s.from, rect), self.world_to_screen(s.to, rect)],
                        egui::Stroke::new(width, color),
                    );
                }
            }

            // Light.
            let light = self.world_to_screen(self.light.position.truncate(), rect);
            painter.circle_filled(light, 6.0, egui::Color32::YELLOW);

            if self.running {
                for _ in 0..self.steps_per_frame {
                    self.step_once();
                }
                ctx.request_repaint();
            }
        });
    }
}

/// Floor along `y = 0` and a wall at `x = 1.2` facing the origin.
fn scene() -> vine_core::Result<TriangleSurface> {
    let mut surface = TriangleSurface::plane(
        Vec3::new(-1.5, 0.0, -0.5),
        Vec3::Z,
        Vec3::new(2.7, 0.0, 0.0),
        2,
        12,
    )?;
    let wall = TriangleSurface::plane(
        Vec3::new(1.2, 0.0, -0.5),
        Vec3::Z,
        Vec3::new(0.0, 2.0, 0.0),
        2,
        10,
    )?;
    surface.extend(wall);
    Ok(surface)
}

impl App for Viewer {
    /// eframe callback that builds all UI panels for each frame.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui_top_panel(ctx);
        self.ui_status_bar(ctx);
        self.ui_config_panel(ctx);
        self.ui_central_panel(ctx);
        self.ui_toolbar(ctx);
    }
}
