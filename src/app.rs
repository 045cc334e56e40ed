use std::path::PathBuf;

use eframe::egui;
use egui_extras::{Column, TableBuilder};

use crate::acquire::{self, ImageLoader, ImageSource, ALLOWED_EXTENSIONS};
use crate::config::AppConfig;
use crate::export;
use crate::overlay::{arrowhead_triangle, Color4, OverlayElement, OverlayKind};
use crate::session::{Action, Phase, SessionController};

// ── App ─────────────────────────────────────────────────────────────────────

pub struct ValveApp {
    config: AppConfig,
    session: SessionController,
    loader: ImageLoader,

    texture: Option<egui::TextureHandle>,
    texture_generation: u64,

    /// Slider value; the session holds the applied rotation.
    rotation: f32,
    /// Outcome of the last export, shown under the status.
    notice: Option<String>,

    // pan & zoom
    pan: egui::Vec2,
    zoom: f32,
    panning: bool,
}

impl ValveApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: AppConfig, image: Option<PathBuf>) -> Self {
        let session = SessionController::new(
            config.surface_size,
            config.rotation_mode,
            config.marker_style(),
        );
        let mut app = Self {
            loader: ImageLoader::new(config.max_upload_bytes),
            session,
            texture: None,
            texture_generation: 0,
            rotation: 0.0,
            notice: None,
            pan: egui::Vec2::ZERO,
            zoom: 1.0,
            panning: false,
            config,
        };
        if let Some(path) = image {
            app.request_load(&cc.egui_ctx, ImageSource::File(path));
        }
        app
    }

    fn request_load(&mut self, ctx: &egui::Context, source: ImageSource) {
        let ctx = ctx.clone();
        self.loader.request(source, move || ctx.request_repaint());
    }

    fn apply_completed_loads(&mut self) {
        for done in self.loader.poll() {
            match done.result {
                Ok(image) => {
                    log::info!("load #{} finished: {}", done.request, image.source);
                    self.session.image_loaded(image);
                    self.rotation = 0.0;
                    self.notice = None;
                    self.pan = egui::Vec2::ZERO;
                    self.zoom = 1.0;
                }
                Err(err) => {
                    log::warn!("load #{} failed: {err}", done.request);
                    self.session.image_failed(&err);
                }
            }
        }
    }

    fn dispatch(&mut self, action: Action) {
        if action == Action::Reset {
            self.rotation = 0.0;
        }
        if matches!(action, Action::Reset | Action::Undo) {
            self.notice = None;
        }
        self.session.dispatch(action);
    }

    fn ensure_texture(&mut self, ctx: &egui::Context) {
        if self.texture_generation == self.session.generation() {
            return;
        }
        self.texture_generation = self.session.generation();
        let max_side = ctx.input(|i| i.max_texture_side);
        self.texture = self.session.background().map(|bg| {
            let shown = acquire::display_copy(&bg.pixels, max_side);
            let size = [shown.width() as usize, shown.height() as usize];
            let color_image = egui::ColorImage::from_rgba_unmultiplied(size, shown.as_raw());
            ctx.load_texture("background", color_image, egui::TextureOptions::LINEAR)
        });
    }

    /// Screen position of the surface's top-left corner.
    fn surface_origin(&self, canvas_rect: egui::Rect) -> egui::Pos2 {
        let half = self.session.surface_size() * 0.5 * self.zoom;
        canvas_rect.center() + self.pan - egui::vec2(half, half)
    }

    fn surface_to_screen(&self, canvas_rect: egui::Rect, p: egui::Pos2) -> egui::Pos2 {
        self.surface_origin(canvas_rect) + p.to_vec2() * self.zoom
    }

    fn screen_to_surface(&self, canvas_rect: egui::Rect, screen_pos: egui::Pos2) -> egui::Pos2 {
        ((screen_pos - self.surface_origin(canvas_rect)) / self.zoom).to_pos2()
    }

    fn draw_background(&self, painter: &egui::Painter, canvas_rect: egui::Rect) {
        let size = self.session.surface_size() * self.zoom;
        let surface = egui::Rect::from_min_size(self.surface_origin(canvas_rect), egui::vec2(size, size));
        painter.rect_filled(surface, 0.0, egui::Color32::from_gray(0xf0));

        let (Some(tex), Some(bg)) = (&self.texture, self.session.background()) else {
            return;
        };
        let mut mesh = egui::Mesh::with_texture(tex.id());
        for (pos, uv) in bg.transform.corners() {
            mesh.vertices.push(egui::epaint::Vertex {
                pos: self.surface_to_screen(canvas_rect, pos),
                uv,
                color: egui::Color32::WHITE,
            });
        }
        mesh.add_triangle(0, 1, 2);
        mesh.add_triangle(0, 2, 3);
        painter.add(egui::Shape::mesh(mesh));
    }

    fn draw_overlays(&self, painter: &egui::Painter, canvas_rect: egui::Rect, overlays: &[OverlayElement]) {
        let to_screen = |p: (f32, f32)| self.surface_to_screen(canvas_rect, egui::pos2(p.0, p.1));
        for el in overlays {
            match &el.kind {
                OverlayKind::Circle {
                    center,
                    radius,
                    fill,
                    stroke,
                    stroke_width,
                } => {
                    painter.circle(
                        to_screen(*center),
                        radius * self.zoom,
                        fill.to_egui(),
                        egui::Stroke::new(*stroke_width, stroke.to_egui()),
                    );
                }
                OverlayKind::Label {
                    pos,
                    content,
                    font_size,
                    color,
                } => {
                    let s = to_screen(*pos);
                    let font = egui::FontId::proportional(font_size * self.zoom);
                    // dark halo keeps white text readable on bright film
                    for d in [egui::vec2(1.0, 1.0), egui::vec2(-1.0, -1.0)] {
                        painter.text(s + d, egui::Align2::LEFT_TOP, content, font.clone(), Color4::BLACK.to_egui());
                    }
                    painter.text(s, egui::Align2::LEFT_TOP, content, font, color.to_egui());
                }
                OverlayKind::AxisLine {
                    start,
                    end,
                    color,
                    thickness,
                }
                | OverlayKind::VectorLine {
                    start,
                    end,
                    color,
                    thickness,
                } => {
                    painter.line_segment(
                        [to_screen(*start), to_screen(*end)],
                        egui::Stroke::new(*thickness, color.to_egui()),
                    );
                }
                OverlayKind::Arrowhead {
                    tip,
                    direction,
                    length,
                    color,
                } => {
                    let corners = arrowhead_triangle(*tip, *direction, *length);
                    painter.add(egui::Shape::convex_polygon(
                        corners.iter().map(|c| to_screen(*c)).collect(),
                        color.to_egui(),
                        egui::Stroke::NONE,
                    ));
                }
            }
        }
    }

    fn open_dialog(&mut self, ctx: &egui::Context) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &ALLOWED_EXTENSIONS)
            .pick_file()
        {
            self.request_load(ctx, ImageSource::File(path));
        }
    }

    fn download(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .set_file_name(&self.config.export_file_name)
            .add_filter("PNG", &["png"])
            .save_file()
        else {
            return;
        };
        self.notice = Some(match export::export(&self.session.export_view(), &path) {
            Ok(report) => format!(
                "Saved {} and {} ({})",
                path.display(),
                report.display(),
                self.session.result().unwrap_or_default()
            ),
            Err(err) => {
                log::warn!("export failed: {err}");
                format!("Export failed: {err}")
            }
        });
    }

    fn handle_input(&mut self, ctx: &egui::Context) {
        let (undo, paste, dropped) = ctx.input(|i| {
            let undo = i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace);
            let paste = i.events.iter().any(|e| {
                matches!(e, egui::Event::Paste(_))
                    || matches!(
                        e,
                        egui::Event::Key { key: egui::Key::V, pressed: true, modifiers, .. }
                            if modifiers.command
                    )
            });
            (undo, paste, i.raw.dropped_files.first().cloned())
        });

        if undo {
            self.dispatch(Action::Undo);
        }
        if paste {
            self.request_load(ctx, ImageSource::Clipboard);
        }
        if let Some(file) = dropped {
            if let Some(path) = file.path {
                self.request_load(ctx, ImageSource::File(path));
            } else if let Some(bytes) = file.bytes {
                self.request_load(
                    ctx,
                    ImageSource::Bytes {
                        name: file.name,
                        bytes: bytes.to_vec(),
                    },
                );
            }
        }
    }

    fn toolbar(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        let has_image = self.session.background().is_some();
        ui.horizontal(|ui| {
            if ui.button("Open…").clicked() {
                self.open_dialog(ctx);
            }
            if ui.button("Paste").on_hover_text("Ctrl+V").clicked() {
                self.request_load(ctx, ImageSource::Clipboard);
            }
            if self.loader.is_busy() {
                ui.spinner();
            }
            ui.separator();
            if ui.add_enabled(has_image, egui::Button::new("Reset")).clicked() {
                self.dispatch(Action::Reset);
            }
            if ui
                .add_enabled(!self.session.points().is_empty(), egui::Button::new("Undo"))
                .on_hover_text("Backspace / Delete")
                .clicked()
            {
                self.dispatch(Action::Undo);
            }
            if ui.add_enabled(has_image, egui::Button::new("Flip")).clicked() {
                self.dispatch(Action::Flip);
            }
            ui.label("Rotation:");
            let slider = ui.add_enabled(
                has_image,
                egui::Slider::new(&mut self.rotation, -180.0..=180.0)
                    .step_by(1.0)
                    .suffix("°"),
            );
            if slider.changed() {
                self.dispatch(Action::Rotate(self.rotation));
            }
            ui.separator();
            if ui
                .add_enabled(self.session.can_analyze(), egui::Button::new("Analyze"))
                .clicked()
            {
                self.dispatch(Action::Analyze);
            }
            if ui
                .add_enabled(self.session.can_export(), egui::Button::new("Download"))
                .clicked()
            {
                self.download();
            }
            ui.separator();
            ui.label(format!("Zoom: {:.0}%", self.zoom * 100.0));
        });
    }

    fn side_panel(&self, ui: &mut egui::Ui) {
        let status = self.session.status();
        ui.heading("Instructions");
        ui.label(egui::RichText::new(&status.headline).strong());
        if let Some(detail) = status.detail {
            ui.label(egui::RichText::new(detail).weak());
        }
        if let Some(setting) = self.session.analysis().and_then(|a| a.setting()) {
            ui.add_space(8.0);
            ui.label(egui::RichText::new(format!("Setting {setting}")).size(28.0));
        }
        let rotation = self.session.rotation_degrees();
        let mirrored = self.session.background().is_some_and(|b| b.transform.flip_x);
        if rotation != 0.0 || mirrored {
            let suffix = if mirrored { ", mirrored" } else { "" };
            ui.label(egui::RichText::new(format!("Image rotated {rotation:.0}°{suffix}")).weak());
        }
        if let Some(notice) = &self.notice {
            ui.add_space(8.0);
            ui.label(notice);
        }

        ui.separator();
        ui.label(format!(
            "Landmarks {}/{}",
            self.session.points().len(),
            crate::points::PointStore::CAPACITY
        ));
        TableBuilder::new(ui)
            .striped(true)
            .column(Column::auto())
            .column(Column::remainder())
            .column(Column::auto())
            .column(Column::auto())
            .header(20.0, |mut header| {
                for title in ["#", "Landmark", "x", "y"] {
                    header.col(|ui| {
                        ui.strong(title);
                    });
                }
            })
            .body(|mut body| {
                for p in self.session.points() {
                    body.row(18.0, |mut row| {
                        row.col(|ui| {
                            ui.label((p.index() + 1).to_string());
                        });
                        row.col(|ui| {
                            ui.label(p.label());
                        });
                        row.col(|ui| {
                            ui.label(format!("{:.1}", p.position.x));
                        });
                        row.col(|ui| {
                            ui.label(format!("{:.1}", p.position.y));
                        });
                    });
                }
            });
    }
}

// ── eframe App impl ────────────────────────────────────────────────────────

impl eframe::App for ValveApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.apply_completed_loads();
        self.ensure_texture(ctx);
        self.handle_input(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.toolbar(ctx, ui);
        });

        egui::SidePanel::right("status")
            .min_width(260.0)
            .show(ctx, |ui| {
                self.side_panel(ui);
            });

        // Canvas
        egui::CentralPanel::default().show(ctx, |ui| {
            let (response, painter) =
                ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
            let canvas_rect = response.rect;

            painter.rect_filled(canvas_rect, 0.0, egui::Color32::from_gray(40));
            self.draw_background(&painter, canvas_rect);
            self.draw_overlays(&painter, canvas_rect, &self.session.overlays());

            if self.session.phase() == Phase::Idle {
                painter.text(
                    canvas_rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "Drop an X-ray here, paste it, or use Open…",
                    egui::FontId::proportional(18.0),
                    egui::Color32::from_gray(90),
                );
            }

            // Pan: middle button, or shift + primary
            let (middle_down, shift) = ctx.input(|i| (i.pointer.middle_down(), i.modifiers.shift));
            let shift_drag = shift && response.dragged_by(egui::PointerButton::Primary);
            if middle_down || shift_drag {
                let delta = ctx.input(|i| i.pointer.delta());
                self.pan += delta;
                self.panning = true;
            } else {
                self.panning = false;
            }

            // Zoom about the cursor
            let scroll_delta = ctx.input(|i| i.smooth_scroll_delta.y);
            if scroll_delta != 0.0 && response.hovered() {
                let zoom_factor = 0.999_f32.powf(-scroll_delta);
                let new_zoom = (self.zoom * zoom_factor).clamp(self.config.min_zoom, self.config.max_zoom);
                if let Some(cursor) = response.hover_pos() {
                    let center = canvas_rect.center();
                    let cursor_rel = cursor - center - self.pan;
                    self.pan -= cursor_rel * (new_zoom / self.zoom - 1.0);
                }
                self.zoom = new_zoom;
            }

            if !self.panning && !shift && response.clicked_by(egui::PointerButton::Primary) {
                if let Some(pos) = response.interact_pointer_pos() {
                    let surface_pos = self.screen_to_surface(canvas_rect, pos);
                    if self.session.contains(surface_pos) {
                        self.dispatch(Action::Click(surface_pos));
                    }
                }
            }
        });
    }
}
