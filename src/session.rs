//! The annotation session and the state machine that drives it.
//!
//! Input arrives as discrete [`Action`]s. Every transition refreshes the
//! status line; failures never escape, they only change what the operator
//! is told.

use eframe::egui;
use image::RgbaImage;

use crate::acquire::DecodedImage;
use crate::classifier::{self, Analysis};
use crate::error::{AnnotateError, Result};
use crate::overlay::{self, MarkerStyle, OverlayElement};
use crate::points::{Landmark, LandmarkPoint, PointStore};
use crate::transform::{BackgroundTransform, RotationMode, TransformEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No image loaded.
    Idle,
    Capturing { placed: usize },
    ReadyToAnalyze,
    Analyzed,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action {
    /// Pointer down, surface coordinates.
    Click(egui::Pos2),
    Undo,
    Reset,
    /// Absolute background rotation in degrees.
    Rotate(f32),
    Flip,
    Analyze,
}

/// What the operator should read next.
#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    pub headline: String,
    /// Long description of the pending landmark.
    pub detail: Option<&'static str>,
}

impl Status {
    fn plain(headline: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            detail: None,
        }
    }
}

pub struct Background {
    pub pixels: RgbaImage,
    pub transform: BackgroundTransform,
}

/// Read-only view handed to the export collaborator.
pub struct ExportView<'a> {
    pub background: Option<&'a Background>,
    pub overlays: Vec<OverlayElement>,
    pub points: &'a [LandmarkPoint],
    pub analysis: Option<&'a Analysis>,
    pub result: Option<&'a str>,
    pub surface_size: f32,
}

pub struct SessionController {
    points: PointStore,
    background: Option<Background>,
    /// Bumped on every image load so renderers know to refresh textures.
    generation: u64,
    phase: Phase,
    analysis: Option<Analysis>,
    result: Option<String>,
    analysis_overlays: Vec<OverlayElement>,
    status: Status,
    engine: TransformEngine,
    style: MarkerStyle,
    surface_size: f32,
}

impl SessionController {
    pub fn new(surface_size: f32, rotation_mode: RotationMode, style: MarkerStyle) -> Self {
        Self {
            points: PointStore::new(),
            background: None,
            generation: 0,
            phase: Phase::Idle,
            analysis: None,
            result: None,
            analysis_overlays: Vec::new(),
            status: Status::plain("Upload an X-ray image to begin."),
            engine: TransformEngine::new(rotation_mode),
            style,
            surface_size,
        }
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn points(&self) -> &[LandmarkPoint] {
        self.points.all()
    }

    pub fn background(&self) -> Option<&Background> {
        self.background.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn surface_size(&self) -> f32 {
        self.surface_size
    }

    pub fn rotation_degrees(&self) -> f32 {
        self.background
            .as_ref()
            .map_or(0.0, |b| b.transform.rotation_degrees)
    }

    pub fn can_analyze(&self) -> bool {
        matches!(self.phase, Phase::ReadyToAnalyze | Phase::Analyzed)
    }

    /// Export is offered once an analysis produced a verdict.
    pub fn can_export(&self) -> bool {
        self.result.is_some()
    }

    /// Markers for every point followed by the analysis overlay.
    pub fn overlays(&self) -> Vec<OverlayElement> {
        let mut out = overlay::markers(self.points.all(), &self.style);
        out.extend(self.analysis_overlays.iter().cloned());
        out
    }

    pub fn export_view(&self) -> ExportView<'_> {
        ExportView {
            background: self.background.as_ref(),
            overlays: self.overlays(),
            points: self.points.all(),
            analysis: self.analysis.as_ref(),
            result: self.result.as_deref(),
            surface_size: self.surface_size,
        }
    }

    // ── Transitions ────────────────────────────────────────────────────────

    /// A decode finished. Whatever was in progress is discarded.
    pub fn image_loaded(&mut self, image: DecodedImage) {
        let size = egui::vec2(image.pixels.width() as f32, image.pixels.height() as f32);
        log::info!(
            "loaded {} ({}x{})",
            image.source,
            image.pixels.width(),
            image.pixels.height()
        );
        self.background = Some(Background {
            transform: BackgroundTransform::fit(size, self.surface_size),
            pixels: image.pixels,
        });
        self.generation += 1;
        self.reset();
    }

    pub fn image_failed(&mut self, err: &AnnotateError) {
        log::warn!("image load failed: {err}");
        self.status = Status::plain(format!("Could not load image: {err}"));
    }

    pub fn dispatch(&mut self, action: Action) {
        match action {
            Action::Click(pos) => self.click(pos),
            Action::Undo => self.undo(),
            Action::Reset => self.reset(),
            Action::Rotate(angle) => self.rotate(angle),
            Action::Flip => self.flip(),
            Action::Analyze => {
                // Already reflected in the status line.
                let _ = self.analyze();
            }
        }
    }

    /// Whether `pos` lies on the square surface, edges included.
    pub fn contains(&self, pos: egui::Pos2) -> bool {
        (0.0..=self.surface_size).contains(&pos.x) && (0.0..=self.surface_size).contains(&pos.y)
    }

    pub fn click(&mut self, pos: egui::Pos2) {
        if !matches!(self.phase, Phase::Capturing { .. }) {
            return;
        }
        if !self.contains(pos) {
            log::debug!("click at ({:.1}, {:.1}) is off the surface", pos.x, pos.y);
            return;
        }
        match self.points.add(pos) {
            Ok(_) => self.enter_capture_phase(),
            Err(err) => log::debug!("click ignored: {err}"),
        }
    }

    pub fn undo(&mut self) {
        match self.points.remove_last() {
            Ok(_) => {
                self.clear_analysis();
                self.enter_capture_phase();
            }
            Err(err) => log::debug!("undo ignored: {err}"),
        }
    }

    /// Clear points, analysis and orientation. The loaded image stays.
    pub fn reset(&mut self) {
        self.points.reset();
        self.clear_analysis();
        if let Some(bg) = &mut self.background {
            bg.transform.clear_orientation();
        }
        self.enter_capture_phase();
    }

    pub fn rotate(&mut self, angle_degrees: f32) {
        let Some(bg) = &mut self.background else {
            return;
        };
        let moved = self
            .engine
            .rotate_to_absolute(&mut bg.transform, &self.points.positions(), angle_degrees);
        self.points.set_positions(&moved);
    }

    pub fn flip(&mut self) {
        if let Some(bg) = &mut self.background {
            self.engine.flip_horizontal(&mut bg.transform);
        }
    }

    pub fn analyze(&mut self) -> Result<&Analysis> {
        if !self.can_analyze() {
            self.status = Status::plain("Please mark all 5 points before analyzing.");
            return Err(AnnotateError::IncompletePoints {
                placed: self.points.len(),
            });
        }
        let pos = |l: Landmark| self.points.get(l).map(|p| p.position);
        let (Some(proximal), Some(distal), Some(center), Some(tip)) = (
            pos(Landmark::ProximalConnector),
            pos(Landmark::DistalConnector),
            pos(Landmark::SettingIndicatorBar),
            pos(Landmark::SettingIndicatorTBar),
        ) else {
            return Err(AnnotateError::IncompletePoints {
                placed: self.points.len(),
            });
        };

        self.clear_analysis();
        let analysis = match classifier::classify(proximal, distal, center, tip) {
            Ok(analysis) => analysis,
            Err(err) => {
                log::warn!("analysis failed: {err}");
                self.phase = Phase::ReadyToAnalyze;
                self.status = Status::plain(
                    "Cannot compute the angle: the proximal and distal connectors coincide. \
                     Undo and mark them again.",
                );
                return Err(err);
            }
        };

        let message = analysis.message();
        log::info!("{message}");
        self.analysis_overlays = overlay::analysis_lines(proximal, distal, center, tip);
        self.status = Status::plain(message.clone());
        self.result = Some(message);
        self.phase = Phase::Analyzed;
        let stored: &Analysis = self.analysis.insert(analysis);
        Ok(stored)
    }

    fn clear_analysis(&mut self) {
        self.analysis = None;
        self.result = None;
        self.analysis_overlays.retain(|o| !o.is_analysis());
    }

    /// Derive the phase and instruction from the number of placed points.
    fn enter_capture_phase(&mut self) {
        if self.background.is_none() {
            self.phase = Phase::Idle;
            self.status = Status::plain("Upload an X-ray image to begin.");
            return;
        }
        match self.points.next_landmark() {
            Some(next) => {
                self.phase = Phase::Capturing {
                    placed: self.points.len(),
                };
                self.status = Status {
                    headline: format!("Mark the {}.", next.label()),
                    detail: Some(next.description()),
                };
            }
            None => {
                self.phase = Phase::ReadyToAnalyze;
                self.status = Status::plain(
                    "All points marked. Click \"Analyze\" to process the image.",
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn controller(mode: RotationMode) -> SessionController {
        let mut s = SessionController::new(800.0, mode, MarkerStyle::default());
        s.image_loaded(DecodedImage {
            pixels: RgbaImage::new(400, 400),
            source: "test.png".into(),
        });
        s
    }

    fn mark(s: &mut SessionController, pts: &[(f32, f32)]) {
        for &(x, y) in pts {
            s.dispatch(Action::Click(egui::pos2(x, y)));
        }
    }

    const SETTING_SIX: [(f32, f32); 5] = [
        (0.0, 0.0),
        (0.0, 100.0),
        (30.0, 30.0),
        (50.0, 50.0),
        (50.0, 0.0),
    ];

    #[test]
    fn starts_idle_and_ignores_clicks() {
        let mut s = SessionController::new(800.0, RotationMode::Reproject, MarkerStyle::default());
        assert_eq!(s.phase(), Phase::Idle);
        s.dispatch(Action::Click(egui::pos2(1.0, 1.0)));
        assert!(s.points().is_empty());
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn image_load_starts_capture() {
        let s = controller(RotationMode::Reproject);
        assert_eq!(s.phase(), Phase::Capturing { placed: 0 });
        assert_eq!(s.status().headline, "Mark the Proximal connector.");
        assert_eq!(s.generation(), 1);
    }

    #[test]
    fn clicks_advance_through_labels() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &SETTING_SIX[..2]);
        assert_eq!(s.phase(), Phase::Capturing { placed: 2 });
        assert_eq!(s.status().headline, "Mark the RHS marker.");
        assert_eq!(s.status().detail, Some("Right hand side marker"));

        mark(&mut s, &SETTING_SIX[2..]);
        assert_eq!(s.phase(), Phase::ReadyToAnalyze);
        assert!(s.status().headline.starts_with("All points marked."));
    }

    #[test]
    fn sixth_click_is_ignored() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &SETTING_SIX);
        s.dispatch(Action::Click(egui::pos2(99.0, 99.0)));
        assert_eq!(s.points().len(), 5);
        assert_eq!(s.phase(), Phase::ReadyToAnalyze);
    }

    #[test]
    fn undo_restores_previous_instruction() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &SETTING_SIX);
        s.dispatch(Action::Undo);
        assert_eq!(s.points().len(), 4);
        assert_eq!(s.phase(), Phase::Capturing { placed: 4 });
        assert_eq!(s.status().headline, "Mark the Setting indicator T bar.");
    }

    #[test]
    fn undo_on_empty_is_silent() {
        let mut s = controller(RotationMode::Reproject);
        s.dispatch(Action::Undo);
        assert_eq!(s.phase(), Phase::Capturing { placed: 0 });
        assert_eq!(s.status().headline, "Mark the Proximal connector.");
    }

    #[test]
    fn analyze_before_five_points() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &SETTING_SIX[..3]);
        assert!(matches!(
            s.analyze(),
            Err(AnnotateError::IncompletePoints { placed: 3 })
        ));
        assert_eq!(s.status().headline, "Please mark all 5 points before analyzing.");
        assert!(!s.can_export());
    }

    #[test]
    fn analyze_ignores_rhs_marker() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &SETTING_SIX);
        s.dispatch(Action::Analyze);
        assert_eq!(s.phase(), Phase::Analyzed);
        let analysis = *s.analysis().unwrap();
        assert_abs_diff_eq!(analysis.angle_degrees, 0.0, epsilon = 1e-9);
        assert_eq!(
            s.result(),
            Some("Analysis complete. Angle: 0.00°, Estimated Setting: 6")
        );
        assert!(s.can_export());
        assert_eq!(s.overlays().iter().filter(|o| o.is_analysis()).count(), 3);

        // Moving the RHS marker changes nothing.
        s.dispatch(Action::Undo);
        s.dispatch(Action::Undo);
        s.dispatch(Action::Undo);
        mark(&mut s, &[(700.0, 10.0), (50.0, 50.0), (50.0, 0.0)]);
        s.dispatch(Action::Analyze);
        assert_eq!(s.analysis().unwrap().setting(), analysis.setting());
    }

    #[test]
    fn clicks_off_the_surface_are_ignored() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &[(-5.0, 10.0), (10.0, 800.5), (900.0, 400.0)]);
        assert!(s.points().is_empty());
        assert_eq!(s.phase(), Phase::Capturing { placed: 0 });

        mark(&mut s, &[(800.0, 800.0)]);
        assert_eq!(s.points().len(), 1);
        assert_eq!(s.points()[0].position, egui::pos2(800.0, 800.0));
    }

    #[test]
    fn analyze_can_be_repeated() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &SETTING_SIX);
        s.analyze().unwrap();
        s.analyze().unwrap();
        assert_eq!(s.phase(), Phase::Analyzed);
        assert_eq!(s.overlays().iter().filter(|o| o.is_analysis()).count(), 3);
    }

    #[test]
    fn inconclusive_result_names_bracket() {
        let mut s = controller(RotationMode::Reproject);
        // Indicator tilted 20° left of straight up reads 340°, inside the 337..350 gap.
        let (sin, cos) = (-20f32).to_radians().sin_cos();
        let tip = (50.0 + 50.0 * sin, 50.0 - 50.0 * cos);
        mark(&mut s, &[(0.0, 0.0), (0.0, 100.0), (30.0, 30.0), (50.0, 50.0), tip]);
        s.dispatch(Action::Analyze);
        assert_eq!(
            s.result(),
            Some("Image inconclusive - estimated setting is between 5 and 6. Please repeat the X-ray.")
        );
        assert!(s.can_export());
    }

    #[test]
    fn degenerate_axis_is_reported() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &[(5.0, 5.0), (5.0, 5.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
        assert!(matches!(s.analyze(), Err(AnnotateError::DegenerateAxis)));
        assert_eq!(s.phase(), Phase::ReadyToAnalyze);
        assert!(s.status().headline.starts_with("Cannot compute the angle"));
        assert!(s.result().is_none());
    }

    #[test]
    fn undo_after_analysis_discards_result() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &SETTING_SIX);
        s.dispatch(Action::Analyze);
        s.dispatch(Action::Undo);
        assert_eq!(s.phase(), Phase::Capturing { placed: 4 });
        assert!(s.result().is_none());
        assert!(s.overlays().iter().all(|o| !o.is_analysis()));
    }

    #[test]
    fn reset_clears_points_and_orientation() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &SETTING_SIX);
        s.dispatch(Action::Rotate(45.0));
        s.dispatch(Action::Flip);
        s.dispatch(Action::Analyze);
        s.dispatch(Action::Reset);
        assert!(s.points().is_empty());
        assert_eq!(s.phase(), Phase::Capturing { placed: 0 });
        let t = s.background().unwrap().transform;
        assert_eq!(t.rotation_degrees, 0.0);
        assert!(!t.flip_x);
        assert!(s.overlays().is_empty());
    }

    #[test]
    fn rotate_and_flip_keep_phase() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &SETTING_SIX[..2]);
        s.dispatch(Action::Rotate(30.0));
        s.dispatch(Action::Flip);
        assert_eq!(s.phase(), Phase::Capturing { placed: 2 });
        assert_eq!(s.rotation_degrees(), 30.0);
    }

    #[test]
    fn flip_leaves_points_in_place() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &SETTING_SIX[..2]);
        let before: Vec<_> = s.points().to_vec();
        s.dispatch(Action::Flip);
        assert_eq!(s.points(), before.as_slice());
        assert!(s.background().unwrap().transform.flip_x);
    }

    #[test]
    fn two_step_rotation_compounds_in_reproject_mode() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &[(500.0, 400.0)]);
        s.dispatch(Action::Rotate(45.0));
        s.dispatch(Action::Rotate(45.0));
        // 90° total about the centre (400, 400)
        let p = s.points()[0].position;
        assert_abs_diff_eq!(p.x, 400.0, epsilon = 1e-3);
        assert_abs_diff_eq!(p.y, 500.0, epsilon = 1e-3);
    }

    #[test]
    fn two_step_rotation_is_absolute_in_baseline_mode() {
        let mut s = controller(RotationMode::Baseline);
        mark(&mut s, &[(500.0, 400.0)]);
        s.dispatch(Action::Rotate(45.0));
        s.dispatch(Action::Rotate(45.0));
        let p = s.points()[0].position;
        let half = 100.0 * std::f32::consts::FRAC_1_SQRT_2;
        assert_abs_diff_eq!(p.x, 400.0 + half, epsilon = 1e-3);
        assert_abs_diff_eq!(p.y, 400.0 + half, epsilon = 1e-3);
    }

    #[test]
    fn second_image_load_wins() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &SETTING_SIX[..3]);
        s.image_loaded(DecodedImage {
            pixels: RgbaImage::new(200, 100),
            source: "second.png".into(),
        });
        assert!(s.points().is_empty());
        assert_eq!(s.generation(), 2);
        assert_eq!(s.background().unwrap().transform.image_size, egui::vec2(200.0, 100.0));
    }

    #[test]
    fn failed_load_reports_and_keeps_session() {
        let mut s = controller(RotationMode::Reproject);
        mark(&mut s, &SETTING_SIX[..1]);
        s.image_failed(&AnnotateError::Decode("bad header".into()));
        assert!(s.status().headline.starts_with("Could not load image:"));
        assert_eq!(s.points().len(), 1);
    }
}
