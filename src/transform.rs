//! Background orientation and the point re-projection that follows it.
//!
//! All positions live in surface coordinates: a square of side `surface_size`
//! with y pointing down. The background image is fitted into that square,
//! then mirrored (flip) and rotated about its visual centre. Positive angles
//! turn clockwise on screen.

use eframe::egui;
use serde::{Deserialize, Serialize};

/// How `rotate_to_absolute` moves points that are already placed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RotationMode {
    /// Every call rotates the current positions by the requested angle, so
    /// successive slider moves compound on the points.
    #[default]
    Reproject,
    /// Points are rotated by the difference between the requested angle and
    /// the background's current angle, keeping them locked to the image.
    Baseline,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackgroundTransform {
    pub rotation_degrees: f32,
    pub flip_x: bool,
    pub scale: f32,
    /// Surface position of the unrotated image's top-left corner.
    pub offset: egui::Vec2,
    /// Decoded pixel size.
    pub image_size: egui::Vec2,
}

impl Default for BackgroundTransform {
    fn default() -> Self {
        Self {
            rotation_degrees: 0.0,
            flip_x: false,
            scale: 1.0,
            offset: egui::Vec2::ZERO,
            image_size: egui::Vec2::ZERO,
        }
    }
}

impl BackgroundTransform {
    /// Fit an image into a square surface, preserving aspect ratio and centring it.
    pub fn fit(image_size: egui::Vec2, surface_size: f32) -> Self {
        let scale = (surface_size / image_size.x).min(surface_size / image_size.y);
        let offset = (egui::vec2(surface_size, surface_size) - image_size * scale) * 0.5;
        Self {
            scale,
            offset,
            image_size,
            ..Default::default()
        }
    }

    /// Drop rotation and flip, keep the fit.
    pub fn clear_orientation(&mut self) {
        self.rotation_degrees = 0.0;
        self.flip_x = false;
    }

    pub fn displayed_size(&self) -> egui::Vec2 {
        self.image_size * self.scale
    }

    /// Visual centre of the background, the pivot for every rotation.
    pub fn center(&self) -> egui::Pos2 {
        (self.offset + self.displayed_size() * 0.5).to_pos2()
    }

    /// Image pixel coordinates to surface coordinates, flip and rotation applied.
    pub fn image_to_surface(&self, pixel: egui::Pos2) -> egui::Pos2 {
        let x = if self.flip_x {
            self.image_size.x - pixel.x
        } else {
            pixel.x
        };
        let placed = (egui::vec2(x, pixel.y) * self.scale + self.offset).to_pos2();
        rotate_about(placed, self.center(), self.rotation_degrees)
    }

    /// Inverse of [`Self::image_to_surface`]. `None` when the surface point
    /// falls outside the image.
    pub fn surface_to_image(&self, pos: egui::Pos2) -> Option<egui::Pos2> {
        if self.scale <= 0.0 {
            return None;
        }
        let unrotated = rotate_about(pos, self.center(), -self.rotation_degrees);
        let local = (unrotated.to_vec2() - self.offset) / self.scale;
        let x = if self.flip_x {
            self.image_size.x - local.x
        } else {
            local.x
        };
        let inside = x >= 0.0 && local.y >= 0.0 && x < self.image_size.x && local.y < self.image_size.y;
        inside.then(|| egui::pos2(x, local.y))
    }

    /// Surface corners of the displayed image paired with texture uv, in
    /// top-left, top-right, bottom-right, bottom-left order.
    pub fn corners(&self) -> [(egui::Pos2, egui::Pos2); 4] {
        let (w, h) = (self.image_size.x, self.image_size.y);
        [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)].map(|(x, y)| {
            let uv = egui::pos2(x / w.max(f32::EPSILON), y / h.max(f32::EPSILON));
            (self.image_to_surface(egui::pos2(x, y)), uv)
        })
    }
}

/// Rotate `p` about `center` by `degrees`, clockwise on a y-down surface.
pub fn rotate_about(p: egui::Pos2, center: egui::Pos2, degrees: f32) -> egui::Pos2 {
    if degrees == 0.0 {
        return p;
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let d = p - center;
    center + egui::vec2(d.x * cos - d.y * sin, d.x * sin + d.y * cos)
}

/// Keeps the background orientation and the placed points in step.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransformEngine {
    pub mode: RotationMode,
}

impl TransformEngine {
    pub const MIN_ANGLE: f32 = -180.0;
    pub const MAX_ANGLE: f32 = 180.0;

    pub fn new(mode: RotationMode) -> Self {
        Self { mode }
    }

    /// Set the background's absolute rotation and return the re-projected
    /// positions for `positions`.
    pub fn rotate_to_absolute(
        &self,
        background: &mut BackgroundTransform,
        positions: &[egui::Pos2],
        angle_degrees: f32,
    ) -> Vec<egui::Pos2> {
        let angle = angle_degrees.clamp(Self::MIN_ANGLE, Self::MAX_ANGLE);
        let step = match self.mode {
            RotationMode::Reproject => angle,
            RotationMode::Baseline => angle - background.rotation_degrees,
        };
        background.rotation_degrees = angle;
        log::debug!("background rotation {angle}°, points turned {step}°");

        let center = background.center();
        positions
            .iter()
            .map(|p| rotate_about(*p, center, step))
            .collect()
    }

    /// Mirror the background. Point positions are deliberately left alone.
    pub fn flip_horizontal(&self, background: &mut BackgroundTransform) {
        background.flip_x = !background.flip_x;
        log::debug!("background flip_x = {}", background.flip_x);
    }
}
