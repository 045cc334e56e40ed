use eframe::egui;
use serde::{Deserialize, Serialize};

use crate::points::LandmarkPoint;

// ── Overlay Model ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color4 {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color4 {
    pub const RED: Color4 = Color4::rgb(1.0, 0.0, 0.0);
    pub const WHITE: Color4 = Color4::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color4 = Color4::rgb(0.0, 0.0, 0.0);
    pub const BLUE: Color4 = Color4::rgb(0.0, 0.0, 1.0);
    pub const GREEN: Color4 = Color4::rgb(0.0, 0.5, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn to_rgba_u8(&self) -> [u8; 4] {
        [
            (self.r * 255.0) as u8,
            (self.g * 255.0) as u8,
            (self.b * 255.0) as u8,
            (self.a * 255.0) as u8,
        ]
    }

    pub fn to_egui(&self) -> egui::Color32 {
        let [r, g, b, a] = self.to_rgba_u8();
        egui::Color32::from_rgba_unmultiplied(r, g, b, a)
    }
}

/// Everything drawn on top of the background, in surface coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OverlayKind {
    Circle {
        center: (f32, f32),
        radius: f32,
        fill: Color4,
        stroke: Color4,
        stroke_width: f32,
    },
    Label {
        pos: (f32, f32),
        content: String,
        font_size: f32,
        color: Color4,
    },
    AxisLine {
        start: (f32, f32),
        end: (f32, f32),
        color: Color4,
        thickness: f32,
    },
    VectorLine {
        start: (f32, f32),
        end: (f32, f32),
        color: Color4,
        thickness: f32,
    },
    Arrowhead {
        tip: (f32, f32),
        /// Direction the arrow points, radians on a y-down surface.
        direction: f32,
        length: f32,
        color: Color4,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayElement {
    pub kind: OverlayKind,
}

impl OverlayElement {
    /// Produced by analysis rather than by placing a point.
    pub fn is_analysis(&self) -> bool {
        matches!(
            self.kind,
            OverlayKind::AxisLine { .. } | OverlayKind::VectorLine { .. } | OverlayKind::Arrowhead { .. }
        )
    }
}

/// Marker geometry used when deriving overlays from points.
#[derive(Clone, Copy, Debug)]
pub struct MarkerStyle {
    pub radius: f32,
    pub label_offset: f32,
    pub font_size: f32,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            radius: 5.0,
            label_offset: 10.0,
            font_size: 14.0,
        }
    }
}

/// Circle and label for each placed point.
pub fn markers(points: &[LandmarkPoint], style: &MarkerStyle) -> Vec<OverlayElement> {
    let mut out = Vec::with_capacity(points.len() * 2);
    for p in points {
        let (x, y) = (p.position.x, p.position.y);
        out.push(OverlayElement {
            kind: OverlayKind::Circle {
                center: (x, y),
                radius: style.radius,
                fill: Color4::RED,
                stroke: Color4::WHITE,
                stroke_width: 2.0,
            },
        });
        out.push(OverlayElement {
            kind: OverlayKind::Label {
                pos: (x + style.label_offset, y + style.label_offset),
                content: p.label().to_owned(),
                font_size: style.font_size,
                color: Color4::WHITE,
            },
        });
    }
    out
}

/// Valve axis, setting vector and its arrowhead.
pub fn analysis_lines(
    proximal: egui::Pos2,
    distal: egui::Pos2,
    indicator_center: egui::Pos2,
    indicator_tip: egui::Pos2,
) -> Vec<OverlayElement> {
    let direction = (indicator_tip.y - indicator_center.y).atan2(indicator_tip.x - indicator_center.x);
    vec![
        OverlayElement {
            kind: OverlayKind::AxisLine {
                start: (proximal.x, proximal.y),
                end: (distal.x, distal.y),
                color: Color4::BLUE,
                thickness: 2.0,
            },
        },
        OverlayElement {
            kind: OverlayKind::VectorLine {
                start: (indicator_center.x, indicator_center.y),
                end: (indicator_tip.x, indicator_tip.y),
                color: Color4::GREEN,
                thickness: 2.0,
            },
        },
        OverlayElement {
            kind: OverlayKind::Arrowhead {
                tip: (indicator_tip.x, indicator_tip.y),
                direction,
                length: 10.0,
                color: Color4::GREEN,
            },
        },
    ]
}

/// The three corners of an arrowhead, tip first.
pub fn arrowhead_triangle(tip: (f32, f32), direction: f32, length: f32) -> [(f32, f32); 3] {
    let (dy, dx) = direction.sin_cos();
    let (px, py) = (-dy, dx);
    let back = (tip.0 - dx * length, tip.1 - dy * length);
    let half = length * 0.5;
    [
        tip,
        (back.0 + px * half, back.1 + py * half),
        (back.0 - px * half, back.1 - py * half),
    ]
}
