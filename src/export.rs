use std::path::{Path, PathBuf};

use ab_glyph::{FontRef, PxScale};
use eframe::egui;
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use serde::Serialize;

use crate::classifier::Classification;
use crate::error::{AnnotateError, Result};
use crate::overlay::{arrowhead_triangle, OverlayKind};
use crate::session::ExportView;

/// Fill for surface area the background does not cover.
const SURFACE_FILL: [u8; 4] = [0xf0, 0xf0, 0xf0, 0xff];

/// Height of the white strip under the surface that carries the result line.
pub const RESULT_STRIP_HEIGHT: u32 = 28;
const RESULT_FONT_SIZE: f32 = 14.0;
const LABEL_OUTLINE: [u8; 4] = [0, 0, 0, 0xff];

fn export_font() -> Result<FontRef<'static>> {
    FontRef::try_from_slice(epaint_default_fonts::UBUNTU_LIGHT)
        .map_err(|e| AnnotateError::Font(e.to_string()))
}

#[derive(Debug, Serialize)]
pub struct ReportPoint {
    pub label: String,
    pub position: (f32, f32),
}

/// Sidecar written next to the exported PNG.
#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub result: String,
    pub angle_degrees: Option<f64>,
    pub classification: Option<Classification>,
    pub rotation_degrees: f32,
    pub flip_x: bool,
    pub points: Vec<ReportPoint>,
}

impl AnalysisReport {
    pub fn from_view(view: &ExportView<'_>) -> Result<Self> {
        let result = view.result.ok_or(AnnotateError::IncompletePoints {
            placed: view.points.len(),
        })?;
        let (rotation_degrees, flip_x) = view
            .background
            .map_or((0.0, false), |b| (b.transform.rotation_degrees, b.transform.flip_x));
        Ok(Self {
            result: result.to_owned(),
            angle_degrees: view.analysis.map(|a| a.angle_degrees),
            classification: view.analysis.map(|a| a.classification),
            rotation_degrees,
            flip_x,
            points: view
                .points
                .iter()
                .map(|p| ReportPoint {
                    label: p.label().to_owned(),
                    position: (p.position.x, p.position.y),
                })
                .collect(),
        })
    }
}

/// Rasterize background and overlays at surface resolution, with the result
/// line in a strip along the bottom edge.
pub fn render_composite(view: &ExportView<'_>) -> Result<RgbaImage> {
    let background = view.background.ok_or(AnnotateError::NoImage)?;
    let font = export_font()?;
    let side = view.surface_size.round().max(1.0) as u32;
    let mut img = RgbaImage::from_pixel(side, side + RESULT_STRIP_HEIGHT, Rgba(SURFACE_FILL));
    for y in side..side + RESULT_STRIP_HEIGHT {
        for x in 0..side {
            img.put_pixel(x, y, Rgba([0xff; 4]));
        }
    }

    let t = &background.transform;
    let (src_w, src_h) = background.pixels.dimensions();
    for (x, y, px) in img.enumerate_pixels_mut() {
        if y >= side {
            continue;
        }
        let surface = egui::pos2(x as f32 + 0.5, y as f32 + 0.5);
        if let Some(p) = t.surface_to_image(surface) {
            let sx = (p.x as u32).min(src_w.saturating_sub(1));
            let sy = (p.y as u32).min(src_h.saturating_sub(1));
            *px = *background.pixels.get_pixel(sx, sy);
        }
    }

    for el in &view.overlays {
        match &el.kind {
            OverlayKind::Circle {
                center,
                radius,
                fill,
                stroke,
                stroke_width,
            } => {
                fill_disc(&mut img, *center, radius + stroke_width, stroke.to_rgba_u8());
                fill_disc(&mut img, *center, *radius, fill.to_rgba_u8());
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
                draw_line_on_image(
                    &mut img,
                    start.0,
                    start.1,
                    end.0,
                    end.1,
                    *thickness,
                    color.to_rgba_u8(),
                );
            }
            OverlayKind::Arrowhead {
                tip,
                direction,
                length,
                color,
            } => {
                let c = color.to_rgba_u8();
                let [a, b, d] = arrowhead_triangle(*tip, *direction, *length);
                draw_line_on_image(&mut img, a.0, a.1, b.0, b.1, 2.0, c);
                draw_line_on_image(&mut img, b.0, b.1, d.0, d.1, 2.0, c);
                draw_line_on_image(&mut img, d.0, d.1, a.0, a.1, 2.0, c);
            }
            OverlayKind::Label {
                pos,
                content,
                font_size,
                color,
            } => {
                draw_outlined_text(
                    &mut img,
                    &font,
                    *pos,
                    *font_size,
                    content,
                    color.to_rgba_u8(),
                );
            }
        }
    }

    if let Some(result) = view.result {
        let y = side + (RESULT_STRIP_HEIGHT - RESULT_FONT_SIZE as u32) / 2;
        draw_text_mut(
            &mut img,
            Rgba([0, 0, 0, 0xff]),
            10,
            y as i32,
            PxScale::from(RESULT_FONT_SIZE),
            &font,
            result,
        );
    }
    Ok(img)
}

/// Text with a one pixel dark ring so white labels stay legible on light film.
fn draw_outlined_text(
    img: &mut RgbaImage,
    font: &FontRef<'_>,
    pos: (f32, f32),
    size: f32,
    text: &str,
    color: [u8; 4],
) {
    let scale = PxScale::from(size);
    let (x, y) = (pos.0.round() as i32, pos.1.round() as i32);
    for (ox, oy) in [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)] {
        draw_text_mut(img, Rgba(LABEL_OUTLINE), x + ox, y + oy, scale, font, text);
    }
    draw_text_mut(img, Rgba(color), x, y, scale, font, text);
}

pub fn report_path(png_path: &Path) -> PathBuf {
    png_path.with_extension("json")
}

/// Write the composite PNG and its JSON report. Returns the report path.
pub fn export(view: &ExportView<'_>, png_path: &Path) -> Result<PathBuf> {
    let report = AnalysisReport::from_view(view)?;
    let img = render_composite(view)?;
    img.save(png_path)?;

    let json_path = report_path(png_path);
    std::fs::write(&json_path, serde_json::to_string_pretty(&report)?)?;
    log::info!("exported {} and {}", png_path.display(), json_path.display());
    Ok(json_path)
}

fn fill_disc(img: &mut RgbaImage, center: (f32, f32), radius: f32, color: [u8; 4]) {
    let (w, h) = (img.width() as i32, img.height() as i32);
    let r = radius.ceil() as i32;
    let (cx, cy) = (center.0.round() as i32, center.1.round() as i32);
    for oy in -r..=r {
        for ox in -r..=r {
            if (ox * ox + oy * oy) as f32 > radius * radius {
                continue;
            }
            let (px, py) = (cx + ox, cy + oy);
            if px >= 0 && px < w && py >= 0 && py < h {
                img.put_pixel(px as u32, py as u32, Rgba(color));
            }
        }
    }
}

fn draw_line_on_image(
    img: &mut RgbaImage,
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    thickness: f32,
    color: [u8; 4],
) {
    let dx = x1 - x0;
    let dy = y1 - y0;
    let len = (dx * dx + dy * dy).sqrt();
    let steps = (len * 2.0) as i32;
    let half_t = (thickness / 2.0).max(0.5) as i32;
    let (w, h) = (img.width() as i32, img.height() as i32);

    for i in 0..=steps {
        let t = i as f32 / steps.max(1) as f32;
        let cx = (x0 + dx * t) as i32;
        let cy = (y0 + dy * t) as i32;
        for oy in -half_t..=half_t {
            for ox in -half_t..=half_t {
                let px = cx + ox;
                let py = cy + oy;
                if px >= 0 && px < w && py >= 0 && py < h {
                    img.put_pixel(px as u32, py as u32, Rgba(color));
                }
            }
        }
    }
}
