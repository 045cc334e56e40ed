//! Angle-bucket classification of the valve setting.
//!
//! The setting vector's angle is measured against the reversed valve axis
//! and looked up in a fixed table of eight ranges. Narrow gaps separate the
//! ranges; an angle in a gap is reported as inconclusive together with the
//! two settings on either side.

use std::fmt;

use eframe::egui;
use serde::{Deserialize, Serialize};

use crate::error::{AnnotateError, Result};

/// One of the eight mechanical valve positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValveSetting(pub u8);

impl fmt::Display for ValveSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive angle range in degrees. `min > max` marks the range that wraps
/// through 0°.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SettingRange {
    pub min: f64,
    pub max: f64,
    pub setting: ValveSetting,
}

impl SettingRange {
    const fn new(min: f64, max: f64, setting: u8) -> Self {
        Self {
            min,
            max,
            setting: ValveSetting(setting),
        }
    }

    pub fn wraps(&self) -> bool {
        self.min > self.max
    }

    pub fn contains(&self, angle: f64) -> bool {
        if self.wraps() {
            angle >= self.min || angle <= self.max
        } else {
            angle >= self.min && angle <= self.max
        }
    }
}

/// Ordered counter-clockwise around the circle starting at the wrap range.
pub const SETTING_RANGES: [SettingRange; 8] = [
    SettingRange::new(350.0, 26.0, 6),
    SettingRange::new(33.0, 70.0, 7),
    SettingRange::new(77.0, 115.0, 8),
    SettingRange::new(123.0, 156.0, 1),
    SettingRange::new(171.0, 205.0, 2),
    SettingRange::new(212.0, 249.0, 3),
    SettingRange::new(257.0, 295.0, 4),
    SettingRange::new(302.0, 337.0, 5),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Classification {
    Setting { setting: ValveSetting },
    /// The angle fell between two ranges.
    Unknown {
        lower: ValveSetting,
        upper: ValveSetting,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Normalised into `[0, 360)`.
    pub angle_degrees: f64,
    pub classification: Classification,
}

impl Analysis {
    pub fn setting(&self) -> Option<ValveSetting> {
        match self.classification {
            Classification::Setting { setting } => Some(setting),
            Classification::Unknown { .. } => None,
        }
    }

    /// Operator-facing result line.
    pub fn message(&self) -> String {
        match self.classification {
            Classification::Setting { setting } => format!(
                "Analysis complete. Angle: {:.2}°, Estimated Setting: {}",
                self.angle_degrees, setting
            ),
            Classification::Unknown { lower, upper } => format!(
                "Image inconclusive - estimated setting is between {lower} and {upper}. \
                 Please repeat the X-ray."
            ),
        }
    }
}

/// Fold any angle into `[0, 360)`.
pub fn normalize_degrees(angle: f64) -> f64 {
    let folded = ((angle % 360.0) + 360.0) % 360.0;
    // -0.0 and rounding up to 360 both land here
    if folded == 0.0 || folded >= 360.0 {
        0.0
    } else {
        folded
    }
}

/// Angle of the setting vector relative to the reversed valve axis, in degrees.
pub fn setting_angle(
    proximal: egui::Pos2,
    distal: egui::Pos2,
    indicator_center: egui::Pos2,
    indicator_tip: egui::Pos2,
) -> Result<f64> {
    let (ax, ay) = (
        f64::from(distal.x) - f64::from(proximal.x),
        f64::from(distal.y) - f64::from(proximal.y),
    );
    let length = ax.hypot(ay);
    if length == 0.0 || !length.is_finite() {
        return Err(AnnotateError::DegenerateAxis);
    }
    let (ax, ay) = (ax / length, ay / length);

    let (sx, sy) = (
        f64::from(indicator_tip.x) - f64::from(indicator_center.x),
        f64::from(indicator_tip.y) - f64::from(indicator_center.y),
    );

    let raw = sy.atan2(sx) - (-ay).atan2(-ax);
    Ok(normalize_degrees(raw.to_degrees()))
}

pub fn classify_angle(angle_degrees: f64) -> Classification {
    let angle = normalize_degrees(angle_degrees);
    if let Some(range) = SETTING_RANGES.iter().find(|r| r.contains(angle)) {
        return Classification::Setting {
            setting: range.setting,
        };
    }
    let (lower, upper) = bracket(angle);
    Classification::Unknown { lower, upper }
}

/// The two settings whose ranges surround a gap angle. Walks the table
/// circularly, comparing against the next range's lower bound.
fn bracket(angle: f64) -> (ValveSetting, ValveSetting) {
    let n = SETTING_RANGES.len();
    for i in 0..n {
        let current = SETTING_RANGES[i];
        let next = SETTING_RANGES[(i + 1) % n];
        let in_gap = if next.wraps() {
            angle > current.max && angle < next.min
        } else if current.max < next.min {
            angle > current.max && angle < next.min
        } else {
            // gap straddles 0°
            angle > current.max || angle < next.min
        };
        if in_gap {
            return (current.setting, next.setting);
        }
    }
    // Only reachable for angles inside a range, which callers rule out.
    let nearest = SETTING_RANGES[0].setting;
    (nearest, nearest)
}

/// Full classification from the four consumed landmarks.
pub fn classify(
    proximal: egui::Pos2,
    distal: egui::Pos2,
    indicator_center: egui::Pos2,
    indicator_tip: egui::Pos2,
) -> Result<Analysis> {
    let angle_degrees = setting_angle(proximal, distal, indicator_center, indicator_tip)?;
    Ok(Analysis {
        angle_degrees,
        classification: classify_angle(angle_degrees),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn setting(n: u8) -> Classification {
        Classification::Setting {
            setting: ValveSetting(n),
        }
    }

    fn unknown(lower: u8, upper: u8) -> Classification {
        Classification::Unknown {
            lower: ValveSetting(lower),
            upper: ValveSetting(upper),
        }
    }

    #[test]
    fn ranges_are_disjoint_and_every_angle_has_one_answer() {
        for tenth in 0..3600 {
            let angle = tenth as f64 / 10.0;
            let hits = SETTING_RANGES.iter().filter(|r| r.contains(angle)).count();
            assert!(hits <= 1, "{angle}° is in {hits} ranges");
            match classify_angle(angle) {
                Classification::Setting { setting } => {
                    assert_eq!(hits, 1);
                    assert!((1..=8).contains(&setting.0));
                }
                Classification::Unknown { lower, upper } => {
                    assert_eq!(hits, 0);
                    assert_ne!(lower, upper, "no bracket for {angle}°");
                }
            }
        }
    }

    #[test]
    fn wrap_range_covers_zero() {
        assert_eq!(classify_angle(0.0), setting(6));
        assert_eq!(classify_angle(359.9), setting(6));
        assert_eq!(classify_angle(350.0), setting(6));
        assert_eq!(classify_angle(26.0), setting(6));
        assert_eq!(classify_angle(26.1), unknown(6, 7));
    }

    #[test]
    fn bounds_are_inclusive() {
        assert_eq!(classify_angle(33.0), setting(7));
        assert_eq!(classify_angle(70.0), setting(7));
        assert_eq!(classify_angle(123.0), setting(1));
        assert_eq!(classify_angle(337.0), setting(5));
    }

    #[test]
    fn gaps_report_bracketing_settings() {
        assert_eq!(classify_angle(349.0), unknown(5, 6));
        assert_eq!(classify_angle(27.0), unknown(6, 7));
        assert_eq!(classify_angle(72.0), unknown(7, 8));
        assert_eq!(classify_angle(160.0), unknown(1, 2));
        assert_eq!(classify_angle(300.0), unknown(4, 5));
    }

    #[test]
    fn normalize_folds_negative_and_large_angles() {
        assert_abs_diff_eq!(normalize_degrees(-90.0), 270.0);
        assert_abs_diff_eq!(normalize_degrees(720.5), 0.5);
        assert_eq!(normalize_degrees(-0.0), 0.0);
        assert_eq!(normalize_degrees(-1e-14), 0.0);
    }

    #[test]
    fn vertical_axis_with_upward_indicator_is_setting_six() {
        let analysis = classify(
            egui::pos2(0.0, 0.0),
            egui::pos2(0.0, 100.0),
            egui::pos2(50.0, 50.0),
            egui::pos2(50.0, 0.0),
        )
        .unwrap();
        assert_abs_diff_eq!(analysis.angle_degrees, 0.0, epsilon = 1e-9);
        assert_eq!(analysis.classification, setting(6));
    }

    #[test]
    fn horizontal_axis_with_downward_indicator() {
        // atan2(100, 0) - atan2(-0, -1) = 90° - (-180°) = 270°
        let analysis = classify(
            egui::pos2(0.0, 0.0),
            egui::pos2(100.0, 0.0),
            egui::pos2(0.0, 0.0),
            egui::pos2(0.0, 100.0),
        )
        .unwrap();
        assert_abs_diff_eq!(analysis.angle_degrees, 270.0, epsilon = 1e-9);
        assert_eq!(analysis.setting(), Some(ValveSetting(4)));
    }

    #[test]
    fn coincident_connectors_are_rejected() {
        let err = classify(
            egui::pos2(10.0, 10.0),
            egui::pos2(10.0, 10.0),
            egui::pos2(0.0, 0.0),
            egui::pos2(5.0, 5.0),
        )
        .unwrap_err();
        assert!(matches!(err, AnnotateError::DegenerateAxis));
    }

    #[test]
    fn messages() {
        let ok = Analysis {
            angle_degrees: 142.3712,
            classification: setting(1),
        };
        assert_eq!(
            ok.message(),
            "Analysis complete. Angle: 142.37°, Estimated Setting: 1"
        );
        let gap = Analysis {
            angle_degrees: 340.0,
            classification: unknown(5, 6),
        };
        assert_eq!(
            gap.message(),
            "Image inconclusive - estimated setting is between 5 and 6. Please repeat the X-ray."
        );
    }
}
