use eframe::egui;
use serde::{Deserialize, Serialize};

use crate::error::{AnnotateError, Result};

// ── Landmarks ───────────────────────────────────────────────────────────────

/// The five anatomical landmarks, in the order the operator marks them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Landmark {
    ProximalConnector,
    DistalConnector,
    RhsMarker,
    SettingIndicatorBar,
    SettingIndicatorTBar,
}

impl Landmark {
    pub const ALL: [Landmark; 5] = [
        Landmark::ProximalConnector,
        Landmark::DistalConnector,
        Landmark::RhsMarker,
        Landmark::SettingIndicatorBar,
        Landmark::SettingIndicatorTBar,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Short label drawn next to the marker.
    pub fn label(self) -> &'static str {
        match self {
            Landmark::ProximalConnector => "Proximal connector",
            Landmark::DistalConnector => "Distal connector",
            Landmark::RhsMarker => "RHS marker",
            Landmark::SettingIndicatorBar => "Setting indicator bar",
            Landmark::SettingIndicatorTBar => "Setting indicator T bar",
        }
    }

    /// Longer hint shown under the instruction while this landmark is pending.
    pub fn description(self) -> &'static str {
        match self {
            Landmark::ProximalConnector => "Proximal connector",
            Landmark::DistalConnector => "Distal connector",
            Landmark::RhsMarker => "Right hand side marker",
            Landmark::SettingIndicatorBar => "Setting indicator bar",
            Landmark::SettingIndicatorTBar => "Magnet with tantalum ball (setting indicator)",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LandmarkPoint {
    pub landmark: Landmark,
    /// Surface coordinates.
    pub position: egui::Pos2,
}

impl LandmarkPoint {
    pub fn index(&self) -> usize {
        self.landmark.index()
    }

    pub fn label(&self) -> &'static str {
        self.landmark.label()
    }
}

// ── Store ───────────────────────────────────────────────────────────────────

/// Ordered landmark points for the current image. Only append and remove-last
/// are allowed, so indices always form `0..len`.
#[derive(Clone, Debug, Default)]
pub struct PointStore {
    points: Vec<LandmarkPoint>,
}

impl PointStore {
    pub const CAPACITY: usize = Landmark::ALL.len();

    pub fn new() -> Self {
        Self::default()
    }

    /// The landmark the next `add` will be labelled with.
    pub fn next_landmark(&self) -> Option<Landmark> {
        Landmark::from_index(self.points.len())
    }

    pub fn add(&mut self, position: egui::Pos2) -> Result<LandmarkPoint> {
        let Some(landmark) = self.next_landmark() else {
            return Err(AnnotateError::CapacityExceeded {
                capacity: Self::CAPACITY,
            });
        };
        let point = LandmarkPoint { landmark, position };
        self.points.push(point);
        log::debug!(
            "placed {} at ({:.1}, {:.1})",
            landmark.label(),
            position.x,
            position.y
        );
        Ok(point)
    }

    pub fn remove_last(&mut self) -> Result<LandmarkPoint> {
        let point = self.points.pop().ok_or(AnnotateError::Empty)?;
        log::debug!("removed {}", point.label());
        Ok(point)
    }

    pub fn reset(&mut self) {
        self.points.clear();
    }

    pub fn all(&self) -> &[LandmarkPoint] {
        &self.points
    }

    pub fn get(&self, landmark: Landmark) -> Option<&LandmarkPoint> {
        self.points.get(landmark.index())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn positions(&self) -> Vec<egui::Pos2> {
        self.points.iter().map(|p| p.position).collect()
    }

    /// Move every point to the matching entry of `positions`. Labels and
    /// order are untouched; extra or missing entries are ignored.
    pub fn set_positions(&mut self, positions: &[egui::Pos2]) {
        for (point, pos) in self.points.iter_mut().zip(positions) {
            point.position = *pos;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(n: usize) -> PointStore {
        let mut store = PointStore::new();
        for i in 0..n {
            store.add(egui::pos2(i as f32 * 10.0, 5.0)).unwrap();
        }
        store
    }

    #[test]
    fn labels_follow_fixed_order() {
        let store = filled(5);
        let labels: Vec<_> = store.all().iter().map(|p| p.label()).collect();
        assert_eq!(
            labels,
            [
                "Proximal connector",
                "Distal connector",
                "RHS marker",
                "Setting indicator bar",
                "Setting indicator T bar",
            ]
        );
        for (i, p) in store.all().iter().enumerate() {
            assert_eq!(p.index(), i);
        }
    }

    #[test]
    fn sixth_point_is_rejected() {
        let mut store = filled(5);
        let err = store.add(egui::pos2(1.0, 1.0)).unwrap_err();
        assert!(matches!(err, AnnotateError::CapacityExceeded { capacity: 5 }));
        assert_eq!(store.len(), 5);
        assert_eq!(store.all()[4].position, egui::pos2(40.0, 5.0));
    }

    #[test]
    fn remove_last_reoffers_label() {
        let mut store = filled(5);
        let removed = store.remove_last().unwrap();
        assert_eq!(removed.landmark, Landmark::SettingIndicatorTBar);
        assert_eq!(store.len(), 4);
        assert_eq!(store.next_landmark(), Some(Landmark::SettingIndicatorTBar));

        let again = store.add(egui::pos2(0.0, 0.0)).unwrap();
        assert_eq!(again.landmark, Landmark::SettingIndicatorTBar);
    }

    #[test]
    fn remove_from_empty_store() {
        let mut store = PointStore::new();
        assert!(matches!(store.remove_last(), Err(AnnotateError::Empty)));
        assert_eq!(store.next_landmark(), Some(Landmark::ProximalConnector));
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut store = filled(3);
        store.reset();
        assert_eq!(store.len(), 0);
        assert_eq!(store.next_landmark(), Some(Landmark::ProximalConnector));
    }

    #[test]
    fn set_positions_keeps_labels() {
        let mut store = filled(2);
        store.set_positions(&[egui::pos2(1.0, 2.0), egui::pos2(3.0, 4.0)]);
        assert_eq!(store.all()[0].position, egui::pos2(1.0, 2.0));
        assert_eq!(store.all()[1].landmark, Landmark::DistalConnector);
        assert_eq!(store.get(Landmark::DistalConnector).unwrap().position, egui::pos2(3.0, 4.0));
    }
}
