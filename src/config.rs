use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::overlay::MarkerStyle;
use crate::transform::RotationMode;

/// Mark valve landmarks on a radiograph and estimate the valve setting.
#[derive(Parser, Debug)]
#[command(name = "valve-annotate", version)]
pub struct Cli {
    /// Image to open at startup (jpg, jpeg, png or gif).
    pub image: Option<PathBuf>,

    /// Settings file. Defaults to <config dir>/valve-annotate/config.json.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// How placed points follow the rotation slider.
    #[arg(long, value_enum)]
    pub rotation_mode: Option<RotationMode>,
}

/// All tunables in one struct. Every field has a default, so a settings
/// file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Side of the square drawing surface, in points.
    pub surface_size: f32,
    pub marker_radius: f32,
    /// Labels sit this far right of and below their marker.
    pub label_offset: f32,
    pub label_font_size: f32,
    pub rotation_mode: RotationMode,
    /// Larger files are refused before decoding.
    pub max_upload_bytes: u64,
    pub export_file_name: String,
    pub min_zoom: f32,
    pub max_zoom: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surface_size: 800.0,
            marker_radius: 5.0,
            label_offset: 10.0,
            label_font_size: 14.0,
            rotation_mode: RotationMode::Reproject,
            max_upload_bytes: 5_000_000,
            export_file_name: "valve_analysis.png".to_owned(),
            min_zoom: 0.01,
            max_zoom: 20.0,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("valve-annotate").join("config.json"))
    }

    /// Explicit path must exist; the default location is optional.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => {
                    log::info!("using settings from {}", path.display());
                    Self::load(&path)?
                }
                None => Self::default(),
            },
        };
        if let Some(mode) = cli.rotation_mode {
            config.rotation_mode = mode;
        }
        Ok(config)
    }

    pub fn marker_style(&self) -> MarkerStyle {
        MarkerStyle {
            radius: self.marker_radius,
            label_offset: self.label_offset,
            font_size: self.label_font_size,
        }
    }
}
