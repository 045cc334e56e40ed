mod acquire;
mod app;
mod classifier;
mod config;
mod error;
mod export;
mod overlay;
mod points;
mod session;
mod transform;

use anyhow::Context as _;
use clap::Parser;
use eframe::egui;

use crate::config::{AppConfig, Cli};

// ── Main ────────────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = AppConfig::resolve(&cli).context("failed to load settings")?;
    log::debug!("{config:?}");

    if let Some(path) = &cli.image {
        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
    }

    let title = match cli.image.as_deref().and_then(|p| p.file_name()) {
        Some(name) => format!("valve-annotate — {}", name.to_string_lossy()),
        None => "valve-annotate".to_owned(),
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 900.0])
            .with_title(&title),
        ..Default::default()
    };

    let image = cli.image;
    eframe::run_native(
        &title,
        options,
        Box::new(move |cc| Ok(Box::new(app::ValveApp::new(cc, config, image)))),
    )
    .map_err(|e| anyhow::anyhow!("failed to run eframe: {e}"))
}
