//! Getting pixels into the session: validation, off-thread decoding and
//! clipboard paste.
//!
//! Each request produces exactly one completion. Completions are handed back
//! in arrival order and nothing is cancelled, so when two loads overlap the
//! one that finishes last decides what the session shows.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use image::RgbaImage;

use crate::error::{AnnotateError, Result};

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

pub struct DecodedImage {
    pub pixels: RgbaImage,
    /// File name or "clipboard", for logs.
    pub source: String,
}

#[derive(Debug)]
pub enum ImageSource {
    File(PathBuf),
    /// Bytes handed over without touching disk, e.g. a browser-style drop.
    Bytes { name: String, bytes: Vec<u8> },
    Clipboard,
}

impl ImageSource {
    fn describe(&self) -> String {
        match self {
            ImageSource::File(path) => path.display().to_string(),
            ImageSource::Bytes { name, .. } => name.clone(),
            ImageSource::Clipboard => "clipboard".to_owned(),
        }
    }
}

pub fn check_extension(name: &Path) -> Result<()> {
    let ext = name
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(AnnotateError::UnsupportedExtension(ext))
    }
}

pub fn check_size(size: u64, limit: u64) -> Result<()> {
    if size > limit {
        Err(AnnotateError::FileTooLarge { size, limit })
    } else {
        Ok(())
    }
}

pub fn decode_bytes(bytes: &[u8], source: impl Into<String>) -> Result<DecodedImage> {
    let img = image::load_from_memory(bytes).map_err(|e| AnnotateError::Decode(e.to_string()))?;
    Ok(DecodedImage {
        pixels: img.to_rgba8(),
        source: source.into(),
    })
}

fn load_file(path: &Path, limit: u64) -> Result<DecodedImage> {
    check_extension(path)?;
    check_size(std::fs::metadata(path)?.len(), limit)?;
    let bytes = std::fs::read(path)?;
    decode_bytes(&bytes, path.display().to_string())
}

fn load_clipboard() -> Result<DecodedImage> {
    let mut clipboard = arboard::Clipboard::new().map_err(|e| AnnotateError::Clipboard(e.to_string()))?;
    let data = clipboard
        .get_image()
        .map_err(|e| AnnotateError::Clipboard(e.to_string()))?;
    let pixels = RgbaImage::from_raw(
        data.width as u32,
        data.height as u32,
        data.bytes.into_owned(),
    )
    .ok_or_else(|| AnnotateError::Clipboard("pixel buffer does not match its size".into()))?;
    Ok(DecodedImage {
        pixels,
        source: "clipboard".to_owned(),
    })
}

/// Resolve one request synchronously.
pub fn load(source: ImageSource, limit: u64) -> Result<DecodedImage> {
    match source {
        ImageSource::File(path) => load_file(&path, limit),
        ImageSource::Bytes { name, bytes } => {
            check_extension(Path::new(&name))?;
            check_size(bytes.len() as u64, limit)?;
            decode_bytes(&bytes, name)
        }
        ImageSource::Clipboard => load_clipboard(),
    }
}

pub struct LoadCompletion {
    pub request: u64,
    pub result: Result<DecodedImage>,
}

/// Runs each request on its own thread and queues the results.
pub struct ImageLoader {
    tx: Sender<LoadCompletion>,
    rx: Receiver<LoadCompletion>,
    next_request: u64,
    limit: u64,
    in_flight: usize,
}

impl ImageLoader {
    pub fn new(limit: u64) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            next_request: 0,
            limit,
            in_flight: 0,
        }
    }

    /// Start a load. `on_done` runs on the worker after the result is queued,
    /// typically to wake the UI.
    pub fn request(&mut self, source: ImageSource, on_done: impl FnOnce() + Send + 'static) -> u64 {
        let request = self.next_request;
        self.next_request += 1;
        self.in_flight += 1;
        log::info!("load #{request}: {}", source.describe());

        let tx = self.tx.clone();
        let limit = self.limit;
        std::thread::spawn(move || {
            let result = load(source, limit);
            // Receiver gone means the app is shutting down.
            let _ = tx.send(LoadCompletion { request, result });
            on_done();
        });
        request
    }

    /// Completed loads, oldest first.
    pub fn poll(&mut self) -> Vec<LoadCompletion> {
        let done: Vec<_> = self.rx.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(done.len());
        done
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }
}

/// Pixels small enough for a GPU texture whose sides are capped at
/// `max_side`. The full-resolution buffer stays with the session for export.
pub fn display_copy(pixels: &RgbaImage, max_side: usize) -> Cow<'_, RgbaImage> {
    let (w, h) = pixels.dimensions();
    let longest = w.max(h) as usize;
    if longest <= max_side || max_side == 0 {
        return Cow::Borrowed(pixels);
    }
    let ratio = max_side as f64 / longest as f64;
    let nw = ((w as f64 * ratio).floor() as u32).clamp(1, max_side as u32);
    let nh = ((h as f64 * ratio).floor() as u32).clamp(1, max_side as u32);
    log::info!("downscaling {w}x{h} to {nw}x{nh} for display");
    Cow::Owned(image::imageops::resize(
        pixels,
        nw,
        nh,
        image::imageops::FilterType::Triangle,
    ))
}
