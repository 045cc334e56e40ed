use thiserror::Error;

/// Everything that can go wrong while annotating, analysing or exporting.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AnnotateError {
    #[error("all {capacity} landmarks are already placed")]
    CapacityExceeded { capacity: usize },

    #[error("no landmarks to remove")]
    Empty,

    #[error("proximal and distal connectors coincide")]
    DegenerateAxis,

    #[error("only {placed} of 5 landmarks placed")]
    IncompletePoints { placed: usize },

    #[error("no image loaded")]
    NoImage,

    #[error("unsupported file type: {0}")]
    UnsupportedExtension(String),

    #[error("file is {size} bytes, limit is {limit}")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("clipboard: {0}")]
    Clipboard(String),

    #[error("export font: {0}")]
    Font(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnnotateError>;
