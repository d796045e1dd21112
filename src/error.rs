use thiserror::Error;

// ---------------------------------------------------------------------------
// Core pipeline errors
// ---------------------------------------------------------------------------

/// Failures raised by preprocessing, training, evaluation and the
/// gas-challenge post-processor. File and configuration problems are
/// reported through `anyhow` at the I/O edges instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Fewer than two values, a non-finite value, or zero spread.
    #[error("degenerate spectrum: {0}")]
    DegenerateInput(&'static str),

    #[error("wavelength index {index} out of range for a spectrum of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("wavelength index {0} selected more than once")]
    DuplicateIndex(usize),

    #[error("wavelength selection is empty")]
    EmptySelection,

    #[error("{what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{0} is empty")]
    EmptyInput(&'static str),

    /// Relative error is undefined for a zero ground-truth label.
    #[error("label at position {0} is zero, relative error undefined")]
    ZeroLabel(usize),

    #[error("tumour coordinate ({x}, {y}) is not among the chosen pixels")]
    UnknownCoordinate { x: u32, y: u32 },

    #[error("pixel ({x}, {y}) lies outside a {width}x{height} map")]
    CoordinateOutOfBounds {
        x: u32,
        y: u32,
        width: usize,
        height: usize,
    },

    #[error("series has {actual} timesteps, need more than the {baseline} baseline timesteps")]
    InsufficientTimesteps { baseline: usize, actual: usize },

    #[error("invalid histogram: {0}")]
    InvalidHistogram(&'static str),

    #[error("row {row}")]
    Row {
        row: usize,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Attach the position of the failing item in a collection.
    pub fn at_row(self, row: usize) -> Self {
        PipelineError::Row {
            row,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
