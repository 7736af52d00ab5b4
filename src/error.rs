use thiserror::Error;

/// Errors raised by the compositing core.
///
/// These are configuration errors: a caller that sees one has wired the
/// pipeline up wrong and should stop rather than retry.
#[derive(Debug, Error)]
pub enum Error {
    #[error("mask has {actual} entries, expected {expected} ({width}x{height})")]
    MaskLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("dimension mismatch: {what} is {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("invalid tuning: {0}")]
    InvalidTuning(String),

    #[error("segmentation model is not ready")]
    ModelNotReady,
}

pub type Result<T> = std::result::Result<T, Error>;
