use thiserror::Error;

/// Failures the library surfaces to callers.
///
/// Only invalid input escapes `process`; degenerate numerics inside a
/// lap are absorbed locally and logged.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no valid samples in input")]
    NoSamples,

    #[error("no laps found in input")]
    NoLaps,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
