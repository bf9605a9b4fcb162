use std::io;
use thiserror::Error;

/// The primary error type for the `br124ac-lib` library.
///
/// The decode engine itself never fails: every byte value at every offset
/// is decodable, and sync loss is a state transition rather than an error.
/// Errors only arise in the byte-source layer.
#[derive(Error, Debug)]
pub enum AcError {
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no sync sequence found in capture")]
    NoSync,

    #[error("seeking is not supported by this byte source")]
    SeekUnsupported,
}
