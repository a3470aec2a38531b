//! Error module for the noise correlation library.
use std::error::Error;
use std::fmt;

/// Error types for the library.
#[derive(Debug, PartialEq)]
pub enum NCError {
    /// Error for invalid parameters, e.g., a non-positive bin size.
    InvalidParameter(String),
    /// Error for invalid spike times, e.g., NaN or infinite values.
    InvalidSpikeTimes(String),
    /// Error for signals that cannot be correlated together, e.g., different lengths.
    IncompatibleSignals(String),
    /// Error for out of bounds access, e.g., a combination index past the last cluster pair.
    OutOfBounds(String),
    /// Error for a cluster missing from the session.
    ClusterNotFound(String),
    /// Error for a missing or unreadable directory.
    InvalidDirectory(String),
    /// Error for I/O operations.
    IOError(String),
    /// Error for malformed files, e.g., an unexpected MAT element.
    FormatError(String),
}

impl fmt::Display for NCError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NCError::InvalidParameter(e) => write!(f, "Invalid parameters: {}", e),
            NCError::InvalidSpikeTimes(e) => write!(f, "Invalid spike times: {}", e),
            NCError::IncompatibleSignals(e) => write!(f, "Incompatible signals: {}", e),
            NCError::OutOfBounds(e) => write!(f, "Index out of bounds: {}", e),
            NCError::ClusterNotFound(e) => write!(f, "Cluster not found: {}", e),
            NCError::InvalidDirectory(e) => write!(f, "Invalid directory: {}", e),
            NCError::IOError(e) => write!(f, "I/O error: {}", e),
            NCError::FormatError(e) => write!(f, "Format error: {}", e),
        }
    }
}

impl Error for NCError {}

impl From<std::io::Error> for NCError {
    fn from(e: std::io::Error) -> Self {
        NCError::IOError(e.to_string())
    }
}
