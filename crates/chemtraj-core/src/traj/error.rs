use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Where in a file a format error was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Header,
    Byte(u64),
    Line(usize),
    Frame(usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "header"),
            Self::Byte(offset) => write!(f, "byte {offset}"),
            Self::Line(line) => write!(f, "line {line}"),
            Self::Frame(frame) => write!(f, "frame {frame}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrajError {
    /// Clean end of stream. Callers treat this as loop termination, not failure.
    #[error("No more frames")]
    LastFrame,

    #[error("Malformed {file} at {location}: {message}")]
    Format {
        file: String,
        location: Location,
        message: String,
    },

    #[error("Cannot access '{}': {source}", .path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Buffer holds {found} positions but the trajectory has {expected} atoms")]
    Capacity { expected: usize, found: usize },

    /// A coordinate the target format cannot represent. Nothing was written.
    #[error("Cannot encode {value} for atom {atom} of frame {frame}")]
    InvalidCoordinate { frame: usize, atom: usize, value: f64 },

    #[error("{file} uses an unsupported feature: {feature}")]
    Unsupported { file: String, feature: String },

    #[error("Cannot write header entry '{key}': {reason}")]
    InvalidHeader { key: String, reason: &'static str },

    #[error("Trajectory is closed or exhausted")]
    NotReadable,

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Frame decoder stopped before delivering a result")]
    Disconnected,

    #[error("XTC error: {0}")]
    Xdr(#[from] xdrfile::Error),
}

impl TrajError {
    pub fn is_last_frame(&self) -> bool {
        matches!(self, Self::LastFrame)
    }

    /// True for conditions that mean the data or the file is unusable.
    ///
    /// End of stream and cancellation are control flow. Capacity mismatches,
    /// unencodable coordinates and reads from a closed handle are caller errors
    /// that leave the file intact.
    pub fn is_critical(&self) -> bool {
        !matches!(
            self,
            Self::LastFrame
                | Self::Cancelled
                | Self::Capacity { .. }
                | Self::InvalidCoordinate { .. }
                | Self::NotReadable
        )
    }

    pub(crate) fn format(file: &str, location: Location, message: impl Into<String>) -> Self {
        Self::Format {
            file: file.to_string(),
            location,
            message: message.into(),
        }
    }

    pub(crate) fn resource(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Resource {
            path: path.into(),
            source,
        }
    }
}
