//! Coarse error taxonomy shared by every stage.

use std::fmt;

/// The category an error falls into, independent of the stage that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The input path does not exist.
    NotFound,
    /// The input is unusable as given (a directory, a missing field, a bad URL).
    InvalidInput,
    /// Reading or writing failed at the OS level.
    Io,
    /// A manifest or registry response could not be decoded.
    Decode,
    /// Transport failure or a non-success HTTP status.
    Network,
}

impl ErrorKind {
    /// Returns the kind as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::InvalidInput => "invalid input",
            Self::Io => "I/O error",
            Self::Decode => "decode error",
            Self::Network => "network error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
