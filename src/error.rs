//! Error type shared by the journal core.

use std::fmt;
use std::path::PathBuf;

/// What went wrong while reading or writing a journal file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistenceErrorKind {
    /// Filesystem access failed.
    Io,
    /// The payload was not a valid journal document.
    Decode,
    /// The requested format is not handled by this store.
    Unsupported,
    /// The file exceeded the store's size cap.
    TooLarge,
}

impl PersistenceErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Io => "i/o failure",
            Self::Decode => "malformed document",
            Self::Unsupported => "unsupported format",
            Self::TooLarge => "file too large",
        }
    }
}

/// Journal error.
#[derive(Debug)]
pub enum JournalError {
    /// Page or variable index outside the valid bounds.
    OutOfRange { index: usize, len: usize },
    /// Mutation attempted on a built-in (non-deletable) variable.
    Immutable { index: usize },
    /// Image file missing or corrupt.
    ResourceLoad { path: PathBuf, reason: String },
    /// Book, variables or settings could not be loaded or saved.
    Persistence {
        path: PathBuf,
        kind: PersistenceErrorKind,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl JournalError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, kind: PersistenceErrorKind) -> Self {
        Self::Persistence {
            path: path.into(),
            kind,
            source: None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            kind: PersistenceErrorKind::Io,
            source: Some(Box::new(err)),
        }
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, err: serde_json::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            kind: PersistenceErrorKind::Decode,
            source: Some(Box::new(err)),
        }
    }

    /// Persistence failure kind, if this is a persistence error.
    pub fn persistence_kind(&self) -> Option<PersistenceErrorKind> {
        match self {
            Self::Persistence { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { index, len } => {
                write!(f, "index {} out of range (len={})", index, len)
            }
            Self::Immutable { index } => write!(f, "variable {} is read-only", index),
            Self::ResourceLoad { path, reason } => {
                write!(f, "unable to load image {}: {}", path.display(), reason)
            }
            Self::Persistence { path, kind, source } => match source {
                Some(err) => write!(f, "{} ({}): {}", kind.as_str(), path.display(), err),
                None => write!(f, "{} ({})", kind.as_str(), path.display()),
            },
        }
    }
}

impl std::error::Error for JournalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Persistence {
                source: Some(err), ..
            } => Some(&**err),
            _ => None,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, JournalError>;
