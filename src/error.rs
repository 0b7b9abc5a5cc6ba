use crate::cursor::OutOfData;
use thiserror::Error;

/// crate specific Result type
pub type Result<T> = std::result::Result<T, Error>;

/// crate specific Error enum
#[derive(Error, Debug)]
pub enum Error {
    /// A decoder rejected its input
    #[error(transparent)]
    Format(#[from] FormatError),

    /// A decoder rejected a named resource
    #[error("could not decode {resource} ({stage}): {source}")]
    Decode {
        resource: String,
        stage: &'static str,
        #[source]
        source: FormatError,
    },

    /// The asset provider has no resource at this path
    #[error("resource not found: {path}")]
    MissingResource {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// [std::io::Error]
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The tile id does not belong to the tileset
    #[error("tile {0} is not part of this tileset")]
    UnknownTile(usize),
}

impl Error {
    /// Attaches the resource name and decode stage to a format error.
    pub fn decode(resource: impl Into<String>, stage: &'static str, source: FormatError) -> Self {
        Error::Decode {
            resource: resource.into(),
            stage,
            source,
        }
    }
}

/// Structural violations found while decoding a buffer.
///
/// Always fatal to the single decode call; no partial result is returned.
#[derive(Error, Debug)]
pub enum FormatError {
    /// The file does not start with the expected magic value
    #[error("invalid {format} magic: expected {expected:#x}, found {found:#x}")]
    BadMagic {
        format: &'static str,
        expected: u32,
        found: u32,
    },

    /// A read ran past the end of the buffer
    #[error("truncated data: {0}")]
    Truncated(#[from] OutOfData),

    /// The point cloud feature table is not usable
    #[error("invalid feature table: {0}")]
    FeatureTable(String),

    /// [serde_json::Error]
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Text that must be UTF-8 is not
    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),

    /// A record is internally inconsistent
    #[error("invalid record {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },
}
