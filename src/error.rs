//! Error types for EPUB inspection and rewriting

use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, EpubError>;

/// Everything that can go wrong while reading or rewriting an EPUB
#[derive(Error, Debug)]
pub enum EpubError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("mimetype file not found. Is this definitely an EPUB file?")]
    MissingMimetype,

    #[error("Found mimetype file but it contains {found:?}. Expected: \"application/epub+zip\"")]
    BadMimetype { found: String },

    #[error("Cannot find {0} in archive")]
    MissingEntry(String),

    #[error("Unable to find <rootfiles> <rootfile> in META-INF/container.xml")]
    MissingRootfile,

    #[error("Invalid package document: {0}")]
    InvalidPackage(String),

    #[error("{0} is not an epub archive.")]
    NotAnEpub(String),

    #[error("{0} not found or not a regular file.")]
    NotARegularFile(String),

    #[error("Output file {0} already exists")]
    DestinationExists(String),

    #[error("No input files given")]
    NoInputs,
}

impl From<quick_xml::Error> for EpubError {
    fn from(value: quick_xml::Error) -> Self {
        match value {
            quick_xml::Error::Io(e) => EpubError::Io(std::io::Error::new(e.kind(), e.to_string())),
            other => EpubError::Xml(other.to_string()),
        }
    }
}

impl From<roxmltree::Error> for EpubError {
    fn from(value: roxmltree::Error) -> Self {
        EpubError::Xml(value.to_string())
    }
}
