//! Error type shared by all the library modules.

use thiserror::Error;

/// Failures surfaced by the library.
///
/// Per-ROI failures inside a multi-ROI analysis are not
/// returned through this type; they are collected as
/// [`AnalysisWarning`][crate::analysis::AnalysisWarning]s
/// so that one bad region never discards a whole image.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("region `{0}` covers no pixels of the field")]
    EmptyRegion(String),

    #[error("mask shape {mask:?} does not match field shape {field:?}")]
    MaskShapeMismatch {
        mask: (usize, usize),
        field: (usize, usize),
    },

    #[error("duplicate ROI name `{0}`")]
    DuplicateName(String),

    #[error("unknown ROI `{0}`")]
    UnknownRoi(String),

    #[error("removing `{roi}` would leave comparison group {group:?} with fewer than 2 members")]
    DanglingGroupReference { roi: String, group: Vec<String> },

    #[error("reference document `{0}` contains no image sections")]
    EmptyReferenceDocument(String),

    #[error("image `{0}` not found in reference set")]
    ImageNotInReference(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("malformed temperature field (line {line}): {message}")]
    MalformedField { line: usize, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
