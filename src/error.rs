use std::path::PathBuf;

use thiserror::Error;

/// Failure to read an embedding artifact from disk.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read model '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed header in '{path}': {reason}")]
    Header { path: PathBuf, reason: String },

    #[error("malformed record {record} in '{path}': {reason}")]
    Record {
        path: PathBuf,
        record: usize,
        reason: String,
    },

    #[error("'{path}' declares {expected} vectors but contains {found}")]
    CountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("vector for '{key}' has {found} dimensions, expected {expected}")]
    Dimension {
        key: String,
        expected: usize,
        found: usize,
    },

    #[error("duplicate key '{0}' in model")]
    DuplicateKey(String),

    #[error("invalid JSON model '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("model '{0}' contains no vectors")]
    Empty(PathBuf),
}

/// Failure while building the vector matrix and labels.
#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    #[error("no vector found for node '{0}'")]
    MissingVector(String),

    #[error("vector for node '{id}' has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        found: usize,
    },
}

/// Invalid input or parameters for the t-SNE reducer.
#[derive(Debug, Error, PartialEq)]
pub enum TsneError {
    #[error("cannot reduce an empty matrix")]
    EmptyInput,

    #[error("row {row} has {found} columns, expected {expected}")]
    RaggedInput {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("perplexity must be a positive finite number, got {0}")]
    InvalidPerplexity(f64),

    #[error("perplexity ({perplexity}) must be less than the number of samples ({n_samples})")]
    PerplexityTooLarge { perplexity: f64, n_samples: usize },

    #[error("invalid t-SNE parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("{points} projected points but {labels} labels")]
    LengthMismatch { points: usize, labels: usize },

    #[error("drawing failed: {0}")]
    Drawing(String),
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error(transparent)]
    Plot(#[from] PlotError),

    #[error("could not launch image viewer '{viewer}': {source}")]
    Viewer {
        viewer: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure to save or read a projection export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to access projection file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid projection JSON '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level error for a visualization run.
#[derive(Debug, Error)]
pub enum VizError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Tsne(#[from] TsneError),

    #[error(transparent)]
    Plot(#[from] PlotError),

    #[error(transparent)]
    Display(#[from] DisplayError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
