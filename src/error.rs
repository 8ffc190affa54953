use std::fmt;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Decompress,
    Index,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Decompress => write!(f, "decompress"),
            Stage::Index => write!(f, "index"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum SeqidxError {
    #[error("no {provider} release '{version}' is known for species '{species}'")]
    #[diagnostic(help("pick a species/release pair listed by `seqidx index --help`"))]
    Resolution {
        provider: String,
        species: String,
        version: String,
    },

    #[error("no {provider} release '{release}' is known")]
    UnknownRelease { provider: String, release: String },

    #[error("unsupported species: {0}")]
    UnsupportedSpecies(String),

    #[error("destination directory already exists: {0}")]
    #[diagnostic(help("remove it, or pass it with -d to index the files it already holds"))]
    DestinationExists(Utf8PathBuf),

    #[error("transfer of {file} failed: {message}")]
    Transfer { file: String, message: String },

    #[error("decompression of {path} failed: {message}")]
    Decompression { path: Utf8PathBuf, message: String },

    #[error("required tool not found: {0}")]
    #[diagnostic(help("install it and make sure it is on your PATH"))]
    BinaryNotFound(String),

    #[error("{algorithm} index build failed: {message}")]
    IndexBuild { algorithm: String, message: String },

    #[error("index directory already exists: {0}")]
    IndexDirExists(Utf8PathBuf),

    #[error(
        "{stage} stage failed: {} failure(s), {} item(s) left unfinished",
        .failures.len(),
        .incomplete.len()
    )]
    StageFailed {
        stage: Stage,
        #[related]
        failures: Vec<SeqidxError>,
        incomplete: Vec<String>,
    },

    #[error("cancelled after a sibling task failed")]
    Cancelled,

    #[error("worker thread panicked: {0}")]
    WorkerPanic(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl SeqidxError {
    pub fn filesystem(context: impl fmt::Display, err: impl fmt::Display) -> Self {
        SeqidxError::Filesystem(format!("{context}: {err}"))
    }

    /// Process exit code: 2 for configuration and resolution, 3 for network
    /// and tools, 4 for decompression and index builds, 1 otherwise. A stage
    /// failure whose failures all share one code exits with that code.
    pub fn exit_code(&self) -> u8 {
        match self {
            SeqidxError::Resolution { .. }
            | SeqidxError::UnknownRelease { .. }
            | SeqidxError::UnsupportedSpecies(_)
            | SeqidxError::DestinationExists(_)
            | SeqidxError::IndexDirExists(_)
            | SeqidxError::ConfigRead(_)
            | SeqidxError::ConfigParse(_)
            | SeqidxError::InvalidArgument(_) => 2,
            SeqidxError::Transfer { .. } | SeqidxError::BinaryNotFound(_) => 3,
            SeqidxError::Decompression { .. } | SeqidxError::IndexBuild { .. } => 4,
            SeqidxError::StageFailed { stage, failures, .. } => {
                let mut codes = failures.iter().map(SeqidxError::exit_code);
                match codes.next() {
                    Some(first) if codes.all(|code| code == first) => first,
                    _ => match stage {
                        Stage::Fetch => 3,
                        Stage::Decompress | Stage::Index => 4,
                    },
                }
            }
            SeqidxError::Cancelled | SeqidxError::WorkerPanic(_) | SeqidxError::Filesystem(_) => 1,
        }
    }
}
