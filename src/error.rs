use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions raised by the line classifier.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("malformed editor's note block in state {state}: unexpected line {line:?}")]
    MalformedNoteBlock { state: &'static str, line: String },
}

/// Fatal conditions raised while assembling the node tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssembleError {
    #[error("unknown structural level {0:?}")]
    UnknownStructuralSignal(String),

    #[error("section {enumerator:?} has no open ancestor above section level")]
    MissingSuperParent { enumerator: String },
}

/// Failures of a paragraph source or of the worker behind it.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("rendering worker {worker} unavailable: {reason}")]
    Unavailable { worker: String, reason: String },

    #[error("failed to render {path}: {reason}")]
    Render { path: PathBuf, reason: String },

    #[error("worker protocol error: {0}")]
    Protocol(String),

    #[error("rendering worker {worker} sent nothing for {seconds}s")]
    Timeout { worker: String, seconds: u64 },

    #[error("rendering cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Error type for the whole document pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("classification failed: {0}")]
    Classify(#[from] ClassifyError),

    #[error("assembly failed: {0}")]
    Assemble(#[from] AssembleError),

    #[error("paragraph source failed: {0}")]
    Source(#[from] SourceError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("pipeline cancelled")]
    Cancelled,

    #[error("stage {0} exited without a terminal marker")]
    StageDisconnected(&'static str),

    #[error("document {path} failed: {source}")]
    DocumentFailed {
        path: PathBuf,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn is_cancellation(&self) -> bool {
        match self {
            PipelineError::Cancelled | PipelineError::Source(SourceError::Cancelled) => true,
            PipelineError::DocumentFailed { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }
}
