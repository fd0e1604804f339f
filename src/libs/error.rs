use std::fmt;

/// Errors raised while building, trimming and concatenating per-gene MSAs.
///
/// Per-gene variants carry the gene id so the end-of-run report can point at
/// the failing locus. Whether a variant aborts the whole run or is recorded
/// and skipped is decided by [`PipelineError::is_fatal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// A gene's sequence set contained no records
    EmptyInput { gene: String },
    /// The alignment backend failed or produced no output file
    Alignment {
        gene: String,
        backend: String,
        cause: String,
    },
    /// The trimming tool failed or its report could not be parsed
    Trim { gene: String, cause: String },
    /// The trimming tool kept zero blocks; the gene contributes nothing
    NoConservedBlocks { gene: String },
    /// The raw alignment's id set does not match the dataset
    AlignmentMismatch { gene: String },
    /// Zero shared samples, or a zero-width single-gene alignment
    FatalConcat { cause: String },
    /// An expected file could not be read or written
    Io { path: String, cause: String },
}

impl PipelineError {
    /// Fatal errors abort the run at once; the rest are collected and the
    /// next gene is processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::AlignmentMismatch { .. }
                | PipelineError::FatalConcat { .. }
                | PipelineError::Io { .. }
        )
    }

    /// The gene this error belongs to, if any.
    pub fn gene(&self) -> Option<&str> {
        match self {
            PipelineError::EmptyInput { gene }
            | PipelineError::Alignment { gene, .. }
            | PipelineError::Trim { gene, .. }
            | PipelineError::NoConservedBlocks { gene }
            | PipelineError::AlignmentMismatch { gene } => Some(gene),
            PipelineError::FatalConcat { .. } | PipelineError::Io { .. } => None,
        }
    }

    pub fn io(path: &std::path::Path, err: &std::io::Error) -> Self {
        PipelineError::Io {
            path: path.display().to_string(),
            cause: err.to_string(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::EmptyInput { gene } => {
                write!(f, "{}: no sequences to align", gene)
            }
            PipelineError::Alignment {
                gene,
                backend,
                cause,
            } => {
                write!(f, "{}: {} alignment failed: {}", gene, backend, cause)
            }
            PipelineError::Trim { gene, cause } => {
                write!(f, "{}: trimming failed: {}", gene, cause)
            }
            PipelineError::NoConservedBlocks { gene } => {
                write!(f, "{}: no good blocks", gene)
            }
            PipelineError::AlignmentMismatch { gene } => {
                write!(
                    f,
                    "MSA for {} does not match the dataset, please re-build",
                    gene
                )
            }
            PipelineError::FatalConcat { cause } => {
                write!(f, "concatenation failed: {}", cause)
            }
            PipelineError::Io { path, cause } => {
                write!(f, "could not access {}: {}", path, cause)
            }
        }
    }
}

impl std::error::Error for PipelineError {}
