use std::path::PathBuf;

use thiserror::Error;

/// Errors raised at a hard boundary of the pipeline (argument parsing,
/// input/output, the phased-genotype invariant). Everything else propagates
/// as `anyhow::Error` with added context; these are the cases where the
/// caller needs to pick an exit code or a specific diagnostic shape.
#[derive(Error, Debug)]
pub enum IbdError {
    #[error("{0}")]
    ArgParse(String),

    #[error("missing or unreadable input file {path:?}: {source}")]
    MissingInputFile { path: PathBuf, #[source] source: std::io::Error },

    #[error("malformed VCF record at {path:?} line {line}: {reason}")]
    MalformedVcfRecord { path: PathBuf, line: usize, reason: String },

    #[error(
        "genotype at {chrom}:{pos} sample index {sample} is unphased or \
         missing, input must be fully phased and complete"
    )]
    UnphasedOrMissingGenotype { chrom: String, pos: u64, sample: usize },

    #[error(
        "chromosome {prev} was followed by {next} in the input, VCF records \
         must be grouped contiguously by chromosome"
    )]
    ChromosomeNotContiguous { prev: String, next: String },

    #[error("output path {path:?} collides with an input path")]
    OutputCollidesWithInput { path: PathBuf },

    #[error(
        "every record on chromosome {chrom} fell outside the genetic map's \
         span; nothing to analyze"
    )]
    AllRecordsDroppedByMap { chrom: String },

    #[error("I/O error writing output to {path:?}: {source}")]
    OutputIo { path: PathBuf, #[source] source: std::io::Error },
}
