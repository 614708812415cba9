//! Error types for the succession pipeline.
//!
//! Every failure names the pipeline stage it came from. The pipeline has no
//! side effects, so a failed stage leaves nothing to roll back.

use std::fmt;

use thiserror::Error;

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Preparation,
    Rasterization,
    MoistureClassification,
    Accumulation,
    Merge,
    Aggregation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preparation => "preparation",
            Stage::Rasterization => "rasterization",
            Stage::MoistureClassification => "moisture classification",
            Stage::Accumulation => "accumulation",
            Stage::Merge => "merge",
            Stage::Aggregation => "aggregation",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Unmapped category label, missing required band, out-of-range table entry.
    #[error("configuration error during {stage}: {message}")]
    Configuration { stage: Stage, message: String },

    /// Required input data does not exist for the requested date or region.
    #[error("data unavailable during {stage}: {message}")]
    DataUnavailable { stage: Stage, message: String },

    /// A data collaborator or an internal consistency check failed while
    /// realizing a result.
    #[error("computation failed during {stage}: {message}")]
    Computation { stage: Stage, message: String },
}

impl Error {
    pub fn configuration(stage: Stage, message: impl Into<String>) -> Self {
        Error::Configuration { stage, message: message.into() }
    }

    pub fn data_unavailable(stage: Stage, message: impl Into<String>) -> Self {
        Error::DataUnavailable { stage, message: message.into() }
    }

    pub fn computation(stage: Stage, message: impl Into<String>) -> Self {
        Error::Computation { stage, message: message.into() }
    }

    /// Stage the error was raised in.
    pub fn stage(&self) -> Stage {
        match self {
            Error::Configuration { stage, .. }
            | Error::DataUnavailable { stage, .. }
            | Error::Computation { stage, .. } => *stage,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_the_stage() {
        let e = Error::configuration(Stage::Rasterization, "unmapped label 'x'");
        assert_eq!(e.stage(), Stage::Rasterization);
        assert_eq!(
            e.to_string(),
            "configuration error during rasterization: unmapped label 'x'"
        );
    }
}
