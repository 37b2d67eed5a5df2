//! Errors raised while reading, fetching or building a contract's source.
use std::{path::PathBuf, process::ExitStatus, time::Duration};

use alloy::{
    primitives::{Address, U256},
    transports::{RpcError, TransportErrorKind},
};

use crate::record::FormatError;

/// Result type alias for verifier operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors of the verification client.
///
/// Only [`Error::Rpc`] and [`Error::NoCode`] abort a verification. Every
/// other variant is raised by the fetch or build stage and ends up as the
/// reason of a [`crate::Verdict`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The node could not be queried or returned undecodable data.
    #[error("rpc request failed: {0}")]
    Rpc(String),

    /// No code is deployed at the address.
    #[error("no code deployed at {0}")]
    NoCode(Address),

    /// The contract reports more history records than are read.
    #[error("provenance history of {count} records exceeds the limit of {max}")]
    HistoryTooLong {
        /// Value returned by `provenanceCount()`.
        count: U256,
        /// Highest number of records read.
        max: usize,
    },

    /// The record does not follow the format rules.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The fetcher does not know how to fetch this kind of repository.
    #[error("unsupported repository type `{0}`")]
    UnsupportedRepositoryType(String),

    /// A child process exited with a non-zero status.
    #[error("`{program}` exited with {status}: {stderr}")]
    Command {
        /// Program that failed.
        program: String,
        /// Exit status of the program.
        status: ExitStatus,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// A child process did not finish in time and was killed.
    #[error("`{program}` timed out after {timeout:?}")]
    Timeout {
        /// Program that timed out.
        program: String,
        /// Configured timeout.
        timeout: Duration,
    },

    /// The checkout resolved to another commit than the declared one.
    #[error("checked out {actual} instead of {expected}")]
    CommitMismatch {
        /// Declared commit hash.
        expected: String,
        /// Commit hash of `HEAD` after checkout.
        actual: String,
    },

    /// The build did not produce the expected artifact.
    #[error("artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    /// More than one file could be the build artifact.
    #[error("ambiguous artifact, candidates: {0:?}")]
    AmbiguousArtifact(Vec<PathBuf>),

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration file is not valid TOML.
    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<alloy::contract::Error> for Error {
    fn from(value: alloy::contract::Error) -> Self {
        Error::Rpc(value.to_string())
    }
}

impl From<RpcError<TransportErrorKind>> for Error {
    fn from(value: RpcError<TransportErrorKind>) -> Self {
        Error::Rpc(value.to_string())
    }
}
