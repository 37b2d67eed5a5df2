//! Contract module which lets a contract declare the origin of its own source
//! code: the repository it lives in and the exact commit it was built from.
//!
//! The record is made of three strings:
//!
//! * `repositoryType` - Lowercase alphanumeric name of the version control
//!   system, `git` for Git repositories.
//! * `repositoryUrl` - Complete URL including its scheme, usable directly as
//!   a clone target.
//! * `commitHash` - Full-length commit identifier (40 or 64 hex characters).
//!   Branch and tag names are not allowed, since they can move.
//!
//! [`Provenance`] stores a record fixed at construction. Upgradeable
//! contracts should use [`history::ProvenanceHistory`], which keeps every
//! published record.
//!
//! Reading the record never reverts and never changes state. Nothing here
//! proves the record is truthful: a verifier must fetch the declared commit,
//! rebuild it and compare the output with the deployed code.
use alloc::{string::String, vec, vec::Vec};

use alloy_primitives::aliases::B32;
pub use sol::*;
use stylus_sdk::{
    call::MethodError, function_selector, prelude::*, storage::StorageString,
};

use crate::utils::introspection::erc165::IErc165;

pub mod format;
pub mod history;

#[cfg_attr(coverage_nightly, coverage(off))]
mod sol {
    use alloy_sol_macro::sol;

    sol! {
        /// The repository type is empty or not lowercase alphanumeric.
        ///
        /// * `repository_type` - Rejected repository type.
        #[derive(Debug)]
        #[allow(missing_docs)]
        error ProvenanceInvalidRepositoryType(string repository_type);
        /// The repository URL does not start with a scheme.
        ///
        /// * `repository_url` - Rejected repository URL.
        #[derive(Debug)]
        #[allow(missing_docs)]
        error ProvenanceInvalidRepositoryUrl(string repository_url);
        /// The commit hash is not a full-length hex digest.
        ///
        /// * `commit_hash` - Rejected commit hash.
        #[derive(Debug)]
        #[allow(missing_docs)]
        error ProvenanceInvalidCommitHash(string commit_hash);
        /// A history entry was requested past the end of the history.
        ///
        /// * `index` - Requested index.
        /// * `count` - Number of entries in the history.
        #[derive(Debug)]
        #[allow(missing_docs)]
        error ProvenanceIndexOutOfBounds(uint256 index, uint256 count);
    }
}

/// An error that occurred in the implementation of a [`Provenance`] or
/// [`history::ProvenanceHistory`] contract.
#[derive(SolidityError, Debug)]
pub enum Error {
    /// The repository type is empty or not lowercase alphanumeric.
    InvalidRepositoryType(ProvenanceInvalidRepositoryType),
    /// The repository URL does not start with a scheme.
    InvalidRepositoryUrl(ProvenanceInvalidRepositoryUrl),
    /// The commit hash is not a full-length hex digest.
    InvalidCommitHash(ProvenanceInvalidCommitHash),
    /// A history entry was requested past the end of the history.
    IndexOutOfBounds(ProvenanceIndexOutOfBounds),
}

#[cfg_attr(coverage_nightly, coverage(off))]
impl MethodError for Error {
    fn encode(self) -> alloc::vec::Vec<u8> {
        self.into()
    }
}

/// Interface of a contract exposing the provenance of its source code.
pub trait ISourceProvenance {
    /// Returns the `(repositoryType, repositoryUrl, commitHash)` record
    /// describing where the source code of this contract lives.
    ///
    /// Never reverts and never mutates state.
    ///
    /// # Arguments
    ///
    /// * `&self` - Read access to the contract's state.
    #[must_use]
    fn provenance(&self) -> (String, String, String);

    /// Solidity interface id of [`ISourceProvenance`], the selector of
    /// `provenance()`.
    #[must_use]
    fn interface_id() -> B32
    where
        Self: Sized,
    {
        B32::new(function_selector!("provenance"))
    }
}

/// State of a [`Provenance`] contract.
#[storage]
pub struct Provenance {
    /// Version control system, e.g. `git`.
    pub(crate) repository_type: StorageString,
    /// Clone URL of the repository.
    pub(crate) repository_url: StorageString,
    /// Full commit hash the deployed code was built from.
    pub(crate) commit_hash: StorageString,
}

#[public]
#[implements(ISourceProvenance, IErc165)]
impl Provenance {
    /// Constructor.
    ///
    /// # Arguments
    ///
    /// * `&mut self` - Write access to the contract's state.
    /// * `repository_type` - Version control system, e.g. `git`.
    /// * `repository_url` - Clone URL of the repository, with its scheme.
    /// * `commit_hash` - Full commit hash of the deployed source.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidRepositoryType`] - If `repository_type` is not
    ///   lowercase alphanumeric.
    /// * [`Error::InvalidRepositoryUrl`] - If `repository_url` has no scheme.
    /// * [`Error::InvalidCommitHash`] - If `commit_hash` is not a full hash.
    #[constructor]
    pub fn constructor(
        &mut self,
        repository_type: String,
        repository_url: String,
        commit_hash: String,
    ) -> Result<(), Error> {
        check_record(&repository_type, &repository_url, &commit_hash)?;

        self.repository_type.set_str(repository_type);
        self.repository_url.set_str(repository_url);
        self.commit_hash.set_str(commit_hash);
        Ok(())
    }
}

#[public]
impl ISourceProvenance for Provenance {
    fn provenance(&self) -> (String, String, String) {
        self.provenance()
    }
}

impl Provenance {
    /// Returns the `(repositoryType, repositoryUrl, commitHash)` record.
    ///
    /// # Arguments
    ///
    /// * `&self` - Read access to the contract's state.
    #[must_use]
    pub fn provenance(&self) -> (String, String, String) {
        (
            self.repository_type.get_string(),
            self.repository_url.get_string(),
            self.commit_hash.get_string(),
        )
    }
}

#[public]
impl IErc165 for Provenance {
    fn supports_interface(&self, interface_id: B32) -> bool {
        <Self as ISourceProvenance>::interface_id() == interface_id
            || <Self as IErc165>::interface_id() == interface_id
    }
}

/// Checks the format of a record, converting the first violation into the
/// matching Solidity error.
///
/// # Errors
///
/// * [`Error::InvalidRepositoryType`] - If `repository_type` is invalid.
/// * [`Error::InvalidRepositoryUrl`] - If `repository_url` has no scheme.
/// * [`Error::InvalidCommitHash`] - If `commit_hash` is not a full hash.
pub(crate) fn check_record(
    repository_type: &str,
    repository_url: &str,
    commit_hash: &str,
) -> Result<(), Error> {
    match format::validate(repository_type, repository_url, commit_hash) {
        Ok(_) => Ok(()),
        Err(format::FormatViolation::RepositoryType) => {
            Err(Error::InvalidRepositoryType(ProvenanceInvalidRepositoryType {
                repository_type: repository_type.into(),
            }))
        }
        Err(format::FormatViolation::RepositoryUrl) => {
            Err(Error::InvalidRepositoryUrl(ProvenanceInvalidRepositoryUrl {
                repository_url: repository_url.into(),
            }))
        }
        Err(format::FormatViolation::CommitHash) => {
            Err(Error::InvalidCommitHash(ProvenanceInvalidCommitHash {
                commit_hash: commit_hash.into(),
            }))
        }
    }
}
