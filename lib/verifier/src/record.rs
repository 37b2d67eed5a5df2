//! The provenance record read from a contract, and the client-side checks
//! run on it before anything is fetched.
use std::fmt;

use serde::{Deserialize, Serialize};
use source_provenance::provenance::format::{self, CommitHashKind};
use url::Url;

/// `(repositoryType, repositoryUrl, commitHash)` as returned by
/// `provenance()`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceRecord {
    /// Version control system, e.g. `git`.
    pub repository_type: String,
    /// Clone URL of the repository.
    pub repository_url: String,
    /// Full commit hash the deployed code claims to be built from.
    pub commit_hash: String,
}

/// A record field that fails a format check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FormatError {
    /// Repository type is empty or not lowercase alphanumeric.
    #[error("repository type `{0}` is not lowercase alphanumeric")]
    RepositoryType(String),
    /// Repository URL is not an absolute URL with a scheme.
    #[error("repository url `{url}` is not usable as a clone target: {reason}")]
    RepositoryUrl {
        /// Rejected URL.
        url: String,
        /// Why the URL was rejected.
        reason: String,
    },
    /// Commit hash is not a 40 or 64 character hex digest.
    #[error("commit hash `{0}` is not a 40 or 64 character hex digest")]
    CommitHash(String),
    /// Commit hash is the name of a branch or tag, which can move.
    #[error("commit hash `{0}` is the name of a branch or tag")]
    SymbolicRef(String),
}

impl ProvenanceRecord {
    /// Creates a record from its three fields.
    pub fn new(
        repository_type: impl Into<String>,
        repository_url: impl Into<String>,
        commit_hash: impl Into<String>,
    ) -> Self {
        Self {
            repository_type: repository_type.into(),
            repository_url: repository_url.into(),
            commit_hash: commit_hash.into(),
        }
    }

    /// Returns the object format of the commit hash, if it is a full hash.
    #[must_use]
    pub fn commit_hash_kind(&self) -> Option<CommitHashKind> {
        format::commit_hash_kind(&self.commit_hash)
    }

    /// Runs every format check and returns all failures, in field order.
    ///
    /// `known_refs` are branch and tag names the commit hash must not be
    /// equal to. Short names (`main`) and full names (`refs/heads/main`) are
    /// both compared.
    #[must_use]
    pub fn check(&self, known_refs: &[String]) -> Vec<FormatError> {
        let mut problems = Vec::new();

        if !format::is_valid_repository_type(&self.repository_type) {
            let kind = self.repository_type.clone();
            problems.push(FormatError::RepositoryType(kind));
        }

        if let Err(reason) = check_url(&self.repository_url) {
            problems.push(FormatError::RepositoryUrl {
                url: self.repository_url.clone(),
                reason,
            });
        }

        if self.commit_hash_kind().is_none() {
            problems.push(FormatError::CommitHash(self.commit_hash.clone()));
        }

        if names_ref(&self.commit_hash, known_refs) {
            problems.push(FormatError::SymbolicRef(self.commit_hash.clone()));
        }

        problems
    }
}

impl From<(String, String, String)> for ProvenanceRecord {
    fn from(
        (repository_type, repository_url, commit_hash): (
            String,
            String,
            String,
        ),
    ) -> Self {
        Self { repository_type, repository_url, commit_hash }
    }
}

impl fmt::Display for ProvenanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {}",
            self.repository_type, self.repository_url, self.commit_hash
        )
    }
}

pub(crate) fn check_url(raw: &str) -> Result<(), String> {
    if !format::has_url_scheme(raw) {
        return Err("missing `scheme://` prefix".into());
    }

    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if url.cannot_be_a_base() {
        return Err("not a hierarchical URL".into());
    }
    let has_host = url.host_str().is_some_and(|host| !host.is_empty());
    if url.scheme() != "file" && !has_host {
        return Err("missing host".into());
    }

    Ok(())
}

/// Returns true if `name` is one of `known_refs`, comparing full ref names
/// by their short form.
pub(crate) fn names_ref(name: &str, known_refs: &[String]) -> bool {
    known_refs
        .iter()
        .any(|known| short_ref_name(known) == name || known == name)
}

/// Strips `refs/heads/`, `refs/tags/` and the peeled tag suffix `^{}`.
pub(crate) fn short_ref_name(name: &str) -> &str {
    let name = name.strip_suffix("^{}").unwrap_or(name);
    name.strip_prefix("refs/heads/")
        .or_else(|| name.strip_prefix("refs/tags/"))
        .unwrap_or(name)
}
