//! Format rules of a provenance record.
//!
//! These checks only look at the shape of the three strings. Whether the
//! declared commit really exists, and whether it rebuilds to the deployed
//! code, can only be checked off-chain.

/// Length of a hex encoded SHA-1 commit hash.
pub const SHA1_HEX_LEN: usize = 40;
/// Length of a hex encoded SHA-256 commit hash.
pub const SHA256_HEX_LEN: usize = 64;

/// Object format of a full-length commit hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitHashKind {
    /// 40 hex characters.
    Sha1,
    /// 64 hex characters.
    Sha256,
}

impl CommitHashKind {
    /// Number of hex characters of a hash of this kind.
    #[must_use]
    pub const fn hex_len(self) -> usize {
        match self {
            CommitHashKind::Sha1 => SHA1_HEX_LEN,
            CommitHashKind::Sha256 => SHA256_HEX_LEN,
        }
    }
}

/// Part of a record that breaks the format rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatViolation {
    /// Repository type is empty or has characters other than lowercase
    /// alphanumerics.
    RepositoryType,
    /// Repository URL has no `scheme://` prefix or contains whitespace.
    RepositoryUrl,
    /// Commit hash is neither 40 nor 64 hex characters.
    CommitHash,
}

/// Returns true if `repository_type` is non-empty and made of lowercase
/// ASCII letters and digits only, like `git` or `hg`.
#[must_use]
pub fn is_valid_repository_type(repository_type: &str) -> bool {
    !repository_type.is_empty()
        && repository_type
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// Returns true if `url` starts with an RFC 3986 scheme followed by `://`
/// and a non-empty remainder, and has no whitespace or control characters.
///
/// scp-like Git addresses (`git@host:owner/repo`) are rejected, since the
/// URL must be usable as a clone target without further interpretation.
#[must_use]
pub fn has_url_scheme(url: &str) -> bool {
    let Some((scheme, rest)) = url.split_once("://") else {
        return false;
    };

    let mut scheme_bytes = scheme.bytes();
    let starts_with_letter =
        scheme_bytes.next().is_some_and(|b| b.is_ascii_alphabetic());
    let scheme_ok = starts_with_letter
        && scheme_bytes.all(|b| {
            b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.'
        });

    scheme_ok
        && !rest.is_empty()
        && !url.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control())
}

/// Returns the kind of `commit_hash` if it is a full-length hex digest.
///
/// Both lowercase and uppercase hex digits are accepted. Abbreviated hashes,
/// branch names and tag names are rejected.
#[must_use]
pub fn commit_hash_kind(commit_hash: &str) -> Option<CommitHashKind> {
    if !commit_hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    match commit_hash.len() {
        SHA1_HEX_LEN => Some(CommitHashKind::Sha1),
        SHA256_HEX_LEN => Some(CommitHashKind::Sha256),
        _ => None,
    }
}

/// Checks every format rule of a record, reporting the first violation.
///
/// # Errors
///
/// * [`FormatViolation::RepositoryType`] - If `repository_type` is invalid.
/// * [`FormatViolation::RepositoryUrl`] - If `repository_url` has no scheme.
/// * [`FormatViolation::CommitHash`] - If `commit_hash` is not a full hash.
pub fn validate(
    repository_type: &str,
    repository_url: &str,
    commit_hash: &str,
) -> Result<CommitHashKind, FormatViolation> {
    if !is_valid_repository_type(repository_type) {
        return Err(FormatViolation::RepositoryType);
    }

    if !has_url_scheme(repository_url) {
        return Err(FormatViolation::RepositoryUrl);
    }

    commit_hash_kind(commit_hash).ok_or(FormatViolation::CommitHash)
}
