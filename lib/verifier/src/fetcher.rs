//! Fetches the exact commit a record declares.
use std::{
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};

use source_provenance::provenance::format::CommitHashKind;
use tempfile::TempDir;

use crate::{
    error::{Error, Result},
    process::Run,
    record::{check_url, short_ref_name, FormatError, ProvenanceRecord},
};

/// Default timeout of a single `git` invocation.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(300);

/// A source tree checked out at a given commit.
///
/// The directory is removed when the checkout is dropped, unless it was
/// created to be kept.
#[derive(Debug)]
pub struct Checkout {
    dir: TempDir,
    commit: String,
}

impl Checkout {
    /// Wraps a directory holding the source tree of `commit`.
    #[must_use]
    pub fn new(dir: TempDir, commit: impl Into<String>) -> Self {
        Self { dir, commit: commit.into() }
    }

    /// Root of the source tree.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Commit the tree was checked out at.
    #[must_use]
    pub fn commit(&self) -> &str {
        &self.commit
    }
}

/// Something able to materialize the source tree of a record.
pub trait Fetcher {
    /// Fetches the source tree at the commit declared by `record`.
    fn fetch(
        &self,
        record: &ProvenanceRecord,
    ) -> impl Future<Output = Result<Checkout>> + Send;

    /// Lists the branch and tag names of the repository declared by
    /// `record`, so a commit hash equal to one of them can be flagged.
    fn remote_refs(
        &self,
        _record: &ProvenanceRecord,
    ) -> impl Future<Output = Result<Vec<String>>> + Send {
        async { Ok(Vec::new()) }
    }
}

/// [`Fetcher`] driving the `git` command line.
#[derive(Clone, Debug)]
pub struct GitFetcher {
    program: PathBuf,
    workdir: PathBuf,
    timeout: Duration,
    keep_checkouts: bool,
}

impl GitFetcher {
    /// Creates a fetcher placing checkouts under `workdir`.
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("git"),
            workdir: workdir.into(),
            timeout: DEFAULT_GIT_TIMEOUT,
            keep_checkouts: false,
        }
    }

    /// Uses `program` instead of the `git` found in `PATH`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Sets the timeout of each `git` invocation.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Keeps checkouts on disk after verification.
    #[must_use]
    pub fn keep_checkouts(mut self, keep: bool) -> Self {
        self.keep_checkouts = keep;
        self
    }

    fn git(&self) -> Run<'_> {
        // Never block on a credential prompt.
        Run::new(&self.program, self.timeout).env("GIT_TERMINAL_PROMPT", "0")
    }

    async fn try_shallow_fetch(
        &self,
        dir: &Path,
        url: &str,
        commit: &str,
    ) -> bool {
        let fetched = self
            .git()
            .current_dir(dir)
            .args(["fetch", "--quiet", "--depth", "1", "--", url, commit])
            .output()
            .await;

        match fetched {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(
                    %url,
                    %commit,
                    error = %e,
                    "shallow fetch failed, fetching all refs"
                );
                false
            }
        }
    }

    async fn fetch_all(&self, dir: &Path, url: &str) -> Result<()> {
        self.git()
            .current_dir(dir)
            .args([
                "fetch",
                "--quiet",
                "--",
                url,
                "+refs/heads/*:refs/remotes/origin/*",
                "+refs/tags/*:refs/tags/*",
            ])
            .output()
            .await?;
        Ok(())
    }
}

/// Rejects records this fetcher can't hand to `git` safely.
///
/// The URL comes from the contract being verified, so it is checked here
/// whatever the format policy: a value such as `--upload-pack=...` would
/// otherwise be parsed by `git` as an option.
fn check_git_record(record: &ProvenanceRecord) -> Result<()> {
    if record.repository_type != "git" {
        return Err(Error::UnsupportedRepositoryType(
            record.repository_type.clone(),
        ));
    }
    check_url(&record.repository_url).map_err(|reason| {
        FormatError::RepositoryUrl {
            url: record.repository_url.clone(),
            reason,
        }
    })?;
    Ok(())
}

impl Fetcher for GitFetcher {
    #[tracing::instrument(
        skip_all,
        fields(url = %record.repository_url, commit = %record.commit_hash)
    )]
    async fn fetch(&self, record: &ProvenanceRecord) -> Result<Checkout> {
        check_git_record(record)?;
        let kind = record.commit_hash_kind().ok_or_else(|| {
            FormatError::CommitHash(record.commit_hash.clone())
        })?;
        let url = record.repository_url.as_str();
        let commit = record.commit_hash.to_ascii_lowercase();

        tokio::fs::create_dir_all(&self.workdir).await?;
        let dir = tempfile::Builder::new()
            .prefix("checkout-")
            .keep(self.keep_checkouts)
            .tempdir_in(&self.workdir)?;

        let mut init = vec!["init", "--quiet"];
        if kind == CommitHashKind::Sha256 {
            init.push("--object-format=sha256");
        }
        self.git()
            .current_dir(dir.path())
            .args(init.iter().copied())
            .output()
            .await?;

        let target = if self.try_shallow_fetch(dir.path(), url, &commit).await
        {
            "FETCH_HEAD"
        } else {
            self.fetch_all(dir.path(), url).await?;
            commit.as_str()
        };

        self.git()
            .current_dir(dir.path())
            .args([
                "-c",
                "advice.detachedHead=false",
                "checkout",
                "--quiet",
                "--detach",
                target,
            ])
            .output()
            .await?;

        let head = self
            .git()
            .current_dir(dir.path())
            .args(["rev-parse", "HEAD"])
            .output()
            .await?;
        let head = head.trim();
        if !head.eq_ignore_ascii_case(&commit) {
            return Err(Error::CommitMismatch {
                expected: commit,
                actual: head.to_owned(),
            });
        }

        tracing::info!(path = %dir.path().display(), "checked out");
        Ok(Checkout::new(dir, commit))
    }

    async fn remote_refs(
        &self,
        record: &ProvenanceRecord,
    ) -> Result<Vec<String>> {
        check_git_record(record)?;

        let listing = self
            .git()
            .args([
                "ls-remote",
                "--heads",
                "--tags",
                "--",
                record.repository_url.as_str(),
            ])
            .output()
            .await?;

        Ok(parse_ls_remote(&listing))
    }
}

/// Extracts short branch and tag names from `git ls-remote` output.
fn parse_ls_remote(listing: &str) -> Vec<String> {
    let mut names: Vec<String> = listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(|name| short_ref_name(name).to_owned())
        .collect();
    names.sort();
    names.dedup();
    names
}
