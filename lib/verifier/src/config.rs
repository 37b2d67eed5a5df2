//! TOML configuration of the verifier.
//!
//! Every key is optional:
//!
//! ```toml
//! rpc_url = "http://localhost:8547"
//! workdir = "/tmp/provenance"
//! keep_checkouts = false
//! max_parallel = 3
//! strict = true
//! known_refs = ["main", "develop"]
//! list_remote_refs = true
//!
//! [git]
//! program = "git"
//! timeout_secs = 300
//!
//! [build]
//! program = "cargo"
//! args = [
//!     "build",
//!     "--release",
//!     "--locked",
//!     "--lib",
//!     "--target",
//!     "wasm32-unknown-unknown",
//! ]
//! timeout_secs = 900
//! env = { CARGO_TERM_COLOR = "never" }
//!
//! [[immutables]]
//! offset = 120
//! length = 32
//! ```
use std::{collections::BTreeMap, path::{Path, PathBuf}, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::{
    builder::{self, CommandBuilder, DEFAULT_BUILD_TIMEOUT},
    comparator::{Comparator, ImmutableRange},
    error::{Error, Result},
    fetcher::{GitFetcher, DEFAULT_GIT_TIMEOUT},
    verify::{Policy, DEFAULT_MAX_PARALLEL},
};

/// Verifier configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// JSON-RPC endpoint of the chain.
    pub rpc_url: Option<String>,
    /// Directory checkouts are created in.
    pub workdir: PathBuf,
    /// Keeps checkouts on disk after verification.
    pub keep_checkouts: bool,
    /// Number of contracts verified at the same time.
    pub max_parallel: usize,
    /// Format problems make a record [`crate::Verdict::Malformed`].
    pub strict: bool,
    /// Branch and tag names a commit hash must not be equal to.
    pub known_refs: Vec<String>,
    /// Lists the branches and tags of each declared repository.
    pub list_remote_refs: bool,
    /// `git` settings.
    pub git: GitConfig,
    /// Build settings.
    pub build: BuildConfig,
    /// EVM bytecode ranges holding immutables.
    pub immutables: Vec<ImmutableRange>,
}

/// `[git]` section.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitConfig {
    /// `git` executable.
    pub program: PathBuf,
    /// Timeout of each `git` invocation, in seconds.
    pub timeout_secs: u64,
}

/// `[build]` section.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Build executable.
    pub program: String,
    /// Arguments of the build executable.
    pub args: Vec<String>,
    /// Artifact path, relative to the checkout root.
    pub artifact: Option<PathBuf>,
    /// Build timeout, in seconds.
    pub timeout_secs: u64,
    /// Extra environment of the build.
    pub env: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: None,
            workdir: std::env::temp_dir().join("provenance-verifier"),
            keep_checkouts: false,
            max_parallel: DEFAULT_MAX_PARALLEL,
            strict: true,
            known_refs: Vec::new(),
            list_remote_refs: false,
            git: GitConfig::default(),
            build: BuildConfig::default(),
            immutables: Vec::new(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
            timeout_secs: DEFAULT_GIT_TIMEOUT.as_secs(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: "cargo".into(),
            args: builder::default_args(),
            artifact: None,
            timeout_secs: DEFAULT_BUILD_TIMEOUT.as_secs(),
            env: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Reads and validates the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// * [`Error::Io`] - If the file can't be read.
    /// * [`Error::Toml`] - If the file is not valid TOML.
    /// * [`Error::Config`] - If a value is out of range.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates a configuration.
    ///
    /// # Errors
    ///
    /// * [`Error::Toml`] - If `contents` is not valid TOML.
    /// * [`Error::Config`] - If a value is out of range.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde can't.
    ///
    /// # Errors
    ///
    /// * [`Error::Config`] - If a value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            return Err(Error::Config("max_parallel must be at least 1".into()));
        }
        if self.git.timeout_secs == 0 || self.build.timeout_secs == 0 {
            return Err(Error::Config(
                "timeouts must be at least 1 second".into(),
            ));
        }
        if self.build.program.is_empty() {
            return Err(Error::Config("build.program must not be empty".into()));
        }
        if self.build.artifact.as_deref().is_some_and(Path::is_absolute) {
            return Err(Error::Config(
                "build.artifact must be relative to the checkout".into(),
            ));
        }
        if let Some(rpc_url) = &self.rpc_url {
            parse_rpc_url(rpc_url)?;
        }
        Ok(())
    }

    /// Returns the RPC endpoint, if one is configured.
    ///
    /// # Errors
    ///
    /// * [`Error::Config`] - If the endpoint is not a valid URL.
    pub fn rpc_url(&self) -> Result<Option<Url>> {
        self.rpc_url.as_deref().map(parse_rpc_url).transpose()
    }

    /// Format policy described by the configuration.
    #[must_use]
    pub fn policy(&self) -> Policy {
        Policy {
            strict: self.strict,
            known_refs: self.known_refs.clone(),
            list_remote_refs: self.list_remote_refs,
        }
    }

    /// Fetcher described by the configuration.
    #[must_use]
    pub fn fetcher(&self) -> GitFetcher {
        GitFetcher::new(&self.workdir)
            .with_program(&self.git.program)
            .with_timeout(Duration::from_secs(self.git.timeout_secs))
            .keep_checkouts(self.keep_checkouts)
    }

    /// Builder described by the configuration.
    #[must_use]
    pub fn builder(&self) -> CommandBuilder {
        let mut builder =
            CommandBuilder::new(&self.build.program, self.build.args.clone())
                .with_timeout(Duration::from_secs(self.build.timeout_secs));
        if let Some(artifact) = &self.build.artifact {
            builder = builder.with_artifact(artifact);
        }
        for (key, value) in &self.build.env {
            builder = builder.with_env(key, value);
        }
        builder
    }

    /// Comparator described by the configuration.
    #[must_use]
    pub fn comparator(&self) -> Comparator {
        Comparator::new(self.immutables.clone())
    }
}

fn parse_rpc_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| {
        Error::Config(format!("invalid rpc_url `{raw}`: {e}"))
    })
}
