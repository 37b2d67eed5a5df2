//! Rebuilds a checked out source tree.
use std::{
    collections::BTreeMap,
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy::hex;

use crate::{
    error::{Error, Result},
    fetcher::Checkout,
    process::Run,
};

/// Default timeout of a build.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(900);

/// Output of a build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// File the code was read from.
    pub path: PathBuf,
    /// Code, hex-decoded if the file held hex text.
    pub bytes: Vec<u8>,
}

/// Something able to turn a source tree into deployable code.
pub trait Builder {
    /// Builds `checkout` and returns the produced code.
    fn build(
        &self,
        checkout: &Checkout,
    ) -> impl Future<Output = Result<Artifact>> + Send;
}

/// [`Builder`] running a command in the checkout, then reading a file.
#[derive(Clone, Debug)]
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
    artifact: Option<PathBuf>,
    env: BTreeMap<String, String>,
    timeout: Duration,
}

impl Default for CommandBuilder {
    /// `cargo build --release --locked --lib --target wasm32-unknown-unknown`,
    /// picking up the single wasm file of the release target directory.
    fn default() -> Self {
        Self::new("cargo", default_args())
    }
}

/// Arguments of the default Stylus build.
#[must_use]
pub fn default_args() -> Vec<String> {
    [
        "build",
        "--release",
        "--locked",
        "--lib",
        "--target",
        "wasm32-unknown-unknown",
    ]
    .map(String::from)
    .to_vec()
}

impl CommandBuilder {
    /// Creates a builder running `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            artifact: None,
            env: BTreeMap::new(),
            timeout: DEFAULT_BUILD_TIMEOUT,
        }
    }

    /// Reads the artifact at `path`, relative to the checkout root.
    #[must_use]
    pub fn with_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact = Some(path.into());
        self
    }

    /// Sets an environment variable for the build command.
    #[must_use]
    pub fn with_env(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the build timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn locate_artifact(&self, root: &Path) -> Result<PathBuf> {
        if let Some(relative) = &self.artifact {
            if relative.is_absolute() {
                return Err(Error::Config(format!(
                    "artifact path {} must be relative to the checkout",
                    relative.display()
                )));
            }
            let path = root.join(relative);
            return if tokio::fs::try_exists(&path).await? {
                Ok(path)
            } else {
                Err(Error::ArtifactNotFound(path))
            };
        }

        let release =
            root.join("target").join("wasm32-unknown-unknown").join("release");
        let mut candidates = Vec::new();
        let mut entries = match tokio::fs::read_dir(&release).await {
            Ok(entries) => entries,
            Err(_) => return Err(Error::ArtifactNotFound(release)),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "wasm") {
                candidates.push(path);
            }
        }

        match candidates.len() {
            0 => Err(Error::ArtifactNotFound(release)),
            1 => Ok(candidates.remove(0)),
            _ => {
                candidates.sort();
                Err(Error::AmbiguousArtifact(candidates))
            }
        }
    }
}

impl Builder for CommandBuilder {
    #[tracing::instrument(skip_all, fields(commit = %checkout.commit()))]
    async fn build(&self, checkout: &Checkout) -> Result<Artifact> {
        let root = checkout.path();

        let mut run = Run::new(&self.program, self.timeout)
            .current_dir(root)
            .args(&self.args);
        for (key, value) in &self.env {
            run = run.env(key, value);
        }
        run.output().await?;

        let path = self.locate_artifact(root).await?;
        let bytes = decode_artifact(tokio::fs::read(&path).await?);
        tracing::info!(
            path = %path.display(),
            len = bytes.len(),
            "built artifact"
        );

        Ok(Artifact { path, bytes })
    }
}

/// Hex-decodes `raw` if it is hex text (as written by `solc --bin-runtime`),
/// otherwise returns it unchanged.
#[must_use]
pub fn decode_artifact(raw: Vec<u8>) -> Vec<u8> {
    let Ok(text) = std::str::from_utf8(&raw) else {
        return raw;
    };
    let text = text.trim();
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return raw;
    }

    hex::decode(digits).unwrap_or(raw)
}
