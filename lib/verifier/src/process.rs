//! Child process helper shared by the fetcher and the builder.
use std::{ffi::OsStr, path::Path, process::Stdio, time::Duration};

use tokio::process::Command;

use crate::error::{Error, Result};

/// A child process to run to completion.
pub(crate) struct Run<'a> {
    program: &'a OsStr,
    args: Vec<&'a OsStr>,
    cwd: Option<&'a Path>,
    envs: Vec<(&'a str, &'a str)>,
    timeout: Duration,
}

impl<'a> Run<'a> {
    pub(crate) fn new(
        program: &'a (impl AsRef<OsStr> + ?Sized),
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.as_ref(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            timeout,
        }
    }

    pub(crate) fn arg(mut self, arg: &'a (impl AsRef<OsStr> + ?Sized)) -> Self {
        self.args.push(arg.as_ref());
        self
    }

    pub(crate) fn args<S>(
        mut self,
        args: impl IntoIterator<Item = &'a S>,
    ) -> Self
    where
        S: AsRef<OsStr> + ?Sized + 'a,
    {
        self.args.extend(args.into_iter().map(AsRef::as_ref));
        self
    }

    pub(crate) fn current_dir(mut self, dir: &'a Path) -> Self {
        self.cwd = Some(dir);
        self
    }

    pub(crate) fn env(mut self, key: &'a str, value: &'a str) -> Self {
        self.envs.push((key, value));
        self
    }

    /// Runs the process and returns its standard output.
    ///
    /// The process is killed if it outlives the timeout.
    ///
    /// # Errors
    ///
    /// * [`Error::Io`] - If the process could not be spawned.
    /// * [`Error::Timeout`] - If the process did not finish in time.
    /// * [`Error::Command`] - If the process exited with a non-zero status.
    pub(crate) async fn output(self) -> Result<String> {
        let program = self.program.to_string_lossy().into_owned();

        let mut command = Command::new(self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().copied())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = self.cwd {
            command.current_dir(dir);
        }

        tracing::debug!(
            %program,
            args = ?self.args,
            cwd = ?self.cwd,
            "running"
        );

        let timeout = self.timeout;
        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| Error::Timeout {
                program: program.clone(),
                timeout,
            })??;

        if !output.status.success() {
            let stderr =
                String::from_utf8_lossy(&output.stderr).trim().to_owned();
            return Err(Error::Command {
                program,
                status: output.status,
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
