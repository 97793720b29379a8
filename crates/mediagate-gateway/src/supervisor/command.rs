//! Worker launch command and output forwarding.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use mediagate_core::WorkerConfig;

use super::manager::SupervisorError;

/// How to start the worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    /// Executable name or path.
    pub program: String,
    /// Arguments, typically just the worker's entry point.
    pub args: Vec<String>,
    /// Working directory. Inherited from the gateway when `None`.
    pub working_directory: Option<PathBuf>,
    /// Extra environment variables, set on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_directory: None,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_directory: config.working_directory.clone(),
            env: config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Spawn the worker with stdout/stderr relayed into the gateway log.
    pub(crate) fn spawn(&self) -> Result<Child, SupervisorError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| SupervisorError::SpawnFailed {
            program: self.program.clone(),
            reason: e.to_string(),
        })?;

        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, pid, OutputStream::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, pid, OutputStream::Stderr);
        }
        Ok(child)
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Relay one output pipe line by line. Runs on its own task so a slow log
/// sink never stalls the worker; non-UTF-8 bytes are replaced, not fatal.
fn forward_output<R>(reader: R, pid: Option<u32>, stream: OutputStream)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\r', '\n']);
                    match stream {
                        OutputStream::Stdout => info!(pid, stream = "stdout", "worker: {line}"),
                        OutputStream::Stderr => warn!(pid, stream = "stderr", "worker: {line}"),
                    }
                }
                Err(e) => {
                    warn!(pid, ?stream, error = %e, "Failed to read worker output");
                    break;
                }
            }
        }
        debug!(pid, ?stream, "Worker output reader finished");
    });
}
