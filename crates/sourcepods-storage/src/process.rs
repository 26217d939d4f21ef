//! Invocation of the external `git` executable.
//!
//! Handlers never touch [`tokio::process`] directly. They go through
//! [`ProcessInvoker`], which hands out one [`Subprocess`] per request with
//! exclusive ownership of its stdin and stdout. Tests plug in an in-memory
//! implementation instead of spawning real processes.

use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

/// Boxed stdout of a subprocess.
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// Boxed stdin of a subprocess.
pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Errors from the subprocess lifecycle.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// A standard stream was not piped or was already taken.
    #[error("{0} pipe unavailable")]
    MissingPipe(&'static str),

    /// The process ran to completion but reported failure.
    #[error("process exited with {}", describe_exit(.code))]
    Exit { code: Option<i32> },

    /// The process did not finish in time and was killed.
    #[error("process timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error on one of the pipes.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "signal".to_string(),
    }
}

/// Starts subprocesses for requests.
pub trait ProcessInvoker: Send + Sync {
    /// Spawns the executable with `args`, working in `dir`.
    fn spawn(&self, args: &[&str], dir: &Path) -> Result<Box<dyn Subprocess>, ProcessError>;
}

/// A running subprocess owned by a single request.
#[async_trait]
pub trait Subprocess: Send {
    /// Takes the stdin pipe. Dropping it closes the stream.
    fn take_stdin(&mut self) -> Option<BoxedWriter>;

    /// Takes the stdout pipe.
    fn take_stdout(&mut self) -> Option<BoxedReader>;

    /// Waits for exit, failing on a non-zero status.
    async fn wait(&mut self) -> Result<(), ProcessError>;

    /// Kills the process and reaps it.
    async fn kill(&mut self) -> Result<(), ProcessError>;
}

/// Runs `git` from a fixed executable path.
#[derive(Debug, Clone)]
pub struct GitInvoker {
    program: PathBuf,
}

impl GitInvoker {
    /// Creates an invoker for the executable at `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Returns the executable path.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl ProcessInvoker for GitInvoker {
    fn spawn(&self, args: &[&str], dir: &Path) -> Result<Box<dyn Subprocess>, ProcessError> {
        let child = Command::new(&self.program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        tracing::debug!(
            program = %self.program.display(),
            args = ?args,
            dir = %dir.display(),
            pid = child.id(),
            "Spawned git"
        );

        Ok(Box::new(GitProcess { child }))
    }
}

struct GitProcess {
    child: Child,
}

#[async_trait]
impl Subprocess for GitProcess {
    fn take_stdin(&mut self) -> Option<BoxedWriter> {
        self.child
            .stdin
            .take()
            .map(|stdin| Box::pin(stdin) as BoxedWriter)
    }

    fn take_stdout(&mut self) -> Option<BoxedReader> {
        self.child
            .stdout
            .take()
            .map(|stdout| Box::pin(stdout) as BoxedReader)
    }

    async fn wait(&mut self) -> Result<(), ProcessError> {
        let status = self.child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(ProcessError::Exit {
                code: status.code(),
            })
        }
    }

    async fn kill(&mut self) -> Result<(), ProcessError> {
        // An already reaped child has nothing left to kill.
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill().await?;
        Ok(())
    }
}

/// Runs `fut` until it completes or `deadline` passes.
///
/// With no deadline the future runs to completion. On expiry the future is
/// dropped and [`ProcessError::Timeout`] is returned; the caller still owns
/// the subprocess and has to [`reap`] it.
pub async fn with_deadline<F: Future>(
    deadline: Option<Duration>,
    fut: F,
) -> Result<F::Output, ProcessError> {
    match deadline {
        None => Ok(fut.await),
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ProcessError::Timeout(limit)),
    }
}

/// Kills and reaps `child` after a failed exchange.
pub async fn reap(child: &mut dyn Subprocess) {
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "Failed to kill git");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_pipes_stdin_to_stdout() {
        let invoker = GitInvoker::new("cat");
        let dir = std::env::temp_dir();
        let mut child = invoker.spawn(&["-"], &dir).unwrap();

        let mut stdin = child.take_stdin().unwrap();
        stdin.write_all(b"0009done\n").await.unwrap();
        stdin.shutdown().await.unwrap();
        drop(stdin);

        let mut out = Vec::new();
        child.take_stdout().unwrap().read_to_end(&mut out).await.unwrap();
        child.wait().await.unwrap();

        assert_eq!(out, b"0009done\n");
        assert!(child.take_stdin().is_none());
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let invoker = GitInvoker::new("false");
        let mut child = invoker.spawn(&[], &std::env::temp_dir()).unwrap();
        let err = child.wait().await.unwrap_err();
        assert!(matches!(err, ProcessError::Exit { code: Some(1) }));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let invoker = GitInvoker::new("/nonexistent/sourcepods/git");
        let err = invoker
            .spawn(&["upload-pack"], &std::env::temp_dir())
            .err()
            .unwrap();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/sourcepods/git"));
    }

    #[tokio::test]
    async fn test_deadline_kills_process() {
        let invoker = GitInvoker::new("sleep");
        let mut child = invoker.spawn(&["5"], &std::env::temp_dir()).unwrap();

        let result = with_deadline(Some(Duration::from_millis(50)), child.wait()).await;
        assert!(matches!(result, Err(ProcessError::Timeout(_))));

        reap(child.as_mut()).await;
        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_without_deadline() {
        let value = with_deadline(None, async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }
}
