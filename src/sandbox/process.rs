use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use super::{BoxFuture, ProcessOutput, ProcessRunner, ProcessSpec};

/// How long to wait for the output pipes to close once the process is gone
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Runs programs as plain child processes, each in its own process group.
///
/// On timeout the whole group is killed, so helper processes spawned by the
/// JVM or compiler daemon do not outlive the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubprocessRunner;

impl SubprocessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for SubprocessRunner {
    fn run_process<'a>(
        &'a self,
        spec: &'a ProcessSpec,
        timeout: Duration,
    ) -> BoxFuture<'a, anyhow::Result<ProcessOutput>> {
        Box::pin(run_with_timeout(spec, timeout))
    }
}

async fn run_with_timeout(spec: &ProcessSpec, budget: Duration) -> anyhow::Result<ProcessOutput> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);
    if let Some(dir) = &spec.cwd {
        command.current_dir(dir);
    }

    log::debug!("Spawning `{spec}`");
    let start = Instant::now();
    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn `{}`", spec.program))?;
    let pid = child.id();

    let mut stdout = Capture::start(child.stdout.take(), spec.output_limit);
    let mut stderr = Capture::start(child.stderr.take(), spec.output_limit);

    let (exit_code, timed_out) = match tokio::time::timeout(budget, child.wait()).await {
        Ok(status) => (status?.code(), false),
        Err(_) => {
            log::warn!("`{}` exceeded {:?}, killing its process group", spec.program, budget);
            kill_group(pid);
            if let Err(e) = child.kill().await {
                log::warn!("Failed to reap `{}`: {e}", spec.program);
            }
            (None, true)
        }
    };
    let duration = start.elapsed();

    // Descendants that inherited the pipes keep them open past the exit
    let stdout_closed = stdout.drain(DRAIN_GRACE).await;
    let stderr_closed = stderr.drain(DRAIN_GRACE).await;
    if !(stdout_closed && stderr_closed) {
        log::warn!("Output of `{}` still open after exit, killing its process group", spec.program);
        kill_group(pid);
    }

    Ok(ProcessOutput {
        stdout: stdout.into_bytes(),
        stderr: stderr.into_bytes(),
        exit_code,
        timed_out,
        duration,
    })
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    // SAFETY: plain syscall; the group id is the child's pid since it was
    // spawned with `process_group(0)`
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    if rc != 0 {
        log::debug!(
            "kill(-{pid}) failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

/// Accumulates one output pipe in the background.
///
/// Bytes land in the shared buffer as they are read, so a capture that is
/// abandoned midway still yields everything received up to that point. Past
/// `limit` the pipe is still drained so the child never blocks on a full pipe,
/// but the bytes are only counted, and a marker reporting them is appended.
struct Capture {
    buffer: Arc<Mutex<Captured>>,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Captured {
    bytes: Vec<u8>,
    dropped: usize,
}

impl Captured {
    fn push(&mut self, chunk: &[u8], limit: Option<usize>) {
        let room = limit.map_or(chunk.len(), |limit| limit.saturating_sub(self.bytes.len()));
        let kept = room.min(chunk.len());
        self.bytes.extend_from_slice(&chunk[..kept]);
        self.dropped += chunk.len() - kept;
    }

    fn finish(mut self) -> Vec<u8> {
        if self.dropped > 0 {
            if !self.bytes.ends_with(b"\n") {
                self.bytes.push(b'\n');
            }
            let marker = format!("[output truncated: {} bytes dropped]\n", self.dropped);
            self.bytes.extend_from_slice(marker.as_bytes());
        }
        self.bytes
    }
}

impl Capture {
    fn start<R>(pipe: Option<R>, limit: Option<usize>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Captured::default()));
        let task = pipe.map(|mut pipe| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => buffer.lock().push(&chunk[..n], limit),
                        Err(e) => {
                            log::debug!("Pipe read failed: {e}");
                            break;
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Waits for end of stream; false if the grace period ran out first
    async fn drain(&mut self, grace: Duration) -> bool {
        match &mut self.task {
            Some(task) => tokio::time::timeout(grace, task).await.is_ok(),
            None => true,
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        if let Some(task) = self.task {
            task.abort();
        }
        std::mem::take(&mut *self.buffer.lock()).finish()
    }
}
