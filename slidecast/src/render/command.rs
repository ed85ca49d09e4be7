//! Helper for invoking external tools (ffmpeg/ffprobe) with a hard timeout.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

/// Lines of diagnostic output kept from the end of the stream.
const DIAGNOSTIC_TAIL_LINES: usize = 40;

/// Output from a completed command.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: std::process::ExitStatus,
    /// Wall-clock duration in seconds.
    pub duration: f64,
    /// Captured stdout, whole.
    pub stdout: String,
    /// Last portion of stderr, for diagnostics on failure.
    pub stderr_tail: String,
}

fn spawn_tail_reader<R>(
    reader: R,
    sink: Arc<Mutex<VecDeque<String>>>,
    cap: usize,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("tool: {}", line);
            let mut tail = sink.lock();
            while tail.len() >= cap {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    })
}

/// Run a command, capturing stdout and a stderr tail, killing the process if
/// it exceeds `timeout`.
pub async fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<CommandOutput> {
    let start = std::time::Instant::now();

    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    command.kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| Error::Other(format!("Failed to spawn command: {}", e)))?;

    let stdout_buf = Arc::new(Mutex::new(VecDeque::new()));
    let stderr_buf = Arc::new(Mutex::new(VecDeque::new()));

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_tail_reader(stdout, stdout_buf.clone(), usize::MAX));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_tail_reader(
            stderr,
            stderr_buf.clone(),
            DIAGNOSTIC_TAIL_LINES,
        ));
    }

    let status = tokio::select! {
        status = child.wait() => {
            status.map_err(|e| Error::Other(format!("Failed to wait for command: {}", e)))?
        }
        _ = tokio::time::sleep(timeout) => {
            let _ = child.kill().await;
            return Err(Error::EncodeTimeout {
                secs: timeout.as_secs(),
            });
        }
    };

    // Pipes are closed once the child exits, so the readers finish promptly.
    for reader in readers {
        let _ = reader.await;
    }

    let stdout = stdout_buf.lock().iter().cloned().collect::<Vec<_>>().join("\n");
    let stderr_tail = stderr_buf.lock().iter().cloned().collect::<Vec<_>>().join("\n");

    Ok(CommandOutput {
        status,
        duration: start.elapsed().as_secs_f64(),
        stdout,
        stderr_tail,
    })
}
