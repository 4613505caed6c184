use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::{ExecutionPolicy, ExecutorConfig};
use crate::error::{BatchError, Result};
use crate::exec::chunk;

/// Synthetic exit codes for chunks whose subprocess never started, following
/// shell conventions for "not found" and "not executable".
const EXIT_NOT_FOUND: i32 = 127;
const EXIT_NOT_PERMITTED: i32 = 126;

/// Result of one chunk invocation.
#[derive(Debug)]
pub struct InvocationResult {
    pub exit_code: i32,
    /// Captured stdout followed by captured stderr.
    pub output: Vec<u8>,
}

/// Combined result of a whole batch.
#[derive(Debug)]
pub struct BatchResult {
    /// Maximum exit code across all chunks; 0 iff every chunk succeeded.
    pub exit_code: i32,
    /// Chunk outputs concatenated in dispatch order.
    pub output: Vec<u8>,
}

/// Runs a base command over a file list in argument-length-safe chunks.
///
/// Chunks run concurrently up to the configured worker bound. Each chunk's
/// output is buffered until the whole batch finishes and merged in dispatch
/// order, so the reported transcript is stable across runs even though
/// completion order is not.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    config: ExecutorConfig,
}

impl BatchExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Execute `command` over `files`, one subprocess per chunk.
    ///
    /// A chunk whose tool exits nonzero is reported through the merged exit
    /// code, never dropped. Only system-level failures abort the batch:
    /// spawn errors other than a missing or non-executable program, a lost
    /// chunk task, or cancellation. No chunk is ever retried.
    pub async fn run(
        &self,
        command: &[String],
        files: &[String],
        policy: &ExecutionPolicy,
    ) -> Result<BatchResult> {
        if command.is_empty() {
            return Err(BatchError::EmptyCommand);
        }

        let run_id = Uuid::new_v4();
        let chunks: Vec<Vec<String>> = if policy.require_serial {
            vec![files.to_vec()]
        } else {
            let max_length = self
                .config
                .max_arg_length
                .unwrap_or_else(chunk::platform_max_length);
            chunk::partition(command, files, max_length)?
                .into_iter()
                .map(<[String]>::to_vec)
                .collect()
        };

        tracing::info!(
            run_id = %run_id,
            files = files.len(),
            chunks = chunks.len(),
            serial = policy.require_serial,
            "Dispatching batch"
        );

        let result = if chunks.len() == 1 {
            let invocation = self.invoke(run_id, 0, command, &chunks[0], policy).await?;
            BatchResult {
                exit_code: invocation.exit_code,
                output: invocation.output,
            }
        } else {
            self.run_parallel(run_id, command, chunks, policy).await?
        };

        tracing::info!(run_id = %run_id, exit_code = result.exit_code, "Batch completed");
        Ok(result)
    }

    /// Dispatch every chunk as its own task, bounded by the worker limit,
    /// and merge results in dispatch order.
    async fn run_parallel(
        &self,
        run_id: Uuid,
        command: &[String],
        chunks: Vec<Vec<String>>,
        policy: &ExecutionPolicy,
    ) -> Result<BatchResult> {
        let chunk_count = chunks.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();

        for (index, files) in chunks.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let command = command.to_vec();
            let policy = policy.clone();
            let executor = self.clone();
            tasks.spawn(async move {
                // The semaphore is never closed while tasks are running.
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let result = executor
                    .invoke(run_id, index, &command, &files, &policy)
                    .await;
                (index, result)
            });
        }

        // Results are written into slots keyed by dispatch index, not
        // appended in completion order.
        let mut slots: Vec<Option<InvocationResult>> = Vec::new();
        slots.resize_with(chunk_count, || None);
        while let Some(joined) = tasks.join_next().await {
            let (index, result) =
                joined.map_err(|e| BatchError::Internal(format!("chunk task failed: {e}")))?;
            slots[index] = Some(result?);
        }

        let mut exit_code = 0;
        let mut output = Vec::new();
        for slot in slots {
            let invocation =
                slot.ok_or_else(|| BatchError::Internal("chunk result missing".to_string()))?;
            exit_code = exit_code.max(invocation.exit_code);
            output.extend_from_slice(&invocation.output);
        }

        Ok(BatchResult { exit_code, output })
    }

    /// Spawn one chunk subprocess and capture its result.
    async fn invoke(
        &self,
        run_id: Uuid,
        index: usize,
        command: &[String],
        files: &[String],
        policy: &ExecutionPolicy,
    ) -> Result<InvocationResult> {
        tracing::debug!(
            run_id = %run_id,
            chunk = index,
            files = files.len(),
            "Spawning chunk subprocess"
        );

        let mut cmd = Command::new(&command[0]);
        cmd.args(&command[1..])
            .args(files)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if policy.color {
            cmd.env("CLICOLOR_FORCE", "1").env("FORCE_COLOR", "1");
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return Self::spawn_failure(&command[0], e),
        };

        let cancel = self.config.cancel.clone();
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Dropping the wait future kills the child (kill_on_drop).
                tracing::warn!(run_id = %run_id, chunk = index, "Interrupted, killing chunk");
                return Err(BatchError::Interrupted);
            }
            output = child.wait_with_output() => output?,
        };

        let exit_code = exit_code_of(&output.status);
        let mut bytes = output.stdout;
        bytes.extend_from_slice(&output.stderr);

        tracing::debug!(run_id = %run_id, chunk = index, exit_code, "Chunk completed");
        Ok(InvocationResult {
            exit_code,
            output: bytes,
        })
    }

    /// Classify a spawn error: a missing or non-executable program is an
    /// ordinary chunk failure carrying a synthetic exit code, so the rest of
    /// the batch still runs; anything else (descriptor or memory exhaustion)
    /// is fatal to the whole batch.
    fn spawn_failure(program: &str, error: std::io::Error) -> Result<InvocationResult> {
        use std::io::ErrorKind;

        let exit_code = match error.kind() {
            ErrorKind::NotFound => EXIT_NOT_FOUND,
            ErrorKind::PermissionDenied => EXIT_NOT_PERMITTED,
            _ => {
                return Err(BatchError::Spawn {
                    program: program.to_string(),
                    source: error,
                })
            }
        };

        tracing::error!(program, error = %error, "Chunk subprocess could not start");
        Ok(InvocationResult {
            exit_code,
            output: format!("{program}: {error}\n").into_bytes(),
        })
    }
}

/// Exit code of a finished child. Signal deaths map to `128 + signal` on
/// unix so they stay positive under the max-merge rule.
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(1)
}
