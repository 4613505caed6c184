use std::thread;

use tokio_util::sync::CancellationToken;

/// Per-batch options recognized by the executor.
///
/// These travel with a single `run` call; executor-wide settings live in
/// [`ExecutorConfig`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionPolicy {
    /// Force exactly one invocation covering every file argument.
    ///
    /// For tools whose invocations are not safely parallelizable (shared
    /// mutable state, non-idempotent side effects, ordering between files).
    /// The caller accepts that the single argument vector may exceed the
    /// platform limit.
    pub require_serial: bool,
    /// Ask the invoked tool for ANSI-colored output.
    pub color: bool,
}

impl ExecutionPolicy {
    /// Policy forcing a single all-files invocation.
    pub fn serial() -> Self {
        Self {
            require_serial: true,
            ..Self::default()
        }
    }
}

/// Configuration for the batch executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on concurrently running chunk subprocesses.
    pub max_workers: usize,
    /// Override for the platform argument-length limit.
    ///
    /// `None` queries the platform at run time. Mainly useful for tests and
    /// for tuning against exotic kernels.
    pub max_arg_length: Option<usize>,
    /// Cancelling this token kills in-flight chunk subprocesses and fails
    /// the batch with an interruption error.
    pub cancel: CancellationToken,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_arg_length: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_max_arg_length(mut self, max_arg_length: usize) -> Self {
        self.max_arg_length = Some(max_arg_length);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_default_is_parallel_plain() {
        let policy = ExecutionPolicy::default();
        assert!(!policy.require_serial);
        assert!(!policy.color);
    }

    #[test]
    fn policy_serial() {
        let policy = ExecutionPolicy::serial();
        assert!(policy.require_serial);
        assert!(!policy.color);
    }

    #[test]
    fn executor_config_default() {
        let cfg = ExecutorConfig::default();
        assert!(cfg.max_workers >= 1);
        assert!(cfg.max_arg_length.is_none());
        assert!(!cfg.cancel.is_cancelled());
    }

    #[test]
    fn executor_config_builders() {
        let cfg = ExecutorConfig::default()
            .with_max_workers(3)
            .with_max_arg_length(1024);
        assert_eq!(cfg.max_workers, 3);
        assert_eq!(cfg.max_arg_length, Some(1024));
    }

    #[test]
    fn zero_workers_clamps_to_one() {
        let cfg = ExecutorConfig::default().with_max_workers(0);
        assert_eq!(cfg.max_workers, 1);
    }

    #[test]
    fn cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let cfg = ExecutorConfig::default().with_cancellation(token.clone());
        token.cancel();
        assert!(cfg.cancel.is_cancelled());
    }
}
