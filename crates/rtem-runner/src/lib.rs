//! Concurrent process runner with graceful shutdown.
//!
//! Long-running processes are spawned together and share a cancellation
//! token. The first process error, or SIGTERM/SIGINT, cancels the rest;
//! closers then run under a timeout regardless of how the processes ended.
//! `run` reports the exit code instead of exiting, so callers (and tests)
//! decide when the process dies.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

type ProcessFuture = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>;

struct Process {
    name: String,
    start: Box<dyn FnOnce(CancellationToken) -> ProcessFuture + Send>,
}

type Closer = Box<dyn FnOnce() -> ProcessFuture + Send>;

pub struct Runner {
    processes: Vec<Process>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            token: CancellationToken::new(),
        }
    }

    /// Add a named long-running process. All processes run concurrently and
    /// observe a shared cancellation token.
    pub fn with_process<F, Fut>(mut self, name: impl Into<String>, start: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.processes.push(Process {
            name: name.into(),
            start: Box::new(|token| Box::pin(start(token))),
        });
        self
    }

    /// Add a closer. Closers run after every process has stopped, whatever
    /// the outcome; each one runs even if another fails.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an external token, for embedding the runner in tests or a larger
    /// process.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Run until every process has stopped, then run the closers. Returns
    /// the process exit code: 0 for a clean shutdown, 1 when any process
    /// failed or panicked.
    pub async fn run(self) -> i32 {
        let token = self.token;
        let mut join_set = JoinSet::new();

        for process in self.processes {
            let process_token = token.clone();
            let name = process.name;
            join_set.spawn(async move {
                let result = (process.start)(process_token).await;
                (name, result)
            });
        }

        spawn_signal_handlers(token.clone());

        let mut failed = false;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "Process completed");
                }
                Ok((name, Err(e))) => {
                    error!(process = %name, error = format!("{e:#}"), "Process failed");
                    failed = true;
                    token.cancel();
                }
                Err(e) => {
                    error!(error = %e, "Process panicked");
                    failed = true;
                    token.cancel();
                }
            }
        }

        run_closers(self.closers, self.closer_timeout).await;

        if failed {
            error!("Shutdown complete after process failure");
            1
        } else {
            info!("Shutdown complete");
            0
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let interrupt_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt signal");
                interrupt_token.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to install interrupt handler");
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
                token.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    });
}

async fn run_closers(closers: Vec<Closer>, timeout: Duration) {
    if closers.is_empty() {
        return;
    }

    let all = async {
        let mut closer_set = JoinSet::new();
        for closer in closers {
            closer_set.spawn(closer());
        }
        while let Some(result) = closer_set.join_next().await {
            match result {
                Ok(Ok(())) => debug!("Closer completed"),
                Ok(Err(e)) => error!(error = format!("{e:#}"), "Closer failed"),
                Err(e) => error!(error = %e, "Closer panicked"),
            }
        }
    };

    if tokio::time::timeout(timeout, all).await.is_err() {
        error!(timeout_ms = timeout.as_millis() as u64, "Closers timed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn wait_for_cancel(token: CancellationToken) -> Result<(), anyhow::Error> {
        token.cancelled().await;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn clean_cancellation_exits_zero_and_runs_closers() {
        let closed = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let runner = Runner::new()
            .with_process("a", wait_for_cancel)
            .with_process("b", wait_for_cancel)
            .with_closer({
                let closed = Arc::clone(&closed);
                move || async move {
                    closed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_cancellation_token(token.clone());

        token.cancel();
        assert_eq!(runner.run().await, 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn process_failure_cancels_the_rest_and_exits_nonzero() {
        let runner = Runner::new()
            .with_process("failing", |_token| async {
                Err(anyhow::anyhow!("boom"))
            })
            .with_process("waiting", wait_for_cancel);

        assert_eq!(runner.run().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closers_run_even_when_one_fails() {
        let closed = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let runner = Runner::new()
            .with_process("a", wait_for_cancel)
            .with_closer(|| async { Err(anyhow::anyhow!("closer boom")) })
            .with_closer({
                let closed = Arc::clone(&closed);
                move || async move {
                    closed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_cancellation_token(token.clone());

        token.cancel();
        assert_eq!(runner.run().await, 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_closer_is_abandoned_after_the_timeout() {
        let token = CancellationToken::new();

        let runner = Runner::new()
            .with_process("a", wait_for_cancel)
            .with_closer(|| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .with_closer_timeout(Duration::from_millis(50))
            .with_cancellation_token(token.clone());

        token.cancel();
        assert_eq!(runner.run().await, 0);
    }
}
