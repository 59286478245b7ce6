//! Consumer side of a running lifecycle operation

use std::fmt;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::adapters::Operation;
use crate::crd::Engine;
use crate::error::{Error, Result};
use crate::reconcilers::{ClusterState, Endpoint, OutputMsg};

/// Terminal success of an operation
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OperationOutcome {
    pub operation: Operation,
    pub engine: Engine,
    pub cluster: String,
    pub state: ClusterState,
    pub messages: Vec<String>,
    pub endpoint: Option<Endpoint>,
}

impl fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.messages.is_empty() {
            return write!(f, "{} of {} finished: {}", self.operation, self.cluster, self.state);
        }
        f.write_str(&self.messages.join("\n"))
    }
}

/// Three-channel view of a background operation
///
/// Dropping the handle cancels the task behind it.
#[derive(Debug)]
pub struct OperationHandle {
    success: oneshot::Receiver<OperationOutcome>,
    error: oneshot::Receiver<Error>,
    progress: mpsc::Receiver<OutputMsg>,
    token: CancellationToken,
    _guard: DropGuard,
}

impl OperationHandle {
    /// Ask the background task to stop
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive the operation to its terminal event
    ///
    /// Progress queued before the terminal event is handed to `on_progress`
    /// first.
    pub async fn wait(mut self, mut on_progress: impl FnMut(OutputMsg)) -> Result<OperationOutcome> {
        let mut progress_open = true;
        let mut success_open = true;
        let mut error_open = true;

        loop {
            tokio::select! {
                biased;

                msg = self.progress.recv(), if progress_open => match msg {
                    Some(msg) => on_progress(msg),
                    None => progress_open = false,
                },
                outcome = &mut self.success, if success_open => match outcome {
                    Ok(outcome) => return Ok(outcome),
                    Err(_) => success_open = false,
                },
                error = &mut self.error, if error_open => match error {
                    Ok(error) => return Err(error),
                    Err(_) => error_open = false,
                },
                else => return Err(Error::Cancelled),
            }
        }
    }
}

/// Producer side, owned by the background task
#[derive(Debug)]
pub(crate) struct Reporter {
    success: oneshot::Sender<OperationOutcome>,
    error: oneshot::Sender<Error>,
    progress: mpsc::Sender<OutputMsg>,
    token: CancellationToken,
}

impl Reporter {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Queue a progress event, giving up if the operation is cancelled
    pub async fn progress(&self, msg: OutputMsg) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = self.progress.send(msg) => {}
        }
    }

    /// Deliver the single terminal event
    pub fn finish(self, result: Result<OperationOutcome>) {
        // The consumer may be gone already
        let _ = match result {
            Ok(outcome) => self.success.send(outcome).map_err(|_| ()),
            Err(error) => self.error.send(error).map_err(|_| ()),
        };
    }
}

pub(crate) fn channel(capacity: usize) -> (OperationHandle, Reporter) {
    let (success_tx, success_rx) = oneshot::channel();
    let (error_tx, error_rx) = oneshot::channel();
    let (progress_tx, progress_rx) = mpsc::channel(capacity.max(1));
    let token = CancellationToken::new();

    let handle = OperationHandle {
        success: success_rx,
        error: error_rx,
        progress: progress_rx,
        _guard: token.clone().drop_guard(),
        token: token.clone(),
    };
    let reporter = Reporter {
        success: success_tx,
        error: error_tx,
        progress: progress_tx,
        token,
    };
    (handle, reporter)
}
