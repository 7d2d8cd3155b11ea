//! Poll loop - fixed-interval status pull for one job.
//!
//! The [`PollLoop`] fetches the job status every interval, starting
//! immediately, and forwards each result to its owner as a [`PollNotice`].
//!
//! # Design
//!
//! - `new()` + `start()` spawns the loop as a task
//! - at most one fetch is in flight; a tick that finds one running is
//!   skipped rather than queued
//! - retryable errors are absorbed and surfaced as warnings, anything else
//!   stops the loop as fatal
//! - terminal snapshots are forwarded like any other; the owner decides
//!   whether to accept one and cancels the loop when it does

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::client::{JobClient, JobClientError};
use crate::job::{JobId, StatusSnapshot};

/// Notifications sent from the poll loop to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum PollNotice {
    Snapshot(StatusSnapshot),

    /// A retryable failure; polling continues.
    Warning(JobClientError),

    /// A non-retryable failure; polling has stopped.
    Fatal(JobClientError),
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    Fatal,
    Cancelled,
}

/// Poll loop daemon for one job.
pub struct PollLoop<C: JobClient> {
    client: Arc<C>,
    job_id: JobId,
    interval: Duration,
    notice_tx: mpsc::Sender<PollNotice>,
    cancel: CancellationToken,
}

impl<C: JobClient + 'static> PollLoop<C> {
    pub fn new(
        client: Arc<C>,
        job_id: JobId,
        interval: Duration,
        notice_tx: mpsc::Sender<PollNotice>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            job_id,
            interval,
            notice_tx,
            cancel,
        }
    }

    /// Start the loop as an async task.
    pub fn start(self) -> tokio::task::JoinHandle<PollExit> {
        tokio::spawn(self.run())
    }

    /// Run the poll loop.
    pub async fn run(self) -> PollExit {
        tracing::info!(
            job_id = %self.job_id,
            interval_ms = self.interval.as_millis() as u64,
            "Poll loop started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: JoinSet<Result<StatusSnapshot, JobClientError>> = JoinSet::new();
        let mut consecutive_errors: u32 = 0;

        let exit = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break PollExit::Cancelled,

                _ = interval.tick() => {
                    if !in_flight.is_empty() {
                        tracing::trace!(job_id = %self.job_id, "Previous status fetch still in flight, skipping tick");
                        continue;
                    }
                    let client = Arc::clone(&self.client);
                    let job_id = self.job_id.clone();
                    in_flight.spawn(async move { client.fetch_status(&job_id).await });
                }

                Some(joined) = in_flight.join_next() => {
                    let outcome = joined.unwrap_or_else(|e| {
                        Err(JobClientError::Transient(format!("status fetch task failed: {e}")))
                    });

                    match outcome {
                        Ok(snapshot) => {
                            consecutive_errors = 0;
                            if !self.notify(PollNotice::Snapshot(snapshot)).await {
                                break PollExit::Cancelled;
                            }
                        }
                        Err(e) if e.is_retryable() => {
                            consecutive_errors += 1;
                            tracing::warn!(
                                job_id = %self.job_id,
                                error = %e,
                                consecutive_errors,
                                "Status poll failed"
                            );
                            if !self.notify(PollNotice::Warning(e)).await {
                                break PollExit::Cancelled;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(job_id = %self.job_id, error = %e, "Status poll failed fatally");
                            self.notify(PollNotice::Fatal(e)).await;
                            break PollExit::Fatal;
                        }
                    }
                }
            }
        };

        in_flight.abort_all();
        tracing::info!(job_id = %self.job_id, exit = ?exit, "Poll loop stopped");
        exit
    }

    async fn notify(&self, notice: PollNotice) -> bool {
        if self.notice_tx.send(notice).await.is_err() {
            tracing::debug!(job_id = %self.job_id, "Poll notice channel closed, stopping");
            return false;
        }
        true
    }
}
