//! Push-channel connector for one job.
//!
//! The connector owns one event stream at a time and walks the channel
//! state machine:
//!
//! ```text
//! Idle ─► Connecting ─► Open ─► (snapshot)* ─► Closed      terminal snapshot
//!            ▲            │
//!            └── backoff ◄┘ stream error / end            failures < max
//!                         └──────────────────► Failed      failures == max
//! ```
//!
//! Every state change the tracker cares about is sent as a [`PushNotice`].
//! Cancelling the token stops the connector at any point, including while
//! it sleeps before a reconnect.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::event::decode_status_event;
use super::sse::SseDecoder;
use super::transport::{ByteStream, PushTransport};
use crate::config::defaults::{DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE_DELAY_MS};
use crate::job::{JobId, StatusSnapshot};

/// Upper bound on a single reconnect delay.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// State of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    /// Closed deliberately after a terminal snapshot or on request.
    Closed,
    /// Gave up after too many consecutive failures.
    Failed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Notifications sent from the connector to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum PushNotice {
    /// The stream is open; the failure counter has been reset.
    Opened,

    Snapshot(StatusSnapshot),

    /// The stream was lost; reconnecting after `delay`.
    Reconnecting { attempt: u32, delay: Duration },

    /// A terminal snapshot was delivered and the channel closed.
    Closed,

    /// Consecutive failures reached the limit.
    Failed { attempts: u32, reason: String },
}

/// Reconnection limits for the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failures after which the channel is abandoned.
    pub max_attempts: u32,

    /// Delay after the first failure; doubled for each further failure.
    pub base_delay: Duration,

    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Delay after `failures` consecutive failures (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(20);
        self.base_delay
            .checked_mul(2u32.pow(exponent))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_RECONNECT_BASE_DELAY_MS),
            max_delay: MAX_RECONNECT_DELAY,
        }
    }
}

/// How one open stream ended.
enum StreamEnd {
    Terminal,
    Cancelled,
    OwnerGone,
    Dropped(String),
}

/// Connector daemon for one job's event stream.
pub struct PushConnector<T: PushTransport> {
    transport: Arc<T>,
    job_id: JobId,
    policy: ReconnectPolicy,
    notice_tx: mpsc::Sender<PushNotice>,
    cancel: CancellationToken,
    state: ChannelState,
}

impl<T: PushTransport + 'static> PushConnector<T> {
    pub fn new(
        transport: Arc<T>,
        job_id: JobId,
        policy: ReconnectPolicy,
        notice_tx: mpsc::Sender<PushNotice>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            job_id,
            policy,
            notice_tx,
            cancel,
            state: ChannelState::Idle,
        }
    }

    /// Start the connector as an async task. The task yields the final
    /// channel state.
    pub fn start(self) -> tokio::task::JoinHandle<ChannelState> {
        tokio::spawn(self.run())
    }

    /// Run the connect / read / reconnect loop until closed, failed or
    /// cancelled.
    pub async fn run(mut self) -> ChannelState {
        tracing::info!(
            job_id = %self.job_id,
            max_attempts = self.policy.max_attempts,
            "Push connector started"
        );

        let mut decoder = SseDecoder::new();
        let mut failures: u32 = 0;

        let final_state = loop {
            self.set_state(ChannelState::Connecting);
            decoder = SseDecoder::resume(&decoder);

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break ChannelState::Closed,
                result = self.transport.connect(&self.job_id, decoder.last_event_id()) => result,
            };

            let reason = match connected {
                Ok(stream) => {
                    failures = 0;
                    self.set_state(ChannelState::Open);
                    if !self.notify(PushNotice::Opened).await {
                        break ChannelState::Closed;
                    }

                    match self.pump(stream, &mut decoder).await {
                        StreamEnd::Terminal => {
                            self.notify(PushNotice::Closed).await;
                            break ChannelState::Closed;
                        }
                        StreamEnd::Cancelled | StreamEnd::OwnerGone => break ChannelState::Closed,
                        StreamEnd::Dropped(reason) => reason,
                    }
                }
                Err(e) => e.to_string(),
            };

            failures += 1;
            if failures >= self.policy.max_attempts {
                tracing::warn!(
                    job_id = %self.job_id,
                    attempts = failures,
                    reason = %reason,
                    "Push channel failed, giving up"
                );
                self.notify(PushNotice::Failed {
                    attempts: failures,
                    reason,
                })
                .await;
                break ChannelState::Failed;
            }

            let delay = self
                .policy
                .delay_for(failures)
                .max(decoder.retry().unwrap_or_default());
            tracing::warn!(
                job_id = %self.job_id,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Push channel lost, reconnecting"
            );
            if !self
                .notify(PushNotice::Reconnecting {
                    attempt: failures,
                    delay,
                })
                .await
            {
                break ChannelState::Closed;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break ChannelState::Closed,
                _ = tokio::time::sleep(delay) => {}
            }
        };

        self.set_state(final_state);
        tracing::info!(job_id = %self.job_id, state = %final_state, "Push connector stopped");
        final_state
    }

    /// Read one open stream until it ends.
    async fn pump(&self, mut stream: ByteStream, decoder: &mut SseDecoder) -> StreamEnd {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StreamEnd::Cancelled,
                next = stream.next() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return StreamEnd::Dropped(e.to_string()),
                None => return StreamEnd::Dropped("event stream ended".to_string()),
            };

            for frame in decoder.feed(&chunk) {
                match decode_status_event(&frame, &self.job_id) {
                    Ok(Some(snapshot)) => {
                        let terminal = snapshot.is_terminal();
                        tracing::debug!(
                            job_id = %self.job_id,
                            event = %frame.event,
                            state = %snapshot.lifecycle_state,
                            progress = snapshot.progress,
                            "Push snapshot received"
                        );
                        if !self.notify(PushNotice::Snapshot(snapshot)).await {
                            return StreamEnd::OwnerGone;
                        }
                        if terminal {
                            return StreamEnd::Terminal;
                        }
                    }
                    Ok(None) => {
                        tracing::trace!(job_id = %self.job_id, event = %frame.event, "Push frame ignored");
                    }
                    Err(e) => {
                        tracing::warn!(
                            job_id = %self.job_id,
                            event = %frame.event,
                            error = %e,
                            "Dropping undecodable push event"
                        );
                    }
                }
            }
        }
    }

    /// Send a notice; returns false once the owner has gone away.
    async fn notify(&self, notice: PushNotice) -> bool {
        if self.notice_tx.send(notice).await.is_err() {
            tracing::debug!(job_id = %self.job_id, "Push notice channel closed, stopping");
            return false;
        }
        true
    }

    fn set_state(&mut self, state: ChannelState) {
        if self.state != state {
            tracing::debug!(job_id = %self.job_id, from = %self.state, to = %state, "Push channel state");
            self.state = state;
        }
    }
}
