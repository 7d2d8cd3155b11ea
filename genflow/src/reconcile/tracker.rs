//! Workflow tracker - the async driver around [`Reconciler`].
//!
//! The tracker owns the job client, the push transport and the lifetimes of
//! whichever connector or poll loop is running. Everything that can change
//! workflow state (caller commands, push notices, poll notices, request
//! outcomes) is funnelled through one `select!` loop, so the reconciler is
//! only ever touched from a single task.
//!
//! Callers interact through a cloneable [`WorkflowHandle`] and observe
//! progress through a `watch` channel of [`WorkflowView`]s.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use super::machine::{Command, Event, Reconciler};
use super::state::{RunId, WorkflowView};
use crate::client::{JobClient, JobClientError, RetryPolicy};
use crate::config::ConfigFile;
use crate::job::{JobId, JobRequest};
use crate::poll::{PollLoop, PollNotice};
use crate::push::{PushConnector, PushNotice, PushTransport, ReconnectPolicy};

/// Capacity of the control and notice channels.
const CHANNEL_CAPACITY: usize = 32;

/// Errors returned by [`WorkflowHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("Workflow tracker has stopped")]
    Stopped,
}

/// Runtime configuration for the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Prefer the push channel; when false jobs are polled from the start.
    pub push_enabled: bool,

    /// Retry behaviour for job client calls. Applied by the caller when
    /// wrapping the client in a `RetryingClient`.
    pub retry: RetryPolicy,

    pub reconnect: ReconnectPolicy,

    pub poll_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from_config_file(&ConfigFile::default())
    }
}

impl TrackerConfig {
    pub fn from_config_file(config: &ConfigFile) -> Self {
        Self {
            push_enabled: config.backend.push_enabled,
            retry: RetryPolicy {
                max_retries: config.client.max_retries,
                base_delay: Duration::from_millis(config.client.retry_base_delay_ms),
                request_timeout: Duration::from_millis(config.client.request_timeout_ms),
                ..RetryPolicy::default()
            },
            reconnect: ReconnectPolicy {
                max_attempts: config.push.max_reconnect_attempts,
                base_delay: Duration::from_millis(config.push.reconnect_base_delay_ms),
                ..ReconnectPolicy::default()
            },
            poll_interval: Duration::from_millis(config.polling.interval_ms),
        }
    }

    pub fn with_push_enabled(mut self, enabled: bool) -> Self {
        self.push_enabled = enabled;
        self
    }
}

/// Requests sent from handles to the tracker task.
#[derive(Debug)]
enum Control {
    Submit(JobRequest, oneshot::Sender<RunId>),
    Track(JobId, oneshot::Sender<RunId>),
    Retry(oneshot::Sender<RunId>),
    Reset(oneshot::Sender<()>),
}

/// A running connector or poll loop, with the means to stop it.
struct ActiveTransport<N> {
    rx: mpsc::Receiver<N>,
    cancel: CancellationToken,
    task: AbortHandle,
}

impl<N> ActiveTransport<N> {
    fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// Receive from the transport if one is running; pend forever otherwise.
async fn recv_active<N>(active: &mut Option<ActiveTransport<N>>) -> Option<N> {
    match active {
        Some(transport) => transport.rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle for driving and observing a [`WorkflowTracker`].
#[derive(Clone)]
pub struct WorkflowHandle {
    control_tx: mpsc::Sender<Control>,
    view_rx: watch::Receiver<WorkflowView>,
    shutdown: CancellationToken,
}

impl WorkflowHandle {
    /// Submit a new job, abandoning the current one. Returns the new run id.
    pub async fn submit(&self, request: JobRequest) -> Result<RunId, TrackerError> {
        self.request(|ack| Control::Submit(request, ack)).await
    }

    /// Follow an existing job, abandoning the current one.
    pub async fn track(&self, job_id: JobId) -> Result<RunId, TrackerError> {
        self.request(|ack| Control::Track(job_id, ack)).await
    }

    /// Retry after a failure. Returns the current run id; unchanged if the
    /// workflow had not failed.
    pub async fn retry(&self) -> Result<RunId, TrackerError> {
        self.request(Control::Retry).await
    }

    /// Abandon the current job and return to idle. Safe to call repeatedly.
    pub async fn reset(&self) -> Result<(), TrackerError> {
        self.request(Control::Reset).await
    }

    /// The most recently published view.
    pub fn view(&self) -> WorkflowView {
        self.view_rx.borrow().clone()
    }

    /// A receiver notified on every view change.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowView> {
        self.view_rx.clone()
    }

    /// Wait until `run` reaches `Done` or `Failed`, or is superseded by a
    /// newer run, and return the view at that point.
    pub async fn settled(&self, run: RunId) -> Result<WorkflowView, TrackerError> {
        let mut rx = self.view_rx.clone();
        let view = rx
            .wait_for(|view| view.run != run || view.state.is_settled())
            .await
            .map_err(|_| TrackerError::Stopped)?;
        Ok(view.clone())
    }

    /// Stop the tracker and everything it has running.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn request<R>(
        &self,
        control: impl FnOnce(oneshot::Sender<R>) -> Control,
    ) -> Result<R, TrackerError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.control_tx
            .send(control(ack_tx))
            .await
            .map_err(|_| TrackerError::Stopped)?;
        ack_rx.await.map_err(|_| TrackerError::Stopped)
    }
}

/// Tracker daemon for one workflow at a time.
pub struct WorkflowTracker<C: JobClient, T: PushTransport> {
    client: Arc<C>,
    transport: Arc<T>,
    config: TrackerConfig,
    reconciler: Reconciler,
    control_rx: mpsc::Receiver<Control>,
    view_tx: watch::Sender<WorkflowView>,
    shutdown: CancellationToken,
    push: Option<ActiveTransport<PushNotice>>,
    poll: Option<ActiveTransport<PollNotice>>,
    requests: JoinSet<Event>,
}

impl<C, T> WorkflowTracker<C, T>
where
    C: JobClient + 'static,
    T: PushTransport + 'static,
{
    pub fn new(client: Arc<C>, transport: Arc<T>, config: TrackerConfig) -> (Self, WorkflowHandle) {
        let (control_tx, control_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (view_tx, view_rx) = watch::channel(WorkflowView::default());
        let shutdown = CancellationToken::new();

        let tracker = Self {
            client,
            transport,
            reconciler: Reconciler::new(config.push_enabled),
            config,
            control_rx,
            view_tx,
            shutdown: shutdown.clone(),
            push: None,
            poll: None,
            requests: JoinSet::new(),
        };
        let handle = WorkflowHandle {
            control_tx,
            view_rx,
            shutdown,
        };
        (tracker, handle)
    }

    /// Start the tracker as an async task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the event loop until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        tracing::info!(push_enabled = self.config.push_enabled, "Workflow tracker started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                control = self.control_rx.recv() => {
                    match control {
                        Some(control) => self.on_control(control),
                        None => break,
                    }
                }

                notice = recv_active(&mut self.push) => {
                    let event = match notice {
                        Some(notice) => push_event(notice),
                        None => {
                            self.push = None;
                            Event::PushFailed { attempts: 0, reason: "push connector stopped".to_string() }
                        }
                    };
                    self.dispatch(event);
                }

                notice = recv_active(&mut self.poll) => {
                    let event = match notice {
                        Some(notice) => poll_event(notice),
                        None => {
                            self.poll = None;
                            Event::PollFailed(JobClientError::Transient("poll loop stopped".to_string()))
                        }
                    };
                    self.dispatch(event);
                }

                Some(joined) = self.requests.join_next() => {
                    match joined {
                        Ok(event) => self.dispatch(event),
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => tracing::error!(error = %e, "Request task failed"),
                    }
                }
            }
        }

        self.stop_push();
        self.stop_poll();
        self.requests.shutdown().await;
        tracing::info!("Workflow tracker stopped");
    }

    fn on_control(&mut self, control: Control) {
        match control {
            Control::Submit(request, ack) => {
                self.dispatch(Event::Submit(request));
                let _ = ack.send(self.reconciler.run());
            }
            Control::Track(job_id, ack) => {
                self.dispatch(Event::Track(job_id));
                let _ = ack.send(self.reconciler.run());
            }
            Control::Retry(ack) => {
                self.dispatch(Event::Retry);
                let _ = ack.send(self.reconciler.run());
            }
            Control::Reset(ack) => {
                self.dispatch(Event::Reset);
                let _ = ack.send(());
            }
        }
    }

    /// Feed one event to the reconciler, execute its commands and publish
    /// the resulting view.
    fn dispatch(&mut self, event: Event) {
        for command in self.reconciler.handle(event) {
            self.execute(command);
        }

        let view = self.reconciler.view().clone();
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }

    fn execute(&mut self, command: Command) {
        tracing::debug!(command = ?command, "Executing command");
        match command {
            Command::Submit { run, request } => {
                let client = Arc::clone(&self.client);
                self.requests.spawn(async move {
                    let outcome = client.submit(&request).await;
                    Event::SubmitCompleted { run, outcome }
                });
            }
            Command::FetchResult { run, job_id } => {
                let client = Arc::clone(&self.client);
                self.requests.spawn(async move {
                    let outcome = client.fetch_result(&job_id).await;
                    Event::ResultCompleted { run, outcome }
                });
            }
            Command::AbortRequests => self.requests.abort_all(),
            Command::OpenPush { job_id } => {
                self.stop_push();
                let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
                let cancel = self.shutdown.child_token();
                let task = PushConnector::new(
                    Arc::clone(&self.transport),
                    job_id,
                    self.config.reconnect.clone(),
                    tx,
                    cancel.clone(),
                )
                .start();
                self.push = Some(ActiveTransport {
                    rx,
                    cancel,
                    task: task.abort_handle(),
                });
            }
            Command::ClosePush => self.stop_push(),
            Command::StartPoll { job_id } => {
                self.stop_poll();
                let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
                let cancel = self.shutdown.child_token();
                let task = PollLoop::new(
                    Arc::clone(&self.client),
                    job_id,
                    self.config.poll_interval,
                    tx,
                    cancel.clone(),
                )
                .start();
                self.poll = Some(ActiveTransport {
                    rx,
                    cancel,
                    task: task.abort_handle(),
                });
            }
            Command::StopPoll => self.stop_poll(),
        }
    }

    fn stop_push(&mut self) {
        if let Some(push) = self.push.take() {
            push.stop();
        }
    }

    fn stop_poll(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.stop();
        }
    }
}

fn push_event(notice: PushNotice) -> Event {
    match notice {
        PushNotice::Opened => Event::PushOpened,
        PushNotice::Snapshot(snapshot) => Event::PushSnapshot(snapshot),
        PushNotice::Reconnecting { attempt, delay } => Event::PushReconnecting { attempt, delay },
        PushNotice::Closed => Event::PushClosed,
        PushNotice::Failed { attempts, reason } => Event::PushFailed { attempts, reason },
    }
}

fn poll_event(notice: PollNotice) -> Event {
    match notice {
        PollNotice::Snapshot(snapshot) => Event::PollSnapshot(snapshot),
        PollNotice::Warning(error) => Event::PollWarning(error),
        PollNotice::Fatal(error) => Event::PollFailed(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SimulatedJobClient;
    use crate::push::{ByteStream, PushError};
    use crate::reconcile::{ErrorOrigin, WorkflowState};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Push transport whose connections are always refused.
    #[derive(Default)]
    struct RefusingTransport {
        attempts: AtomicU32,
    }

    impl PushTransport for RefusingTransport {
        async fn connect(&self, _job_id: &JobId, _last_event_id: Option<&str>) -> Result<ByteStream, PushError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(PushError::Connect("connection refused".into()))
        }
    }

    fn config(push_enabled: bool) -> TrackerConfig {
        TrackerConfig {
            push_enabled,
            retry: RetryPolicy::no_retries(Duration::from_secs(5)),
            reconnect: ReconnectPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
            },
            poll_interval: Duration::from_secs(1),
        }
    }

    fn tracker(
        client: SimulatedJobClient,
        push_enabled: bool,
    ) -> (Arc<SimulatedJobClient>, Arc<RefusingTransport>, WorkflowHandle) {
        let client = Arc::new(client);
        let transport = Arc::new(RefusingTransport::default());
        let (tracker, handle) = WorkflowTracker::new(Arc::clone(&client), Arc::clone(&transport), config(push_enabled));
        tracker.start();
        (client, transport, handle)
    }

    #[test]
    fn test_config_from_file() {
        let mut file = ConfigFile::default();
        file.backend.push_enabled = false;
        file.client.max_retries = 7;
        file.client.request_timeout_ms = 1_500;
        file.push.max_reconnect_attempts = 2;
        file.polling.interval_ms = 250;

        let config = TrackerConfig::from_config_file(&file);

        assert!(!config.push_enabled);
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.retry.request_timeout, Duration::from_millis(1_500));
        assert_eq!(config.reconnect.max_attempts, 2);
        assert_eq!(config.reconnect.base_delay, Duration::from_secs(1));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert!(config.with_push_enabled(true).push_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_run_completes() {
        let (client, transport, handle) = tracker(SimulatedJobClient::new().with_step(40), false);

        let run = handle.submit(JobRequest::new("Rust")).await.unwrap();
        let view = handle.settled(run).await.unwrap();

        assert_eq!(view.state, WorkflowState::Done);
        assert!(view.artifact.is_some());
        assert_eq!(view.snapshot.unwrap().progress, 100);
        assert_eq!(client.status_calls(), 3);
        assert_eq!(client.result_calls(), 1);
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_push_falls_back_to_polling() {
        let (client, transport, handle) = tracker(SimulatedJobClient::new().with_step(50), true);

        let run = handle.submit(JobRequest::new("Rust")).await.unwrap();
        let view = handle.settled(run).await.unwrap();

        assert_eq!(view.state, WorkflowState::Done);
        assert!(view.push_downgraded);
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(client.result_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_validation_error() {
        let (_client, _transport, handle) = tracker(SimulatedJobClient::new(), false);

        let run = handle.submit(JobRequest::new("  ")).await.unwrap();
        let view = handle.settled(run).await.unwrap();

        assert_eq!(view.state, WorkflowState::Failed);
        let error = view.error.unwrap();
        assert_eq!(error.origin, ErrorOrigin::Submit);
        assert!(!error.retryable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_unknown_job_fails() {
        let (_client, _transport, handle) = tracker(SimulatedJobClient::new(), false);

        let run = handle.track(JobId::from("missing")).await.unwrap();
        let view = handle.settled(run).await.unwrap();

        assert_eq!(view.state, WorkflowState::Failed);
        assert_eq!(view.error.unwrap().origin, ErrorOrigin::Transport);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_job_failure_resubmits() {
        let (client, _transport, handle) = tracker(SimulatedJobClient::new().with_step(50).with_failure(60, "boom"), false);

        let first = handle.submit(JobRequest::new("Rust")).await.unwrap();
        let view = handle.settled(first).await.unwrap();
        assert_eq!(view.state, WorkflowState::Failed);
        assert_eq!(view.job_id, Some(JobId::from("sim-1")));

        let second = handle.retry().await.unwrap();
        assert_eq!(second, first + 1);
        let view = handle.settled(second).await.unwrap();

        // The simulated backend fails every job at 60, so the retry fails too,
        // but on a freshly submitted job.
        assert_eq!(view.state, WorkflowState::Failed);
        assert_eq!(view.job_id, Some(JobId::from("sim-2")));
        assert_eq!(client.result_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_stops_polling() {
        let (client, _transport, handle) = tracker(SimulatedJobClient::new().with_step(1), false);

        handle.submit(JobRequest::new("Rust")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        handle.reset().await.unwrap();
        handle.reset().await.unwrap();

        let calls = client.status_calls();
        assert!(calls >= 1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(client.status_calls(), calls);
        assert_eq!(handle.view().state, WorkflowState::Idle);
        assert!(handle.view().snapshot.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_tracker() {
        let client = Arc::new(SimulatedJobClient::new());
        let (tracker, handle) = WorkflowTracker::new(client, Arc::new(RefusingTransport::default()), config(false));
        let task = tracker.start();

        handle.shutdown();
        task.await.unwrap();

        assert_eq!(handle.submit(JobRequest::new("Rust")).await, Err(TrackerError::Stopped));
    }
}
