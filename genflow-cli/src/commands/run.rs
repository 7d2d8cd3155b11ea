//! `run` and `watch` - follow a job to completion.
//!
//! Both commands drive a [`WorkflowTracker`], printing progress as the view
//! changes, and print the result JSON once the job is done.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Args;
use genflow::client::JobClient;
use genflow::job::{JobId, JobRequest};
use genflow::phase::PhaseTable;
use genflow::push::PushTransport;
use genflow::reconcile::{TrackerConfig, TrackerError, WorkflowState, WorkflowTracker, WorkflowView};

use crate::error::CliError;
use crate::render::{render_phases, ProgressPrinter};
use crate::runner::CliRunner;

/// Arguments for `genflow run`.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Topic to generate content for
    #[arg(long)]
    pub topic: Option<String>,

    /// Keyword to include (repeatable)
    #[arg(long = "keyword", value_name = "KEYWORD")]
    pub keywords: Vec<String>,

    /// JSON file with the full job request; --topic and --keyword override its fields
    #[arg(long, value_name = "FILE")]
    pub request: Option<PathBuf>,

    /// Poll for status instead of using the event stream
    #[arg(long)]
    pub no_push: bool,
}

/// What the tracker should follow.
enum Target {
    Submit(JobRequest),
    Track(JobId),
}

/// Submit a job and follow it.
pub fn run(runner: &CliRunner, args: RunArgs) -> Result<(), CliError> {
    runner.log_startup("run");
    let request = build_request(&args)?;
    follow(runner, Target::Submit(request), args.no_push)
}

/// Follow an existing job.
pub fn watch(runner: &CliRunner, job_id: String, no_push: bool) -> Result<(), CliError> {
    runner.log_startup("watch");
    follow(runner, Target::Track(JobId::new(job_id)), no_push)
}

/// Build the job request from a request file and/or flags.
fn build_request(args: &RunArgs) -> Result<JobRequest, CliError> {
    let mut request = match &args.request {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|error| CliError::RequestFile {
                path: path.clone(),
                error,
            })?;
            serde_json::from_str::<JobRequest>(&content)
                .map_err(|e| CliError::InvalidRequest(format!("{}: {}", path.display(), e)))?
        }
        None => JobRequest::default(),
    };

    if let Some(topic) = &args.topic {
        request.topic = topic.clone();
    }
    if !args.keywords.is_empty() {
        request.keywords = args.keywords.clone();
    }

    if request.topic.trim().is_empty() {
        return Err(CliError::InvalidRequest(
            "a topic is required (use --topic or a request file)".to_string(),
        ));
    }
    Ok(request)
}

fn follow(runner: &CliRunner, target: Target, no_push: bool) -> Result<(), CliError> {
    let backend = runner.backend()?;
    if backend.is_simulated() {
        println!("Using simulated backend");
    }
    if let Target::Track(job_id) = &target {
        backend.register_job(job_id);
    }
    let transport = runner.push_transport()?;
    let config = runner.tracker_config(no_push);

    let view = runner.block_on(follow_async(backend, transport, config, target))??;

    match view.state {
        WorkflowState::Done => {
            if let Some(artifact) = &view.artifact {
                let json = serde_json::to_string_pretty(&artifact.content)
                    .map_err(|e| CliError::Output(e.to_string()))?;
                println!("{json}");
            }
            Ok(())
        }
        _ => match view.error {
            Some(error) => Err(CliError::Workflow {
                error,
                job_id: view.job_id,
            }),
            None => Err(CliError::Tracker(TrackerError::Stopped)),
        },
    }
}

async fn follow_async<C, T>(
    client: C,
    transport: T,
    config: TrackerConfig,
    target: Target,
) -> Result<WorkflowView, CliError>
where
    C: JobClient + 'static,
    T: PushTransport + 'static,
{
    let (tracker, handle) = WorkflowTracker::new(Arc::new(client), Arc::new(transport), config);
    let task = tracker.start();

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        let handle = handle.clone();
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
            handle.shutdown();
        })
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;
    }

    let run = match target {
        Target::Submit(request) => handle.submit(request).await?,
        Target::Track(job_id) => handle.track(job_id).await?,
    };

    let table = PhaseTable::content_pipeline();
    let mut printer = ProgressPrinter::new();
    let mut views = handle.subscribe();

    let outcome = loop {
        let view = views.borrow_and_update().clone();
        for line in printer.update(&view, &table) {
            println!("{line}");
        }
        if view.run != run || view.state.is_settled() {
            break Ok(view);
        }
        if views.changed().await.is_err() {
            break Err(if interrupted.load(Ordering::SeqCst) {
                CliError::Interrupted
            } else {
                CliError::Tracker(TrackerError::Stopped)
            });
        }
    };

    handle.shutdown();
    if let Err(e) = task.await {
        tracing::warn!(error = %e, "Tracker task ended abnormally");
    }

    let view = outcome?;
    if let Some(snapshot) = &view.snapshot {
        print!("{}", render_phases(snapshot, &table));
    }
    Ok(view)
}
