//! `status` and `result` - one-shot queries against a job.

use genflow::client::JobClient;
use genflow::job::JobId;
use genflow::phase::PhaseTable;

use crate::error::CliError;
use crate::render::render_phases;
use crate::runner::CliRunner;

/// Fetch the status once and print it with the phase breakdown.
pub fn status(runner: &CliRunner, job_id: String) -> Result<(), CliError> {
    runner.log_startup("status");
    let backend = runner.backend()?;
    let job_id = JobId::new(job_id);
    backend.register_job(&job_id);

    let snapshot = runner.block_on(async { backend.fetch_status(&job_id).await })??;
    let table = PhaseTable::content_pipeline();

    println!("Job:      {}", snapshot.job_id);
    println!("State:    {}", snapshot.lifecycle_state);
    println!("Progress: {}%", snapshot.clamped_progress());
    if let Some(label) = &snapshot.current_phase_label {
        println!("Phase:    {}", label);
    }
    if let Some(updated_at) = snapshot.updated_at {
        println!("Updated:  {}", updated_at.to_rfc3339());
    }
    if let Some(message) = &snapshot.error_message {
        println!("Error:    {}", message);
    }
    println!();
    print!("{}", render_phases(&snapshot, &table));

    Ok(())
}

/// Fetch and print the result JSON of a finished job.
pub fn result(runner: &CliRunner, job_id: String) -> Result<(), CliError> {
    runner.log_startup("result");
    let backend = runner.backend()?;
    let job_id = JobId::new(job_id);

    let artifact = runner.block_on(async { backend.fetch_result(&job_id).await })??;
    let json = serde_json::to_string_pretty(&artifact.content)
        .map_err(|e| CliError::Output(e.to_string()))?;
    println!("{json}");

    Ok(())
}
