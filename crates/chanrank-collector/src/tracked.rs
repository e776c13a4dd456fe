//! Collection runs with `collection_runs` bookkeeping.
//!
//! create → start → run passes → record each pass → complete/fail. A run that
//! stops early on quota exhaustion still completes, with a note.

use chanrank_db::{DbError, PassResult};
use sqlx::PgPool;

use crate::error::CollectorError;
use crate::pipeline::{PassSummary, Pipeline, RunSummary};

pub const RUN_TYPE: &str = "channels";

fn saturating_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Marks a run failed, logging instead of propagating a secondary error.
async fn fail_run_best_effort(pool: &PgPool, run_id: i64, message: &str) {
    if let Err(e) = chanrank_db::fail_collection_run(pool, run_id, message).await {
        tracing::error!(run_id, error = %e, "failed to mark collection run as failed");
    }
}

async fn record_pass(pool: &PgPool, run_id: i64, pass: &PassSummary) -> Result<(), DbError> {
    let note = pass.note();
    let result = PassResult {
        region: &pass.region,
        category: &pass.category,
        status: pass.status(),
        candidates_found: saturating_i32(pass.candidates),
        records_processed: saturating_i32(pass.records_written()),
        error_message: note.as_deref(),
    };
    chanrank_db::upsert_collection_run_pass(pool, run_id, &result).await
}

/// Runs `passes` through `pipeline` inside a tracked collection run.
///
/// # Errors
///
/// Returns [`CollectorError::Db`] if the run cannot be created, started, or
/// completed, and [`CollectorError::AllPassesFailed`] if every pass that ran
/// failed and nothing was written. Per-pass bookkeeping failures are logged.
pub async fn run_tracked(
    pool: &PgPool,
    pipeline: &Pipeline,
    passes: &[(String, String)],
    trigger_source: &str,
) -> Result<RunSummary, CollectorError> {
    let run = chanrank_db::create_collection_run(pool, RUN_TYPE, trigger_source).await?;
    if let Err(e) = chanrank_db::start_collection_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, &e.to_string()).await;
        return Err(e.into());
    }
    tracing::info!(
        run_id = run.id,
        public_id = %run.public_id,
        passes = passes.len(),
        trigger_source,
        "collection run started"
    );

    let summary = pipeline.run(passes).await;

    for pass in &summary.passes {
        if let Err(e) = record_pass(pool, run.id, pass).await {
            tracing::warn!(
                run_id = run.id,
                region = %pass.region,
                category = %pass.category,
                error = %e,
                "failed to record pass result"
            );
        }
    }

    if summary.all_failed() {
        let failed = summary.failed_passes();
        fail_run_best_effort(pool, run.id, &format!("all {failed} collection passes failed")).await;
        return Err(CollectorError::AllPassesFailed { failed });
    }

    let note = summary
        .keys_exhausted()
        .then_some("stopped early: all upstream API keys exhausted");
    let records = saturating_i32(summary.records_written());
    if let Err(e) = chanrank_db::complete_collection_run(pool, run.id, records, note).await {
        fail_run_best_effort(pool, run.id, &e.to_string()).await;
        return Err(e.into());
    }

    tracing::info!(
        run_id = run.id,
        records,
        failed_passes = summary.failed_passes(),
        keys_exhausted = summary.keys_exhausted(),
        "collection run completed"
    );
    Ok(summary)
}
