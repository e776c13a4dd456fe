//! `collect` command handler.
//!
//! Builds the collection pipeline over the Postgres store and runs the
//! selected passes. A normal run is tracked in `collection_runs`; a dry run
//! is not.

use std::sync::Arc;

use anyhow::Context;
use chanrank_collector::{run_tracked, PassSummary, Pipeline, RunSummary};
use chanrank_core::{AppConfig, RankingStore};
use chanrank_db::PgRankingStore;

pub(crate) struct CollectArgs<'a> {
    pub region: Option<&'a str>,
    pub category: Option<&'a str>,
    pub dry_run: bool,
    pub force: bool,
}

/// Runs a channel collection from the command line.
///
/// # Errors
///
/// Returns an error if the plan cannot be loaded, the filters select no
/// pass, the pipeline cannot be built, or a tracked run fails outright.
pub(crate) async fn run_collect(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    args: &CollectArgs<'_>,
) -> anyhow::Result<()> {
    let plan = chanrank_core::load_plan(&config.plan_path)
        .with_context(|| format!("loading plan {}", config.plan_path.display()))?;
    let store: Arc<dyn RankingStore> = Arc::new(PgRankingStore::new(pool.clone()));
    let pipeline = Pipeline::from_app_config(config, Arc::new(plan), store)?
        .with_dry_run(args.dry_run)
        .with_force_refresh(args.force);

    let passes = pipeline.passes(args.region, args.category);
    if passes.is_empty() {
        anyhow::bail!(
            "no planned passes match region={} category={}",
            args.region.unwrap_or("*"),
            args.category.unwrap_or("*")
        );
    }

    tracing::info!(
        passes = passes.len(),
        dry_run = args.dry_run,
        force = args.force,
        "starting channel collection"
    );
    let summary = if args.dry_run {
        println!("dry-run: {} passes, nothing will be written", passes.len());
        pipeline.run(&passes).await
    } else {
        run_tracked(pool, &pipeline, &passes, "cli").await?
    };

    print_summary(&summary, args.dry_run);
    Ok(())
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    for pass in &summary.passes {
        println!("{}", pass_line(pass, dry_run));
    }
    println!(
        "total: {} accepted, {} written, {} failed passes{}",
        summary.accepted(),
        summary.records_written(),
        summary.failed_passes(),
        if summary.keys_exhausted() {
            " (stopped early: upstream keys exhausted)"
        } else {
            ""
        }
    );
}

fn pass_line(pass: &PassSummary, dry_run: bool) -> String {
    let written = if dry_run {
        format!("would write {}", pass.accepted)
    } else {
        format!("created {} updated {}", pass.created, pass.updated)
    };
    let mut line = format!(
        "{}/{} [{}] candidates {} resolved {} rejected {} {written}",
        pass.region,
        pass.category,
        pass.status(),
        pass.candidates,
        pass.resolved,
        pass.rejected,
    );
    if let Some(note) = pass.note() {
        line.push_str(" - ");
        line.push_str(&note);
    }
    line
}
