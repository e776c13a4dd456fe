//! Background job scheduler.
//!
//! Always registers the daily quota reset for the shared key pool. The
//! channel collection job is registered only when `CHANRANK_COLLECT_CRON` is
//! set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chanrank_collector::{run_tracked, Pipeline};
use chanrank_upstream::KeyPool;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// 08:00 UTC, midnight Pacific standard time, when upstream quotas roll over.
const QUOTA_RESET_CRON: &str = "0 0 8 * * *";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process; dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered (including an invalid cron expression), or the
/// scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    pipeline: Arc<Pipeline>,
    collect_cron: Option<&str>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_quota_reset_job(&scheduler, Arc::clone(pipeline.key_pool())).await?;
    match collect_cron {
        Some(cron) => register_collection_job(&scheduler, cron, pool, pipeline).await?,
        None => tracing::info!("CHANRANK_COLLECT_CRON not set; scheduled collection disabled"),
    }

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_quota_reset_job(
    scheduler: &JobScheduler,
    key_pool: Arc<KeyPool>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(QUOTA_RESET_CRON, move |_uuid, _lock| {
        let key_pool = Arc::clone(&key_pool);
        Box::pin(async move {
            key_pool.reset();
            tracing::info!(keys = key_pool.len(), "scheduler: upstream key quotas reset");
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}

/// Registers the recurring collection run over every planned pass. A tick
/// that fires while the previous run is still going is skipped.
async fn register_collection_job(
    scheduler: &JobScheduler,
    cron: &str,
    pool: PgPool,
    pipeline: Arc<Pipeline>,
) -> Result<(), JobSchedulerError> {
    let running = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let pool = pool.clone();
        let pipeline = Arc::clone(&pipeline);
        let running = Arc::clone(&running);

        Box::pin(async move {
            let Some(_guard) = RunGuard::acquire(&running) else {
                tracing::warn!("scheduler: previous collection run still in progress; skipping");
                return;
            };
            run_collection(&pool, &pipeline).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: channel collection job registered");
    Ok(())
}

/// Holds the collection job's `running` flag; clears it on drop, including
/// when the run panics.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(running: &Arc<AtomicBool>) -> Option<Self> {
        if running.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(Arc::clone(running)))
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn run_collection(pool: &PgPool, pipeline: &Pipeline) {
    let passes = pipeline.passes(None, None);
    tracing::info!(passes = passes.len(), "scheduler: starting channel collection run");

    match run_tracked(pool, pipeline, &passes, "scheduler").await {
        Ok(summary) => tracing::info!(
            records = summary.records_written(),
            failed_passes = summary.failed_passes(),
            keys_exhausted = summary.keys_exhausted(),
            "scheduler: channel collection run complete"
        ),
        Err(e) => tracing::error!(error = %e, "scheduler: channel collection run failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chanrank_collector::CollectSettings;
    use chanrank_core::parse_plan;
    use chanrank_db::{MemoryRankingStore, PoolConfig};
    use chanrank_upstream::{Fetcher, FetcherOptions};

    fn pipeline() -> Arc<Pipeline> {
        let plan = parse_plan(
            "defaults: {min_subscribers: 1, min_views: 1, target_count: 1}\n\
             baseline_region: US\n\
             default_category: music\n\
             categories: [{id: music, name: Music}]\n\
             regions: []\n",
        )
        .expect("plan");
        let pool = Arc::new(KeyPool::new(["key-a"], 10));
        let fetcher = Fetcher::with_base_url(pool, &FetcherOptions::default(), "http://127.0.0.1:9/")
            .expect("fetcher");
        Arc::new(Pipeline::new(
            fetcher,
            Arc::new(plan),
            Arc::new(MemoryRankingStore::new()),
            CollectSettings::default(),
        ))
    }

    fn lazy_pool() -> PgPool {
        let config = PoolConfig {
            min_connections: 0,
            ..PoolConfig::default()
        };
        chanrank_db::connect_lazy("postgres://chanrank@127.0.0.1:1/chanrank", config)
            .expect("lazy pool")
    }

    #[test]
    fn run_guard_is_exclusive_until_dropped() {
        let running = Arc::new(AtomicBool::new(false));
        let guard = RunGuard::acquire(&running).expect("first acquire");
        assert!(RunGuard::acquire(&running).is_none());
        drop(guard);
        assert!(!running.load(Ordering::SeqCst));
        assert!(RunGuard::acquire(&running).is_some());
    }

    #[tokio::test]
    async fn panicking_run_releases_the_flag() {
        let running = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&running);
        let result = tokio::spawn(async move {
            let _guard = RunGuard::acquire(&flag).expect("acquire");
            panic!("collection run blew up");
        })
        .await;

        assert!(result.unwrap_err().is_panic());
        assert!(!running.load(Ordering::SeqCst));
        assert!(RunGuard::acquire(&running).is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_collection_cron_is_rejected() {
        let result = build_scheduler(lazy_pool(), pipeline(), Some("every tuesday")).await;
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduler_starts_with_and_without_collection_job() {
        let mut without = build_scheduler(lazy_pool(), pipeline(), None)
            .await
            .expect("scheduler without collection job");
        without.shutdown().await.expect("shutdown");

        let mut with = build_scheduler(lazy_pool(), pipeline(), Some("0 0 3 * * *"))
            .await
            .expect("scheduler with collection job");
        with.shutdown().await.expect("shutdown");
    }
}
