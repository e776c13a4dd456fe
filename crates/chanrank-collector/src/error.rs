use chanrank_db::DbError;
use chanrank_upstream::UpstreamError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    /// Fetcher construction failed (bad base URL or HTTP client setup).
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Run bookkeeping could not be written.
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("all {failed} collection passes failed")]
    AllPassesFailed { failed: usize },
}
