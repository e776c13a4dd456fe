//! Channel collection engine.
//!
//! A collection pass for one (region, category) runs the plan's query
//! templates through [`SearchCollector`], resolves the candidates in batches
//! with [`BatchResolver`], filters and classifies them with
//! [`QualityFilter`], and upserts the survivors into a
//! [`chanrank_core::RankingStore`]. [`Pipeline`] ties the stages together and
//! runs passes concurrently over one shared key pool.

pub mod error;
pub mod filter;
pub mod pipeline;
pub mod resolve;
pub mod search;
pub mod tracked;

pub use error::CollectorError;
pub use filter::{dedupe_latest, QualityFilter, Rejection};
pub use pipeline::{CollectSettings, PassSummary, Pipeline, RunSummary, TransientOutcome};
pub use resolve::{BatchResolver, ResolveOutcome, ResolvedChannel};
pub use search::{overcollect_target, CollectOutcome, SearchCollector, SearchSettings};
pub use tracked::{run_tracked, RUN_TYPE};
