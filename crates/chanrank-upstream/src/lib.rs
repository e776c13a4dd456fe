//! Quota-aware client for the upstream channel data API.
//!
//! [`KeyPool`] owns the credential keys and their daily unit counters;
//! [`Fetcher`] issues paced HTTP calls through the pool and classifies the
//! outcome into [`UpstreamError`] variants the collectors can act on.

pub mod channels;
pub mod client;
pub mod error;
pub mod key_pool;
pub mod search;
pub mod types;

pub use channels::MAX_DETAIL_BATCH;
pub use client::{Endpoint, Fetcher, FetcherOptions};
pub use error::UpstreamError;
pub use key_pool::{ApiKey, KeyPool, KeyUsage};
pub use search::{SearchRequest, MAX_SEARCH_RESULTS};
pub use types::{ChannelDetail, SearchOrder, SearchPage};
