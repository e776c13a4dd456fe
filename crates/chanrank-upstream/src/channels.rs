use crate::client::{Endpoint, Fetcher};
use crate::error::UpstreamError;
use crate::types::{ChannelDetail, ChannelListResponse};

/// Upstream hard cap on ids per detail call.
pub const MAX_DETAIL_BATCH: usize = 50;

impl Fetcher {
    /// Fetches statistics and metadata for up to [`MAX_DETAIL_BATCH`] ids in
    /// one call.
    ///
    /// Ids the upstream does not know are silently absent from the result.
    /// An empty `ids` slice returns without calling out.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Upstream`] with status 400 if more than
    /// [`MAX_DETAIL_BATCH`] ids are passed; otherwise propagates every
    /// [`UpstreamError`] from [`Fetcher::call`].
    pub async fn channel_details(
        &self,
        ids: &[String],
        cost: u64,
    ) -> Result<Vec<ChannelDetail>, UpstreamError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > MAX_DETAIL_BATCH {
            return Err(UpstreamError::Upstream {
                status: 400,
                message: format!(
                    "detail batch of {} ids exceeds the limit of {MAX_DETAIL_BATCH}",
                    ids.len()
                ),
            });
        }

        let joined = ids.join(",");
        let max_results = ids.len().to_string();
        let params = [
            ("part", "snippet,statistics"),
            ("id", joined.as_str()),
            ("maxResults", max_results.as_str()),
        ];

        let response: ChannelListResponse = self.call(Endpoint::Channels, &params, cost).await?;
        Ok(response.items.into_iter().map(ChannelDetail::from).collect())
    }
}
