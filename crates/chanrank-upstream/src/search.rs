use crate::client::{Endpoint, Fetcher};
use crate::error::UpstreamError;
use crate::types::{SearchListResponse, SearchOrder, SearchPage};

/// Upstream hard cap on results per search page.
pub const MAX_SEARCH_RESULTS: u32 = 50;

/// Parameters of one search call.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub region: Option<&'a str>,
    pub order: SearchOrder,
    pub max_results: u32,
    pub page_token: Option<&'a str>,
}

impl<'a> SearchRequest<'a> {
    #[must_use]
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            region: None,
            order: SearchOrder::default(),
            max_results: MAX_SEARCH_RESULTS,
            page_token: None,
        }
    }
}

impl Fetcher {
    /// Searches for channels matching a free-text query.
    ///
    /// `max_results` is clamped to `1..=50`. Returned ids are in upstream
    /// order and may repeat across pages.
    ///
    /// # Errors
    ///
    /// Propagates every [`UpstreamError`] from [`Fetcher::call`].
    pub async fn search_channels(
        &self,
        request: &SearchRequest<'_>,
        cost: u64,
    ) -> Result<SearchPage, UpstreamError> {
        let max_results = request.max_results.clamp(1, MAX_SEARCH_RESULTS).to_string();
        let region = request.region.map(str::to_ascii_uppercase);

        let mut params = vec![
            ("part", "snippet"),
            ("type", "channel"),
            ("q", request.query),
            ("maxResults", max_results.as_str()),
            ("order", request.order.as_str()),
        ];
        if let Some(region) = region.as_deref() {
            params.push(("regionCode", region));
        }
        if let Some(token) = request.page_token {
            params.push(("pageToken", token));
        }

        let response: SearchListResponse = self.call(Endpoint::Search, &params, cost).await?;
        Ok(SearchPage {
            channel_ids: response
                .items
                .into_iter()
                .filter_map(crate::types::SearchItem::channel_id)
                .collect(),
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }
}
