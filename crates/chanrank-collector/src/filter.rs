//! Quality filtering, category classification, and country resolution.
//!
//! Everything here is pure: the plan supplies thresholds, keyword tables, the
//! denylist and the country override table.

use std::collections::HashMap;

use chanrank_core::{ChannelRecord, CollectionPlan};
use chanrank_upstream::ChannelDetail;

use crate::resolve::ResolvedChannel;

/// Why a channel was kept out of the ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    BelowSubscriberFloor { count: u64, floor: u64 },
    BelowViewFloor { count: u64, floor: u64 },
    Denylisted { entry: String },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::BelowSubscriberFloor { count, floor } => {
                write!(f, "{count} subscribers is below the floor of {floor}")
            }
            Rejection::BelowViewFloor { count, floor } => {
                write!(f, "{count} views is below the floor of {floor}")
            }
            Rejection::Denylisted { entry } => write!(f, "display name matches denylist '{entry}'"),
        }
    }
}

pub struct QualityFilter<'a> {
    plan: &'a CollectionPlan,
    denylist: Vec<String>,
    keywords: Vec<(&'a str, Vec<String>)>,
}

impl<'a> QualityFilter<'a> {
    #[must_use]
    pub fn new(plan: &'a CollectionPlan) -> Self {
        let denylist = plan
            .denylist
            .iter()
            .filter(|d| !d.trim().is_empty())
            .map(|d| d.to_lowercase())
            .collect();
        let keywords = plan
            .categories
            .iter()
            .map(|c| {
                let words = c
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                (c.id.as_str(), words)
            })
            .collect();
        Self {
            plan,
            denylist,
            keywords,
        }
    }

    /// Returns the first reason `detail` fails the bar for `region`, or `None`
    /// if it qualifies. Counts exactly at a floor pass.
    #[must_use]
    pub fn check(&self, detail: &ChannelDetail, region: &str) -> Option<Rejection> {
        let name = detail.title.to_lowercase();
        if let Some(entry) = self.denylist.iter().find(|d| name.contains(d.as_str())) {
            return Some(Rejection::Denylisted {
                entry: entry.clone(),
            });
        }

        let floor = self.plan.min_subscribers_for(region);
        if detail.subscriber_count < floor {
            return Some(Rejection::BelowSubscriberFloor {
                count: detail.subscriber_count,
                floor,
            });
        }

        let floor = self.plan.min_views_for(region);
        if detail.view_count < floor {
            return Some(Rejection::BelowViewFloor {
                count: detail.view_count,
                floor,
            });
        }

        None
    }

    #[must_use]
    pub fn accept(&self, detail: &ChannelDetail, region: &str) -> bool {
        self.check(detail, region).is_none()
    }

    /// First category, in plan order, with a keyword in the name or
    /// description. `None` when no keyword matches.
    #[must_use]
    pub fn keyword_match(&self, detail: &ChannelDetail) -> Option<&'a str> {
        let haystack = format!(
            "{} {}",
            detail.title.to_lowercase(),
            detail.description.as_deref().unwrap_or_default().to_lowercase()
        );
        self.keywords
            .iter()
            .find(|(_, words)| words.iter().any(|w| haystack.contains(w.as_str())))
            .map(|(id, _)| *id)
    }

    /// [`Self::keyword_match`], else the plan's default category.
    #[must_use]
    pub fn classify(&self, detail: &ChannelDetail) -> &'a str {
        self.keyword_match(detail)
            .unwrap_or(self.plan.default_category.as_str())
    }

    /// Upstream country, then the plan's override table, then the requested
    /// region, then the baseline region.
    #[must_use]
    pub fn resolve_country(
        &self,
        detail: &ChannelDetail,
        requested_region: Option<&str>,
    ) -> String {
        detail
            .country
            .clone()
            .or_else(|| self.plan.country_overrides.get(&detail.id).cloned())
            .or_else(|| {
                requested_region
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_ascii_uppercase)
            })
            .unwrap_or_else(|| self.plan.baseline_region.clone())
    }

    /// Builds the persisted record for a channel found while searching
    /// `region`/`searched_category`. With no keyword match the searched
    /// category is used, then the plan's default.
    #[must_use]
    pub fn to_record(
        &self,
        resolved: &ResolvedChannel,
        region: &str,
        searched_category: Option<&str>,
    ) -> ChannelRecord {
        let detail = &resolved.detail;
        let category_id = self
            .keyword_match(detail)
            .or(searched_category)
            .unwrap_or(self.plan.default_category.as_str())
            .to_owned();
        ChannelRecord {
            id: detail.id.clone(),
            display_name: detail.title.clone(),
            handle: detail.handle.clone(),
            image_url: detail.image_url.clone(),
            description: detail.description.clone(),
            subscriber_count: detail.subscriber_count,
            total_view_count: detail.view_count,
            video_count: detail.video_count,
            country: self.resolve_country(detail, Some(region)),
            category_id,
            created_at: resolved.resolved_at,
            last_updated: resolved.resolved_at,
        }
    }
}

/// Collapses duplicates to one record per id. The most recently resolved
/// instance wins; output keeps the order in which ids were first seen.
#[must_use]
pub fn dedupe_latest(records: Vec<ResolvedChannel>) -> Vec<ResolvedChannel> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut out: Vec<ResolvedChannel> = Vec::with_capacity(records.len());
    for record in records {
        match slots.get(&record.detail.id) {
            Some(&slot) => {
                if record.resolved_at >= out[slot].resolved_at {
                    out[slot] = record;
                }
            }
            None => {
                slots.insert(record.detail.id.clone(), out.len());
                out.push(record);
            }
        }
    }
    out
}
