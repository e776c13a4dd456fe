//! Declarative collection plan.
//!
//! One YAML file drives every collection pass: which regions are searched,
//! which query templates run per (region, category), the popularity floors a
//! channel must clear, the keyword table used for classification, and the
//! static country lookup used when the upstream omits a country.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDefaults {
    pub min_subscribers: u64,
    pub min_views: u64,
    pub target_count: usize,
    /// Over-collect multiplier applied to `target_count` by the search collector.
    #[serde(default = "default_overcollect_factor")]
    pub overcollect_factor: f64,
    #[serde(default = "default_pages_per_query")]
    pub pages_per_query: u32,
    /// Number of query templates the read-path fallback may spend.
    #[serde(default = "default_fallback_query_limit")]
    pub fallback_query_limit: usize,
}

fn default_overcollect_factor() -> f64 {
    1.5
}

fn default_pages_per_query() -> u32 {
    1
}

fn default_fallback_query_limit() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryPlan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionPlan {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub min_subscribers: Option<u64>,
    #[serde(default)]
    pub min_views: Option<u64>,
    #[serde(default)]
    pub target_count: Option<usize>,
    /// Query templates keyed by category id.
    #[serde(default)]
    pub queries: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionPlan {
    pub defaults: PlanDefaults,
    pub baseline_region: String,
    pub default_category: String,
    pub categories: Vec<CategoryPlan>,
    pub regions: Vec<RegionPlan>,
    #[serde(default)]
    pub denylist: Vec<String>,
    /// Channel id → country code for channels whose upstream metadata lacks one.
    #[serde(default)]
    pub country_overrides: HashMap<String, String>,
}

impl CollectionPlan {
    #[must_use]
    pub fn region(&self, code: &str) -> Option<&RegionPlan> {
        self.regions
            .iter()
            .find(|r| r.code.eq_ignore_ascii_case(code))
    }

    #[must_use]
    pub fn category(&self, id: &str) -> Option<&CategoryPlan> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Subscriber floor for `region`; unknown regions use the plan default.
    #[must_use]
    pub fn min_subscribers_for(&self, region: &str) -> u64 {
        self.region(region)
            .and_then(|r| r.min_subscribers)
            .unwrap_or(self.defaults.min_subscribers)
    }

    #[must_use]
    pub fn min_views_for(&self, region: &str) -> u64 {
        self.region(region)
            .and_then(|r| r.min_views)
            .unwrap_or(self.defaults.min_views)
    }

    #[must_use]
    pub fn target_count_for(&self, region: &str) -> usize {
        self.region(region)
            .and_then(|r| r.target_count)
            .unwrap_or(self.defaults.target_count)
    }

    /// Query templates for a (region, category) pair; empty when none are planned.
    #[must_use]
    pub fn queries_for(&self, region: &str, category: &str) -> &[String] {
        self.region(region)
            .and_then(|r| r.queries.get(category))
            .map_or(&[], Vec::as_slice)
    }

    /// Every planned (region, category) pair, in plan order.
    #[must_use]
    pub fn passes(&self) -> Vec<(String, String)> {
        self.regions
            .iter()
            .flat_map(|r| {
                r.queries
                    .iter()
                    .filter(|(_, templates)| !templates.is_empty())
                    .map(|(category, _)| (r.code.clone(), category.clone()))
            })
            .collect()
    }
}

/// Load and validate the collection plan from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_plan(path: &Path) -> Result<CollectionPlan, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::PlanFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_plan(&content)
}

/// Parse and validate a collection plan from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the text does not parse or fails validation.
pub fn parse_plan(content: &str) -> Result<CollectionPlan, ConfigError> {
    let plan: CollectionPlan = serde_yaml::from_str(content)?;
    validate_plan(&plan)?;
    Ok(plan)
}

fn is_country_code(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_uppercase())
}

fn validate_plan(plan: &CollectionPlan) -> Result<(), ConfigError> {
    let fail = |msg: String| Err(ConfigError::Validation(msg));

    if !is_country_code(&plan.baseline_region) {
        return fail(format!(
            "baseline_region '{}' must be a two-letter uppercase country code",
            plan.baseline_region
        ));
    }

    if plan.defaults.target_count == 0 {
        return fail("defaults.target_count must be greater than zero".to_string());
    }

    let factor = plan.defaults.overcollect_factor;
    if factor.is_nan() || factor < 1.0 {
        return fail(format!(
            "defaults.overcollect_factor must be >= 1.0, got {}",
            plan.defaults.overcollect_factor
        ));
    }

    if plan.defaults.pages_per_query == 0 {
        return fail("defaults.pages_per_query must be greater than zero".to_string());
    }

    if plan.categories.is_empty() {
        return fail("at least one category must be defined".to_string());
    }

    let mut category_ids = HashSet::new();
    for category in &plan.categories {
        if category.id.trim().is_empty() {
            return fail("category id must be non-empty".to_string());
        }
        if category.id != category.id.to_ascii_lowercase() {
            return fail(format!("category id '{}' must be lowercase", category.id));
        }
        if !category_ids.insert(category.id.as_str()) {
            return fail(format!("duplicate category id: '{}'", category.id));
        }
    }

    if !category_ids.contains(plan.default_category.as_str()) {
        return fail(format!(
            "default_category '{}' is not a defined category",
            plan.default_category
        ));
    }

    let mut region_codes = HashSet::new();
    for region in &plan.regions {
        if !is_country_code(&region.code) {
            return fail(format!(
                "region code '{}' must be a two-letter uppercase country code",
                region.code
            ));
        }
        if !region_codes.insert(region.code.as_str()) {
            return fail(format!("duplicate region code: '{}'", region.code));
        }
        if region.target_count == Some(0) {
            return fail(format!(
                "region '{}' has target_count 0; omit it to use the default",
                region.code
            ));
        }
        for category in region.queries.keys() {
            if !category_ids.contains(category.as_str()) {
                return fail(format!(
                    "region '{}' has queries for unknown category '{category}'",
                    region.code
                ));
            }
        }
    }

    for (channel_id, country) in &plan.country_overrides {
        if !is_country_code(country) {
            return fail(format!(
                "country override for '{channel_id}' has invalid code '{country}'"
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "plan_test.rs"]
mod tests;
