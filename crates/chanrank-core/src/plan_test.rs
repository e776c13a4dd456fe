use std::path::Path;

use super::*;

const MINIMAL_PLAN: &str = r"
defaults:
  min_subscribers: 100000
  min_views: 1000000
  target_count: 50
baseline_region: US
default_category: other
categories:
  - id: music
    name: Music
    keywords: [music, song]
  - id: other
    name: Other
regions:
  - code: KR
    min_subscribers: 50000
    queries:
      music: [kpop official, korean ballad]
  - code: US
    target_count: 80
    queries:
      music: [top music channel]
      other: []
denylist: [YouTube]
country_overrides:
  UC123: JP
";

#[test]
fn parses_minimal_plan_with_defaults() {
    let plan = parse_plan(MINIMAL_PLAN).expect("plan should parse");
    assert!((plan.defaults.overcollect_factor - 1.5).abs() < f64::EPSILON);
    assert_eq!(plan.defaults.pages_per_query, 1);
    assert_eq!(plan.defaults.fallback_query_limit, 1);
    assert_eq!(plan.categories.len(), 2);
    assert_eq!(plan.country_overrides.get("UC123").map(String::as_str), Some("JP"));
}

#[test]
fn region_thresholds_fall_back_to_defaults() {
    let plan = parse_plan(MINIMAL_PLAN).unwrap();
    assert_eq!(plan.min_subscribers_for("KR"), 50_000);
    assert_eq!(plan.min_subscribers_for("US"), 100_000);
    assert_eq!(plan.min_subscribers_for("BR"), 100_000);
    assert_eq!(plan.min_views_for("KR"), 1_000_000);
    assert_eq!(plan.target_count_for("US"), 80);
    assert_eq!(plan.target_count_for("KR"), 50);
}

#[test]
fn region_lookup_is_case_insensitive() {
    let plan = parse_plan(MINIMAL_PLAN).unwrap();
    assert_eq!(plan.region("kr").map(|r| r.code.as_str()), Some("KR"));
    assert_eq!(plan.queries_for("kr", "music").len(), 2);
    assert!(plan.queries_for("KR", "other").is_empty());
    assert!(plan.queries_for("ZZ", "music").is_empty());
}

#[test]
fn passes_skip_empty_template_lists() {
    let plan = parse_plan(MINIMAL_PLAN).unwrap();
    assert_eq!(
        plan.passes(),
        vec![
            ("KR".to_string(), "music".to_string()),
            ("US".to_string(), "music".to_string()),
        ]
    );
}

#[test]
fn rejects_unknown_default_category() {
    let yaml = MINIMAL_PLAN.replace("default_category: other", "default_category: gaming");
    let err = parse_plan(&yaml).unwrap_err();
    assert!(err.to_string().contains("default_category 'gaming'"));
}

#[test]
fn rejects_queries_for_unknown_category() {
    let yaml = MINIMAL_PLAN.replace("      other: []", "      sports: [football]");
    let err = parse_plan(&yaml).unwrap_err();
    assert!(err.to_string().contains("unknown category 'sports'"));
}

#[test]
fn rejects_mixed_case_category_id() {
    let yaml = MINIMAL_PLAN.replace("  - id: other", "  - id: Other");
    let err = parse_plan(&yaml).unwrap_err();
    assert!(err.to_string().contains("category id 'Other' must be lowercase"));
}

#[test]
fn rejects_lowercase_region_code() {
    let yaml = MINIMAL_PLAN.replace("  - code: KR", "  - code: kr");
    let err = parse_plan(&yaml).unwrap_err();
    assert!(err.to_string().contains("two-letter uppercase"));
}

#[test]
fn rejects_duplicate_region_code() {
    let yaml = MINIMAL_PLAN.replace("  - code: US", "  - code: KR");
    let err = parse_plan(&yaml).unwrap_err();
    assert!(err.to_string().contains("duplicate region code"));
}

#[test]
fn rejects_overcollect_factor_below_one() {
    let yaml = MINIMAL_PLAN.replace(
        "  target_count: 50\n",
        "  target_count: 50\n  overcollect_factor: 0.5\n",
    );
    let err = parse_plan(&yaml).unwrap_err();
    assert!(err.to_string().contains("overcollect_factor"));
}

#[test]
fn rejects_invalid_country_override() {
    let yaml = MINIMAL_PLAN.replace("UC123: JP", "UC123: Japan");
    let err = parse_plan(&yaml).unwrap_err();
    assert!(err.to_string().contains("invalid code 'Japan'"));
}

#[test]
fn load_plan_reports_missing_file() {
    let err = load_plan(Path::new("/definitely/not/here.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::PlanFileIo { .. }));
}

#[test]
fn load_plan_from_real_file() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("config")
        .join("collection_plan.yaml");
    assert!(
        path.exists(),
        "collection_plan.yaml missing at {path:?}; required for this test"
    );
    let plan = load_plan(&path).expect("shipped collection plan should validate");
    assert!(!plan.regions.is_empty());
    assert!(!plan.passes().is_empty());
}
