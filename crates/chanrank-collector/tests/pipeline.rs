//! Collection pipeline tests against a wiremock upstream and the in-memory
//! ranking store.

use std::sync::Arc;
use std::time::Duration;

use chanrank_collector::{
    BatchResolver, CollectSettings, Pipeline, SearchCollector, SearchSettings,
};
use chanrank_core::{parse_plan, CollectionPlan, RankingFilter, RankingStore};
use chanrank_db::MemoryRankingStore;
use chanrank_upstream::{Fetcher, FetcherOptions, KeyPool};
use chrono::TimeDelta;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const PLAN: &str = r"
defaults:
  min_subscribers: 1000
  min_views: 10000
  target_count: 100
  overcollect_factor: 1.0
baseline_region: US
default_category: other
categories:
  - id: music
    name: Music
    keywords: [music]
  - id: other
    name: Other
regions:
  - code: KR
    queries:
      music: [kpop, ballad]
  - code: JP
    queries:
      music: [jpop]
denylist: [' - Topic']
";

fn plan() -> Arc<CollectionPlan> {
    Arc::new(parse_plan(PLAN).expect("test plan should parse"))
}

fn fetcher(base_url: &str, keys: &[&str], ceiling: u64) -> Fetcher {
    let pool = Arc::new(KeyPool::new(keys.iter().copied(), ceiling));
    let options = FetcherOptions {
        timeout_secs: 5,
        min_interval: Duration::ZERO,
        ..FetcherOptions::default()
    };
    Fetcher::with_base_url(pool, &options, base_url).expect("fetcher construction should not fail")
}

fn settings() -> CollectSettings {
    CollectSettings {
        search: SearchSettings {
            overcollect_factor: 1.0,
            search_cost: 1,
            ..SearchSettings::default()
        },
        detail_cost: 1,
        ..CollectSettings::default()
    }
}

fn query_value(request: &Request, key: &str) -> String {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

/// Search results derived from the query: `per_query` ids unique to the
/// query plus one id every query shares.
struct SearchEcho {
    per_query: usize,
}

impl Respond for SearchEcho {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let q = query_value(request, "q");
        let mut items: Vec<_> = (0..self.per_query)
            .map(|i| json!({ "id": { "kind": "youtube#channel", "channelId": format!("UC-{q}-{i}") } }))
            .collect();
        items.push(json!({ "id": { "kind": "youtube#channel", "channelId": "UC-shared" } }));
        ResponseTemplate::new(200).set_body_json(json!({ "items": items }))
    }
}

/// Detail results for exactly the requested ids. A chunk containing
/// `UCfail` gets a 503.
struct ChannelEcho {
    subscribers: u64,
}

impl Respond for ChannelEcho {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let ids = query_value(request, "id");
        if ids.split(',').any(|id| id == "UCfail") {
            return ResponseTemplate::new(503).set_body_string("backend error");
        }
        let items: Vec<_> = ids
            .split(',')
            .filter(|id| !id.is_empty())
            .map(|id| {
                json!({
                    "id": id,
                    "snippet": { "title": format!("Channel {id}") },
                    "statistics": {
                        "subscriberCount": self.subscribers.to_string(),
                        "viewCount": "5000000",
                        "videoCount": "100"
                    }
                })
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "items": items }))
    }
}

async fn mount_echo(server: &MockServer, per_query: usize, subscribers: u64) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(SearchEcho { per_query })
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(ChannelEcho { subscribers })
        .mount(server)
        .await;
}

#[tokio::test]
async fn two_keys_exhaust_after_six_calls_and_keep_partial_candidates() {
    let server = MockServer::start().await;

    for (i, key) in ["key-a", "key-a", "key-a", "key-b", "key-b", "key-b"]
        .iter()
        .enumerate()
    {
        let q = format!("q{}", i + 1);
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", q.as_str()))
            .and(query_param("key", *key))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "id": { "channelId": format!("UC-{q}") } }]
            })))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(query_param("q", "q7"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = fetcher(&server.uri(), &["key-a", "key-b"], 3);
    let search = SearchSettings {
        search_cost: 1,
        ..SearchSettings::default()
    };
    let templates: Vec<String> = (1..=7).map(|i| format!("q{i}")).collect();

    let outcome = SearchCollector::new(&fetcher, &search)
        .collect("KR", "music", &templates, 100)
        .await;

    assert!(outcome.keys_exhausted);
    assert_eq!(outcome.queries_issued, 6);
    assert_eq!(outcome.candidates.len(), 6);
    for i in 1..=6 {
        assert!(outcome.candidates.contains(&format!("UC-q{i}")));
    }

    let usage = fetcher.pool().snapshot();
    assert_eq!(usage[0].units_used, 3);
    assert_eq!(usage[1].units_used, 3);
    assert!(usage.iter().all(|u| u.exhausted));
}

#[tokio::test]
async fn search_stops_once_target_is_reached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(SearchEcho { per_query: 10 })
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher(&server.uri(), &["key-a"], 10_000);
    let search = SearchSettings {
        overcollect_factor: 1.0,
        search_cost: 1,
        ..SearchSettings::default()
    };
    let templates = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let outcome = SearchCollector::new(&fetcher, &search)
        .collect("KR", "music", &templates, 5)
        .await;

    assert_eq!(outcome.queries_issued, 1);
    assert_eq!(outcome.candidates.len(), 11);
}

#[tokio::test]
async fn search_follows_page_tokens_up_to_the_page_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextPageToken": "more",
            "items": [{ "id": { "channelId": "UC-page" } }]
        })))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = fetcher(&server.uri(), &["key-a"], 10_000);
    let search = SearchSettings {
        pages_per_query: 3,
        search_cost: 1,
        ..SearchSettings::default()
    };
    let outcome = SearchCollector::new(&fetcher, &search)
        .collect("KR", "music", &["only".to_string()], 100)
        .await;
    assert_eq!(outcome.queries_issued, 3);
}

#[tokio::test]
async fn failing_template_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", "broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("q", "works"))
        .respond_with(SearchEcho { per_query: 2 })
        .mount(&server)
        .await;

    let fetcher = fetcher(&server.uri(), &["key-a"], 10_000);
    let search = SearchSettings::default();
    let templates = vec!["broken".to_string(), "works".to_string()];
    let outcome = SearchCollector::new(&fetcher, &search)
        .collect("KR", "music", &templates, 100)
        .await;

    assert_eq!(outcome.queries_failed, 1);
    assert_eq!(outcome.queries_issued, 2);
    assert_eq!(outcome.candidates.len(), 3);
    assert!(!outcome.keys_exhausted);
}

#[tokio::test]
async fn resolver_chunks_by_batch_size() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(ChannelEcho {
            subscribers: 5_000,
        })
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = fetcher(&server.uri(), &["key-a"], 10_000);
    let ids = (0..120).map(|i| format!("UC{i:03}"));
    let outcome = BatchResolver::new(&fetcher, 50, 1).resolve(ids).await;

    assert_eq!(outcome.chunks_total, 3);
    assert_eq!(outcome.chunks_failed, 0);
    assert_eq!(outcome.records.len(), 120);
    assert_eq!(fetcher.pool().snapshot()[0].units_used, 3);
}

#[tokio::test]
async fn failed_chunk_is_skipped_and_others_kept() {
    let server = MockServer::start().await;
    mount_echo(&server, 0, 5_000).await;

    let fetcher = fetcher(&server.uri(), &["key-a"], 10_000);
    // UCfail sorts after the digits, into the third chunk.
    let mut ids: Vec<String> = (0..25).map(|i| format!("UC{i:02}")).collect();
    ids.push("UCfail".to_string());
    let outcome = BatchResolver::new(&fetcher, 10, 1).resolve(ids).await;

    assert_eq!(outcome.chunks_total, 3);
    assert_eq!(outcome.chunks_failed, 1);
    assert_eq!(outcome.records.len(), 20);
    assert!(outcome.records.iter().all(|r| r.detail.id.as_str() < "UC20"));
    assert!(!outcome.keys_exhausted);
}

#[tokio::test]
async fn resolver_stops_when_keys_run_out_and_keeps_resolved_chunks() {
    let server = MockServer::start().await;
    mount_echo(&server, 0, 5_000).await;

    let fetcher = fetcher(&server.uri(), &["key-a"], 2);
    let ids = (0..150).map(|i| format!("UC{i:03}"));
    let outcome = BatchResolver::new(&fetcher, 50, 1).resolve(ids).await;

    assert!(outcome.keys_exhausted);
    assert_eq!(outcome.records.len(), 100);
    assert_eq!(outcome.chunks_failed, 1);
}

#[tokio::test]
async fn pass_deduplicates_overlapping_templates_and_upserts_once_per_channel() {
    let server = MockServer::start().await;
    mount_echo(&server, 3, 5_000).await;

    let store = Arc::new(MemoryRankingStore::new());
    let pipeline = Pipeline::new(
        fetcher(&server.uri(), &["key-a"], 10_000),
        plan(),
        store.clone(),
        settings(),
    );

    let summary = pipeline.run_pass("KR", "music").await;

    // kpop ×3 + ballad ×3 + the shared id once.
    assert_eq!(summary.candidates, 7);
    assert_eq!(summary.resolved, 7);
    assert_eq!(summary.created, 7);
    assert_eq!(summary.status(), "succeeded");
    assert_eq!(store.len(), 7);

    let shared = store.get("UC-shared").expect("shared channel stored");
    assert_eq!(shared.record.country, "KR");
    assert_eq!(shared.record.category_id, "music");
}

#[tokio::test]
async fn rerunning_a_pass_updates_in_place() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(SearchEcho { per_query: 1 })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(ChannelEcho {
            subscribers: 5_000,
        })
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(ChannelEcho {
            subscribers: 9_000,
        })
        .mount(&server)
        .await;

    let store = Arc::new(MemoryRankingStore::new());
    let pipeline = Pipeline::new(
        fetcher(&server.uri(), &["key-a"], 10_000),
        plan(),
        store.clone(),
        settings(),
    );

    let first = pipeline.run_pass("JP", "music").await;
    let second = pipeline.run_pass("JP", "music").await;

    assert_eq!(first.created, 2);
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 2);
    assert_eq!(store.len(), 2);
    assert_eq!(
        store.get("UC-jpop-0").unwrap().record.subscriber_count,
        9_000
    );
}

#[tokio::test]
async fn recently_refreshed_candidates_are_not_resolved_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(SearchEcho { per_query: 1 })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(ChannelEcho {
            subscribers: 5_000,
        })
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryRankingStore::new());
    let mut settings = settings();
    settings.refresh_after = TimeDelta::try_hours(24);
    let pipeline = Pipeline::new(
        fetcher(&server.uri(), &["key-a"], 10_000),
        plan(),
        store.clone(),
        settings,
    );

    pipeline.run_pass("JP", "music").await;
    let second = pipeline.run_pass("JP", "music").await;

    assert_eq!(second.skipped_fresh, 2);
    assert_eq!(second.resolved, 0);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn channels_below_the_floor_are_not_stored() {
    let server = MockServer::start().await;
    mount_echo(&server, 2, 999).await;

    let store = Arc::new(MemoryRankingStore::new());
    let pipeline = Pipeline::new(
        fetcher(&server.uri(), &["key-a"], 10_000),
        plan(),
        store.clone(),
        settings(),
    );

    let summary = pipeline.run_pass("JP", "music").await;
    assert_eq!(summary.rejected, 3);
    assert_eq!(summary.accepted, 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let server = MockServer::start().await;
    mount_echo(&server, 2, 5_000).await;

    let store = Arc::new(MemoryRankingStore::new());
    let pipeline = Pipeline::new(
        fetcher(&server.uri(), &["key-a"], 10_000),
        plan(),
        store.clone(),
        settings(),
    )
    .with_dry_run(true);

    let summary = pipeline.run_pass("JP", "music").await;
    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.records_written(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn run_ends_gracefully_when_quota_runs_out() {
    let server = MockServer::start().await;
    mount_echo(&server, 1, 5_000).await;

    let store = Arc::new(MemoryRankingStore::new());
    // Enough for the JP pass (1 search + 1 detail) and nothing more.
    let pipeline = Pipeline::new(
        fetcher(&server.uri(), &["key-a"], 2),
        plan(),
        store.clone(),
        settings(),
    );
    let passes = pipeline.passes(None, Some("music"));
    assert_eq!(passes.len(), 2);

    let summary = pipeline
        .run(&[
            ("JP".to_string(), "music".to_string()),
            ("KR".to_string(), "music".to_string()),
        ])
        .await;

    assert!(summary.keys_exhausted());
    assert!(!summary.all_failed());
    assert_eq!(summary.records_written(), 2);
    let kr = summary.passes.iter().find(|p| p.region == "KR").unwrap();
    assert!(kr.skipped);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn transient_collection_includes_extra_ids_and_persists_nothing() {
    let server = MockServer::start().await;
    mount_echo(&server, 2, 5_000).await;

    let store = Arc::new(MemoryRankingStore::new());
    let pipeline = Pipeline::new(
        fetcher(&server.uri(), &["key-a"], 10_000),
        plan(),
        store.clone(),
        settings(),
    );

    let filter = RankingFilter {
        country: Some("kr".to_string()),
        category: Some("music".to_string()),
    };
    let outcome = pipeline
        .collect_transient(&filter, 10, &["UC-reference".to_string()])
        .await;

    let ids: Vec<&str> = outcome.records.iter().map(|r| r.id.as_str()).collect();
    // Only the first template ("kpop") runs on the read path.
    assert!(ids.contains(&"UC-kpop-0"));
    assert!(!ids.contains(&"UC-ballad-0"));
    assert!(ids.contains(&"UC-reference"));
    assert!(outcome.records.iter().all(|r| r.country == "KR"));
    assert!(store.is_empty());
    assert_eq!(store.count(&filter).await.unwrap(), 0);
}
