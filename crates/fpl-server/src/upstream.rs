// Upstream FPL API client with a bounded TTL cache.
//
// `FplSource` is the seam the routes depend on; `FplClient` is the reqwest
// implementation used by the binary. Responses are cached as raw JSON per URL
// and decoded into typed payloads on every read.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use fpl_core::domain::{BootstrapPayload, Fixture, PicksPayload};

use crate::config::UpstreamConfig;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Resource not found")]
    NotFound,

    #[error("upstream returned status {status}")]
    Status { status: u16 },

    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected upstream payload for {what}: {message}")]
    Decode { what: &'static str, message: String },
}

// ---------------------------------------------------------------------------
// FplSource
// ---------------------------------------------------------------------------

/// The three upstream reads the service needs.
#[async_trait]
pub trait FplSource: Send + Sync {
    async fn bootstrap(&self) -> Result<BootstrapPayload, UpstreamError>;

    /// Every fixture of the season.
    async fn fixtures(&self) -> Result<Vec<Fixture>, UpstreamError>;

    async fn manager_picks(&self, tid: u32, gw: u32) -> Result<PicksPayload, UpstreamError>;
}

// ---------------------------------------------------------------------------
// TtlCache
// ---------------------------------------------------------------------------

/// Bounded map of URL -> JSON with a fixed time-to-live. When full, expired
/// entries are dropped first, then the oldest entry.
pub struct TtlCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, (Instant, Arc<Value>)>>,
}

impl TtlCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        TtlCache {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Value>> {
        let mut entries = self.entries.lock().await;
        let fresh = entries
            .get(key)
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, value)| Arc::clone(value));
        if fresh.is_none() {
            entries.remove(key);
        }
        fresh
    }

    pub async fn insert(&self, key: String, value: Arc<Value>) {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let ttl = self.ttl;
            entries.retain(|_, (stored, _)| stored.elapsed() < ttl);
            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, (stored, _))| *stored)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(key, (Instant::now(), value));
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

// ---------------------------------------------------------------------------
// FplClient
// ---------------------------------------------------------------------------

pub struct FplClient {
    http: reqwest::Client,
    base_url: String,
    cache: TtlCache,
}

impl FplClient {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("fpl-planner/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(FplClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache: TtlCache::new(Duration::from_secs(config.cache_ttl_secs), config.cache_max_entries),
        })
    }

    /// GET `{base_url}/{path}` as JSON, served from the cache while fresh.
    /// The cache lock is never held across the request.
    pub async fn get_json(&self, path: &str) -> Result<Arc<Value>, UpstreamError> {
        let url = format!("{}/{}", self.base_url, path);
        if let Some(hit) = self.cache.get(&url).await {
            debug!(%url, "upstream cache hit");
            return Ok(hit);
        }
        debug!(%url, "upstream cache miss");

        let resp = self.http.get(&url).send().await.map_err(|e| {
            warn!(%url, error = %e, "upstream request failed");
            UpstreamError::Http(e)
        })?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound);
        }
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "upstream error status");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let value: Value = resp.json().await.map_err(|e| UpstreamError::Decode {
            what: "json",
            message: e.to_string(),
        })?;
        let value = Arc::new(value);
        self.cache.insert(url, Arc::clone(&value)).await;
        Ok(value)
    }
}

fn decode<'a, T: Deserialize<'a>>(what: &'static str, value: &'a Value) -> Result<T, UpstreamError> {
    T::deserialize(value).map_err(|e| UpstreamError::Decode {
        what,
        message: e.to_string(),
    })
}

/// Fixtures must be a JSON array. Entries that do not parse are skipped.
pub fn decode_fixtures(value: &Value) -> Result<Vec<Fixture>, UpstreamError> {
    let Some(items) = value.as_array() else {
        return Err(UpstreamError::Decode {
            what: "fixtures",
            message: "expected a list".to_string(),
        });
    };
    let fixtures: Vec<Fixture> = items
        .iter()
        .filter_map(|item| Fixture::deserialize(item).ok())
        .collect();
    if fixtures.len() < items.len() {
        warn!(skipped = items.len() - fixtures.len(), "skipped malformed fixtures");
    }
    Ok(fixtures)
}

#[async_trait]
impl FplSource for FplClient {
    async fn bootstrap(&self) -> Result<BootstrapPayload, UpstreamError> {
        let value = self.get_json("bootstrap-static/").await?;
        decode("bootstrap", &value)
    }

    async fn fixtures(&self) -> Result<Vec<Fixture>, UpstreamError> {
        let value = self.get_json("fixtures/").await?;
        decode_fixtures(&value)
    }

    async fn manager_picks(&self, tid: u32, gw: u32) -> Result<PicksPayload, UpstreamError> {
        let value = self.get_json(&format!("entry/{tid}/event/{gw}/picks/")).await?;
        decode("picks", &value)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warp::Filter;

    #[tokio::test(start_paused = true)]
    async fn cache_entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(300), 4);
        cache.insert("a".into(), Arc::new(json!(1))).await;
        assert_eq!(cache.get("a").await.as_deref(), Some(&json!(1)));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get("a").await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("a").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_evicts_expired_then_oldest() {
        let cache = TtlCache::new(Duration::from_secs(10), 2);
        cache.insert("old".into(), Arc::new(json!("old"))).await;
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.insert("b".into(), Arc::new(json!("b"))).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        // "old" has expired and makes room.
        cache.insert("c".into(), Arc::new(json!("c"))).await;
        assert_eq!(cache.len().await, 2);
        assert!(cache.get("b").await.is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("d".into(), Arc::new(json!("d"))).await;
        // Nothing expired: "b" is the oldest.
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("c").await.is_some());
        assert!(cache.get("d").await.is_some());
    }

    #[test]
    fn fixtures_must_be_a_list() {
        assert!(matches!(
            decode_fixtures(&json!({"fixtures": []})),
            Err(UpstreamError::Decode { what: "fixtures", .. })
        ));
        let parsed = decode_fixtures(&json!([
            {"id": 1, "event": 3, "team_h": 1, "team_a": 2, "kickoff_time": "2024-08-16T19:00:00Z"},
            {"id": 2, "event": null, "team_h": 3, "team_a": 4},
            {"id": "broken"}
        ]))
        .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].event, None);
    }

    /// Serves a bootstrap, a 404 for every picks request and a 500 for
    /// fixtures on an ephemeral local port.
    async fn local_upstream(hits: Arc<AtomicUsize>) -> String {
        let bootstrap = warp::path!("bootstrap-static" / ..).map(move || {
            hits.fetch_add(1, Ordering::SeqCst);
            warp::reply::json(&json!({"elements": [], "teams": [{"id": 1, "name": "Arsenal", "strength": 4}]}))
        });
        let picks = warp::path!("entry" / u32 / "event" / u32 / "picks" / ..)
            .map(|_, _| warp::reply::with_status("missing", warp::http::StatusCode::NOT_FOUND));
        let fixtures = warp::path!("fixtures" / ..)
            .map(|| warp::reply::with_status("boom", warp::http::StatusCode::INTERNAL_SERVER_ERROR));
        let (addr, server) = warp::serve(bootstrap.or(picks).or(fixtures)).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        format!("http://{addr}")
    }

    fn client(base_url: String) -> FplClient {
        FplClient::from_config(&UpstreamConfig {
            base_url,
            timeout_secs: 5,
            cache_ttl_secs: 300,
            cache_max_entries: 8,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn client_caches_and_maps_statuses() {
        let hits = Arc::new(AtomicUsize::new(0));
        let client = client(local_upstream(Arc::clone(&hits)).await);

        let first = client.bootstrap().await.unwrap();
        let second = client.bootstrap().await.unwrap();
        assert_eq!(first.teams.len(), 1);
        assert_eq!(second.teams[0].name.as_deref(), Some("Arsenal"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(matches!(client.manager_picks(1, 3).await, Err(UpstreamError::NotFound)));
        assert!(matches!(
            client.fixtures().await,
            Err(UpstreamError::Status { status: 500 })
        ));
    }
}
