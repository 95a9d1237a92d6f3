use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const RESULT_LIMIT: usize = 5;
const MIN_QUERY_LEN: usize = 3;
const DEBOUNCE: Duration = Duration::from_millis(250);

/// One place-search result. Latitude/longitude arrive as strings on the
/// wire; they are parsed only when the user picks a suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceSuggestion {
    pub display_name: String,
    pub lat: String,
    pub lon: String,
}

/// Seam for the external place-search endpoint. Infallible by contract: a
/// failed or malformed lookup is an empty list.
#[async_trait]
pub trait PlaceSource: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Vec<PlaceSuggestion>;
}

/// Nominatim-style free-text place search.
#[derive(Clone)]
pub struct NominatimClient {
    client: Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Base URL from `GEOCODER_URL`, falling back to the public endpoint.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("GEOCODER_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }
}

#[async_trait]
impl PlaceSource for NominatimClient {
    async fn search(&self, query: &str, limit: usize) -> Vec<PlaceSuggestion> {
        let result = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json"), ("limit", &limit.to_string())])
            .header("User-Agent", "campusflow/0.1")
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Place search failed: {}", e);
                return Vec::new();
            }
        };

        match response.json::<Vec<PlaceSuggestion>>().await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                warn!("Place search returned a malformed body: {}", e);
                Vec::new()
            }
        }
    }
}

struct AutocompleteInner {
    /// Sequence number of the most recently issued request. A response is
    /// applied only while its own number still equals this value.
    seq: AtomicU64,
    suggestions: Mutex<Vec<PlaceSuggestion>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

/// Debounced location autocomplete for the add-profile form. Each keystroke
/// resets the quiet-period timer; queries shorter than three trimmed
/// characters clear the suggestions without touching the network. Responses
/// that are not from the latest issued request are discarded.
#[derive(Clone)]
pub struct LocationAutocomplete {
    source: Arc<dyn PlaceSource>,
    inner: Arc<AutocompleteInner>,
}

impl LocationAutocomplete {
    pub fn new(source: Arc<dyn PlaceSource>) -> Self {
        Self {
            source,
            inner: Arc::new(AutocompleteInner {
                seq: AtomicU64::new(0),
                suggestions: Mutex::new(Vec::new()),
                pending: Mutex::new(None),
            }),
        }
    }

    /// Feed the current query text. Must be called from within a tokio
    /// runtime; the lookup itself runs in the background.
    pub fn on_query(&self, query: &str) {
        let trimmed = query.trim().to_string();

        let mut pending = self.inner.pending.lock().unwrap();
        if let Some(timer) = pending.take() {
            timer.abort();
        }

        if trimmed.chars().count() < MIN_QUERY_LEN {
            // Invalidate any lookup already in flight before clearing.
            self.inner.seq.fetch_add(1, Ordering::SeqCst);
            self.inner.suggestions.lock().unwrap().clear();
            return;
        }

        let source = self.source.clone();
        let inner = self.inner.clone();
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            let seq = inner.seq.fetch_add(1, Ordering::SeqCst) + 1;

            // The request itself is detached: a newer keystroke aborts the
            // quiet-period timer above, not an already-issued lookup. Stale
            // lookups are dropped by the sequence check instead.
            tokio::spawn(async move {
                let results = source.search(&trimmed, RESULT_LIMIT).await;
                if inner.seq.load(Ordering::SeqCst) == seq {
                    *inner.suggestions.lock().unwrap() = results;
                }
            });
        }));
    }

    pub fn suggestions(&self) -> Vec<PlaceSuggestion> {
        self.inner.suggestions.lock().unwrap().clone()
    }

    /// Called when the add-profile form closes: drop the pending timer,
    /// invalidate any lookup already in flight, and clear the suggestions.
    pub fn close(&self) {
        if let Some(timer) = self.inner.pending.lock().unwrap().take() {
            timer.abort();
        }
        self.inner.seq.fetch_add(1, Ordering::SeqCst);
        self.inner.suggestions.lock().unwrap().clear();
    }
}
