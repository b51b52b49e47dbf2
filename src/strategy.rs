//! Strategy executors that orchestrate cache stores with network
//! fetching.
//!
//! One algorithm per request class. Every executor resolves to *some*
//! response (cache hit, network response, or a synthetic fallback), so
//! the interception point never rejects.

use color_eyre::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::net::NetworkClient;
use crate::request::{request_key, Request};
use crate::response::{Response, ResponseSource};
use crate::store::{CapacityEvictor, NamespaceManager, Store, StoreBackend, StoreKind};

/// Holder for the ephemeral navigation preload response.
///
/// At most one warmed response at a time; consumed once, never
/// persisted. Warming is a no-op until activation enables it.
#[derive(Default)]
pub struct PreloadSlot {
  enabled: AtomicBool,
  slot: Mutex<Option<(String, Response)>>,
}

impl PreloadSlot {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_enabled(&self, enabled: bool) {
    self.enabled.store(enabled, Ordering::SeqCst);
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled.load(Ordering::SeqCst)
  }

  /// Stash a warmed response for a navigation URL. Ignored while
  /// preloading is disabled.
  pub fn warm(&self, url: &str, response: Response) {
    if !self.is_enabled() {
      return;
    }
    let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
    *slot = Some((url.to_string(), response));
  }

  /// Consume the warmed response if it matches this URL.
  pub fn take(&self, url: &str) -> Option<Response> {
    let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
    match slot.take() {
      Some((warmed_url, response)) if warmed_url == url => Some(response),
      other => {
        // A warmed response for a different navigation stays put
        *slot = other;
        None
      }
    }
  }
}

/// The strategy layer: one executor per request class, all routing
/// their store access through the namespace manager.
pub struct StrategyLayer<B: StoreBackend, N: NetworkClient> {
  namespaces: NamespaceManager<B>,
  evictor: CapacityEvictor,
  net: Arc<N>,
  preload: Arc<PreloadSlot>,
  api_deadline: Duration,
  shell_document_url: Url,
  offline_page_url: Url,
}

impl<B: StoreBackend, N: NetworkClient> StrategyLayer<B, N> {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    namespaces: NamespaceManager<B>,
    evictor: CapacityEvictor,
    net: Arc<N>,
    preload: Arc<PreloadSlot>,
    origin: &Url,
    shell_document: &str,
    offline_page: &str,
    api_deadline: Duration,
  ) -> Result<Self> {
    Ok(Self {
      namespaces,
      evictor,
      net,
      preload,
      api_deadline,
      shell_document_url: origin.join(shell_document)?,
      offline_page_url: origin.join(offline_page)?,
    })
  }

  /// Network-first with preload, for top-level navigations.
  ///
  /// A warmed preload response wins outright. Otherwise fetch live,
  /// bypassing the cache; success opportunistically refreshes the
  /// cached shell document. On failure degrade through: cached shell
  /// document, cached offline page, inline HTML.
  pub async fn navigation(&self, request: &Request) -> Response {
    if let Some(response) = self.preload.take(request.url.as_str()) {
      debug!(url = %request.url, "serving warmed preload response");
      return response.with_source(ResponseSource::Preload);
    }

    let shell = self.namespaces.open(StoreKind::Shell);
    match self.net.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          shell.put(
            &request_key(&self.shell_document_url),
            self.shell_document_url.as_str(),
            &response,
          );
        }
        response
      }
      Err(e) => {
        debug!(url = %request.url, "navigation fetch failed: {}", e);
        if let Some(hit) = shell.get(&request_key(&self.shell_document_url)) {
          return hit.response;
        }
        if let Some(hit) = shell.get(&request_key(&self.offline_page_url)) {
          return hit.response;
        }
        Response::offline_html()
      }
    }
  }

  /// Stale-while-revalidate, for web-font CSS manifests.
  ///
  /// A cached entry is returned immediately while a background refetch
  /// overwrites it for next time; background errors are absorbed. With
  /// no cached entry the network is awaited directly.
  pub async fn stale_while_revalidate(&self, request: &Request) -> Response {
    let store = self.namespaces.open(StoreKind::Fonts);
    let key = request.cache_key();

    if let Some(hit) = store.get(&key) {
      self.spawn_revalidate(store, key, request.clone());
      return hit.response;
    }

    match self.net.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          store.put(&key, request.url.as_str(), &response);
          self.evictor.enforce(&store);
        }
        response
      }
      Err(e) => {
        debug!(url = %request.url, "style manifest fetch failed: {}", e);
        Response::network_error()
      }
    }
  }

  fn spawn_revalidate(&self, store: Store<B>, key: String, request: Request) {
    let net = Arc::clone(&self.net);
    let evictor = self.evictor.clone();

    tokio::spawn(async move {
      match net.fetch(&request).await {
        Ok(response) if response.is_success() => {
          store.put(&key, request.url.as_str(), &response);
          evictor.enforce(&store);
        }
        Ok(_) => {}
        Err(e) => debug!(url = %request.url, "background revalidation failed: {}", e),
      }
    });
  }

  /// Cache-first with capacity cap, for fonts, images and documents.
  pub async fn cache_first(&self, request: &Request, kind: StoreKind) -> Response {
    let store = self.namespaces.open(kind);
    let key = request.cache_key();

    if let Some(hit) = store.get(&key) {
      return hit.response;
    }

    match self.net.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          store.put(&key, request.url.as_str(), &response);
          self.evictor.enforce(&store);
        }
        response
      }
      Err(e) => {
        debug!(url = %request.url, "fetch failed: {}", e);
        match kind {
          StoreKind::Images => Response::empty_no_content(),
          StoreKind::Documents => Response::offline_json(),
          _ => Response::network_error(),
        }
      }
    }
  }

  /// Timeout-bounded race, for API calls.
  ///
  /// The live fetch races a fixed deadline. A fetch that settles in
  /// time is returned (and cached if 2xx). If the deadline wins, the
  /// losing fetch future is dropped, which aborts the in-flight
  /// request, and the cached entry (or a synthetic 503) is served.
  pub async fn timed_race(&self, request: &Request) -> Response {
    let store = self.namespaces.open(StoreKind::Api);
    let key = request.cache_key();

    match tokio::time::timeout(self.api_deadline, self.net.fetch(request)).await {
      Ok(Ok(response)) => {
        if response.is_success() {
          store.put(&key, request.url.as_str(), &response);
          self.evictor.enforce(&store);
        }
        response
      }
      Ok(Err(e)) => {
        debug!(url = %request.url, "api fetch failed: {}", e);
        self.api_fallback(&store, &key)
      }
      Err(_) => {
        debug!(url = %request.url, "api fetch exceeded deadline");
        self.api_fallback(&store, &key)
      }
    }
  }

  fn api_fallback(&self, store: &Store<B>, key: &str) -> Response {
    match store.get(key) {
      Some(hit) => hit.response,
      None => Response::offline_json(),
    }
  }

  /// Network-first, for everything unclassified.
  pub async fn network_first(&self, request: &Request) -> Response {
    let store = self.namespaces.open(StoreKind::Misc);
    let key = request.cache_key();

    match self.net.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          store.put(&key, request.url.as_str(), &response);
        }
        response
      }
      Err(e) => {
        debug!(url = %request.url, "fetch failed: {}", e);
        if let Some(hit) = store.get(&key) {
          return hit.response;
        }
        if request.wants_html() {
          let shell = self.namespaces.open(StoreKind::Shell);
          if let Some(hit) = shell.get(&request_key(&self.offline_page_url)) {
            return hit.response;
          }
        }
        Response::offline_text()
      }
    }
  }
}
