//! The gateway: an explicit dispatch table over classifier, strategy
//! executors, lifecycle and control channel.
//!
//! Nothing registers itself against ambient events; the gateway is a
//! plain value that can be constructed, driven and torn down in tests.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use crate::classify::{classify, ClassifierConfig, RequestClass};
use crate::config::Config;
use crate::control::ControlChannel;
use crate::lifecycle::{LifecycleController, LifecyclePhase};
use crate::net::NetworkClient;
use crate::request::Request;
use crate::response::Response;
use crate::store::{CapacityEvictor, NamespaceManager, StoreBackend, StoreKind};
use crate::strategy::{PreloadSlot, StrategyLayer};

pub struct Gateway<B: StoreBackend, N: NetworkClient> {
  classifier: ClassifierConfig,
  strategies: StrategyLayer<B, N>,
  lifecycle: Arc<LifecycleController<B, N>>,
  namespaces: NamespaceManager<B>,
  control: ControlChannel,
  control_actor: JoinHandle<()>,
  preload: Arc<PreloadSlot>,
  net: Arc<N>,
}

impl<B: StoreBackend, N: NetworkClient> Gateway<B, N> {
  pub fn new(config: &Config, backend: B, net: N) -> Result<Self> {
    let origin = Url::parse(&config.origin)
      .map_err(|e| eyre!("Invalid origin {}: {}", config.origin, e))?;

    let namespaces = NamespaceManager::new(backend, config.version_token());
    let evictor = CapacityEvictor::new(config.capacity.clone());
    let net = Arc::new(net);
    let preload = Arc::new(PreloadSlot::new());

    let strategies = StrategyLayer::new(
      namespaces.clone(),
      evictor.clone(),
      Arc::clone(&net),
      Arc::clone(&preload),
      &origin,
      &config.shell_document,
      &config.offline_page,
      Duration::from_millis(config.api_deadline_ms),
    )?;

    let lifecycle = Arc::new(LifecycleController::new(
      namespaces.clone(),
      evictor,
      Arc::clone(&net),
      Arc::clone(&preload),
      origin,
      config.precache.clone(),
      config.secondary_precache.clone(),
    ));

    let (control, control_actor) =
      ControlChannel::spawn(Arc::clone(&lifecycle), namespaces.clone());

    Ok(Self {
      classifier: ClassifierConfig::from(config),
      strategies,
      lifecycle,
      namespaces,
      control,
      control_actor,
      preload,
      net,
    })
  }

  /// Intercept one request. Always produces a response; until this
  /// instance is active, requests pass through to the network.
  pub async fn handle(&self, request: Request) -> Response {
    if self.lifecycle.phase() != LifecyclePhase::Active {
      debug!(url = %request.url, "not active, passing through");
      return self.passthrough(&request).await;
    }

    match classify(&request, &self.classifier) {
      RequestClass::Unhandled => self.passthrough(&request).await,
      RequestClass::Navigation => self.strategies.navigation(&request).await,
      RequestClass::StyleManifest => self.strategies.stale_while_revalidate(&request).await,
      RequestClass::Font => self.strategies.cache_first(&request, StoreKind::Fonts).await,
      RequestClass::Image => self.strategies.cache_first(&request, StoreKind::Images).await,
      RequestClass::Document => {
        self.strategies.cache_first(&request, StoreKind::Documents).await
      }
      RequestClass::ApiCall => self.strategies.timed_race(&request).await,
      RequestClass::Generic => self.strategies.network_first(&request).await,
    }
  }

  async fn passthrough(&self, request: &Request) -> Response {
    match self.net.fetch(request).await {
      Ok(response) => response,
      Err(e) => {
        debug!(url = %request.url, "pass-through fetch failed: {}", e);
        Response::bad_gateway()
      }
    }
  }

  /// Fetch a navigation URL ahead of time and stash it for the next
  /// navigation to that URL. No-op until activation enables preload.
  #[allow(dead_code)]
  pub async fn warm_preload(&self, url: Url) {
    if !self.preload.is_enabled() {
      return;
    }
    let request = Request::navigation(url.clone());
    match self.net.fetch(&request).await {
      Ok(response) => self.preload.warm(url.as_str(), response),
      Err(e) => debug!(url = %url, "preload fetch failed: {}", e),
    }
  }

  pub async fn install(&self) -> Result<()> {
    self.lifecycle.install().await
  }

  pub async fn activate(&self) -> Result<()> {
    self.lifecycle.activate().await
  }

  pub fn phase(&self) -> LifecyclePhase {
    self.lifecycle.phase()
  }

  #[allow(dead_code)]
  pub fn subscribe_phase(&self) -> watch::Receiver<LifecyclePhase> {
    self.lifecycle.subscribe()
  }

  pub fn control(&self) -> &ControlChannel {
    &self.control
  }

  pub fn namespaces(&self) -> &NamespaceManager<B> {
    &self.namespaces
  }

  /// Tear down: stop accepting control commands, drain the ones already
  /// queued, then return.
  pub async fn shutdown(self) -> Result<()> {
    drop(self.control);
    self
      .control_actor
      .await
      .map_err(|e| eyre!("control actor panicked: {}", e))
  }
}
