//! Install / wait / activate progression of one deployed gateway
//! version.
//!
//! Install runs an all-or-nothing precache of the application shell;
//! activation sweeps stale-version stores and claims observers. Both
//! are awaited to completion once started.

use color_eyre::{eyre::eyre, Result};
use futures::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;

use crate::net::NetworkClient;
use crate::request::{request_key, Request};
use crate::response::Response;
use crate::store::{CapacityEvictor, NamespaceManager, StoreBackend, StoreKind};
use crate::strategy::PreloadSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
  Installing,
  Waiting,
  Activating,
  Active,
}

pub struct LifecycleController<B: StoreBackend, N: NetworkClient> {
  namespaces: NamespaceManager<B>,
  evictor: CapacityEvictor,
  net: Arc<N>,
  preload: Arc<PreloadSlot>,
  origin: Url,
  precache: Vec<String>,
  secondary_precache: Vec<String>,
  phase_tx: watch::Sender<LifecyclePhase>,
  skip_requested: AtomicBool,
  predecessor_active: AtomicBool,
}

impl<B: StoreBackend, N: NetworkClient> LifecycleController<B, N> {
  pub fn new(
    namespaces: NamespaceManager<B>,
    evictor: CapacityEvictor,
    net: Arc<N>,
    preload: Arc<PreloadSlot>,
    origin: Url,
    precache: Vec<String>,
    secondary_precache: Vec<String>,
  ) -> Self {
    let (phase_tx, _) = watch::channel(LifecyclePhase::Installing);
    Self {
      namespaces,
      evictor,
      net,
      preload,
      origin,
      precache,
      secondary_precache,
      phase_tx,
      skip_requested: AtomicBool::new(false),
      predecessor_active: AtomicBool::new(false),
    }
  }

  pub fn phase(&self) -> LifecyclePhase {
    *self.phase_tx.borrow()
  }

  /// Observe phase transitions; the transition to `Active` is how this
  /// instance claims its observers.
  pub fn subscribe(&self) -> watch::Receiver<LifecyclePhase> {
    self.phase_tx.subscribe()
  }

  fn set_phase(&self, phase: LifecyclePhase) {
    self.phase_tx.send_replace(phase);
  }

  /// Mark whether an instance of a previous version is still serving.
  /// Activation defers while one is, unless skip-waiting was requested.
  #[allow(dead_code)]
  pub fn set_predecessor_active(&self, active: bool) {
    self.predecessor_active.store(active, Ordering::SeqCst);
  }

  /// Short-circuit the waiting rule. Idempotent.
  pub fn skip_waiting(&self) {
    info!("skip-waiting requested");
    self.skip_requested.store(true, Ordering::SeqCst);
  }

  /// Run the install step for this version token.
  ///
  /// The mandatory shell manifest is precached all-or-nothing: nothing
  /// is written until every fetch in the batch has succeeded, so a
  /// failed install leaves no partial shell behind. The secondary list
  /// is best-effort afterwards. A version whose install already
  /// completed (persisted marker) skips straight to Waiting.
  pub async fn install(&self) -> Result<()> {
    if self.phase() != LifecyclePhase::Installing {
      return Ok(());
    }

    let version = self.namespaces.version().to_string();
    if self.namespaces.installed_version().as_deref() == Some(version.as_str()) {
      info!(version = %version, "already installed");
      self.set_phase(LifecyclePhase::Waiting);
      return Ok(());
    }

    info!(version = %version, "installing");
    let entries =
      future::try_join_all(self.precache.iter().map(|path| self.fetch_precache(path)))
        .await
        .map_err(|e| eyre!("shell precache failed, install aborted: {}", e))?;

    let shell = self.namespaces.open(StoreKind::Shell);
    for (url, response) in &entries {
      shell.put(&request_key(url), url.as_str(), response);
    }

    let fonts = self.namespaces.open(StoreKind::Fonts);
    for path in &self.secondary_precache {
      match self.fetch_precache(path).await {
        Ok((url, response)) => {
          fonts.put(&request_key(&url), url.as_str(), &response);
          self.evictor.enforce(&fonts);
        }
        Err(e) => warn!(path = %path, "secondary precache failed: {}", e),
      }
    }

    self.namespaces.mark_installed()?;
    self.set_phase(LifecyclePhase::Waiting);
    Ok(())
  }

  async fn fetch_precache(&self, path: &str) -> Result<(Url, Response)> {
    let url = self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid precache path {}: {}", path, e))?;
    let response = self.net.fetch(&Request::get(url.clone())).await?;
    if !response.is_success() {
      return Err(eyre!("precache of {} returned HTTP {}", url, response.status));
    }
    Ok((url, response))
  }

  /// Activate this version: enable navigation preload, sweep stores of
  /// every other version, claim observers.
  ///
  /// Returns without activating while a previous instance is still
  /// serving and skip-waiting has not been requested.
  pub async fn activate(&self) -> Result<()> {
    match self.phase() {
      LifecyclePhase::Active => return Ok(()),
      LifecyclePhase::Installing => {
        return Err(eyre!("cannot activate: install has not completed"));
      }
      LifecyclePhase::Waiting | LifecyclePhase::Activating => {}
    }

    if self.predecessor_active.load(Ordering::SeqCst)
      && !self.skip_requested.load(Ordering::SeqCst)
    {
      info!("waiting for previous instance to retire");
      return Ok(());
    }

    self.set_phase(LifecyclePhase::Activating);
    self.preload.set_enabled(true);
    self.namespaces.sweep_stale(&self.namespaces.keep_list())?;
    self.set_phase(LifecyclePhase::Active);
    info!(version = %self.namespaces.version(), "activated");
    Ok(())
  }
}
