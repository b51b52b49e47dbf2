//! Out-of-band control channel.
//!
//! The host application steers the gateway past its normal lifecycle
//! timing with a closed set of commands, delivered as JSON message
//! objects. Commands are processed one at a time by an actor task; the
//! mailbox is drained before the actor exits, so a queued CLEAR_CACHES
//! always runs to completion.

use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::lifecycle::LifecycleController;
use crate::net::NetworkClient;
use crate::store::{NamespaceManager, StoreBackend};

/// The control commands. Both are idempotent and side-effect-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlCommand {
  /// Force the transition out of Waiting, bypassing the wait for old
  /// instances to retire.
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
  /// Delete every namespace of every version. A hard reset,
  /// independent of the version-token mechanism.
  #[serde(rename = "CLEAR_CACHES")]
  ClearCaches,
}

impl ControlCommand {
  /// Parse a raw control message. Unknown message types yield None and
  /// are ignored by the channel.
  pub fn parse(raw: &str) -> Option<Self> {
    serde_json::from_str(raw).ok()
  }
}

/// Sending half of the control channel. Cloneable; commands enqueue and
/// never block.
#[derive(Clone)]
pub struct ControlChannel {
  tx: mpsc::UnboundedSender<ControlCommand>,
}

impl ControlChannel {
  /// Spawn the command actor. It exclusively performs the lifecycle and
  /// namespace mutations the commands ask for; dropping every
  /// [`ControlChannel`] clone lets it drain and exit.
  pub fn spawn<B: StoreBackend, N: NetworkClient>(
    lifecycle: Arc<LifecycleController<B, N>>,
    namespaces: NamespaceManager<B>,
  ) -> (Self, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
      while let Some(command) = rx.recv().await {
        match command {
          ControlCommand::SkipWaiting => {
            lifecycle.skip_waiting();
            if let Err(e) = lifecycle.activate().await {
              warn!("skip-waiting activation failed: {}", e);
            }
          }
          ControlCommand::ClearCaches => {
            if let Err(e) = namespaces.purge_all() {
              warn!("cache purge failed: {}", e);
            }
          }
        }
      }
    });

    (Self { tx }, handle)
  }

  pub fn send(&self, command: ControlCommand) {
    // Err means the actor is gone; nothing useful left to do
    let _ = self.tx.send(command);
  }

  /// Handle a raw message object from the host. Unknown types are
  /// ignored.
  #[allow(dead_code)]
  pub fn post_message(&self, raw: &str) {
    match ControlCommand::parse(raw) {
      Some(command) => self.send(command),
      None => debug!(message = %raw, "ignoring unknown control message"),
    }
  }
}
