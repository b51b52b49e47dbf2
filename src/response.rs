//! Response snapshots and the synthetic fallback responses.
//!
//! Every strategy executor resolves to one of these, so the interception
//! point never rejects: worst case is a synthetic, class-appropriate
//! body.

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network.
  Network,
  /// Served from a persistent store.
  Cache,
  /// Consumed a warmed navigation preload.
  Preload,
  /// Synthesized locally after every fallback was exhausted.
  Synthetic,
}

/// A response snapshot: everything the caching layer keeps of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub source: ResponseSource,
}

impl Response {
  pub fn new(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
    Self {
      status,
      content_type,
      body,
      source: ResponseSource::Network,
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn with_source(mut self, source: ResponseSource) -> Self {
    self.source = source;
    self
  }

  /// Empty 204 for failed image fetches, so layouts degrade silently.
  pub fn empty_no_content() -> Self {
    Self {
      status: 204,
      content_type: None,
      body: Vec::new(),
      source: ResponseSource::Synthetic,
    }
  }

  /// Structured JSON 503 for document/API fallbacks the application can
  /// detect by status code.
  pub fn offline_json() -> Self {
    Self {
      status: 503,
      content_type: Some("application/json".to_string()),
      body: serde_json::json!({ "error": "offline" }).to_string().into_bytes(),
      source: ResponseSource::Synthetic,
    }
  }

  /// Plain-text 503 for generic non-HTML fallbacks.
  pub fn offline_text() -> Self {
    Self {
      status: 503,
      content_type: Some("text/plain".to_string()),
      body: b"offline".to_vec(),
      source: ResponseSource::Synthetic,
    }
  }

  /// Minimal inline HTML for navigations with nothing cached at all.
  pub fn offline_html() -> Self {
    Self {
      status: 503,
      content_type: Some("text/html".to_string()),
      body: b"<!doctype html><html><body><h1>Offline</h1><p>This page is not available without a network connection.</p></body></html>".to_vec(),
      source: ResponseSource::Synthetic,
    }
  }

  /// Empty 503 for failed font fetches.
  pub fn network_error() -> Self {
    Self {
      status: 503,
      content_type: None,
      body: Vec::new(),
      source: ResponseSource::Synthetic,
    }
  }

  /// 502 for pass-through requests whose upstream fetch failed.
  pub fn bad_gateway() -> Self {
    Self {
      status: 502,
      content_type: Some("text/plain".to_string()),
      body: b"upstream unreachable".to_vec(),
      source: ResponseSource::Synthetic,
    }
  }
}
