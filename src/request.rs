//! Intercepted request model and cache-key derivation.

use sha2::{Digest, Sha256};
use url::Url;

/// HTTP method of an intercepted request.
///
/// Only GET requests are ever served from cache; everything else passes
/// straight through to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(dead_code)]
pub enum Method {
  #[default]
  Get,
  Head,
  Post,
  Put,
  Delete,
  Patch,
  Options,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
      Method::Patch => "PATCH",
      Method::Options => "OPTIONS",
    }
  }
}

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(dead_code)]
pub enum RequestMode {
  /// Top-level page load.
  Navigate,
  #[default]
  Cors,
  NoCors,
}

/// What the requester intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(dead_code)]
pub enum Destination {
  Document,
  Style,
  Script,
  Font,
  Image,
  #[default]
  Empty,
}

/// One intercepted outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub mode: RequestMode,
  pub destination: Destination,
  pub accept: Option<String>,
}

impl Request {
  /// A plain GET request with no destination hint.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      mode: RequestMode::default(),
      destination: Destination::default(),
      accept: None,
    }
  }

  /// A top-level navigation request.
  pub fn navigation(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      mode: RequestMode::Navigate,
      destination: Destination::Document,
      accept: Some("text/html,application/xhtml+xml".to_string()),
    }
  }

  #[allow(dead_code)]
  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  #[allow(dead_code)]
  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  #[allow(dead_code)]
  pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
    self.accept = Some(accept.into());
    self
  }

  /// Whether the requester would accept an HTML response.
  pub fn wants_html(&self) -> bool {
    self
      .accept
      .as_deref()
      .map(|a| a.contains("text/html"))
      .unwrap_or(false)
  }

  /// The cache key for this request's URL.
  pub fn cache_key(&self) -> String {
    request_key(&self.url)
  }
}

/// Derive the cache key for a URL.
///
/// The fragment is dropped before hashing; the query string is kept.
/// Request headers never participate in the key, so two requests for the
/// same URL always share one cache entry.
pub fn request_key(url: &Url) -> String {
  let mut normalized = url.clone();
  normalized.set_fragment(None);

  // SHA256 hash for stable, fixed-length keys
  let mut hasher = Sha256::new();
  hasher.update(normalized.as_str().as_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_fragment_is_ignored() {
    let a = request_key(&url("https://app.example.com/page#top"));
    let b = request_key(&url("https://app.example.com/page"));
    assert_eq!(a, b);
  }

  #[test]
  fn test_query_is_significant() {
    let a = request_key(&url("https://api.example.com/items?page=1"));
    let b = request_key(&url("https://api.example.com/items?page=2"));
    assert_ne!(a, b);
  }

  #[test]
  fn test_key_is_stable_hex_digest() {
    let key = request_key(&url("https://app.example.com/"));
    assert_eq!(key.len(), 64);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(key, request_key(&url("https://app.example.com/")));
  }

  #[test]
  fn test_wants_html() {
    let nav = Request::navigation(url("https://app.example.com/"));
    assert!(nav.wants_html());

    let api = Request::get(url("https://api.example.com/items"))
      .with_accept("application/json");
    assert!(!api.wants_html());

    let bare = Request::get(url("https://app.example.com/x.bin"));
    assert!(!bare.wants_html());
  }
}
