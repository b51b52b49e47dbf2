//! Network access behind a trait, so strategies and lifecycle can be
//! tested with injected stubs (delayed responses, failures) instead of
//! sockets.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;

use crate::request::Request;
use crate::response::Response;

/// The single seam to the real network.
pub trait NetworkClient: Send + Sync + 'static {
  /// Perform the request and snapshot the response. Errors mean the
  /// network failed (unreachable, reset, DNS); HTTP error statuses are
  /// returned as responses, not errors.
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// reqwest-backed client.
#[derive(Clone)]
pub struct ReqwestClient {
  client: reqwest::Client,
}

impl ReqwestClient {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl NetworkClient for ReqwestClient {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
    let client = self.client.clone();
    let method = request.method;
    let url = request.url.clone();
    let accept = request.accept.clone();

    async move {
      let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|e| eyre!("Invalid method: {}", e))?;

      let mut builder = client.request(method, url.as_str());
      if let Some(accept) = accept {
        builder = builder.header(reqwest::header::ACCEPT, accept);
      }

      let response = builder
        .send()
        .await
        .map_err(|e| eyre!("Request to {} failed: {}", url, e))?;

      let status = response.status().as_u16();
      let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
      let body = response
        .bytes()
        .await
        .map_err(|e| eyre!("Failed to read body from {}: {}", url, e))?
        .to_vec();

      Ok(Response::new(status, content_type, body))
    }
  }
}

#[cfg(test)]
pub(crate) mod stub {
  //! Scriptable network stub for tests.

  use std::collections::HashMap;
  use std::sync::Mutex;
  use std::time::Duration;

  use super::*;

  #[derive(Clone)]
  enum Route {
    Ok(Response),
    Fail,
    /// Respond after a delay; with a paused tokio clock the delay is
    /// virtual.
    Slow(Duration, Response),
  }

  /// Stub network: URL-keyed scripted outcomes, unknown URLs fail.
  #[derive(Default)]
  pub struct StubNetwork {
    routes: Mutex<HashMap<String, Route>>,
    hits: Mutex<HashMap<String, usize>>,
  }

  impl StubNetwork {
    pub fn new() -> Self {
      Self::default()
    }

    /// A network where every fetch fails.
    pub fn offline() -> Self {
      Self::new()
    }

    pub fn respond(&self, url: &str, response: Response) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), Route::Ok(response));
    }

    pub fn respond_slow(&self, url: &str, delay: Duration, response: Response) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), Route::Slow(delay, response));
    }

    pub fn fail(&self, url: &str) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), Route::Fail);
    }

    /// How many times the given URL was fetched.
    pub fn hits(&self, url: &str) -> usize {
      self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }
  }

  impl NetworkClient for StubNetwork {
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
      let url = request.url.to_string();
      *self.hits.lock().unwrap().entry(url.clone()).or_insert(0) += 1;
      let route = self.routes.lock().unwrap().get(&url).cloned();

      async move {
        match route {
          Some(Route::Ok(response)) => Ok(response),
          Some(Route::Slow(delay, response)) => {
            tokio::time::sleep(delay).await;
            Ok(response)
          }
          Some(Route::Fail) | None => Err(eyre!("connection refused: {}", url)),
        }
      }
    }
  }
}
