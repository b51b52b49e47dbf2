//! Request classification.
//!
//! A total, deterministic, pure function over request attributes. The
//! predicates overlap (an image served from a font host, say), so they
//! are evaluated in fixed priority order and the first match wins.

use crate::config::Config;
use crate::request::{Destination, Method, Request, RequestMode};

/// The resource class a request resolves to; one strategy executor per
/// class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Non-GET; passes straight through to the network untouched.
  Unhandled,
  Navigation,
  /// Web-font CSS manifest.
  StyleManifest,
  Font,
  Image,
  /// Downloadable document (PDF).
  Document,
  ApiCall,
  Generic,
}

/// The host lists and predicates the classifier runs against.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
  pub api_hosts: Vec<String>,
  pub font_css_hosts: Vec<String>,
  pub font_file_hosts: Vec<String>,
  pub image_hosts: Vec<String>,
}

impl From<&Config> for ClassifierConfig {
  fn from(config: &Config) -> Self {
    Self {
      api_hosts: config.api_hosts.clone(),
      font_css_hosts: config.font_css_hosts.clone(),
      font_file_hosts: config.font_file_hosts.clone(),
      image_hosts: config.image_hosts.clone(),
    }
  }
}

const IMAGE_EXTENSIONS: &[&str] = &[
  "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "avif", "bmp",
];

/// Classify one request. Pure and total: every request gets a class.
pub fn classify(request: &Request, config: &ClassifierConfig) -> RequestClass {
  if request.method != Method::Get {
    return RequestClass::Unhandled;
  }

  if request.mode == RequestMode::Navigate {
    return RequestClass::Navigation;
  }

  let host = request.url.host_str().unwrap_or("");
  let path = request.url.path();

  if request.destination == Destination::Style && contains(&config.font_css_hosts, host) {
    return RequestClass::StyleManifest;
  }

  if request.destination == Destination::Font
    || path.starts_with("/fonts/")
    || contains(&config.font_file_hosts, host)
  {
    return RequestClass::Font;
  }

  if request.destination == Destination::Image
    || has_extension(path, IMAGE_EXTENSIONS)
    || contains(&config.image_hosts, host)
  {
    return RequestClass::Image;
  }

  if has_extension(path, &["pdf"]) {
    return RequestClass::Document;
  }

  if contains(&config.api_hosts, host) {
    return RequestClass::ApiCall;
  }

  RequestClass::Generic
}

fn contains(hosts: &[String], host: &str) -> bool {
  hosts.iter().any(|h| h == host)
}

fn has_extension(path: &str, extensions: &[&str]) -> bool {
  path
    .rsplit('/')
    .next()
    .and_then(|file| file.rsplit_once('.'))
    .map(|(_, ext)| {
      let ext = ext.to_lowercase();
      extensions.iter().any(|e| *e == ext)
    })
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn config() -> ClassifierConfig {
    ClassifierConfig {
      api_hosts: vec!["api.example.com".to_string()],
      font_css_hosts: vec!["fonts.googleapis.com".to_string()],
      font_file_hosts: vec!["fonts.gstatic.com".to_string()],
      image_hosts: vec!["cdn.images.example.com".to_string()],
    }
  }

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_non_get_is_unhandled() {
    let request =
      Request::get(url("https://api.example.com/items")).with_method(Method::Post);
    assert_eq!(classify(&request, &config()), RequestClass::Unhandled);
  }

  #[test]
  fn test_navigation_wins_over_everything() {
    // A navigation to a .pdf URL is still a navigation
    let request = Request::navigation(url("https://app.example.com/report.pdf"));
    assert_eq!(classify(&request, &config()), RequestClass::Navigation);
  }

  #[test]
  fn test_font_css_host_stylesheet() {
    let request = Request::get(url("https://fonts.googleapis.com/css2?family=Inter"))
      .with_destination(Destination::Style);
    assert_eq!(classify(&request, &config()), RequestClass::StyleManifest);
  }

  #[test]
  fn test_stylesheet_from_other_host_is_generic() {
    let request = Request::get(url("https://app.example.com/app.css"))
      .with_destination(Destination::Style);
    assert_eq!(classify(&request, &config()), RequestClass::Generic);
  }

  #[test]
  fn test_font_by_destination_path_and_host() {
    let by_destination = Request::get(url("https://app.example.com/assets/inter.woff2"))
      .with_destination(Destination::Font);
    assert_eq!(classify(&by_destination, &config()), RequestClass::Font);

    let by_path = Request::get(url("https://app.example.com/fonts/inter.woff2"));
    assert_eq!(classify(&by_path, &config()), RequestClass::Font);

    let by_host = Request::get(url("https://fonts.gstatic.com/s/inter/v12/abc"));
    assert_eq!(classify(&by_host, &config()), RequestClass::Font);
  }

  #[test]
  fn test_image_from_font_host_resolves_as_font() {
    // Overlapping predicates resolve by priority order
    let request = Request::get(url("https://fonts.gstatic.com/icon.png"));
    assert_eq!(classify(&request, &config()), RequestClass::Font);
  }

  #[test]
  fn test_image_by_extension_destination_and_host() {
    let by_ext = Request::get(url("https://app.example.com/hero.WebP"));
    assert_eq!(classify(&by_ext, &config()), RequestClass::Image);

    let by_destination = Request::get(url("https://app.example.com/dynamic-image"))
      .with_destination(Destination::Image);
    assert_eq!(classify(&by_destination, &config()), RequestClass::Image);

    let by_host = Request::get(url("https://cdn.images.example.com/v1/abc"));
    assert_eq!(classify(&by_host, &config()), RequestClass::Image);
  }

  #[test]
  fn test_pdf_is_document() {
    let request = Request::get(url("https://app.example.com/files/report.pdf"));
    assert_eq!(classify(&request, &config()), RequestClass::Document);
  }

  #[test]
  fn test_api_host_allow_list() {
    let request = Request::get(url("https://api.example.com/v1/items?page=2"));
    assert_eq!(classify(&request, &config()), RequestClass::ApiCall);

    let other = Request::get(url("https://other.example.com/v1/items"));
    assert_eq!(classify(&other, &config()), RequestClass::Generic);
  }

  #[test]
  fn test_everything_else_is_generic() {
    let request = Request::get(url("https://app.example.com/bundle.js"));
    assert_eq!(classify(&request, &config()), RequestClass::Generic);
  }

  #[test]
  fn test_path_without_extension_is_not_document() {
    let request = Request::get(url("https://app.example.com/pdf"));
    assert_eq!(classify(&request, &config()), RequestClass::Generic);
  }
}
