use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::types::{
  ApiEnvelope, ClaimResult, DownlinePage, DownlineRequest, MemberDetail, MemberSummary, RateTable,
};
use super::{ApiFuture, RewardsApi};
use crate::domain::Domain;

/// HTTP client for the rewards backend.
#[derive(Clone)]
pub struct HttpApiClient {
  http: reqwest::Client,
  base: Url,
}

impl HttpApiClient {
  pub fn new(base_url: &str) -> Result<Self> {
    // Url::join drops the last path segment unless the base ends with '/'
    let normalized = if base_url.ends_with('/') {
      base_url.to_string()
    } else {
      format!("{}/", base_url)
    };
    let base =
      Url::parse(&normalized).map_err(|e| eyre!("Invalid API url {}: {}", base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  /// Build `{base}/{domain}/{path}` with the given query parameters.
  fn endpoint(&self, domain: Domain, path: &str, query: &[(&str, String)]) -> Result<Url, String> {
    let mut url = self
      .base
      .join(&format!("{}/{}", domain.as_str(), path))
      .map_err(|e| format!("Invalid endpoint {}: {}", path, e))?;
    if !query.is_empty() {
      url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
  }

  fn call<T>(
    &self,
    method: Method,
    url: Result<Url, String>,
    token: Option<&str>,
    body: Option<serde_json::Value>,
  ) -> ApiFuture<T>
  where
    T: DeserializeOwned + Send + 'static,
  {
    let http = self.http.clone();
    let token = token.map(String::from);

    Box::pin(async move {
      let url = url?;
      let mut request = http.request(method, url.clone());
      if let Some(token) = token {
        request = request.bearer_auth(token);
      }
      if let Some(body) = body {
        request = request.json(&body);
      }

      let response = request
        .send()
        .await
        .map_err(|e| format!("Request to {} failed: {}", url.path(), e))?;
      let status = response.status();

      let envelope: ApiEnvelope<T> = response.json().await.map_err(|e| {
        format!(
          "Unexpected response from {} ({}): {}",
          url.path(),
          status,
          e
        )
      })?;
      envelope.into_result()
    })
  }
}

impl RewardsApi for HttpApiClient {
  fn fetch_rate(&self, domain: Domain) -> ApiFuture<RateTable> {
    let url = self.endpoint(domain, "rates", &[]);
    self.call(Method::GET, url, None, None)
  }

  fn fetch_downline(&self, domain: Domain, request: DownlineRequest) -> ApiFuture<DownlinePage> {
    let url = self.endpoint(
      domain,
      "downline",
      &[
        ("username", request.username.clone()),
        ("page", request.page.to_string()),
        ("pageSize", request.page_size.to_string()),
        ("sortOrder", request.sort_order.as_str().to_string()),
      ],
    );
    self.call(Method::GET, url, Some(&request.token), None)
  }

  fn fetch_member_summary(
    &self,
    domain: Domain,
    username: &str,
    token: &str,
  ) -> ApiFuture<MemberSummary> {
    let url = self.endpoint(domain, "summary", &[("username", username.to_string())]);
    self.call(Method::GET, url, Some(token), None)
  }

  fn fetch_member_detail(
    &self,
    domain: Domain,
    username: &str,
    token: &str,
  ) -> ApiFuture<MemberDetail> {
    let url = self.endpoint(domain, "detail", &[("username", username.to_string())]);
    self.call(Method::GET, url, Some(token), None)
  }

  fn claim(&self, domain: Domain, username: &str, token: &str) -> ApiFuture<ClaimResult> {
    let url = self.endpoint(domain, "claim", &[]);
    let body = json!({ "username": username });
    self.call(Method::POST, url, Some(token), Some(body))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::referrals::SortOrder;

  #[test]
  fn test_endpoint_keeps_base_path() {
    let client = HttpApiClient::new("https://api.example.com/v1").unwrap();
    let url = client
      .endpoint(Domain::Bonus, "summary", &[("username", "alice".into())])
      .unwrap();
    assert_eq!(
      url.as_str(),
      "https://api.example.com/v1/bonus/summary?username=alice"
    );
  }

  #[test]
  fn test_downline_query_uses_wire_sort_names() {
    let client = HttpApiClient::new("https://api.example.com/").unwrap();
    let url = client
      .endpoint(
        Domain::Affiliate,
        "downline",
        &[
          ("page", "3".into()),
          ("sortOrder", SortOrder::WageredDesc.as_str().into()),
        ],
      )
      .unwrap();
    assert_eq!(
      url.as_str(),
      "https://api.example.com/affiliate/downline?page=3&sortOrder=wagered_desc"
    );
  }

  #[test]
  fn test_rejects_invalid_base_url() {
    assert!(HttpApiClient::new("not a url").is_err());
  }
}
