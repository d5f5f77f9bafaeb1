// Async HTTP client for the sensor registry.
//
// Endpoints (relative to the configured base, e.g. `http://host/iot/`):
//   GET    list
//   POST   add
//   DELETE {id}
//   POST   {id}/adjust?delta=<f64>

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{AdjustResponse, CreateEntityBody, EntityRecord};
use crate::transport::TransportConfig;

// ── Error response shape ─────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the sensor registry.
#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RegistryClient {
    // ── Constructors ─────────────────────────────────────────────────

    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::from_reqwest(base_url, http)
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self { http, base_url })
    }

    /// Ensure the base path ends with `/` so relative joins append.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Base URL extended by the given path segments, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, Error> {
        let url = self.url(segments)?;
        debug!("GET {url}");

        let resp = self.http.get(url).send().await?;
        Self::handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(segments)?;
        debug!("POST {url}");

        let resp = self.http.post(url).json(body).send().await?;
        Self::handle_response(resp).await
    }

    async fn post_with_params<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        params: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = self.url(segments)?;
        debug!("POST {url} params={params:?}");

        let resp = self.http.post(url).query(params).send().await?;
        Self::handle_response(resp).await
    }

    async fn delete(&self, segments: &[&str]) -> Result<(), Error> {
        let url = self.url(segments)?;
        debug!("DELETE {url}");

        let resp = self.http.delete(url).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::parse_error(status, resp).await)
        }
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                let preview: String = body.chars().take(200).collect();
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            Err(Self::parse_error(status, resp).await)
        }
    }

    async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
        let raw = resp.text().await.unwrap_or_default();

        let message = match serde_json::from_str::<ErrorResponse>(&raw) {
            Ok(err) => err.message.or(err.error),
            Err(_) => None,
        }
        .unwrap_or_else(|| {
            if raw.is_empty() {
                status.to_string()
            } else {
                raw
            }
        });

        if status == reqwest::StatusCode::CONFLICT {
            Error::Conflict { message }
        } else {
            Error::Registry {
                status: status.as_u16(),
                message,
            }
        }
    }

    // ━━ Public API ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Every sensor the registry knows about.
    pub async fn list(&self) -> Result<Vec<EntityRecord>, Error> {
        self.get(&["list"]).await
    }

    /// Register a new sensor. A taken device id yields [`Error::Conflict`].
    pub async fn add(&self, body: &CreateEntityBody) -> Result<EntityRecord, Error> {
        self.post(&["add"], body).await
    }

    pub async fn delete_entity(&self, id: &str) -> Result<(), Error> {
        self.delete(&[id]).await
    }

    /// Shift a sensor's bias by `delta`, returning the new absolute bias.
    pub async fn adjust(&self, id: &str, delta: f64) -> Result<AdjustResponse, Error> {
        self.post_with_params(&[id, "adjust"], &[("delta", delta.to_string())])
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> RegistryClient {
        RegistryClient::from_reqwest(base, reqwest::Client::new()).unwrap()
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        assert_eq!(client("http://localhost:8080/iot").base_url().as_str(), "http://localhost:8080/iot/");
        assert_eq!(client("http://localhost:8080/iot/").base_url().as_str(), "http://localhost:8080/iot/");
    }

    #[test]
    fn segments_are_appended_and_encoded() {
        let c = client("http://localhost:8080/iot");
        assert_eq!(
            c.url(&["a b", "adjust"]).unwrap().as_str(),
            "http://localhost:8080/iot/a%20b/adjust"
        );
        assert_eq!(c.url(&["list"]).unwrap().as_str(), "http://localhost:8080/iot/list");
    }

    #[test]
    fn rejects_garbage_base() {
        assert!(matches!(
            RegistryClient::from_reqwest("not a url", reqwest::Client::new()),
            Err(Error::InvalidUrl(_))
        ));
    }
}
