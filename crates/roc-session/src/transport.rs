//! One-request HTTP wrapper. Credential headers, a finite timeout, JSON
//! decoding; `fetch_json` never surfaces an error to its caller. Retry policy
//! lives with the poll cycle, not here.

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use roc_core::Credential;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("credential is not header-safe")]
    Credential,
    #[error("invalid endpoint '{endpoint}': {source}")]
    Endpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status} for {endpoint}")]
    Status { endpoint: String, status: StatusCode },
}

pub struct Transport {
    http: reqwest::Client,
    base: Url,
}

impl Transport {
    pub fn new(
        base: Url,
        credential: &Credential,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "uid",
            HeaderValue::from_str(&credential.identity).map_err(|_| TransportError::Credential)?,
        );
        headers.insert(
            "token",
            HeaderValue::from_str(&credential.token).map_err(|_| TransportError::Credential)?,
        );
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path)
            .map_err(|source| TransportError::Endpoint {
                endpoint: path.to_string(),
                source,
            })
    }

    /// Fetch and decode one endpoint. Any transport or decode failure is
    /// logged and collapses to `None`; callers never see an error here.
    pub async fn fetch_json<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        match self.try_fetch(path).await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(event = "transport_fetch_error", endpoint = path, error = %err);
                None
            }
        }
    }

    async fn try_fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let url = self.endpoint(path)?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: path.to_string(),
                status,
            });
        }
        Ok(response.json().await?)
    }

    /// Administrative one-shot. The outcome is reported to the operator and
    /// otherwise dropped; nothing retries.
    pub async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<(), TransportError> {
        let url = self.endpoint(path)?;
        let mut request = self.http.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: path.to_string(),
                status,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential {
            identity: "op-1".to_string(),
            token: "secret".to_string(),
        }
    }

    #[test]
    fn endpoint_joins_against_base() {
        let transport = Transport::new(
            Url::parse("http://127.0.0.1:9090/").unwrap(),
            &credential(),
            Duration::from_secs(5),
        )
        .unwrap();
        let url = transport.endpoint("/admin/users").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9090/admin/users");
    }

    #[test]
    fn header_unsafe_credential_is_rejected() {
        let bad = Credential {
            identity: "op\n1".to_string(),
            token: "secret".to_string(),
        };
        let result = Transport::new(
            Url::parse("http://127.0.0.1:9090/").unwrap(),
            &bad,
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(TransportError::Credential)));
    }
}
