//! Remote spectrum source: the fetch capability trait and its HTTP implementation.

use std::time::Duration;

use serde::Serialize;

use crate::config::FetchConfig;
use crate::error::{Error, FetchError, Result};
use crate::types::{SourceId, SpectraTable, SpectrumRow};

/// Longest response body kept in a [`FetchError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// Archive credentials forwarded to the service
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Archive username
    pub username: String,
    /// Archive password
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Options shared by every batch call of a run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchRequest {
    /// Wavelength grid in nm; the service default when None
    pub sampling: Option<Vec<f64>>,
    /// Truncate the basis function set
    pub truncate: bool,
    /// Archive credentials
    pub credentials: Option<Credentials>,
}

impl FetchRequest {
    /// Build the request options from configuration
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let sampling = config
            .sampling
            .as_ref()
            .map(|spec| spec.wavelengths())
            .transpose()?;
        let credentials = match (&config.username, &config.password) {
            (Some(username), password) => Some(Credentials {
                username: username.clone(),
                password: password.clone().unwrap_or_default(),
            }),
            (None, _) => None,
        };
        Ok(Self {
            sampling,
            truncate: config.truncate,
            credentials,
        })
    }
}

/// Abstraction over the remote bulk calibration call, enabling testability.
///
/// Implementations may resolve any subset of the requested identifiers;
/// callers must not assume one row per identifier.
#[async_trait::async_trait]
pub trait SpectrumSource: Send + Sync {
    /// Fetch calibrated spectra for a batch of identifiers
    async fn fetch(
        &self,
        ids: &[SourceId],
        request: &FetchRequest,
    ) -> std::result::Result<SpectraTable, FetchError>;
}

/// Body sent to the calibration endpoint
#[derive(Serialize)]
struct CalibrateBody<'a> {
    source_ids: &'a [SourceId],
    #[serde(skip_serializing_if = "Option::is_none")]
    sampling: Option<&'a [f64]>,
    truncation: bool,
}

/// Production [`SpectrumSource`] posting batches to a JSON calibration endpoint.
///
/// The endpoint receives `{"source_ids": [...], "sampling": [...], "truncation": bool}`
/// and answers with a JSON array of `{"source_id", "flux", "flux_error"}` objects.
/// Credentials, when configured, are sent as HTTP basic auth.
pub struct HttpSpectrumSource {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpSpectrumSource {
    /// Create a source for the given endpoint
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = url::Url::parse(endpoint).map_err(|e| Error::Config {
            message: format!("invalid endpoint URL '{endpoint}': {e}"),
            key: Some("fetch.endpoint".to_string()),
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::Config {
                message: format!("endpoint scheme '{}' is not http(s)", endpoint.scheme()),
                key: Some("fetch.endpoint".to_string()),
            });
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    /// Create a source from configuration, failing if no endpoint is set
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let endpoint = config.endpoint.as_deref().ok_or_else(|| Error::Config {
            message: "no calibration endpoint configured".to_string(),
            key: Some("fetch.endpoint".to_string()),
        })?;
        Self::new(endpoint, config.request_timeout)
    }
}

#[async_trait::async_trait]
impl SpectrumSource for HttpSpectrumSource {
    async fn fetch(
        &self,
        ids: &[SourceId],
        request: &FetchRequest,
    ) -> std::result::Result<SpectraTable, FetchError> {
        let body = CalibrateBody {
            source_ids: ids,
            sampling: request.sampling.as_deref(),
            truncation: request.truncate,
        };

        let mut call = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(credentials) = &request.credentials {
            call = call.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = call.send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| text.is_char_boundary(*i))
                    .unwrap_or(0);
                text.truncate(cut);
            }
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let bytes = response.bytes().await?;
        let rows: Vec<SpectrumRow> =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(SpectraTable::new(rows))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::SamplingSpec;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> HttpSpectrumSource {
        HttpSpectrumSource::new(&format!("{}/calibrate", server.uri()), Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn decodes_partial_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calibrate"))
            .and(body_partial_json(serde_json::json!({
                "source_ids": [1, 2, 3],
                "truncation": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"source_id": 1, "flux": [1.0, 2.0], "flux_error": [0.1, 0.2]},
                {"source_id": 3, "flux": [3.0, 4.0], "flux_error": [0.3, 0.4]}
            ])))
            .mount(&server)
            .await;

        let request = FetchRequest {
            truncate: true,
            ..FetchRequest::default()
        };
        let table = source_for(&server)
            .fetch(&[SourceId(1), SourceId(2), SourceId(3)], &request)
            .await
            .unwrap();

        assert_eq!(table.len(), 2, "service resolved only two of three ids");
        assert_eq!(table.rows()[1].source_id, SourceId(3));
        assert_eq!(table.rows()[1].flux_error, vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn sends_basic_auth_when_credentials_present() {
        let server = MockServer::start().await;
        // "astro:secret" base64 encoded
        Mock::given(method("POST"))
            .and(header("authorization", "Basic YXN0cm86c2VjcmV0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let request = FetchRequest {
            credentials: Some(Credentials {
                username: "astro".into(),
                password: "secret".into(),
            }),
            ..FetchRequest::default()
        };
        let table = source_for(&server)
            .fetch(&[SourceId(9)], &request)
            .await
            .unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn forwards_sampling_grid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "sampling": [400.0, 405.0]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let request = FetchRequest {
            sampling: Some("arange 400 410 5".parse::<SamplingSpec>().unwrap().wavelengths().unwrap()),
            ..FetchRequest::default()
        };
        source_for(&server)
            .fetch(&[SourceId(9)], &request)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn server_error_becomes_status_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("archive overloaded"))
            .mount(&server)
            .await;

        let err = source_for(&server)
            .fetch(&[SourceId(1)], &FetchRequest::default())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FetchError::Status {
                status: 503,
                body: "archive overloaded".into()
            }
        );
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn garbage_body_becomes_decode_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = source_for(&server)
            .fetch(&[SourceId(1)], &FetchRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_becomes_transport_failure() {
        // Port 9 (discard) on localhost is closed in test environments
        let source =
            HttpSpectrumSource::new("http://127.0.0.1:9/calibrate", Duration::from_secs(2)).unwrap();
        let err = source
            .fetch(&[SourceId(1)], &FetchRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)), "got {err:?}");
    }

    #[test]
    fn rejects_non_http_endpoint() {
        assert!(HttpSpectrumSource::new("ftp://archive/calibrate", Duration::from_secs(1)).is_err());
        assert!(HttpSpectrumSource::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn missing_endpoint_is_config_error() {
        let err = HttpSpectrumSource::from_config(&FetchConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn request_from_config_builds_grid_and_credentials() {
        let config = FetchConfig {
            sampling: Some("linspace 600 1050 10".parse().unwrap()),
            truncate: true,
            username: Some("astro".into()),
            password: Some("secret".into()),
            ..FetchConfig::default()
        };
        let request = FetchRequest::from_config(&config).unwrap();

        assert_eq!(request.sampling.as_ref().map(Vec::len), Some(10));
        assert!(request.truncate);
        assert_eq!(
            request.credentials.as_ref().map(|c| c.username.as_str()),
            Some("astro")
        );
        assert!(!format!("{request:?}").contains("secret"));
    }
}
