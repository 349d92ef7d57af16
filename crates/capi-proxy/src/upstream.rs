//! HTTP client for the upstream chat service.

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT,
};
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::UpstreamConfig;
use crate::error::ProxyError;

const CONTENT_TYPE_CONNECT_PROTO: &str = "application/connect+proto";
const CONNECT_USER_AGENT: &str = "connect-es/1.4.0";

const CONNECT_ACCEPT_ENCODING: HeaderName = HeaderName::from_static("connect-accept-encoding");
const CONNECT_PROTOCOL_VERSION: HeaderName = HeaderName::from_static("connect-protocol-version");
const X_AMZN_TRACE_ID: HeaderName = HeaderName::from_static("x-amzn-trace-id");
const X_CURSOR_CHECKSUM: HeaderName = HeaderName::from_static("x-cursor-checksum");
const X_CURSOR_CLIENT_VERSION: HeaderName = HeaderName::from_static("x-cursor-client-version");
const X_CURSOR_TIMEZONE: HeaderName = HeaderName::from_static("x-cursor-timezone");
const X_GHOST_MODE: HeaderName = HeaderName::from_static("x-ghost-mode");
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Sends encoded request frames and hands back the streaming response.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    endpoint: String,
    base_headers: HeaderMap,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        // No total deadline: answers may stream for longer than any single
        // read is allowed to stall.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint(),
            base_headers: base_headers(config)?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Headers for one request: the fixed set plus auth and fresh trace ids.
    pub fn request_headers(&self, token: &str) -> Result<HeaderMap, ProxyError> {
        let mut headers = self.base_headers.clone();
        let auth = HeaderValue::try_from(format!("Bearer {}", token))
            .map_err(|_| ProxyError::InvalidAuthorization)?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(X_AMZN_TRACE_ID, uuid_header(Some("Root=")));
        headers.insert(X_REQUEST_ID, uuid_header(None));
        Ok(headers)
    }

    /// POST a request frame. Non-2xx responses are reported as errors with
    /// the upstream body attached for logging.
    pub async fn stream_chat(
        &self,
        token: &str,
        frame: Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        let headers = self.request_headers(token)?;
        debug!(endpoint = %self.endpoint, frame_bytes = frame.len(), "sending upstream request");

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .body(frame)
            .send()
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    timeout = e.is_timeout(),
                    connect = e.is_connect(),
                    "upstream request failed"
                );
                ProxyError::UpstreamTransport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "upstream error");
            return Err(ProxyError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        debug!(%status, "upstream stream opened");
        Ok(response)
    }
}

fn base_headers(config: &UpstreamConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_CONNECT_PROTO));
    headers.insert(USER_AGENT, HeaderValue::from_static(CONNECT_USER_AGENT));
    headers.insert(CONNECT_ACCEPT_ENCODING, HeaderValue::from_static("gzip,br"));
    headers.insert(CONNECT_PROTOCOL_VERSION, HeaderValue::from_static("1"));
    headers.insert(
        X_CURSOR_CHECKSUM,
        config_header("upstream.checksum", &config.checksum)?,
    );
    headers.insert(
        X_CURSOR_CLIENT_VERSION,
        config_header("upstream.client_version", &config.client_version)?,
    );
    headers.insert(
        X_CURSOR_TIMEZONE,
        config_header("upstream.timezone", &config.timezone)?,
    );
    headers.insert(
        X_GHOST_MODE,
        HeaderValue::from_static(if config.ghost_mode { "true" } else { "false" }),
    );
    Ok(headers)
}

fn config_header(field: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).with_context(|| format!("Invalid header value for {}", field))
}

fn uuid_header(prefix: Option<&str>) -> HeaderValue {
    let value = format!("{}{}", prefix.unwrap_or_default(), Uuid::new_v4());
    // prefix and hyphenated uuid are plain ASCII
    HeaderValue::try_from(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_headers() {
        let client = UpstreamClient::new(&UpstreamConfig::default()).unwrap();
        let headers = client.request_headers("tok").unwrap();

        assert_eq!(headers[AUTHORIZATION], "Bearer tok");
        assert_eq!(headers[CONTENT_TYPE], "application/connect+proto");
        assert_eq!(headers["connect-protocol-version"], "1");
        assert_eq!(headers["x-cursor-client-version"], "0.42.3");
        assert_eq!(headers["x-ghost-mode"], "false");
        assert!(headers["x-amzn-trace-id"]
            .to_str()
            .unwrap()
            .starts_with("Root="));
    }

    #[test]
    fn test_request_ids_are_fresh() {
        let client = UpstreamClient::new(&UpstreamConfig::default()).unwrap();
        let a = client.request_headers("tok").unwrap();
        let b = client.request_headers("tok").unwrap();
        assert_ne!(a["x-request-id"], b["x-request-id"]);
    }

    #[test]
    fn test_token_with_newline_is_rejected() {
        let client = UpstreamClient::new(&UpstreamConfig::default()).unwrap();
        assert!(matches!(
            client.request_headers("bad\ntoken"),
            Err(ProxyError::InvalidAuthorization)
        ));
    }

    #[test]
    fn test_invalid_config_header() {
        let config = UpstreamConfig {
            timezone: "Bad\nZone".to_string(),
            ..UpstreamConfig::default()
        };
        assert!(UpstreamClient::new(&config).is_err());
    }
}
