//! HTTP transport implementation.
//!
//! Requests are sent with a blocking `reqwest` client from the caller's own
//! thread. Multiple configured nodes are used round-robin; a node that
//! refuses the connection is skipped in favour of the next one.

use crate::config::EsConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::transport::{Method, Request, Response, Transport};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::warn;

/// Blocking HTTP transport to one or more backend nodes.
pub struct HttpTransport {
    /// Base URLs of the backend nodes.
    nodes: Vec<Url>,
    /// HTTP client with the request timeout applied.
    client: Client,
    /// Basic auth credentials.
    credentials: Option<(String, String)>,
    /// Round-robin cursor.
    next: AtomicUsize,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport from the connection settings in `config`.
    pub fn new(config: &EsConfig) -> GatewayResult<Self> {
        let nodes = config
            .addresses()
            .into_iter()
            .map(|addr| {
                Url::parse(addr).map_err(|e| {
                    GatewayError::invalid_request(format!("invalid backend url `{addr}`: {e}"))
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;
        if nodes.is_empty() {
            return Err(GatewayError::invalid_request("no backend url configured"));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::transport(format!("error creating the client: {e}")))?;

        let credentials = config
            .has_credentials()
            .then(|| (config.username.clone(), config.password.clone()));

        Ok(Self {
            nodes,
            client,
            credentials,
            next: AtomicUsize::new(0),
            timeout: config.request_timeout,
        })
    }

    /// Returns the configured node URLs.
    pub fn nodes(&self) -> &[Url] {
        &self.nodes
    }

    fn url_for(&self, base: &Url, request: &Request) -> GatewayResult<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::invalid_request(format!("`{base}` cannot be a base url")))?
            .pop_if_empty()
            .extend(&request.path);
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    fn send_to(&self, url: Url, request: &Request) -> Result<Response, reqwest::Error> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, url);
        if let Some((username, password)) = &self.credentials {
            builder = builder.basic_auth(username, Some(password));
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, request.content_type.mime())
                .body(body.clone());
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.bytes()?;
        Ok(Response::new(status, body.to_vec()))
    }

    fn map_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else {
            GatewayError::transport(err.to_string())
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> GatewayResult<Response> {
        let count = self.nodes.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % count;
        let mut last_error = None;

        for attempt in 0..count {
            let node = &self.nodes[(start + attempt) % count];
            let url = self.url_for(node, request)?;
            match self.send_to(url, request) {
                Ok(response) => return Ok(response),
                Err(err) if err.is_connect() => {
                    warn!(node = %node, "backend node unreachable: {}", err);
                    last_error = Some(err);
                }
                Err(err) => return Err(self.map_error(err)),
            }
        }

        Err(last_error
            .map(|err| self.map_error(err))
            .unwrap_or_else(|| GatewayError::transport("no backend node available")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_creation() {
        let config = EsConfig::new().with_url("http://a:9200,http://b:9200");
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.nodes().len(), 2);
        assert!(transport.credentials.is_none());
    }

    #[test]
    fn credentials_only_with_username() {
        let config = EsConfig::new().with_credentials("elastic", "pw");
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(
            transport.credentials,
            Some(("elastic".to_string(), "pw".to_string()))
        );
    }

    #[test]
    fn empty_url_rejected() {
        let config = EsConfig::new().with_url(" , ");
        assert!(matches!(
            HttpTransport::new(&config),
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn url_encodes_segments_and_query() {
        let config = EsConfig::new().with_url("http://localhost:9200/prefix/");
        let transport = HttpTransport::new(&config).unwrap();
        let request = Request::new(Method::Get, ["goiot-device", "_doc", "a b/c"])
            .param("refresh", "true");

        let url = transport.url_for(&transport.nodes()[0], &request).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9200/prefix/goiot-device/_doc/a%20b%2Fc?refresh=true"
        );
    }
}
