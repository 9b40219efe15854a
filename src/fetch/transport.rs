use crate::fetch::egress::EgressIdentity;
use crate::fetch::FetchError;
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::{Client, Proxy};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// The underlying network call
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a GET and returns the response body
    ///
    /// Non-success statuses are reported through [`FetchError::from_status`]
    /// so the retry layer can tell transient failures from permanent ones.
    async fn get(&self, url: &Url, identity: &EgressIdentity) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed transport holding one client per egress proxy
#[derive(Debug)]
pub struct HttpTransport {
    clients: HashMap<Option<String>, Client>,
}

impl HttpTransport {
    /// Builds a client for each proxy (`None` for direct connections)
    pub fn new(proxies: &[Option<String>], timeout: Duration) -> Result<Self, FetchError> {
        let mut clients = HashMap::new();
        for proxy in proxies {
            clients.insert(proxy.clone(), build_http_client(proxy.as_deref(), timeout)?);
        }
        if clients.is_empty() {
            clients.insert(None, build_http_client(None, timeout)?);
        }
        Ok(Self { clients })
    }
}

/// Builds an HTTP client, optionally routed through `proxy`
pub fn build_http_client(proxy: Option<&str>, timeout: Duration) -> Result<Client, FetchError> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}

fn classify(url: &Url, error: reqwest::Error) -> FetchError {
    let status = error.status().map(|s| s.as_u16());
    let message = if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        format!("Connection failed: {}", error)
    } else {
        error.to_string()
    };

    if error.is_builder() || error.is_redirect() {
        FetchError::Permanent {
            url: url.to_string(),
            message,
            status,
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            message,
            status,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url, identity: &EgressIdentity) -> Result<Vec<u8>, FetchError> {
        let client = self
            .clients
            .get(&identity.proxy)
            .ok_or_else(|| FetchError::Permanent {
                url: url.to_string(),
                message: format!("No client configured for proxy {:?}", identity.proxy),
                status: None,
            })?;

        let response = client
            .get(url.clone())
            .header(USER_AGENT, identity.user_agent.as_str())
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(url.as_str(), status));
        }

        let body = response.bytes().await.map_err(|e| classify(url, e))?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_direct_client() {
        assert!(build_http_client(None, Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_build_proxied_client() {
        assert!(build_http_client(Some("http://127.0.0.1:3128"), Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_transport_has_client_per_proxy() {
        let transport = HttpTransport::new(
            &[None, Some("http://127.0.0.1:3128".to_string())],
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(transport.clients.len(), 2);
    }
}
