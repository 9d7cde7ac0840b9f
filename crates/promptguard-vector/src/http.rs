//! Pooled HTTP transport shared by the OpenSearch, Elasticsearch and Qdrant backends.

use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde_json::Value;

use promptguard_core::settings::HttpBackendSettings;

use crate::error::{BackendError, Result};

pub(crate) struct HttpTransport {
    /// `None` once closed; dropping the client releases its connection pool.
    client: RwLock<Option<Client>>,
    base: Url,
    basic_auth: Option<(String, String)>,
    api_key: Option<String>,
}

impl HttpTransport {
    pub(crate) fn new(settings: &HttpBackendSettings) -> Result<Self> {
        let base = settings.base_url()?;
        let base = Url::parse(&base).map_err(|e| BackendError::Configuration(format!("invalid url {base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::Configuration(format!("{base} cannot be used as a base url")));
        }
        let client = Client::builder()
            .timeout(settings.timeout())
            .pool_max_idle_per_host(settings.pool_size)
            .danger_accept_invalid_certs(!settings.verify_certs)
            .build()?;
        Ok(Self {
            client: RwLock::new(Some(client)),
            base,
            basic_auth: settings.basic_auth().map(|(u, p)| (u.to_string(), p.to_string())),
            api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    /// `base` with `segments` appended, each percent-encoded.
    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> Result<RequestBuilder> {
        let client = self.client.read().clone().ok_or_else(|| BackendError::Connection("client is closed".into()))?;
        let mut rb = client.request(method, url);
        if let Some((user, password)) = &self.basic_auth {
            rb = rb.basic_auth(user, Some(password));
        }
        if let Some(key) = &self.api_key {
            rb = rb.header("api-key", key);
        }
        Ok(rb)
    }

    /// Sends and decodes a JSON body, mapping non-2xx statuses to errors.
    pub(crate) async fn send_json(&self, rb: RequestBuilder) -> Result<Value> {
        let resp = rb.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        Ok(resp.json::<Value>().await?)
    }

    /// `Ok(true)` on 2xx, `Ok(false)` on 404.
    pub(crate) async fn reachable(&self, method: Method, url: Url) -> Result<bool> {
        let resp = self.request(method, url)?.send().await?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(status_error(s, "")),
        }
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool { self.client.read().is_none() }

    /// Drops the client; `false` when it was already closed.
    pub(crate) fn close(&self) -> bool { self.client.write().take().is_some() }
}

fn status_error(status: StatusCode, body: &str) -> BackendError {
    let body: String = body.chars().take(512).collect();
    let msg = format!("HTTP {status}: {body}");
    if status.is_client_error() { BackendError::Query(msg) } else { BackendError::Connection(msg) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(host: &str) -> HttpBackendSettings {
        HttpBackendSettings { host: Some(host.into()), port: Some(9200), scheme: "http".into(), ..Default::default() }
    }

    #[test]
    fn url_segments_are_encoded() {
        let t = HttpTransport::new(&settings("localhost")).expect("transport");
        assert_eq!(t.url(&["my index", "_doc", "a/b"]).as_str(), "http://localhost:9200/my%20index/_doc/a%2Fb");
    }

    #[test]
    fn missing_port_is_a_configuration_error() {
        let mut s = settings("localhost");
        s.port = None;
        assert!(matches!(HttpTransport::new(&s), Err(BackendError::Configuration(_))));
    }

    #[test]
    fn status_classes_map_to_error_kinds() {
        assert!(matches!(status_error(StatusCode::BAD_REQUEST, "bad"), BackendError::Query(_)));
        assert!(matches!(status_error(StatusCode::SERVICE_UNAVAILABLE, ""), BackendError::Connection(_)));
    }

    #[tokio::test]
    async fn closed_transport_refuses_requests() {
        let t = HttpTransport::new(&settings("localhost")).expect("transport");
        assert!(!t.is_closed());
        assert!(t.close());
        assert!(t.is_closed(), "client and its pool are released");
        assert!(!t.close());
        assert!(matches!(t.request(Method::GET, t.url(&[])), Err(BackendError::Connection(_))));
    }
}
