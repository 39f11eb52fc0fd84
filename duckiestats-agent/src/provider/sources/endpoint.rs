use async_trait::async_trait;
use serde_json::Value;

use crate::{
    http_util::{self, HttpOptions},
    provider::Source,
};

/// Reports the JSON document served at a fixed URL, optionally one field of it.
#[derive(Debug, Clone)]
pub struct JsonEndpointSource {
    key: &'static str,
    url: String,
    field: Option<&'static str>,
    opts: HttpOptions,
}

impl JsonEndpointSource {
    pub fn new(key: &'static str, url: impl Into<String>, opts: HttpOptions) -> Self {
        Self {
            key,
            url: url.into(),
            field: None,
            opts,
        }
    }

    /// Endpoint served by the robot itself, `http://{hostname}.local/{path}`.
    pub fn local(key: &'static str, hostname: &str, path: &str, opts: HttpOptions) -> Self {
        Self::new(
            key,
            format!("http://{hostname}.local/{}", path.trim_start_matches('/')),
            opts,
        )
    }

    /// Report only `field` of the returned document.
    pub fn field(mut self, field: &'static str) -> Self {
        self.field = Some(field);
        self
    }
}

#[async_trait]
impl Source for JsonEndpointSource {
    fn key(&self) -> &str {
        self.key
    }

    async fn observe(&mut self) -> anyhow::Result<Option<Value>> {
        let mut document: Value = http_util::get_json(&self.url, self.opts).await?;
        match self.field {
            Some(field) => match document.get_mut(field) {
                Some(value) => Ok(Some(value.take())),
                None => anyhow::bail!("'{}' has no field '{field}'", self.url),
            },
            None => Ok(Some(document)),
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    const OPTS: HttpOptions = HttpOptions {
        timeout: Duration::from_secs(5),
        prefer_ipv6: false,
    };

    #[test]
    fn local_url_uses_mdns_hostname() {
        let source = JsonEndpointSource::local("health", "autobot01", "/health", OPTS);
        assert_eq!(source.url, "http://autobot01.local/health");
    }

    #[tokio::test]
    async fn extracts_selected_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ros/graph"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "ok", "data": {"nodes": ["a"]}})),
            )
            .mount(&server)
            .await;

        let url = format!("{}/ros/graph", server.uri());
        let mut graph = JsonEndpointSource::new("ros/graph", &url, OPTS).field("data");
        assert_eq!(
            graph.observe().await.unwrap(),
            Some(json!({"nodes": ["a"]}))
        );

        let mut missing = JsonEndpointSource::new("ros/graph", &url, OPTS).field("nope");
        assert!(missing.observe().await.is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let mut source = JsonEndpointSource::new("health", "http://127.0.0.1:1/health", OPTS);
        assert!(source.observe().await.is_err());
    }
}
