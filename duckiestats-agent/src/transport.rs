use async_trait::async_trait;
use bytes::Bytes;
use duckiestats_proto::{
    Category,
    msg::{DeviceToken, PushPointReq, PushPointResp},
};
use http::{HeaderValue, Method, StatusCode, header};
use log::trace;

use crate::{
    config::ApiConf,
    http_util::{self, HttpOptions},
};

/// Outbound leg of the pipeline: one authenticated attempt per call.
#[async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(
        &self,
        category: Category,
        point: &PushPointReq,
        token: &DeviceToken,
    ) -> anyhow::Result<PushPointResp>;
}

/// HTTP client for `POST {protocol}://{host}:{port}/{version}/{category}?`.
#[derive(Debug, Clone)]
pub struct StatsClient {
    base_url: String,
    opts: HttpOptions,
}

impl StatsClient {
    pub fn new(api: &ApiConf) -> Self {
        Self::with_base_url(
            format!("{}://{}:{}/{}", api.protocol, api.host, api.port, api.version),
            HttpOptions {
                timeout: api.timeout(),
                prefer_ipv6: api.prefer_ipv6,
            },
        )
    }

    pub fn with_base_url(base_url: impl Into<String>, opts: HttpOptions) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            opts,
        }
    }

    pub fn endpoint(&self, category: Category) -> String {
        format!("{}/{category}?", self.base_url)
    }
}

#[async_trait]
impl Deliver for StatsClient {
    async fn deliver(
        &self,
        category: Category,
        point: &PushPointReq,
        token: &DeviceToken,
    ) -> anyhow::Result<PushPointResp> {
        let body = Bytes::from(serde_json::to_vec(point)?);
        let req = http_util::request_builder(&self.endpoint(category), Method::POST)?
            .header(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Token {token}"))?,
            )
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len())
            .body(body)?;

        let resp = http_util::send(req, self.opts).await?;
        trace!("{category} point '{}' answered {}", point.key, resp.status());

        match serde_json::from_slice::<PushPointResp>(resp.body()) {
            Ok(parsed) => Ok(parsed),
            // a bare conflict still means the server already has the point
            Err(_) if resp.status() == StatusCode::CONFLICT => Ok(PushPointResp {
                success: false,
                code: Some(PushPointResp::CONFLICT),
                message: None,
            }),
            Err(e) => anyhow::bail!(
                "malformed response [{}]: {e}",
                resp.status().as_u16()
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header as header_is, method, path},
    };

    use super::*;

    fn client(server: &MockServer) -> StatsClient {
        StatsClient::with_base_url(
            format!("{}/v1/", server.uri()),
            HttpOptions {
                timeout: Duration::from_secs(5),
                prefer_ipv6: false,
            },
        )
    }

    fn request() -> PushPointReq {
        PushPointReq {
            key: "uptime".to_owned(),
            device: "device-0".to_owned(),
            boot_id: "boot-1".to_owned(),
            stamp_ms: 1_000,
            format: "1.0".to_owned(),
            payload: json!({"uptime": 12}),
        }
    }

    fn token() -> DeviceToken {
        "dt1-3nXp-43dzqWFn".parse().unwrap()
    }

    #[test]
    fn endpoint_follows_url_template() {
        let api = crate::config::load("/nonexistent/agent.toml").unwrap().api;
        let client = StatsClient::new(&api);
        assert_eq!(
            client.endpoint(Category::Configuration),
            "https://stats.duckietown.org:443/v1/configuration?"
        );
    }

    #[tokio::test]
    async fn posts_json_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/usage"))
            .and(header_is("authorization", "Token dt1-3nXp-43dzqWFn"))
            .and(header_is("content-type", "application/json"))
            .and(body_json(json!({
                "key": "uptime",
                "device": "device-0",
                "boot_id": "boot-1",
                "stamp_ms": 1000,
                "format": "1.0",
                "payload": {"uptime": 12},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client(&server)
            .deliver(Category::Usage, &request(), &token())
            .await
            .unwrap();
        assert!(resp.success);
    }

    #[tokio::test]
    async fn interprets_conflicts_and_garbage() {
        let server = MockServer::start().await;
        Mock::given(path("/v1/event"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": false, "code": 409})),
            )
            .mount(&server)
            .await;
        Mock::given(path("/v1/configuration"))
            .respond_with(ResponseTemplate::new(409).set_body_string("already there"))
            .mount(&server)
            .await;
        Mock::given(path("/v1/usage"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let client = client(&server);
        let event = client
            .deliver(Category::Event, &request(), &token())
            .await
            .unwrap();
        assert!(event.is_duplicate());

        let configuration = client
            .deliver(Category::Configuration, &request(), &token())
            .await
            .unwrap();
        assert!(configuration.is_duplicate());

        assert!(
            client
                .deliver(Category::Usage, &request(), &token())
                .await
                .is_err()
        );
    }
}
