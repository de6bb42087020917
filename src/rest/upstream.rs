//! HTTP client forwarding rest-alias calls to the host REST API.
//! Uses reqwest-middleware for retries on transient failures.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::{Map, Value};
use url::Url;

use super::{expand_route, RestRouter, RouteSpec, RouteTable};
use crate::mcp::tool::HttpMethod;
use crate::middleware::rbac::Principal;

/// Header carrying the acting principal's id to the upstream.
pub const ACTING_USER_HEADER: &str = "x-mcp-user";

pub struct HttpRestRouter {
    base: Url,
    table: RouteTable,
    client: ClientWithMiddleware,
    token: Option<String>,
}

impl HttpRestRouter {
    pub fn new(base: &str, routes: Vec<RouteSpec>, token: Option<String>) -> anyhow::Result<Self> {
        // Url::join drops the last segment unless the base ends in '/'.
        let mut base = Url::parse(base).with_context(|| format!("invalid upstream URL '{}'", base))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let reqwest_client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("failed to build HTTP client")?;

        // Retries: 3 times with exponential backoff
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            base,
            table: RouteTable::new(routes)?,
            client,
            token,
        })
    }

    fn url_for(&self, path: &str) -> anyhow::Result<Url> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl RestRouter for HttpRestRouter {
    fn routes(&self) -> Vec<RouteSpec> {
        self.table.specs()
    }

    fn find(&self, method: HttpMethod, path: &str) -> Option<RouteSpec> {
        self.table.find(method, path).cloned()
    }

    async fn dispatch(
        &self,
        method: HttpMethod,
        path: &str,
        params: Value,
        principal: &Principal,
    ) -> anyhow::Result<Value> {
        let mut params = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => anyhow::bail!("REST parameters must be an object, got {}", other),
        };
        let concrete = expand_route(path, &mut params);
        let mut url = self.url_for(&concrete)?;

        let body = match method {
            HttpMethod::Get | HttpMethod::Delete => {
                if !params.is_empty() {
                    let mut pairs = url.query_pairs_mut();
                    for (key, value) in &params {
                        pairs.append_pair(key, &query_value(value));
                    }
                }
                None
            }
            _ => Some(serde_json::to_vec(&Value::Object(params))?),
        };

        tracing::debug!(method = %method, url = %url, user_id = principal.id, "forwarding REST call");

        let mut req = self
            .client
            .request(method.into(), url.as_str())
            .header(ACTING_USER_HEADER, principal.id.to_string());
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.header("content-type", "application/json").body(body);
        }

        let resp = req.send().await.map_err(|e| {
            tracing::warn!("Upstream request failed after retries: {}", e);
            anyhow::anyhow!("upstream request failed: {}", e)
        })?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        let payload = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        if !status.is_success() {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| payload.to_string());
            anyhow::bail!("{} {} returned {}: {}", method, concrete, status.as_u16(), message);
        }
        Ok(payload)
    }
}
