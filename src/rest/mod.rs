//! Bridge to the host REST API used by rest-alias tools.
//!
//! Routes are declared as templates in which path parameters are named regex
//! groups, e.g. `/posts/(?P<id>[\d]+)`. A rest-alias tool references the
//! template verbatim; at call time its arguments fill the groups.

pub mod upstream;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mcp::tool::HttpMethod;
use crate::middleware::rbac::{Capability, Principal};

static PARAM_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\?P<(\w+)>[^)]*\)").expect("static regex"));

/// One declared upstream route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Capability the caller must hold; `None` admits any authenticated principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
}

/// Host route table consumed by the tool registry.
#[async_trait]
pub trait RestRouter: Send + Sync {
    fn routes(&self) -> Vec<RouteSpec>;

    /// Find the route matching `path`, either as its literal template or as a
    /// concrete path the template matches.
    fn find(&self, method: HttpMethod, path: &str) -> Option<RouteSpec>;

    fn has_route(&self, method: HttpMethod, path: &str) -> bool {
        self.find(method, path).is_some()
    }

    fn authorize(&self, method: HttpMethod, path: &str, principal: &Principal) -> bool {
        match self.find(method, path) {
            Some(route) => route.capability.map_or(true, |cap| principal.can(cap)),
            None => false,
        }
    }

    async fn dispatch(
        &self,
        method: HttpMethod,
        path: &str,
        params: Value,
        principal: &Principal,
    ) -> anyhow::Result<Value>;
}

/// Router with no routes. Every rest-alias registration against it fails.
pub struct NoRoutes;

#[async_trait]
impl RestRouter for NoRoutes {
    fn routes(&self) -> Vec<RouteSpec> {
        Vec::new()
    }

    fn find(&self, _method: HttpMethod, _path: &str) -> Option<RouteSpec> {
        None
    }

    async fn dispatch(
        &self,
        method: HttpMethod,
        path: &str,
        _params: Value,
        _principal: &Principal,
    ) -> anyhow::Result<Value> {
        anyhow::bail!("no REST upstream configured for {} {}", method, path)
    }
}

/// Compiled route templates.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<(RouteSpec, Regex)>,
}

impl RouteTable {
    pub fn new(specs: Vec<RouteSpec>) -> anyhow::Result<Self> {
        let mut routes = Vec::with_capacity(specs.len());
        for spec in specs {
            let pattern = Regex::new(&format!("^{}$", spec.path)).map_err(|e| {
                anyhow::anyhow!("route {} {} is not a valid template: {}", spec.method, spec.path, e)
            })?;
            routes.push((spec, pattern));
        }
        Ok(Self { routes })
    }

    pub fn specs(&self) -> Vec<RouteSpec> {
        self.routes.iter().map(|(spec, _)| spec.clone()).collect()
    }

    pub fn find(&self, method: HttpMethod, path: &str) -> Option<&RouteSpec> {
        let candidates = || self.routes.iter().filter(|(spec, _)| spec.method == method);
        candidates()
            .find(|(spec, _)| spec.path == path)
            .or_else(|| candidates().find(|(_, re)| re.is_match(path)))
            .map(|(spec, _)| spec)
    }
}

/// Substitute named path groups from `params`, removing the consumed keys.
///
/// Groups without a matching parameter are left in place, which makes the
/// resulting path fail upstream rather than silently hit another resource.
pub fn expand_route(template: &str, params: &mut Map<String, Value>) -> String {
    PARAM_GROUP
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match params.remove(name) {
                Some(Value::String(s)) => s,
                Some(Value::Null) | None => caps[0].to_string(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}
