//! Blocking HTTP client for the preview data API.
//!
//! Mirrors the request shapes of the injected guest runtime so tooling can
//! reproduce what a preview sees.

use std::time::Duration;

use serde_json::Value;

use crate::query::{classify, filter_by_quantity, QuerySpec};
use crate::{DataApiConfig, DataError};

pub struct DataClient {
    config: DataApiConfig,
    agent: ureq::Agent,
}

impl DataClient {
    /// Placeholders in `config` are resolved once, here.
    pub fn new(config: &DataApiConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(Duration::from_secs(30)).build();
        Self { config: config.resolved(), agent }
    }

    pub fn config(&self) -> &DataApiConfig {
        &self.config
    }

    pub fn rpc_url(&self) -> String {
        format!(
            "{}/rest/rpc/{}",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(&self.config.location_rpc)
        )
    }

    /// One table read.
    pub fn fetch(&self, spec: &QuerySpec) -> Result<Vec<Value>, DataError> {
        let url = spec.url(&self.config.url);
        tracing::debug!("[data] GET {}", url);
        let req = self.authorize(self.agent.get(&url));
        classify(read_json(req.call())?)
    }

    /// Products at a location, filtered to `quantity >= min_quantity`. Without
    /// a location id this degrades to a plain `products` read, unfiltered.
    pub fn location_products(&self, location_id: Option<&str>) -> Result<Vec<Value>, DataError> {
        let Some(location_id) = location_id.filter(|id| !id.is_empty()) else {
            return self.fetch(&QuerySpec::new("products"));
        };
        let url = self.rpc_url();
        tracing::debug!("[data] POST {} location_id={}", url, location_id);
        let body = serde_json::json!({ "location_id": location_id }).to_string();
        let req = self.authorize(self.agent.post(&url)).set("Content-Type", "application/json");
        let rows = classify(read_json(req.send_string(&body))?)?;
        Ok(filter_by_quantity(rows, self.config.min_quantity))
    }

    fn authorize(&self, req: ureq::Request) -> ureq::Request {
        req.set("apikey", &self.config.anon_key)
            .set("Authorization", &format!("Bearer {}", self.config.bearer()))
            .set("Accept", "application/json")
    }
}

// Error statuses still carry a JSON body worth classifying.
fn read_json(result: Result<ureq::Response, ureq::Error>) -> Result<Value, DataError> {
    let resp = match result {
        Ok(resp) => resp,
        Err(ureq::Error::Status(code, resp)) => {
            tracing::debug!("[data] HTTP {}", code);
            resp
        }
        Err(ureq::Error::Transport(t)) => return Err(t.into()),
    };
    let body = resp.into_string()?;
    serde_json::from_str(&body).map_err(|e| DataError::Decode(e.to_string()))
}
