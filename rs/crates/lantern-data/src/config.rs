use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `data_api` section of `lantern.json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DataApiConfig {
    pub url: String,
    pub anon_key: String,
    /// Sent as the bearer token when present; otherwise the anon key is.
    pub service_key: Option<String>,
    pub poll_interval_ms: u64,
    pub min_quantity: f64,
    /// Name of the location aggregation RPC.
    pub location_rpc: String,
}

impl Default for DataApiConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            service_key: None,
            poll_interval_ms: 5000,
            min_quantity: 1.0,
            location_rpc: "location_products".into(),
        }
    }
}

impl DataApiConfig {
    /// Copy with `${env.NAME}` placeholders filled in. A service key that
    /// resolves to nothing is treated as absent.
    pub fn resolved(&self) -> Self {
        Self {
            url: resolve_env_vars(&self.url),
            anon_key: resolve_env_vars(&self.anon_key),
            service_key: self.service_key.as_deref().map(resolve_env_vars).filter(|k| !k.is_empty()),
            ..self.clone()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(if self.poll_interval_ms == 0 { 5000 } else { self.poll_interval_ms })
    }

    pub fn bearer(&self) -> &str {
        self.service_key.as_deref().unwrap_or(&self.anon_key)
    }
}

/// Resolve `${env.XXX}` placeholders in a string. Unset variables become
/// empty; an unterminated placeholder is left as is.
pub fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut from = 0;
    while let Some(rel) = result[from..].find("${env.") {
        let start = from + rel;
        let Some(end) = result[start..].find('}') else { break };
        let var_name = &result[start + 6..start + end];
        let replacement = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], replacement, &result[start + end + 1..]);
        from = start + replacement.len();
    }
    result
}
