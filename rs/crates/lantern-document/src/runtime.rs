//! Guest-side assets and the settings injected alongside them.
//!
//! The JS sources are embedded at compile time; they never exist as files the
//! user program can reference.

use serde::{Deserialize, Serialize};

/// Logging shim: console + uncaught errors → host bridge.
pub const GUEST_SHIM_JS: &str = include_str!("../assets/guest-shim.js");

/// Optional-library aliasing and the polling data-access primitives.
pub const DATA_RUNTIME_JS: &str = include_str!("../assets/data-runtime.js");

/// Compile, pick the entry component, mount behind an error boundary.
pub const EPILOGUE_JS: &str = include_str!("../assets/epilogue.js");

pub use lantern_source::ROOT_SYMBOLS;

/// Data API settings the runtime reads from `__LANTERN_CONFIG__`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub api_url: String,
    pub anon_key: String,
    pub service_key: Option<String>,
    pub poll_interval_ms: u64,
    pub min_quantity: f64,
    pub location_rpc: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            anon_key: String::new(),
            service_key: None,
            poll_interval_ms: 5000,
            min_quantity: 1.0,
            location_rpc: "location_products".into(),
        }
    }
}

/// Script URLs included in every document. Relative entries resolve against
/// the document base URL. Optional libraries may fail to load; the runtime
/// replaces their globals with stubs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySet {
    pub required: Vec<String>,
    pub optional: Vec<String>,
}

impl Default for LibrarySet {
    fn default() -> Self {
        Self {
            required: vec![
                "react@18.3.1/umd/react.production.min.js".into(),
                "react-dom@18.3.1/umd/react-dom.production.min.js".into(),
                "@babel/standalone@7.24.7/babel.min.js".into(),
            ],
            optional: vec![
                "https://cdn.tailwindcss.com".into(),
                "prop-types@15.8.1/prop-types.min.js".into(),
                "recharts@2.12.7/umd/Recharts.js".into(),
                "@remix-run/router@1.16.1/dist/router.umd.min.js".into(),
                "react-router@6.23.1/dist/umd/react-router.production.min.js".into(),
                "react-router-dom@6.23.1/dist/umd/react-router-dom.production.min.js".into(),
            ],
        }
    }
}

/// The object assigned to `window.__LANTERN_CONFIG__`.
pub(crate) fn guest_config(runtime: &RuntimeConfig, recognized: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "apiUrl": runtime.api_url,
        "anonKey": runtime.anon_key,
        "serviceKey": runtime.service_key,
        "pollIntervalMs": runtime.poll_interval_ms,
        "minQuantity": runtime.min_quantity,
        "locationRpc": runtime.location_rpc,
        "rootSymbols": ROOT_SYMBOLS,
        "recognized": recognized,
    })
}

/// Serialize for embedding in an inline `<script>`: `<` is written as a
/// unicode escape so no value can close the element.
pub(crate) fn script_json(value: &serde_json::Value) -> String {
    value.to_string().replace('<', "\\u003c")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_json_escapes_angle_brackets() {
        let v = serde_json::json!({ "apiUrl": "</script><script>alert(1)" });
        let out = script_json(&v);
        assert!(!out.contains('<'));
        let back: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_guest_config_shape() {
        let cfg = guest_config(&RuntimeConfig::default(), &["LOCATION_ID"]);
        assert_eq!(cfg["pollIntervalMs"], 5000);
        assert_eq!(cfg["locationRpc"], "location_products");
        assert_eq!(cfg["rootSymbols"][0], "App");
        assert_eq!(cfg["recognized"][0], "LOCATION_ID");
        assert!(cfg["serviceKey"].is_null());
    }

    #[test]
    fn test_assets_embedded() {
        assert!(GUEST_SHIM_JS.contains("__lantern"));
        assert!(DATA_RUNTIME_JS.contains("LanternData"));
        assert!(EPILOGUE_JS.contains("No component to mount"));
    }
}
