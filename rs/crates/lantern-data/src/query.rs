//! Query descriptions and the stale-but-available result state.

use serde::Serialize;
use serde_json::Value;

use crate::DataError;

/// One table read: `GET {api}/rest/<table>?select=..&<filter>&order=..&limit=n`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySpec {
    pub table: String,
    pub select: Option<String>,
    /// Raw PostgREST-style filter, appended verbatim (`status=eq.open`).
    pub filter: Option<String>,
    pub order: Option<String>,
    pub limit: Option<u32>,
}

impl QuerySpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into(), ..Default::default() }
    }

    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Single-record lookup by `id`.
    pub fn by_id(table: impl Into<String>, id: &str) -> Self {
        Self::new(table).filter(format!("id=eq.{}", urlencoding::encode(id))).limit(1)
    }

    /// Full request URL under `api_base`. Same shape the guest runtime emits.
    pub fn url(&self, api_base: &str) -> String {
        let mut params = vec![format!("select={}", urlencoding::encode(self.select.as_deref().unwrap_or("*")))];
        if let Some(filter) = self.filter.as_deref().filter(|f| !f.is_empty()) {
            params.push(filter.to_string());
        }
        if let Some(order) = &self.order {
            params.push(format!("order={}", urlencoding::encode(order)));
        }
        if let Some(limit) = self.limit {
            params.push(format!("limit={}", limit));
        }
        format!("{}/rest/{}?{}", api_base.trim_end_matches('/'), urlencoding::encode(&self.table), params.join("&"))
    }
}

/// `{ data, loading, error }` for one subscription.
///
/// Successful responses replace `data` and clear `error`; failures only set
/// `error`, so the last good rows stay visible.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryState {
    pub data: Vec<Value>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for QueryState {
    fn default() -> Self {
        Self { data: Vec::new(), loading: true, error: None }
    }
}

impl QueryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, outcome: Result<Vec<Value>, DataError>) {
        match outcome {
            Ok(rows) => {
                self.data = rows;
                self.error = None;
            }
            Err(e) => self.error = Some(e.to_string()),
        }
        self.loading = false;
    }
}

/// Classify a decoded body: array = rows, object with `message`/`error` =
/// API failure, anything else is malformed.
pub fn classify(body: Value) -> Result<Vec<Value>, DataError> {
    match body {
        Value::Array(rows) => Ok(rows),
        other => match error_message(&other) {
            Some(msg) => Err(DataError::Api(msg)),
            None => Err(DataError::UnexpectedShape),
        },
    }
}

/// Message of an error-shaped body: `message`, a string `error`, or
/// `error.message`.
pub fn error_message(body: &Value) -> Option<String> {
    let obj = body.as_object()?;
    if let Some(msg) = obj.get("message").and_then(Value::as_str) {
        return Some(msg.to_string());
    }
    match obj.get("error") {
        Some(Value::String(msg)) => Some(msg.clone()),
        Some(err) => err.get("message").and_then(Value::as_str).map(String::from),
        None => None,
    }
}

/// Keep rows whose `quantity` coerces to a number `>= min`. Rows without a
/// usable quantity are dropped.
pub fn filter_by_quantity(rows: Vec<Value>, min: f64) -> Vec<Value> {
    rows.into_iter()
        .filter(|row| row.get("quantity").and_then(coerce_number).map_or(false, |q| q >= min))
        .collect()
}

// Loose numeric coercion, matching how the guest compares quantities.
fn coerce_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_shape() {
        let spec = QuerySpec::new("products").select("id,name").filter("status=eq.open").order("name.asc").limit(20);
        assert_eq!(
            spec.url("https://db.test/"),
            "https://db.test/rest/products?select=id%2Cname&status=eq.open&order=name.asc&limit=20"
        );
        assert_eq!(QuerySpec::new("orders").url("https://db.test"), "https://db.test/rest/orders?select=%2A");
    }

    #[test]
    fn test_by_id_encodes_value() {
        let spec = QuerySpec::by_id("vendors", "a b/c");
        assert_eq!(spec.url("http://x"), "http://x/rest/vendors?select=%2A&id=eq.a%20b%2Fc&limit=1");

        let spec = QuerySpec::by_id("vendors", "café&x=1");
        assert_eq!(spec.url("http://x"), "http://x/rest/vendors?select=%2A&id=eq.caf%C3%A9%26x%3D1&limit=1");
    }

    #[test]
    fn test_error_keeps_previous_data() {
        let mut state = QueryState::new();
        state.apply(classify(json!([{ "id": 1 }])));
        assert_eq!(state.data, vec![json!({ "id": 1 })]);
        assert!(!state.loading);

        state.apply(classify(json!({ "message": "relation not found" })));
        assert_eq!(state.data, vec![json!({ "id": 1 })]);
        assert_eq!(state.error.as_deref(), Some("relation not found"));

        state.apply(classify(json!([])));
        assert!(state.data.is_empty());
        assert_eq!(state.error, None);
    }

    #[test]
    fn test_error_from_initial_empty_state() {
        let mut state = QueryState::new();
        state.apply(classify(json!({ "message": "relation not found" })));
        assert!(state.data.is_empty());
        assert_eq!(state.error.as_deref(), Some("relation not found"));
        assert!(!state.loading);
    }

    #[test]
    fn test_error_message_variants() {
        assert_eq!(error_message(&json!({ "error": "denied" })).as_deref(), Some("denied"));
        assert_eq!(error_message(&json!({ "error": { "message": "nested" } })).as_deref(), Some("nested"));
        assert_eq!(error_message(&json!({ "ok": true })), None);
        assert_eq!(classify(json!("text")), Err(DataError::UnexpectedShape));
    }

    #[test]
    fn test_quantity_threshold() {
        let rows = vec![json!({ "id": "a", "quantity": 0.4 }), json!({ "id": "b", "quantity": 5 })];
        assert_eq!(filter_by_quantity(rows, 1.0), vec![json!({ "id": "b", "quantity": 5 })]);
    }

    #[test]
    fn test_quantity_coercion() {
        let rows = vec![
            json!({ "id": "str", "quantity": "3" }),
            json!({ "id": "missing" }),
            json!({ "id": "null", "quantity": null }),
            json!({ "id": "junk", "quantity": "lots" }),
        ];
        let kept: Vec<_> = filter_by_quantity(rows.clone(), 1.0).iter().map(|r| r["id"].clone()).collect();
        assert_eq!(kept, vec![json!("str")]);
        let kept: Vec<_> = filter_by_quantity(rows, 0.0).iter().map(|r| r["id"].clone()).collect();
        assert_eq!(kept, vec![json!("str"), json!("null")]);
    }
}
