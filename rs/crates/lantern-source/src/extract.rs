//! Static extraction of well-known configuration constants.
//!
//! Best-effort and regex based: the first `(const|let|var) NAME = "value"`
//! (or single-quoted) declaration of an allow-listed name wins. Everything
//! else in the program is inert to the engine.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Identifiers eligible for extraction. Keep this list short; each entry is a
/// global the injected data runtime may read before user code runs.
pub const RECOGNIZED_IDENTIFIERS: [&str; 2] = ["LOCATION_ID", "VENDOR_ID"];

/// Extracted name → value pairs. Ordered so that documents built from the
/// same source are byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedVariables {
    values: BTreeMap<String, String>,
}

impl ExtractedVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Insert only if the name is recognized and not already present.
    /// Returns whether the value was stored.
    pub fn insert_first(&mut self, name: &str, value: impl Into<String>) -> bool {
        if !RECOGNIZED_IDENTIFIERS.contains(&name) || self.values.contains_key(name) {
            return false;
        }
        self.values.insert(name.to_string(), value.into());
        true
    }
}

fn declaration_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        RECOGNIZED_IDENTIFIERS
            .iter()
            .map(|name| {
                let pattern = format!(
                    r#"\b(?:const|let|var)\s+{}\s*=\s*(?:"([^"\\\n]*)"|'([^'\\\n]*)')"#,
                    regex::escape(name)
                );
                (*name, Regex::new(&pattern).expect("static pattern"))
            })
            .collect()
    })
}

/// Scan raw (not normalized) source for recognized declarations.
pub fn extract(source: &str) -> ExtractedVariables {
    let mut vars = ExtractedVariables::new();
    for (name, re) in declaration_patterns() {
        // `captures` returns the leftmost match: first declaration wins.
        if let Some(caps) = re.captures(source) {
            let value = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or("");
            vars.insert_first(name, value);
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_declaration_wins() {
        let src = "const LOCATION_ID = \"abc\";\nfunction f() {}\nconst LOCATION_ID = \"xyz\";\n";
        assert_eq!(extract(src).get("LOCATION_ID"), Some("abc"));
    }

    #[test]
    fn test_single_quotes_and_keywords() {
        let src = "let VENDOR_ID='v-9'\nvar LOCATION_ID = 'loc-1';";
        let vars = extract(src);
        assert_eq!(vars.get("VENDOR_ID"), Some("v-9"));
        assert_eq!(vars.get("LOCATION_ID"), Some("loc-1"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_missing_is_absent_not_error() {
        let vars = extract("const App = () => null;");
        assert!(vars.is_empty());
        assert_eq!(vars.get("LOCATION_ID"), None);
    }

    #[test]
    fn test_unrecognized_names_ignored() {
        let vars = extract("const STORE_ID = \"s1\";\nconst MY_LOCATION_ID = \"nope\";");
        assert!(vars.is_empty());
    }

    #[test]
    fn test_non_literal_assignment_ignored() {
        let vars = extract("const LOCATION_ID = params.id;\nconst LOCATION_ID = \"later\";");
        assert_eq!(vars.get("LOCATION_ID"), Some("later"));
    }

    #[test]
    fn test_insert_first_keeps_existing() {
        let mut vars = ExtractedVariables::new();
        assert!(vars.insert_first("LOCATION_ID", "a"));
        assert!(!vars.insert_first("LOCATION_ID", "b"));
        assert!(!vars.insert_first("OTHER", "c"));
        assert_eq!(vars.iter().collect::<Vec<_>>(), vec![("LOCATION_ID", "a")]);
    }
}
