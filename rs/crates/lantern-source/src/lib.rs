//! lantern-source - Preview source text handling
//!
//! Everything the engine derives from raw user source before a bootstrap
//! document is built:
//!   - `normalize` - strip module syntax, neutralize script-data terminators
//!   - `extract`   - pull allow-listed `LOCATION_ID`-style constants out of the text
//!   - `content_hash` - stable fingerprint of a built document

mod extract;
mod normalize;

pub use extract::{extract, ExtractedVariables, RECOGNIZED_IDENTIFIERS};
pub use normalize::{escape_script_data, normalize, strip_modules, ROOT_SYMBOLS};

/// User-authored preview program plus the id of the document that owns it.
///
/// The engine never mutates this; the editor hands over a fresh value on
/// every edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSource {
    pub document_id: String,
    pub text: String,
}

impl PreviewSource {
    pub fn new(document_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { document_id: document_id.into(), text: text.into() }
    }

    /// Whitespace-only source counts as empty.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// FNV-1a over the UTF-8 bytes. Deterministic across runs and platforms,
/// which `DefaultHasher` does not promise.
pub fn content_hash(text: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in text.as_bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}
