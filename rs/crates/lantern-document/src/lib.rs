//! lantern-document - Self-contained bootstrap documents for live previews
//!
//! A bootstrap document is a complete HTML page that, loaded into an isolated
//! guest, compiles and mounts one user program. Building it is a pure
//! function of (normalized source, extracted variables, options): the same
//! inputs always produce byte-identical output.
//!
//! Section order is fixed:
//!   1. environment setup (`<base>`, reset styles)
//!   2. logging shim
//!   3. library includes, then the config + data runtime
//!   4. extracted configuration globals
//!   5. the normalized program, held inert
//!   6. epilogue (compile, select entry, mount)

#[cfg(feature = "v8")]
pub mod harness;
mod runtime;

use std::fmt;
use std::sync::Arc;

use lantern_source::{content_hash, extract, normalize, ExtractedVariables, RECOGNIZED_IDENTIFIERS};
use serde::Deserialize;

pub use runtime::{LibrarySet, RuntimeConfig, DATA_RUNTIME_JS, EPILOGUE_JS, GUEST_SHIM_JS, ROOT_SYMBOLS};

/// Id of the inert element holding the program text.
pub const SOURCE_ELEMENT_ID: &str = "lantern-source";

const DEFAULT_BASE_URL: &str = "https://unpkg.com/";

const RESET_CSS: &str = "*,*::before,*::after{box-sizing:border-box}\
html,body{margin:0;padding:0;min-height:100%;font-family:system-ui,-apple-system,sans-serif}\
#root{min-height:100vh}\
.lantern-error{margin:16px;padding:16px;border:1px solid #f5c2c7;border-radius:8px;background:#fff5f5;color:#842029}\
.lantern-error h2{margin:0 0 8px;font-size:16px}\
.lantern-error pre{margin:0;white-space:pre-wrap;font-size:12px}\
.lantern-error button{margin-top:12px}";

/// Knobs that shape the document but not the program.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DocumentOptions {
    /// Fixed base URL so relative library references resolve the same way
    /// regardless of where the guest was loaded from.
    pub base_url: String,
    pub title: String,
    pub libraries: LibrarySet,
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            title: "Preview".into(),
            libraries: LibrarySet::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// A built document. Cheap to clone; the HTML is shared.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapDocument {
    html: Arc<str>,
    hash: u64,
}

impl BootstrapDocument {
    pub fn as_str(&self) -> &str {
        &self.html
    }

    pub fn shared(&self) -> Arc<str> {
        Arc::clone(&self.html)
    }

    /// Content hash of the HTML; equal documents have equal hashes.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.html.len()
    }

    pub fn is_empty(&self) -> bool {
        self.html.is_empty()
    }
}

impl fmt::Debug for BootstrapDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapDocument")
            .field("len", &self.html.len())
            .field("hash", &format_args!("{:016x}", self.hash))
            .finish()
    }
}

/// Assemble a document from an already-normalized program.
pub fn build_document(normalized: &str, vars: &ExtractedVariables, options: &DocumentOptions) -> BootstrapDocument {
    let mut html = String::with_capacity(
        normalized.len() + GUEST_SHIM_JS.len() + DATA_RUNTIME_JS.len() + EPILOGUE_JS.len() + 4096,
    );

    // 1. environment
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\" />\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n");
    html.push_str(&format!("<base href=\"{}\" />\n", escape_attr(&options.base_url)));
    html.push_str(&format!("<title>{}</title>\n", escape_html(&options.title)));
    html.push_str("<style>");
    html.push_str(RESET_CSS);
    html.push_str("</style>\n");

    // 2. shim, before any library can log
    push_inline_script(&mut html, GUEST_SHIM_JS);

    // 3. libraries, then config + runtime
    for src in &options.libraries.required {
        html.push_str(&format!("<script src=\"{}\" crossorigin=\"anonymous\"></script>\n", escape_attr(src)));
    }
    for src in &options.libraries.optional {
        html.push_str(&format!(
            "<script src=\"{}\" crossorigin=\"anonymous\" data-optional=\"true\"></script>\n",
            escape_attr(src)
        ));
    }
    html.push_str("</head>\n<body>\n<div id=\"root\"></div>\n");

    let config = runtime::guest_config(&options.runtime, &RECOGNIZED_IDENTIFIERS);
    let mut runtime_js = String::with_capacity(DATA_RUNTIME_JS.len() + 512);
    runtime_js.push_str("window.__LANTERN_CONFIG__ = ");
    runtime_js.push_str(&runtime::script_json(&config));
    runtime_js.push_str(";\n");
    runtime_js.push_str(DATA_RUNTIME_JS);
    push_inline_script(&mut html, &runtime_js);

    // 4. extracted globals, assigned eagerly
    if !vars.is_empty() {
        push_inline_script(&mut html, &globals_script(vars));
    }

    // 5. program text; never executed by the HTML parser
    html.push_str(&format!("<script type=\"text/plain\" id=\"{}\">\n", SOURCE_ELEMENT_ID));
    html.push_str(normalized);
    html.push_str("\n</script>\n");

    // 6. epilogue
    push_inline_script(&mut html, EPILOGUE_JS);

    html.push_str("</body>\n</html>\n");

    let hash = content_hash(&html);
    BootstrapDocument { html: Arc::from(html), hash }
}

/// Normalize, extract and build in one step from raw user source.
pub fn build_from_source(raw: &str, options: &DocumentOptions) -> BootstrapDocument {
    let vars = extract(raw);
    build_document(&normalize(raw), &vars, options)
}

pub(crate) fn globals_script(vars: &ExtractedVariables) -> String {
    let mut globals = String::new();
    for (name, value) in vars.iter() {
        let literal = runtime::script_json(&serde_json::Value::from(value));
        globals.push_str(&format!("window.{} = {};\n", name, literal));
    }
    globals
}

fn push_inline_script(html: &mut String, body: &str) {
    html.push_str("<script>\n");
    html.push_str(body);
    html.push_str("\n</script>\n");
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_html(s).replace('"', "&quot;")
}
