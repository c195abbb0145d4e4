//! Embedded V8 harness for the injected guest scripts.
//!
//! Loads `data-runtime.js` into a bare isolate with a scripted `fetch` and
//! manual timers, so polling behavior can be exercised without a browser.
//! Requests are recorded in `__requests`; responses are served FIFO from
//! `__responses`. Held responses resolve only when their `__held[i]()`
//! callback runs.
//!
//! `RuntimeHarness::mount` goes further and runs a whole document's script
//! sequence (shim, runtime, extracted globals, epilogue) against stub
//! `React` / `ReactDOM` / `Babel` and a two-element `document`. Mounted trees
//! land in `__mounted`, bridge posts in `__posted`, and the `#root` element
//! is `__elements.root`.

use std::sync::Once;

use lantern_source::{ExtractedVariables, RECOGNIZED_IDENTIFIERS};

use crate::globals_script;
use crate::runtime::{guest_config, script_json, RuntimeConfig, DATA_RUNTIME_JS, EPILOGUE_JS, GUEST_SHIM_JS};

const PRELUDE: &str = r#"
globalThis.__requests = [];
globalThis.__responses = [];
globalThis.fetch = function (url, init) {
  __requests.push({ url: url, init: init || {} });
  var next = __responses.shift();
  if (!next) return Promise.reject(new Error('no response queued'));
  if (next.transportError) return Promise.reject(new Error(next.transportError));
  var response = { json: function () { return Promise.resolve(next.body); } };
  if (next.hold) return new Promise(function (resolve) { __held.push(function () { resolve(response); }); });
  return Promise.resolve(response);
};
globalThis.__held = [];
globalThis.__timers = [];
globalThis.setInterval = function (fn, ms) { __timers.push({ fn: fn, ms: ms, cleared: false }); return __timers.length; };
globalThis.clearInterval = function (id) { if (__timers[id - 1]) __timers[id - 1].cleared = true; };
globalThis.__fireTimers = function () {
  __timers.forEach(function (t) { if (!t.cleared) t.fn(); });
};
"#;

const PAGE_PRELUDE: &str = r#"
globalThis.window = globalThis;
globalThis.console = globalThis.console || {};
globalThis.addEventListener = function () {};
globalThis.__posted = [];
globalThis.parent = { postMessage: function (message) { __posted.push(message.__lantern); } };
function __element(tag) {
  return {
    tagName: tag,
    className: '',
    textContent: '',
    children: [],
    get firstChild() { return this.children[0] || null; },
    appendChild: function (child) { this.children.push(child); return child; },
    removeChild: function (child) { this.children.splice(this.children.indexOf(child), 1); return child; }
  };
}
globalThis.__elements = { root: __element('div'), 'lantern-source': __element('script') };
globalThis.document = {
  getElementById: function (id) { return __elements[id] || null; },
  createElement: __element
};
globalThis.__mounted = [];
globalThis.React = {
  Component: function (props) { this.props = props; },
  createElement: function (type, props) {
    return { type: type, props: props || {}, children: Array.prototype.slice.call(arguments, 2) };
  }
};
React.Component.prototype.setState = function (patch) { this.state = Object.assign({}, this.state, patch); };
globalThis.ReactDOM = {
  createRoot: function (el) { return { render: function (tree) { __mounted.push(tree); } }; }
};
globalThis.Babel = { transform: function (source) { return { code: source }; } };
"#;

static V8_INIT: Once = Once::new();

fn init_platform() {
    V8_INIT.call_once(|| {
        let platform = v8::new_default_platform(0, false).make_shared();
        v8::V8::initialize_platform(platform);
        v8::V8::initialize();
    });
}

pub struct RuntimeHarness {
    isolate: v8::OwnedIsolate,
    context: v8::Global<v8::Context>,
}

impl RuntimeHarness {
    fn blank() -> Self {
        init_platform();
        let mut isolate = v8::Isolate::new(v8::CreateParams::default());
        let context = {
            let handle_scope = &mut v8::HandleScope::new(&mut isolate);
            let context = v8::Context::new(handle_scope, Default::default());
            v8::Global::new(handle_scope, context)
        };
        Self { isolate, context }
    }

    pub fn new(config: &RuntimeConfig, recognized: &[&str]) -> Result<Self, String> {
        let mut harness = Self::blank();

        let mut boot = String::from(PRELUDE);
        boot.push_str("globalThis.__LANTERN_CONFIG__ = ");
        boot.push_str(&script_json(&guest_config(config, recognized)));
        boot.push_str(";\n");
        boot.push_str(DATA_RUNTIME_JS);
        harness.run_raw(&boot)?;
        Ok(harness)
    }

    /// Run a document's scripts in page order with `normalized` as the
    /// embedded program. Babel is an identity transform, so the program must
    /// be plain JS.
    pub fn mount(config: &RuntimeConfig, normalized: &str, vars: &ExtractedVariables) -> Result<Self, String> {
        let mut harness = Self::blank();

        harness.run_raw(PRELUDE)?;
        harness.run_raw(PAGE_PRELUDE)?;
        harness.run_raw(&format!(
            "window.__LANTERN_CONFIG__ = {};",
            script_json(&guest_config(config, &RECOGNIZED_IDENTIFIERS))
        ))?;
        harness.run_raw(GUEST_SHIM_JS)?;
        harness.run_raw(DATA_RUNTIME_JS)?;
        if !vars.is_empty() {
            harness.run_raw(&globals_script(vars))?;
        }
        harness.run_raw(&format!(
            "__elements['lantern-source'].textContent = {};",
            serde_json::Value::from(normalized)
        ))?;
        harness.run_raw(EPILOGUE_JS)?;
        Ok(harness)
    }

    /// Queue a JSON body for the next `fetch`.
    pub fn queue_response(&mut self, body_json: &str) -> Result<(), String> {
        self.eval(&format!("__responses.push({{ body: {} }})", body_json)).map(|_| ())
    }

    /// Queue a JSON body whose response stays pending until `__held[i]()`.
    pub fn queue_held_response(&mut self, body_json: &str) -> Result<(), String> {
        self.eval(&format!("__responses.push({{ body: {}, hold: true }})", body_json)).map(|_| ())
    }

    /// Make the next `fetch` reject with `message`.
    pub fn queue_transport_error(&mut self, message: &str) -> Result<(), String> {
        let literal = serde_json::Value::from(message).to_string();
        self.eval(&format!("__responses.push({{ transportError: {} }})", literal)).map(|_| ())
    }

    /// Evaluate `code` at global scope, drain microtasks, and return the
    /// completion value as JSON. Exceptions come back as `Err`.
    pub fn eval(&mut self, code: &str) -> Result<serde_json::Value, String> {
        let literal = serde_json::Value::from(code).to_string();
        let call_code = format!(
            r#"(function() {{ try {{ var __v = (0, eval)({}); return JSON.stringify(__v === undefined ? null : __v); }} catch(e) {{ return JSON.stringify({{__error: e.message || String(e)}}); }} }})()"#,
            literal
        );
        let json = self.run_raw(&call_code)?;
        let value: serde_json::Value = serde_json::from_str(&json).map_err(|e| format!("bad result {json:?}: {e}"))?;
        if let Some(msg) = value.get("__error").and_then(|v| v.as_str()) {
            return Err(msg.to_string());
        }
        Ok(value)
    }

    /// Run pending promise callbacks.
    pub fn settle(&mut self) {
        let handle_scope = &mut v8::HandleScope::new(&mut self.isolate);
        handle_scope.perform_microtask_checkpoint();
    }

    fn run_raw(&mut self, source: &str) -> Result<String, String> {
        let handle_scope = &mut v8::HandleScope::new(&mut self.isolate);
        let context = v8::Local::new(handle_scope, &self.context);
        let scope = &mut v8::ContextScope::new(handle_scope, context);

        let code = v8::String::new(scope, source).ok_or("source too large")?;
        let script = v8::Script::compile(scope, code, None).ok_or("failed to compile")?;
        let result = script.run(scope).ok_or("script threw")?;
        let out = result.to_rust_string_lossy(scope);
        scope.perform_microtask_checkpoint();
        Ok(out)
    }
}
