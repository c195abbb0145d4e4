//! Shell page: the browser side of a `BrowserEngine`.
//!
//! Holds the guest in a sandboxed `<iframe srcdoc>`, swaps frames on load
//! events, relays guest `postMessage`s (tagged with the frame's generation)
//! and paints the loading, error and empty overlays from the session view.

use crate::config::SessionConfig;

const SHELL_CSS: &str = r#"
html,body{margin:0;height:100%;font-family:system-ui,-apple-system,sans-serif;background:#fafafa}
#stage{position:relative;height:100%;overflow:hidden}
#stage iframe{position:absolute;inset:0;width:100%;height:100%;border:0;background:#fff;opacity:0;transition:opacity var(--fade) ease}
#stage iframe.visible{opacity:1}
#stage.fading iframe.visible{opacity:.6}
.overlay{position:absolute;inset:0;display:none;align-items:center;justify-content:center;pointer-events:none}
.overlay.on{display:flex}
#loading .spinner{width:28px;height:28px;border:3px solid #ddd;border-top-color:#555;border-radius:50%;animation:spin .8s linear infinite}
@keyframes spin{to{transform:rotate(360deg)}}
#empty{color:#666;font-size:14px}
#error{align-items:flex-start;padding:16px}
#error .panel{pointer-events:auto;max-width:720px;width:100%;padding:16px;border:1px solid #f5c2c7;border-radius:8px;background:#fff5f5;color:#842029;box-shadow:0 2px 8px rgba(0,0,0,.08)}
#error pre{white-space:pre-wrap;font-size:12px;margin:8px 0 0}
#error button{margin-top:12px}
"#;

const SHELL_JS: &str = r#"
(function () {
  'use strict';
  var cfg = window.__LANTERN_SHELL__;
  var base = '/sessions/' + encodeURIComponent(cfg.session);
  var stage = document.getElementById('stage');
  var overlays = {
    loading: document.getElementById('loading'),
    empty: document.getElementById('empty'),
    error: document.getElementById('error')
  };
  var errorText = document.getElementById('error-text');
  var dismissed = null;
  var current = null;
  var pending = null;
  var outbox = Promise.resolve();

  // Signals are posted one at a time so the host sees them in order.
  function send(msg) {
    outbox = outbox.then(function () {
      return fetch(base + '/guest', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify(msg)
      }).catch(function () {});
    });
  }

  function entryFor(win) {
    if (pending && pending.frame && pending.frame.contentWindow === win) return pending;
    if (current && current.frame.contentWindow === win) return current;
    return null;
  }

  window.addEventListener('message', function (event) {
    var data = event.data;
    if (!data || typeof data !== 'object' || !data.__lantern) return;
    var entry = entryFor(event.source);
    if (!entry) return;
    var msg = {};
    for (var k in data.__lantern) msg[k] = data.__lantern[k];
    msg.generation = entry.generation;
    send(msg);
  });

  function drop(entry) {
    if (entry && entry.frame && entry.frame.parentNode) entry.frame.parentNode.removeChild(entry.frame);
  }

  function teardown() {
    drop(pending);
    drop(current);
    pending = null;
    current = null;
  }

  function promote(entry) {
    var old = current;
    current = entry;
    pending = null;
    entry.frame.classList.add('visible');
    if (old) setTimeout(function () { drop(old); }, cfg.crossfadeMs);
  }

  function load(generation) {
    if ((current && current.generation === generation) || (pending && pending.generation === generation)) return;
    drop(pending);
    var entry = { generation: generation, frame: null };
    pending = entry;
    fetch(base + '/doc/' + generation, { cache: 'no-store' })
      .then(function (res) {
        if (!res.ok) throw new Error('document ' + generation + ': HTTP ' + res.status);
        return res.text();
      })
      .then(function (html) {
        if (pending !== entry) return;
        var frame = document.createElement('iframe');
        frame.setAttribute('sandbox', 'allow-scripts allow-forms allow-modals allow-popups');
        frame.setAttribute('title', 'preview');
        entry.frame = frame;
        frame.addEventListener('load', function () {
          if (pending !== entry) return;
          send({ generation: generation, kind: 'loaded' });
          promote(entry);
        });
        frame.srcdoc = html;
        stage.appendChild(frame);
      })
      .catch(function (err) {
        if (pending === entry) pending = null;
        send({ generation: generation, kind: 'load-failed', error: String((err && err.message) || err) });
      });
  }

  function show(name, on) {
    overlays[name].classList.toggle('on', !!on);
  }

  function paint(view) {
    stage.classList.toggle('fading', view.crossfade);
    show('empty', view.state === 'idle');
    overlays.empty.textContent = view.empty_message || '';
    show('loading', view.state === 'loading' && !view.error);
    if (view.error !== dismissed) dismissed = null;
    show('error', !!view.error && dismissed === null);
    errorText.textContent = view.error || '';
  }

  document.getElementById('dismiss').addEventListener('click', function () {
    dismissed = errorText.textContent;
    show('error', false);
  });

  var source = new EventSource(base + '/events');
  source.onmessage = function (event) {
    var msg = JSON.parse(event.data);
    if (msg.type === 'load') load(msg.generation);
    else if (msg.type === 'teardown') teardown();
    else if (msg.type === 'view') paint(msg);
  };
})();
"#;

/// Render the shell page for one session.
pub fn render_shell(session_id: &str, timing: &SessionConfig) -> String {
    let cfg = serde_json::json!({ "session": session_id, "crossfadeMs": timing.crossfade_ms });
    let cfg = cfg.to_string().replace('<', "\\u003c");

    let mut html = String::with_capacity(SHELL_CSS.len() + SHELL_JS.len() + 1024);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\" />\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n");
    html.push_str("<title>Lantern preview</title>\n");
    html.push_str(&format!("<style>:root{{--fade:{}ms}}{}</style>\n", timing.crossfade_ms, SHELL_CSS));
    html.push_str("</head>\n<body>\n<div id=\"stage\">\n");
    html.push_str("<div id=\"loading\" class=\"overlay\"><div class=\"spinner\"></div></div>\n");
    html.push_str("<div id=\"empty\" class=\"overlay\"></div>\n");
    html.push_str("<div id=\"error\" class=\"overlay\"><div class=\"panel\"><strong>Preview error</strong>");
    html.push_str("<pre id=\"error-text\"></pre><button id=\"dismiss\" type=\"button\">Dismiss</button></div></div>\n");
    html.push_str("</div>\n");
    html.push_str(&format!("<script>window.__LANTERN_SHELL__ = {};</script>\n", cfg));
    html.push_str("<script>");
    html.push_str(SHELL_JS);
    html.push_str("</script>\n</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_embeds_session_safely() {
        let html = render_shell("s</script>1", &SessionConfig::default());
        assert!(html.contains(r#""session":"s\u003c/script>1""#));
        assert!(html.contains("--fade:300ms"));
        assert_eq!(html.matches("</script>").count(), 2);
    }
}
