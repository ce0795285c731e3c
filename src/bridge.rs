//! Sandbox Bridge
//!
//! The bridge is a small same-origin document hosting the sandboxed inner
//! frame. The host posts it finished preview documents; it checks their
//! origin, acknowledges them, fixes up video embeds and assigns them as the
//! inner frame's whole document. Load events and console output from the
//! inner frame are reported back to the host.
//!
//! [`BridgeDocument`] models the bridge script's state machine so the
//! protocol can be exercised without a browser; [`render_bridge_document`]
//! emits the real thing.

use crate::assemble::embed_literal;
use crate::embeds::{fixup_embeds, inject_fixup_script, FIXUP_SCRIPT};
use crate::error::{PreviewError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

// ═══════════════════════════════════════════════════════════════════════════════
// WIRE MESSAGES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PreviewMessage {
    /// Host → bridge: replace the inner document
    #[serde(rename = "setPreviewHtml")]
    SetPreviewHtml { html: String },
    /// Bridge → host: a `setPreviewHtml` passed the origin check
    #[serde(rename = "preview:accepted")]
    Accepted,
    /// Bridge → host: the inner document finished loading
    #[serde(rename = "preview:loaded")]
    Loaded,
    /// Inner content → bridge → host, relayed verbatim
    #[serde(rename = "console")]
    Console {
        level: ConsoleLevel,
        #[serde(default)]
        args: Vec<serde_json::Value>,
    },
}

impl PreviewMessage {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| PreviewError::malformed(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Serialized origin (`scheme://host[:port]`) of the document at `url`.
pub fn origin_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| PreviewError::InvalidBridgeUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return Err(PreviewError::InvalidBridgeUrl {
            url: url.to_string(),
            reason: "opaque origin".to_string(),
        });
    }
    Ok(origin.ascii_serialization())
}

// ═══════════════════════════════════════════════════════════════════════════════
// ISOLATION POLICY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteKind {
    /// The bridge document itself; must stay embeddable by the host
    Bridge,
    /// Routes that need cross-origin isolation for shared memory
    SharedMemory,
}

pub const EMBEDDER_POLICY: &str = "Cross-Origin-Embedder-Policy";
pub const OPENER_POLICY: &str = "Cross-Origin-Opener-Policy";

impl RouteKind {
    /// Response headers for the route. The two pairings are fixed.
    pub fn isolation_headers(self) -> [(&'static str, &'static str); 2] {
        match self {
            RouteKind::Bridge => [(EMBEDDER_POLICY, "unsafe-none"), (OPENER_POLICY, "unsafe-none")],
            RouteKind::SharedMemory => {
                [(EMBEDDER_POLICY, "require-corp"), (OPENER_POLICY, "same-origin")]
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BRIDGE MODEL
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// Wrong origin or not a host message; nothing changed
    Ignored,
    /// Accepted and assigned to the inner frame
    Assigned,
    /// Accepted but held until the inner frame's first load
    Deferred,
}

/// State of one bridge document.
#[derive(Debug)]
pub struct BridgeDocument {
    origin: String,
    /// The inner frame finished its initial blank load
    listening: bool,
    pending: Option<String>,
    inner_document: Option<String>,
    outbox: Vec<PreviewMessage>,
}

impl BridgeDocument {
    pub fn new(bridge_url: &str) -> Result<Self> {
        Ok(Self {
            origin: origin_of(bridge_url)?,
            listening: false,
            pending: None,
            inner_document: None,
            outbox: Vec::new(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Document currently assigned to the inner frame.
    pub fn inner_document(&self) -> Option<&str> {
        self.inner_document.as_deref()
    }

    /// A message posted to the bridge window by `origin`.
    pub fn receive(&mut self, origin: &str, message: PreviewMessage) -> BridgeOutcome {
        if origin != self.origin {
            tracing::warn!(origin, expected = %self.origin, "bridge ignored message from foreign origin");
            return BridgeOutcome::Ignored;
        }
        let PreviewMessage::SetPreviewHtml { html } = message else {
            return BridgeOutcome::Ignored;
        };
        self.outbox.push(PreviewMessage::Accepted);
        let prepared = inject_fixup_script(&fixup_embeds(&html));
        if self.listening {
            self.inner_document = Some(prepared);
            BridgeOutcome::Assigned
        } else {
            self.pending = Some(prepared);
            BridgeOutcome::Deferred
        }
    }

    pub fn receive_json(&mut self, origin: &str, raw: &str) -> Result<BridgeOutcome> {
        let message = PreviewMessage::from_json(raw)?;
        Ok(self.receive(origin, message))
    }

    /// The inner frame fired `load`. The first one is the initial blank
    /// document and redelivers anything that arrived too early; every later
    /// one is reported to the host.
    pub fn inner_loaded(&mut self) {
        if !self.listening {
            self.listening = true;
            if let Some(pending) = self.pending.take() {
                self.inner_document = Some(pending);
            }
            return;
        }
        self.outbox.push(PreviewMessage::Loaded);
    }

    /// A message posted by the inner frame's content. Only console entries
    /// are relayed.
    pub fn relay_from_inner(&mut self, message: PreviewMessage) {
        if let PreviewMessage::Console { .. } = message {
            self.outbox.push(message);
        }
    }

    /// Messages posted to the host since the last call.
    pub fn take_outbox(&mut self) -> Vec<PreviewMessage> {
        std::mem::take(&mut self.outbox)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BRIDGE DOCUMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// The bridge page. Serve it with [`RouteKind::Bridge`] headers.
pub fn render_bridge_document() -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Preview</title>
<style>
  html, body {{ margin: 0; width: 100%; height: 100%; overflow: hidden; }}
  #preview-frame {{ display: block; border: 0; width: 100%; height: 100%; }}
</style>
</head>
<body>
<iframe id="preview-frame" sandbox="allow-scripts" title="Component preview"></iframe>
<script>
(() => {{
  const frame = document.getElementById("preview-frame");
  const ORIGIN = new URL(window.location.href).origin;
  const FIXUP = {fixup};
  let listening = false;
  let pending = null;

  const post = (message) => parent.postMessage(message, ORIGIN);
  const prepare = (html) => {{
    const tag = "<script>" + FIXUP + "<\/script>";
    const head = html.match(/<head(?:\s[^>]*)?>/i);
    if (!head) return tag + html;
    const at = head.index + head[0].length;
    return html.slice(0, at) + tag + html.slice(at);
  }};

  frame.addEventListener("load", () => {{
    if (!listening) {{
      listening = true;
      if (pending !== null) {{
        frame.srcdoc = pending;
        pending = null;
      }}
      return;
    }}
    post({{ type: "preview:loaded" }});
  }});

  window.addEventListener("message", (event) => {{
    const data = event.data;
    if (event.source === frame.contentWindow) {{
      if (data && data.type === "console") post({{ type: "console", level: data.level, args: data.args }});
      return;
    }}
    if (event.origin !== ORIGIN) return;
    if (!data || data.type !== "setPreviewHtml" || typeof data.html !== "string") return;
    post({{ type: "preview:accepted" }});
    const html = prepare(data.html);
    if (listening) frame.srcdoc = html;
    else pending = html;
  }});

  frame.srcdoc = "<!DOCTYPE html><title></title>";
}})();
</script>
</body>
</html>
"#,
        fixup = embed_literal(FIXUP_SCRIPT),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const BRIDGE_URL: &str = "https://preview.example.test:8443/bridge.html";

    #[test]
    fn test_origin_of() {
        assert_eq!(origin_of(BRIDGE_URL).unwrap(), "https://preview.example.test:8443");
        assert_eq!(origin_of("https://a.test/x").unwrap(), "https://a.test");
        assert!(matches!(
            origin_of("data:text/html,hi"),
            Err(PreviewError::InvalidBridgeUrl { .. })
        ));
        assert!(origin_of("not a url").is_err());
    }

    #[test]
    fn test_wire_format() {
        let msg = PreviewMessage::SetPreviewHtml {
            html: "<p>x</p>".to_string(),
        };
        assert_eq!(msg.to_json(), r#"{"type":"setPreviewHtml","html":"<p>x</p>"}"#);
        assert_eq!(PreviewMessage::Accepted.to_json(), r#"{"type":"preview:accepted"}"#);
        assert_eq!(
            PreviewMessage::from_json(r#"{"type":"console","level":"warn","args":["a",1]}"#).unwrap(),
            PreviewMessage::Console {
                level: ConsoleLevel::Warn,
                args: vec![serde_json::json!("a"), serde_json::json!(1)],
            }
        );
        assert!(matches!(
            PreviewMessage::from_json(r#"{"type":"explode"}"#),
            Err(PreviewError::MalformedMessage { .. })
        ));
    }

    #[test]
    fn test_isolation_pairings() {
        assert_eq!(
            RouteKind::Bridge.isolation_headers(),
            [(EMBEDDER_POLICY, "unsafe-none"), (OPENER_POLICY, "unsafe-none")]
        );
        assert_eq!(
            RouteKind::SharedMemory.isolation_headers(),
            [(EMBEDDER_POLICY, "require-corp"), (OPENER_POLICY, "same-origin")]
        );
    }

    #[test]
    fn test_foreign_origin_has_no_effect() {
        let mut bridge = BridgeDocument::new(BRIDGE_URL).unwrap();
        bridge.inner_loaded();
        let outcome = bridge.receive(
            "https://evil.test",
            PreviewMessage::SetPreviewHtml {
                html: "<p>pwned</p>".to_string(),
            },
        );
        assert_eq!(outcome, BridgeOutcome::Ignored);
        assert_eq!(bridge.inner_document(), None);
        assert!(bridge.take_outbox().is_empty());
    }

    #[test]
    fn test_accept_assign_and_report() {
        let mut bridge = BridgeDocument::new(BRIDGE_URL).unwrap();
        bridge.inner_loaded();
        let outcome = bridge
            .receive_json(
                "https://preview.example.test:8443",
                r#"{"type":"setPreviewHtml","html":"<html><head></head><body><iframe src=\"https://youtu.be/dQw4w9WgXcQ\"></iframe></body></html>"}"#,
            )
            .unwrap();
        assert_eq!(outcome, BridgeOutcome::Assigned);
        let inner = bridge.inner_document().unwrap();
        assert!(inner.contains("youtube-nocookie.com/embed/dQw4w9WgXcQ"));
        assert!(inner.contains("MutationObserver"));
        assert_eq!(bridge.take_outbox(), vec![PreviewMessage::Accepted]);

        bridge.inner_loaded();
        bridge.relay_from_inner(PreviewMessage::Console {
            level: ConsoleLevel::Log,
            args: vec![serde_json::json!("hi")],
        });
        bridge.relay_from_inner(PreviewMessage::Loaded);
        let out = bridge.take_outbox();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], PreviewMessage::Loaded);
        assert!(matches!(out[1], PreviewMessage::Console { .. }));
    }

    #[test]
    fn test_render_bridge_document() {
        let html = render_bridge_document();
        assert!(html.contains(r#"sandbox="allow-scripts""#));
        assert!(!html.contains("allow-same-origin"));
        assert!(html.contains("event.origin !== ORIGIN"));
        assert!(html.contains("preview:accepted"));
        assert!(html.contains("preview:loaded"));
        assert_eq!(html.matches("</script>").count(), 1);
    }
}
